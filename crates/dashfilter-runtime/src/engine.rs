#![forbid(unsafe_code)]

//! The dashboard filter engine.
//!
//! [`DashboardFilterEngine`] owns every piece of mutable filter state for one
//! dashboard: the filter configuration, the layout index, the data mask
//! store, the augmentation cache, and the per-panel request ledger.
//! Everything derived from that state (active filters, scopes, augmented
//! queries) is recomputed lazily the first time it is read after a change.
//!
//! # Lifecycle
//!
//! ```text
//! set_layout / set_filters / set_chart_configuration / set_legacy_filters
//!        │
//!        ▼
//! update_selected ──▶ apply ──▶ active_filters ──▶ get_augmented_query
//!                       ▲                                   │
//! emit_cross_filter ────┘                                   ▼
//!                                            issue_request / accept_response
//! ```
//!
//! Problems never cross the panel boundary. Broken configurations are
//! rejected from [`set_filters`](DashboardFilterEngine::set_filters); stale
//! layout references resolve to nothing and show up in
//! [`diagnostics`](DashboardFilterEngine::diagnostics).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashfilter_core::{
    AugmentedQuery, BaseQuery, ChartConfiguration, ColorAssignments, ConfigurationError, DataMask,
    Diagnostic, ExtraFormData, FilterId, Layout, LegacyFilter, LegacyFilterScopes, NativeFilter,
    PanelId,
};
use dashfilter_layout::{
    ActiveTabs, LayoutIndex, LayoutIndexCache, ScopeResolver, TabVisibility,
};
use serde::Serialize;
use serde_json::Value;
use web_time::Instant;

use crate::aggregate::{
    ActiveFilters, AggregationInput, AggregationOptions, FilterSource, compute_active_filters,
    panels_requiring_refresh,
};
use crate::augment::{AugmentationCacheStats, QueryAugmentationCache};
use crate::cascade::CascadeResolver;
use crate::config::EngineConfig;
use crate::data_mask::{ApplyOutcome, AppliedSnapshot, DataMaskStore, MaskEvent, MaskPhase};
use crate::filter_set::{self, FilterSet};
use crate::request::{RequestLedger, RequestTicket};

/// Notifications for the host application, drained with
/// [`DashboardFilterEngine::drain_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    DataMaskApplied {
        generation: u64,
        filter_ids: Vec<FilterId>,
    },
    DataMaskCleared {
        filter_ids: Vec<FilterId>,
    },
    FiltersRemoved {
        generation: u64,
        filter_ids: Vec<FilterId>,
    },
    /// These panels receive different filters than before and must refetch.
    ///
    /// With the tab check on, only visible panels are listed; a changed panel
    /// behind a closed tab is reported once its tab opens.
    PanelsNeedRefresh { panels: BTreeSet<PanelId> },
}

impl From<MaskEvent> for EngineEvent {
    fn from(event: MaskEvent) -> Self {
        match event {
            MaskEvent::Applied {
                generation,
                changed,
            } => Self::DataMaskApplied {
                generation,
                filter_ids: changed,
            },
            MaskEvent::Cleared { filter_ids } => Self::DataMaskCleared { filter_ids },
            MaskEvent::Removed {
                generation,
                filter_ids,
            } => Self::FiltersRemoved {
                generation,
                filter_ids,
            },
        }
    }
}

/// Why [`DashboardFilterEngine::apply`] refused to apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("required filters have no value: {}", join_ids(.0))]
    RequiredFiltersMissing(Vec<FilterId>),
}

/// A filter configuration refused by [`DashboardFilterEngine::set_filters`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("filter configuration rejected: {}", join_errors(.errors))]
pub struct ConfigurationRejected {
    pub errors: Vec<ConfigurationError>,
}

fn join_ids(ids: &[FilterId]) -> String {
    ids.iter().map(FilterId::as_str).collect::<Vec<_>>().join(", ")
}

fn join_errors(errors: &[ConfigurationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What an accepted [`set_filters`](DashboardFilterEngine::set_filters) changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationReport {
    pub added: Vec<FilterId>,
    pub updated: Vec<FilterId>,
    /// Filters back from the removal grace period.
    pub restored: Vec<FilterId>,
    pub scheduled_for_removal: Vec<FilterId>,
}

/// One filter in the legacy `{column, values}` shape older panels consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveColumnFilter {
    pub filter_id: FilterId,
    pub column: String,
    pub values: Value,
}

/// Filter state and derived views for one dashboard.
#[derive(Debug)]
pub struct DashboardFilterEngine {
    config: EngineConfig,
    layout: LayoutIndexCache,
    filters: Vec<NativeFilter>,
    /// Deleted filters still applying during their grace period.
    retired: BTreeMap<FilterId, NativeFilter>,
    chart_configuration: ChartConfiguration,
    legacy_filters: Vec<LegacyFilter>,
    legacy_scopes: LegacyFilterScopes,
    active_tabs: ActiveTabs,
    colors: ColorAssignments,
    masks: DataMaskStore,
    /// `None` when derived state is stale.
    active: Option<Arc<ActiveFilters>>,
    /// Last aggregation handed out, for refresh diffs.
    published: Arc<ActiveFilters>,
    /// Changed panels held back while their tab is closed.
    pending_refresh: BTreeSet<PanelId>,
    cache: QueryAugmentationCache,
    requests: RequestLedger,
    events: Vec<EngineEvent>,
}

impl Default for DashboardFilterEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DashboardFilterEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            cache: QueryAugmentationCache::new(config.cache_capacity),
            config,
            layout: LayoutIndexCache::new(),
            filters: Vec::new(),
            retired: BTreeMap::new(),
            chart_configuration: ChartConfiguration::default(),
            legacy_filters: Vec::new(),
            legacy_scopes: LegacyFilterScopes::new(),
            active_tabs: ActiveTabs::new(),
            colors: ColorAssignments::default(),
            masks: DataMaskStore::new(),
            active: None,
            published: Arc::new(ActiveFilters::default()),
            pending_refresh: BTreeSet::new(),
            requests: RequestLedger::new(),
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn layout_index(&self) -> &LayoutIndex {
        self.layout.index()
    }

    #[must_use]
    pub fn filters(&self) -> &[NativeFilter] {
        &self.filters
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Install a new layout version. Returns whether the index was rebuilt.
    pub fn set_layout(&mut self, layout: &Layout) -> bool {
        let rebuilt = self.layout.update(layout);
        if rebuilt {
            self.mark_dirty("layout");
        }
        rebuilt
    }

    /// Replace the native filter configuration.
    ///
    /// A configuration with any [`ConfigurationError`] is rejected as a
    /// whole and the previous one stays in effect. Filters missing from the
    /// new configuration keep applying for the removal grace period.
    pub fn set_filters(
        &mut self,
        filters: Vec<NativeFilter>,
        now: Instant,
    ) -> Result<ConfigurationReport, ConfigurationRejected> {
        let errors = self.configuration_errors(&filters);
        if !errors.is_empty() {
            for error in &errors {
                tracing::warn!(target: "dashfilter.engine", %error, "rejecting filter configuration");
            }
            return Err(ConfigurationRejected { errors });
        }

        let mut report = ConfigurationReport::default();
        let new_ids: BTreeSet<FilterId> = filters.iter().map(|f| f.id.clone()).collect();
        let deadline = now + self.config.removal_grace();
        for old in std::mem::take(&mut self.filters) {
            if new_ids.contains(&old.id) {
                continue;
            }
            self.masks.schedule_removal(old.id.clone(), deadline);
            report.scheduled_for_removal.push(old.id.clone());
            self.retired.insert(old.id.clone(), old);
        }
        for filter in &filters {
            if self.retired.remove(&filter.id).is_some() {
                report.restored.push(filter.id.clone());
            } else if self.masks.is_registered(&filter.id) {
                report.updated.push(filter.id.clone());
            } else {
                report.added.push(filter.id.clone());
            }
            self.masks
                .register_filter(filter.id.clone(), filter.default_data_mask.clone());
        }
        self.filters = filters;
        self.absorb_mask_events();
        self.mark_dirty("filters");
        tracing::debug!(
            target: "dashfilter.engine",
            added = report.added.len(),
            updated = report.updated.len(),
            restored = report.restored.len(),
            removing = report.scheduled_for_removal.len(),
            "filter configuration installed"
        );
        Ok(report)
    }

    pub fn set_chart_configuration(&mut self, configuration: ChartConfiguration) {
        if self.chart_configuration != configuration {
            self.chart_configuration = configuration;
            self.mark_dirty("chart configuration");
        }
    }

    pub fn set_legacy_filters(&mut self, filters: Vec<LegacyFilter>, scopes: LegacyFilterScopes) {
        if self.legacy_filters != filters || self.legacy_scopes != scopes {
            self.legacy_filters = filters;
            self.legacy_scopes = scopes;
            self.mark_dirty("legacy filters");
        }
    }

    pub fn set_active_tabs(&mut self, tabs: ActiveTabs) {
        if self.active_tabs != tabs {
            self.active_tabs = tabs;
            self.mark_dirty("active tabs");
            self.publish_refresh(BTreeSet::new());
        }
    }

    /// Colors folded into every augmented query from now on.
    pub fn set_color_assignments(&mut self, colors: ColorAssignments) {
        self.colors = colors;
    }

    /// Configuration errors of the current filters against the current layout.
    #[must_use]
    pub fn validate_configuration(&self) -> Vec<ConfigurationError> {
        self.configuration_errors(&self.filters)
    }

    fn configuration_errors(&self, filters: &[NativeFilter]) -> Vec<ConfigurationError> {
        let mut errors = CascadeResolver::new(filters).validate();
        let index = self.layout.index();
        // Before the first layout arrives there is nothing to check roots against.
        if !index.is_empty() {
            let resolver = ScopeResolver::new(index);
            for filter in filters {
                let Some(scope) = &filter.scope else {
                    continue;
                };
                errors.extend(resolver.dangling_roots(scope).map(|root| {
                    ConfigurationError::DanglingScopeRoot {
                        filter: filter.id.clone(),
                        root: root.clone(),
                    }
                }));
            }
        }
        errors
    }

    // ------------------------------------------------------------------
    // Selection and application
    // ------------------------------------------------------------------

    /// Record a filter-bar selection. Nothing downstream changes until
    /// [`apply`](Self::apply).
    ///
    /// When the selection actually changes, cascade children are reset to
    /// their defaults; their ids are returned.
    pub fn update_selected(
        &mut self,
        id: &FilterId,
        mask: DataMask,
    ) -> Result<Vec<FilterId>, ConfigurationError> {
        if !self.filters.iter().any(|f| f.id == *id) {
            return Err(ConfigurationError::UnknownFilter(id.clone()));
        }
        let state = mask.filter_state.clone();
        let previous = self.masks.update_selected(id.clone(), mask);
        let changed = previous.is_none_or(|p| p.filter_state != state);
        if !changed || !self.config.reset_dependents_on_parent_change {
            return Ok(Vec::new());
        }
        let resolver = CascadeResolver::new(&self.filters);
        let dependents = resolver.descendants(id);
        Ok(self.masks.reset_dependents(dependents))
    }

    /// Promote every selection to applied in one step.
    ///
    /// Refuses, applying nothing, while a required filter has no value.
    pub fn apply(&mut self) -> Result<ApplyOutcome, ApplyError> {
        let missing = self.masks.required_filters_missing(&self.filters);
        if !missing.is_empty() {
            tracing::debug!(
                target: "dashfilter.engine",
                missing = %join_ids(&missing),
                "apply refused"
            );
            return Err(ApplyError::RequiredFiltersMissing(missing));
        }
        let outcome = self.masks.apply();
        self.absorb_mask_events();
        if !outcome.changed.is_empty() {
            self.mark_dirty("apply");
        }
        Ok(outcome)
    }

    /// Apply a cross-filter emitted by `panel`. An inert mask clears it.
    ///
    /// Returns whether applied state changed.
    pub fn emit_cross_filter(&mut self, panel: PanelId, mask: DataMask) -> bool {
        if !self.config.cross_filters_enabled {
            tracing::debug!(
                target: "dashfilter.engine",
                panel = %panel,
                "cross-filters disabled; ignoring emission"
            );
            return false;
        }
        let id = panel.cross_filter_id();
        if self.filters.iter().any(|filter| filter.id == id) || self.retired.contains_key(&id) {
            tracing::warn!(
                target: "dashfilter.engine",
                panel = %panel,
                "cross-filter id collides with a native filter; ignoring emission"
            );
            return false;
        }
        let changed = if mask.is_inert() {
            self.masks.remove_now(&id)
        } else {
            !self.masks.apply_immediately(id, mask).changed.is_empty()
        };
        self.absorb_mask_events();
        if changed {
            self.mark_dirty("cross-filter");
        }
        changed
    }

    /// Reset every native filter's selection to its default.
    pub fn clear_all(&mut self) -> Vec<FilterId> {
        let cleared = self.masks.clear_all();
        self.absorb_mask_events();
        cleared
    }

    /// Purge filters whose removal grace period ended at or before `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<FilterId> {
        let purged = self.masks.purge_expired(now);
        if !purged.is_empty() {
            for id in &purged {
                self.retired.remove(id);
            }
            self.absorb_mask_events();
            self.mark_dirty("removal grace expired");
        }
        purged
    }

    #[must_use]
    pub fn phase(&self, id: &FilterId) -> MaskPhase {
        self.masks.phase(id)
    }

    #[must_use]
    pub fn selected(&self, id: &FilterId) -> Option<&DataMask> {
        self.masks.selected(id)
    }

    #[must_use]
    pub fn applied_snapshot(&self) -> AppliedSnapshot {
        self.masks.snapshot()
    }

    /// True when applying would do nothing or is refused.
    #[must_use]
    pub fn is_apply_disabled(&self) -> bool {
        !self.masks.has_pending_changes()
            || !self.masks.required_filters_missing(&self.filters).is_empty()
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    /// Current active filters, recomputed if anything changed since the last read.
    pub fn active_filters(&mut self) -> Arc<ActiveFilters> {
        if let Some(active) = &self.active {
            return Arc::clone(active);
        }
        let snapshot = self.masks.snapshot();
        let computed = {
            let natives: Vec<&NativeFilter> =
                self.filters.iter().chain(self.retired.values()).collect();
            Arc::new(compute_active_filters(&AggregationInput {
                index: self.layout.index(),
                native_filters: &natives,
                applied: &snapshot,
                chart_configuration: &self.chart_configuration,
                legacy_filters: &self.legacy_filters,
                legacy_scopes: &self.legacy_scopes,
                active_tabs: &self.active_tabs,
                options: AggregationOptions {
                    cross_filters: self.config.cross_filters_enabled,
                    legacy_filters: self.config.legacy_filters_enabled,
                    tab_scope_check: self.config.tab_scope_check,
                },
            }))
        };
        let changed = panels_requiring_refresh(&self.published, &computed);
        self.publish_refresh(changed);
        self.published = Arc::clone(&computed);
        self.active = Some(Arc::clone(&computed));
        computed
    }

    /// Filters affecting `panel` in the legacy `{column, values}` shape.
    pub fn get_active_filters(&mut self, panel: PanelId) -> Vec<ActiveColumnFilter> {
        let active = self.active_filters();
        let mut out = Vec::new();
        for entry in active.filters_for_panel(panel) {
            match (&entry.source, &entry.legacy) {
                (FilterSource::Legacy, Some(legacy)) => out.push(ActiveColumnFilter {
                    filter_id: entry.filter_id.clone(),
                    column: legacy.column.clone(),
                    values: legacy.values.clone(),
                }),
                _ => out.extend(entry.extra_form_data.filters.iter().map(|clause| {
                    ActiveColumnFilter {
                        filter_id: entry.filter_id.clone(),
                        column: clause.col.clone(),
                        values: clause.val.clone(),
                    }
                })),
            }
        }
        out
    }

    /// `base` with every filter affecting `panel` folded in.
    ///
    /// Returns the same `Arc` for as long as nothing that panel sees changes.
    pub fn get_augmented_query(&mut self, panel: PanelId, base: &BaseQuery) -> Arc<AugmentedQuery> {
        let active = self.active_filters();
        self.cache.get_or_build(panel, base, &self.colors, &active)
    }

    /// Applied output of `id` merged with its cascade ancestors.
    pub fn merged_upstream_output(&self, id: &FilterId) -> Result<ExtraFormData, ConfigurationError> {
        CascadeResolver::new(&self.filters).merged_upstream_output(id, &self.masks.snapshot())
    }

    /// Output of `id`'s cascade ancestors only; narrows its option query.
    pub fn dependencies(&self, id: &FilterId) -> Result<ExtraFormData, ConfigurationError> {
        CascadeResolver::new(&self.filters).dependencies(id, &self.masks.snapshot())
    }

    /// Saved set matching the current filter-bar selection.
    #[must_use]
    pub fn find_matching_filter_set<'a>(&self, sets: &'a [FilterSet]) -> Option<&'a FilterSet> {
        let selected: BTreeMap<FilterId, DataMask> = self
            .filters
            .iter()
            .filter_map(|f| self.masks.selected(&f.id).map(|m| (f.id.clone(), m.clone())))
            .collect();
        filter_set::find_existing(sets, &selected)
    }

    /// Everything wrong right now: configuration errors against the
    /// current layout, layout inconsistencies, and stale scope roots.
    pub fn diagnostics(&mut self) -> Vec<Diagnostic> {
        let active = self.active_filters();
        let mut out: Vec<Diagnostic> = self
            .validate_configuration()
            .into_iter()
            .map(Diagnostic::from)
            .collect();
        out.extend(self.layout.index().warnings().iter().cloned().map(Diagnostic::from));
        out.extend(active.diagnostics().iter().cloned());
        out
    }

    /// Pending notifications, oldest first.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.active_filters();
        std::mem::take(&mut self.events)
    }

    #[must_use]
    pub fn cache_stats(&self) -> AugmentationCacheStats {
        self.cache.stats()
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Augment `base` and register it as `panel`'s current request.
    pub fn issue_request(&mut self, panel: PanelId, base: &BaseQuery) -> RequestTicket {
        let query = self.get_augmented_query(panel, base);
        self.requests.issue(panel, query)
    }

    /// Whether the response for `ticket` is still current.
    pub fn accept_response(&mut self, ticket: &RequestTicket) -> bool {
        self.requests.accept(ticket)
    }

    // ------------------------------------------------------------------

    fn absorb_mask_events(&mut self) {
        self.events
            .extend(self.masks.drain_events().into_iter().map(EngineEvent::from));
    }

    /// Report `changed` and any held-back panels that are visible now.
    fn publish_refresh(&mut self, changed: BTreeSet<PanelId>) {
        let mut candidates = std::mem::take(&mut self.pending_refresh);
        candidates.extend(changed);
        if candidates.is_empty() {
            return;
        }
        let panels = if self.config.tab_scope_check {
            let visibility = TabVisibility::new(self.layout.index(), &self.active_tabs);
            let (visible, hidden): (BTreeSet<PanelId>, BTreeSet<PanelId>) = candidates
                .into_iter()
                .partition(|&panel| visibility.is_panel_visible(panel));
            if !hidden.is_empty() {
                tracing::debug!(
                    target: "dashfilter.engine",
                    deferred = hidden.len(),
                    "refresh deferred until tab opens"
                );
            }
            self.pending_refresh = hidden;
            visible
        } else {
            candidates
        };
        if !panels.is_empty() {
            tracing::debug!(
                target: "dashfilter.engine",
                panels = panels.len(),
                "panels need refresh"
            );
            self.events.push(EngineEvent::PanelsNeedRefresh { panels });
        }
    }

    fn mark_dirty(&mut self, reason: &'static str) {
        if self.active.take().is_some() {
            tracing::debug!(target: "dashfilter.engine", reason, "derived state invalidated");
        }
    }
}
