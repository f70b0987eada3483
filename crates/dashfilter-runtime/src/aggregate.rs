#![forbid(unsafe_code)]

//! Active filter aggregation.
//!
//! Folds the three filter sources into one list of [`ActiveFilterEntry`]
//! values, each carrying the panels it affects:
//!
//! | Source | Id | Scope |
//! |--------|----|-------|
//! | Native | configured id | declared scope, whole dashboard when absent |
//! | Cross | emitting panel's id | chart configuration scope, minus the emitter |
//! | Legacy | `{chartId}_{column}` | legacy scope map, minus the filter box |
//!
//! Entry order is the merge order augmentation uses: native filters in
//! declaration order, then cross-filters by panel id, then legacy filters by
//! key. Identical inputs always yield identical output.
//!
//! Stale scope roots resolve to nothing and are reported as diagnostics;
//! aggregation itself never fails.

use std::collections::{BTreeMap, BTreeSet};

use dashfilter_core::{
    ChartConfiguration, Diagnostic, ExtraFormData, FilterId, FilterScope, LegacyFilter,
    LegacyFilterKey, LegacyFilterScopes, NativeFilter, PanelId, QueryFilterClause,
};
use dashfilter_layout::{ActiveTabs, LayoutIndex, ScopeResolver, TabVisibility};
use serde_json::Value;

use crate::data_mask::AppliedSnapshot;

/// Where an active filter came from. Ordering is merge rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterSource {
    Native,
    Cross,
    Legacy,
}

/// Raw selection of one legacy filter-box column.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyColumnValues {
    pub column: String,
    pub values: Value,
}

impl LegacyColumnValues {
    /// Equality or membership clause for these values.
    #[must_use]
    pub fn to_clause(&self) -> Option<QueryFilterClause> {
        QueryFilterClause::from_selected_value(self.column.as_str(), &self.values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFilterEntry {
    pub filter_id: FilterId,
    pub source: FilterSource,
    pub affected_panel_ids: BTreeSet<PanelId>,
    /// Applied fragment. Empty for legacy entries.
    pub extra_form_data: ExtraFormData,
    pub legacy: Option<LegacyColumnValues>,
    /// False when every affected panel sits in an inactive tab.
    pub in_scope: bool,
}

impl ActiveFilterEntry {
    #[must_use]
    pub fn affects(&self, panel: PanelId) -> bool {
        self.affected_panel_ids.contains(&panel)
    }
}

/// Which sources to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationOptions {
    pub cross_filters: bool,
    pub legacy_filters: bool,
    pub tab_scope_check: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            cross_filters: true,
            legacy_filters: true,
            tab_scope_check: true,
        }
    }
}

/// Everything aggregation reads. Borrowed, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub index: &'a LayoutIndex,
    /// Configured filters followed by filters awaiting removal.
    pub native_filters: &'a [&'a NativeFilter],
    pub applied: &'a AppliedSnapshot,
    pub chart_configuration: &'a ChartConfiguration,
    pub legacy_filters: &'a [LegacyFilter],
    pub legacy_scopes: &'a LegacyFilterScopes,
    pub active_tabs: &'a ActiveTabs,
    pub options: AggregationOptions,
}

/// Aggregated active filters for one applied generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveFilters {
    entries: Vec<ActiveFilterEntry>,
    positions: BTreeMap<FilterId, usize>,
    diagnostics: Vec<Diagnostic>,
    generation: u64,
}

impl ActiveFilters {
    #[must_use]
    pub fn get(&self, id: &FilterId) -> Option<&ActiveFilterEntry> {
        self.positions.get(id).map(|&i| &self.entries[i])
    }

    /// Entries in merge order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveFilterEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applied generation the entries were computed from.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entries affecting `panel`, in merge order.
    pub fn filters_for_panel(&self, panel: PanelId) -> impl Iterator<Item = &ActiveFilterEntry> {
        self.entries.iter().filter(move |entry| entry.affects(panel))
    }

    /// Entries that are currently in tab scope.
    pub fn in_scope(&self) -> impl Iterator<Item = &ActiveFilterEntry> {
        self.entries.iter().filter(|entry| entry.in_scope)
    }

    /// Union of affected panels over all entries.
    #[must_use]
    pub fn affected_panels(&self) -> BTreeSet<PanelId> {
        self.entries
            .iter()
            .flat_map(|entry| entry.affected_panel_ids.iter().copied())
            .collect()
    }

    /// Scope diagnostics collected while aggregating.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn push(&mut self, entry: ActiveFilterEntry) {
        if self.positions.contains_key(&entry.filter_id) {
            tracing::warn!(
                target: "dashfilter.aggregate",
                filter_id = %entry.filter_id,
                source = ?entry.source,
                "filter id already aggregated from another source; ignoring"
            );
            return;
        }
        self.positions
            .insert(entry.filter_id.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// What each panel's query would receive: contributing ids and payloads.
    fn panel_payloads(&self) -> BTreeMap<PanelId, Vec<PanelPayload<'_>>> {
        let mut out: BTreeMap<PanelId, Vec<PanelPayload<'_>>> = BTreeMap::new();
        for entry in &self.entries {
            for panel in &entry.affected_panel_ids {
                out.entry(*panel).or_default().push(PanelPayload {
                    filter_id: &entry.filter_id,
                    extra_form_data: &entry.extra_form_data,
                    legacy: entry.legacy.as_ref(),
                });
            }
        }
        out
    }
}

#[derive(PartialEq)]
struct PanelPayload<'a> {
    filter_id: &'a FilterId,
    extra_form_data: &'a ExtraFormData,
    legacy: Option<&'a LegacyColumnValues>,
}

/// Panels whose received filters differ between `prev` and `next`.
#[must_use]
pub fn panels_requiring_refresh(prev: &ActiveFilters, next: &ActiveFilters) -> BTreeSet<PanelId> {
    let before = prev.panel_payloads();
    let after = next.panel_payloads();
    before
        .keys()
        .chain(after.keys())
        .filter(|panel| before.get(*panel) != after.get(*panel))
        .copied()
        .collect()
}

/// Aggregate every active filter source.
#[must_use]
pub fn compute_active_filters(input: &AggregationInput<'_>) -> ActiveFilters {
    let _span = tracing::debug_span!(
        target: "dashfilter.aggregate",
        "aggregate.compute",
        native = input.native_filters.len(),
        applied = input.applied.len(),
        legacy = input.legacy_filters.len(),
    )
    .entered();

    let mut out = ActiveFilters {
        generation: input.applied.generation(),
        ..ActiveFilters::default()
    };
    let resolver = ScopeResolver::new(input.index);
    let visibility = TabVisibility::new(input.index, input.active_tabs);
    let in_scope = |panels: &BTreeSet<PanelId>| {
        !input.options.tab_scope_check || visibility.is_filter_in_scope(panels)
    };
    let mut warnings = Vec::new();

    let native_ids: BTreeSet<&FilterId> = input.native_filters.iter().map(|f| &f.id).collect();
    for filter in input.native_filters {
        let Some(mask) = input.applied.get(&filter.id) else {
            continue;
        };
        if mask.is_inert() {
            continue;
        }
        let whole;
        let scope = match &filter.scope {
            Some(scope) => scope,
            None => {
                whole = FilterScope::whole_dashboard();
                &whole
            }
        };
        let panels = resolver.resolve_with_warnings(scope, &mut warnings);
        out.push(ActiveFilterEntry {
            filter_id: filter.id.clone(),
            source: FilterSource::Native,
            in_scope: in_scope(&panels),
            affected_panel_ids: panels,
            extra_form_data: mask.extra_form_data.clone(),
            legacy: None,
        });
    }

    if input.options.cross_filters {
        let mut cross: Vec<(PanelId, &FilterId, &ExtraFormData)> = input
            .applied
            .iter()
            .filter(|(id, mask)| !native_ids.contains(id) && !mask.is_inert())
            .filter_map(|(id, mask)| id.as_panel().map(|panel| (panel, id, &mask.extra_form_data)))
            .collect();
        cross.sort_by_key(|(panel, ..)| *panel);
        for (panel, id, extra) in cross {
            let scope = input
                .chart_configuration
                .scope_for(panel)
                .clone()
                .excluding([panel]);
            let panels = resolver.resolve_with_warnings(&scope, &mut warnings);
            out.push(ActiveFilterEntry {
                filter_id: id.clone(),
                source: FilterSource::Cross,
                in_scope: in_scope(&panels),
                affected_panel_ids: panels,
                extra_form_data: extra.clone(),
                legacy: None,
            });
        }
    }

    if input.options.legacy_filters {
        let mut legacy: BTreeMap<LegacyFilterKey, &Value> = BTreeMap::new();
        for filter in input.legacy_filters {
            for (column, values) in &filter.columns {
                if QueryFilterClause::from_selected_value(column.as_str(), values).is_none() {
                    continue;
                }
                legacy.insert(LegacyFilterKey::new(filter.chart_id, column.as_str()), values);
            }
        }
        for (key, values) in legacy {
            let scope = input
                .legacy_scopes
                .get(&key)
                .map(|column_scope| column_scope.to_filter_scope())
                .unwrap_or_default()
                .excluding([key.chart_id]);
            let panels = resolver.resolve_with_warnings(&scope, &mut warnings);
            out.push(ActiveFilterEntry {
                filter_id: FilterId::new(key.to_string()),
                source: FilterSource::Legacy,
                in_scope: in_scope(&panels),
                affected_panel_ids: panels,
                extra_form_data: ExtraFormData::default(),
                legacy: Some(LegacyColumnValues {
                    column: key.column,
                    values: values.clone(),
                }),
            });
        }
    }

    out.diagnostics = warnings.into_iter().map(Diagnostic::from).collect();
    tracing::debug!(
        target: "dashfilter.aggregate",
        entries = out.len(),
        diagnostics = out.diagnostics.len(),
        "aggregated active filters"
    );
    out
}
