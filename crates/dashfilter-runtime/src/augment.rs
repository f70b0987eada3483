#![forbid(unsafe_code)]

//! Query augmentation and its per-panel cache.
//!
//! [`augment`] folds every active filter affecting a panel into that panel's
//! [`BaseQuery`]:
//!
//! 1. native and cross entries, in merge order, are merged into one
//!    [`ExtraFormData`] (append keys concatenate, override keys are later-wins)
//! 2. legacy entries become equality or membership `extra_filters`
//! 3. color scheme and label colors are copied alongside
//!
//! # Caching
//!
//! [`QueryAugmentationCache`] keeps one entry per panel, tagged with an
//! [`AugmentationSignature`] capturing every input. A lookup whose signature
//! deep-equals the cached one returns the cached `Arc`, so consumers can use
//! `Arc::ptr_eq` to skip a refetch. Any difference (a filter value, the set of
//! contributing filters, the color scheme) is a miss.
//!
//! ```ignore
//! let mut cache = QueryAugmentationCache::new(256);
//! let first = cache.get_or_build(panel, &base, &colors, &active);
//! let again = cache.get_or_build(panel, &base, &colors, &active);
//! assert!(Arc::ptr_eq(&first, &again));
//! ```
//!
//! The cache uses LRU eviction when at capacity.

use std::sync::Arc;

use dashfilter_core::{
    AugmentedQuery, BaseQuery, ColorAssignments, ExtraFormData, FilterId, PanelId,
};
use rustc_hash::FxHashMap;

use crate::aggregate::{ActiveFilters, FilterSource, LegacyColumnValues};

/// One contributing filter as seen by a panel.
#[derive(Debug, Clone, PartialEq)]
struct Contribution {
    filter_id: FilterId,
    source: FilterSource,
    extra_form_data: ExtraFormData,
    legacy: Option<LegacyColumnValues>,
}

/// Every input that determines a panel's augmented query.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentationSignature {
    panel: PanelId,
    base: BaseQuery,
    colors: ColorAssignments,
    contributions: Vec<Contribution>,
}

impl AugmentationSignature {
    #[must_use]
    pub fn capture(
        panel: PanelId,
        base: &BaseQuery,
        colors: &ColorAssignments,
        active: &ActiveFilters,
    ) -> Self {
        Self {
            panel,
            base: base.clone(),
            colors: colors.clone(),
            contributions: active
                .filters_for_panel(panel)
                .map(|entry| Contribution {
                    filter_id: entry.filter_id.clone(),
                    source: entry.source,
                    extra_form_data: entry.extra_form_data.clone(),
                    legacy: entry.legacy.clone(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn panel(&self) -> PanelId {
        self.panel
    }

    /// Ids of contributing filters, in merge order.
    pub fn filter_ids(&self) -> impl Iterator<Item = &FilterId> {
        self.contributions.iter().map(|c| &c.filter_id)
    }

    /// Build the augmented query these inputs describe.
    #[must_use]
    pub fn materialize(&self) -> AugmentedQuery {
        let extra_form_data = ExtraFormData::merge_all(
            self.contributions
                .iter()
                .filter(|c| c.source != FilterSource::Legacy)
                .map(|c| &c.extra_form_data),
        );
        let extra_filters = self
            .contributions
            .iter()
            .filter_map(|c| c.legacy.as_ref())
            .filter_map(LegacyColumnValues::to_clause)
            .collect();
        AugmentedQuery {
            base: self.base.clone(),
            color_scheme: self.colors.color_scheme.clone(),
            label_colors: self.colors.label_colors.clone(),
            shared_label_colors: self.colors.shared_label_colors.clone(),
            extra_filters,
            extra_form_data,
            applied_filter_ids: self.filter_ids().cloned().collect(),
        }
    }
}

/// Uncached augmentation of `base` for `panel`.
#[must_use]
pub fn augment(
    panel: PanelId,
    base: &BaseQuery,
    colors: &ColorAssignments,
    active: &ActiveFilters,
) -> AugmentedQuery {
    AugmentationSignature::capture(panel, base, colors, active).materialize()
}

#[derive(Debug)]
struct CachedAugmentation {
    signature: AugmentationSignature,
    query: Arc<AugmentedQuery>,
    generation: u64,
    last_access: u64,
}

/// Statistics about augmentation cache performance.
#[derive(Debug, Clone, Default)]
pub struct AugmentationCacheStats {
    /// Number of panels currently cached.
    pub entries: usize,
    /// Total cache hits since creation or last reset.
    pub hits: u64,
    /// Total cache misses since creation or last reset.
    pub misses: u64,
    /// Hit rate as a fraction (0.0 to 1.0).
    pub hit_rate: f64,
}

/// Per-panel cache of augmented queries.
///
/// # Generation-Based Invalidation
///
/// Each entry is tagged with a generation number. Calling
/// [`invalidate_all()`](Self::invalidate_all) bumps the generation, making
/// all existing entries stale without freeing them.
#[derive(Debug)]
pub struct QueryAugmentationCache {
    entries: FxHashMap<PanelId, CachedAugmentation>,
    generation: u64,
    max_entries: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl QueryAugmentationCache {
    /// Create a cache holding at most `max_entries` panels.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: FxHashMap::with_capacity_and_hasher(max_entries, Default::default()),
            generation: 0,
            max_entries: max_entries.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached augmented query for `panel`, rebuilt only when an input changed.
    pub fn get_or_build(
        &mut self,
        panel: PanelId,
        base: &BaseQuery,
        colors: &ColorAssignments,
        active: &ActiveFilters,
    ) -> Arc<AugmentedQuery> {
        self.clock += 1;
        let signature = AugmentationSignature::capture(panel, base, colors, active);

        if let Some(entry) = self.entries.get_mut(&panel)
            && entry.generation == self.generation
            && entry.signature == signature
        {
            self.hits += 1;
            entry.last_access = self.clock;
            return Arc::clone(&entry.query);
        }

        self.misses += 1;
        let query = Arc::new(signature.materialize());
        tracing::trace!(
            target: "dashfilter.augment",
            panel = %panel,
            filters = query.applied_filter_ids.len(),
            "rebuilt augmented query"
        );

        if !self.entries.contains_key(&panel) && self.entries.len() >= self.max_entries {
            self.evict_lru();
        }
        self.entries.insert(
            panel,
            CachedAugmentation {
                signature,
                query: Arc::clone(&query),
                generation: self.generation,
                last_access: self.clock,
            },
        );
        query
    }

    /// Cached query for `panel` if it is still current, without rebuilding.
    #[must_use]
    pub fn peek(&self, panel: PanelId) -> Option<&Arc<AugmentedQuery>> {
        self.entries
            .get(&panel)
            .filter(|entry| entry.generation == self.generation)
            .map(|entry| &entry.query)
    }

    /// Drop the entry for `panel`. Returns whether one existed.
    pub fn invalidate(&mut self, panel: PanelId) -> bool {
        self.entries.remove(&panel).is_some()
    }

    /// Invalidate all entries by bumping the generation.
    #[inline]
    pub fn invalidate_all(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn stats(&self) -> AugmentationCacheStats {
        let total = self.hits + self.misses;
        AugmentationCacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            hit_rate: if total > 0 {
                self.hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    #[inline]
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    /// Clear all entries, freeing memory.
    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    fn evict_lru(&mut self) {
        if let Some(panel) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(panel, _)| *panel)
        {
            self.entries.remove(&panel);
        }
    }
}

impl Default for QueryAugmentationCache {
    fn default() -> Self {
        Self::new(256)
    }
}
