#![forbid(unsafe_code)]

//! Cascade resolution between native filters.
//!
//! A child filter's option query is narrowed by the applied output of its
//! cascade parents. [`CascadeResolver::merged_upstream_output`] folds that
//! output along the parent chain with [`ExtraFormData::merge_from`]: parents
//! first, then the filter itself, so the nearest contributor wins on override
//! collisions.
//!
//! Well-formed configurations are acyclic, but the resolver never assumes
//! it. Every walk tracks its current path and reports a
//! [`ConfigurationError::CascadeCycle`] instead of recursing forever.

use std::collections::BTreeSet;

use dashfilter_core::{ConfigurationError, ExtraFormData, FilterId, NativeFilter};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::data_mask::AppliedSnapshot;

/// Parent/child adjacency over one filter configuration.
#[derive(Debug)]
pub struct CascadeResolver<'a> {
    filters: &'a [NativeFilter],
    by_id: FxHashMap<&'a FilterId, usize>,
    children: FxHashMap<&'a FilterId, Vec<&'a FilterId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl<'a> CascadeResolver<'a> {
    #[must_use]
    pub fn new(filters: &'a [NativeFilter]) -> Self {
        let mut by_id = FxHashMap::default();
        let mut children: FxHashMap<&'a FilterId, Vec<&'a FilterId>> = FxHashMap::default();
        for (i, filter) in filters.iter().enumerate() {
            by_id.entry(&filter.id).or_insert(i);
            for parent in &filter.cascade_parent_ids {
                children.entry(parent).or_default().push(&filter.id);
            }
        }
        Self {
            filters,
            by_id,
            children,
        }
    }

    #[must_use]
    pub fn filter(&self, id: &FilterId) -> Option<&'a NativeFilter> {
        let filters = self.filters;
        self.by_id.get(id).map(|&i| &filters[i])
    }

    /// Declared parents of `id`; empty for unknown filters.
    #[must_use]
    pub fn parents(&self, id: &FilterId) -> &'a [FilterId] {
        self.filter(id)
            .map_or(&[][..], |filter| filter.cascade_parent_ids.as_slice())
    }

    /// Filters naming `id` as a parent, in declaration order.
    #[must_use]
    pub fn children(&self, id: &FilterId) -> &[&'a FilterId] {
        self.children.get(id).map_or(&[][..], Vec::as_slice)
    }

    /// Filters with no cascade parent.
    pub fn roots(&self) -> impl Iterator<Item = &'a NativeFilter> + '_ {
        self.filters
            .iter()
            .filter(|filter| filter.cascade_parent_ids.is_empty())
    }

    /// Every filter reachable through child links from `id`, breadth first.
    #[must_use]
    pub fn descendants(&self, id: &FilterId) -> Vec<&'a FilterId> {
        let mut seen: FxHashSet<&FilterId> = FxHashSet::default();
        seen.insert(id);
        let mut out = Vec::new();
        let mut cursor = 0;
        out.extend(self.children(id).iter().copied());
        seen.extend(out.iter().copied());
        while cursor < out.len() {
            let current = out[cursor];
            cursor += 1;
            for &child in self.children(current) {
                if seen.insert(child) {
                    out.push(child);
                }
            }
        }
        out
    }

    /// Every configuration error in the cascade graph, in declaration order.
    ///
    /// Reports duplicate ids, self-parenting, unknown parents, and each
    /// distinct cycle once.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();
        let mut seen_ids: FxHashSet<&FilterId> = FxHashSet::default();
        for filter in self.filters {
            if !seen_ids.insert(&filter.id) {
                errors.push(ConfigurationError::DuplicateFilter(filter.id.clone()));
            }
            for parent in &filter.cascade_parent_ids {
                if *parent == filter.id {
                    errors.push(ConfigurationError::SelfCascade {
                        filter: filter.id.clone(),
                    });
                } else if !self.by_id.contains_key(parent) {
                    errors.push(ConfigurationError::UnknownCascadeParent {
                        filter: filter.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let mut marks: FxHashMap<&FilterId, Mark> = FxHashMap::default();
        let mut reported: BTreeSet<Vec<FilterId>> = BTreeSet::new();
        for filter in self.filters {
            let mut stack = Vec::new();
            self.find_cycles(&filter.id, &mut marks, &mut stack, &mut reported, &mut errors);
        }
        errors
    }

    fn find_cycles(
        &self,
        id: &'a FilterId,
        marks: &mut FxHashMap<&'a FilterId, Mark>,
        stack: &mut Vec<&'a FilterId>,
        reported: &mut BTreeSet<Vec<FilterId>>,
        errors: &mut Vec<ConfigurationError>,
    ) {
        match marks.get(id) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                let Some(start) = stack.iter().position(|entry| *entry == id) else {
                    return;
                };
                let mut path: Vec<FilterId> =
                    stack[start..].iter().map(|&entry| entry.clone()).collect();
                // Self-parenting is reported on its own.
                if path.len() < 2 {
                    return;
                }
                let mut key = path.clone();
                key.sort();
                if reported.insert(key) {
                    path.push(id.clone());
                    errors.push(ConfigurationError::CascadeCycle { path });
                }
                return;
            }
            None => {}
        }
        if !self.by_id.contains_key(id) {
            return;
        }
        marks.insert(id, Mark::Visiting);
        stack.push(id);
        for parent in self.parents(id) {
            self.find_cycles(parent, marks, stack, reported, errors);
        }
        stack.pop();
        marks.insert(id, Mark::Done);
    }

    /// Applied output of `id` merged with everything upstream of it.
    ///
    /// Each distinct ancestor contributes its own applied fragment exactly
    /// once, parents before children and siblings in declaration order, then
    /// `id` itself. A parent that is no longer configured still contributes
    /// its applied fragment but is not walked further.
    pub fn merged_upstream_output(
        &self,
        id: &FilterId,
        applied: &AppliedSnapshot,
    ) -> Result<ExtraFormData, ConfigurationError> {
        let mut walk = UpstreamWalk::default();
        self.collect_upstream(id, &mut walk)?;
        Ok(merge_applied(&walk.order, applied))
    }

    /// Merged output of `id`'s ancestors only; what narrows its option query.
    pub fn dependencies(
        &self,
        id: &FilterId,
        applied: &AppliedSnapshot,
    ) -> Result<ExtraFormData, ConfigurationError> {
        if !self.by_id.contains_key(id) {
            return Err(ConfigurationError::UnknownFilter(id.clone()));
        }
        let mut walk = UpstreamWalk::default();
        walk.path.push(id.clone());
        for parent in self.parents(id) {
            self.collect_upstream(parent, &mut walk)?;
        }
        Ok(merge_applied(&walk.order, applied))
    }

    /// Post-order over parents: `id` lands in `walk.order` after all of its
    /// ancestors, and only on first visit.
    fn collect_upstream(
        &self,
        id: &FilterId,
        walk: &mut UpstreamWalk,
    ) -> Result<(), ConfigurationError> {
        if walk.seen.contains(id) {
            return Ok(());
        }
        if let Some(start) = walk.path.iter().position(|entry| entry == id) {
            let mut path = walk.path[start..].to_vec();
            path.push(id.clone());
            return Err(cycle_error(path));
        }

        walk.path.push(id.clone());
        if self.by_id.contains_key(id) {
            for parent in self.parents(id) {
                self.collect_upstream(parent, walk)?;
            }
        }
        walk.path.pop();
        walk.seen.insert(id.clone());
        walk.order.push(id.clone());
        Ok(())
    }
}

#[derive(Default)]
struct UpstreamWalk {
    path: Vec<FilterId>,
    seen: FxHashSet<FilterId>,
    order: Vec<FilterId>,
}

fn merge_applied(order: &[FilterId], applied: &AppliedSnapshot) -> ExtraFormData {
    ExtraFormData::merge_all(order.iter().filter_map(|id| applied.extra_form_data(id)))
}

fn cycle_error(path: Vec<FilterId>) -> ConfigurationError {
    let err = ConfigurationError::CascadeCycle { path };
    tracing::error!(
        target: "dashfilter.cascade",
        error = %err,
        "cascade walk revisited a filter"
    );
    err
}
