#![forbid(unsafe_code)]

//! Selected and applied data masks.
//!
//! The store keeps two persistent maps keyed by filter id:
//!
//! - **selected**: what the user has picked in the filter bar. Changing it
//!   affects nothing downstream.
//! - **applied**: what panel queries see. Replaced wholesale on
//!   [`apply`](DataMaskStore::apply), so a reader holding an
//!   [`AppliedSnapshot`] never observes a half-applied state.
//!
//! Cross-filters bypass the selected stage and land in applied directly.
//!
//! # Lifecycle
//!
//! ```text
//! Unset ──update_selected──▶ Selected ──apply──▶ Applied
//!                                                  │
//!                                  schedule_removal│
//!                                                  ▼
//!                       cancel_removal ◀── PendingRemoval ──purge_expired──▶ (gone)
//! ```
//!
//! Both maps are `im::OrdMap`, so taking a snapshot is an O(1) clone and the
//! old snapshot stays valid after the next apply.

use std::collections::BTreeMap;

use dashfilter_core::{DataMask, ExtraFormData, FilterId, NativeFilter};
use im::OrdMap;
use web_time::Instant;

/// Immutable view of the applied masks at one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedSnapshot {
    generation: u64,
    masks: OrdMap<FilterId, DataMask>,
}

impl AppliedSnapshot {
    /// Snapshot built directly from masks, at generation 0.
    pub fn from_masks(masks: impl IntoIterator<Item = (FilterId, DataMask)>) -> Self {
        Self {
            generation: 0,
            masks: masks.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn get(&self, id: &FilterId) -> Option<&DataMask> {
        self.masks.get(id)
    }

    #[must_use]
    pub fn extra_form_data(&self, id: &FilterId) -> Option<&ExtraFormData> {
        self.masks.get(id).map(|mask| &mask.extra_form_data)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FilterId, &DataMask)> {
        self.masks.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

/// Where a filter's mask currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskPhase {
    Unset,
    /// Selected value differs from the applied one.
    Selected,
    Applied,
    /// Deleted from the configuration; still applied until the grace deadline.
    PendingRemoval,
}

/// Notification produced by a store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskEvent {
    Applied {
        generation: u64,
        changed: Vec<FilterId>,
    },
    Cleared {
        filter_ids: Vec<FilterId>,
    },
    Removed {
        generation: u64,
        filter_ids: Vec<FilterId>,
    },
}

/// Result of a successful [`DataMaskStore::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub generation: u64,
    /// Filters whose applied mask changed, in id order.
    pub changed: Vec<FilterId>,
}

/// Two-stage mask store with grace-period removal.
#[derive(Debug, Clone, Default)]
pub struct DataMaskStore {
    selected: OrdMap<FilterId, DataMask>,
    applied: OrdMap<FilterId, DataMask>,
    defaults: OrdMap<FilterId, DataMask>,
    pending_removal: BTreeMap<FilterId, Instant>,
    generation: u64,
    events: Vec<MaskEvent>,
}

impl DataMaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configured filter and its default mask.
    ///
    /// A filter seen for the first time starts with its default both selected
    /// and applied. A known filter only has its default replaced.
    pub fn register_filter(&mut self, id: FilterId, default: DataMask) {
        self.pending_removal.remove(&id);
        if self.defaults.insert(id.clone(), default.clone()).is_some() {
            return;
        }
        if self.selected.contains_key(&id) || self.applied.contains_key(&id) {
            return;
        }
        self.selected.insert(id.clone(), default.clone());
        let inert = default.is_inert();
        self.applied.insert(id.clone(), default);
        if !inert {
            self.generation += 1;
            self.events.push(MaskEvent::Applied {
                generation: self.generation,
                changed: vec![id],
            });
        }
    }

    /// Replace the selected mask of `id`. Applied state is untouched.
    ///
    /// Returns the previous selected mask.
    pub fn update_selected(&mut self, id: FilterId, mask: DataMask) -> Option<DataMask> {
        self.selected.insert(id, mask)
    }

    /// Put `id` back to its registered default selection.
    pub fn reset_selected(&mut self, id: &FilterId) {
        match self.defaults.get(id) {
            Some(default) => {
                self.selected.insert(id.clone(), default.clone());
            }
            None => {
                self.selected.remove(id);
            }
        }
    }

    /// Promote every selected mask to applied in one swap.
    ///
    /// Filters whose applied mask is unchanged do not bump the generation.
    pub fn apply(&mut self) -> ApplyOutcome {
        let changed = self.changed_ids();
        if !changed.is_empty() {
            self.applied = self.selected.clone();
            self.generation += 1;
            self.events.push(MaskEvent::Applied {
                generation: self.generation,
                changed: changed.clone(),
            });
            tracing::debug!(
                target: "dashfilter.mask",
                generation = self.generation,
                changed = changed.len(),
                "applied selected masks"
            );
        }
        ApplyOutcome {
            generation: self.generation,
            changed,
        }
    }

    /// Write `mask` to both stages at once. Used for cross-filters.
    pub fn apply_immediately(&mut self, id: FilterId, mask: DataMask) -> ApplyOutcome {
        self.selected.insert(id.clone(), mask.clone());
        if self.applied.get(&id) == Some(&mask) {
            return ApplyOutcome {
                generation: self.generation,
                changed: Vec::new(),
            };
        }
        self.applied.insert(id.clone(), mask);
        self.generation += 1;
        self.events.push(MaskEvent::Applied {
            generation: self.generation,
            changed: vec![id.clone()],
        });
        ApplyOutcome {
            generation: self.generation,
            changed: vec![id],
        }
    }

    /// Reset every registered filter's selection to its default.
    ///
    /// Applied masks are untouched until the next [`apply`](Self::apply).
    pub fn clear_all(&mut self) -> Vec<FilterId> {
        let ids: Vec<FilterId> = self.defaults.keys().cloned().collect();
        for id in &ids {
            self.reset_selected(id);
        }
        self.events.push(MaskEvent::Cleared {
            filter_ids: ids.clone(),
        });
        ids
    }

    /// Reset each of `dependents` to its default selection.
    ///
    /// Returns the filters whose selection actually changed.
    pub fn reset_dependents<'a>(
        &mut self,
        dependents: impl IntoIterator<Item = &'a FilterId>,
    ) -> Vec<FilterId> {
        let mut reset = Vec::new();
        for id in dependents {
            let before = self.selected.get(id).cloned();
            self.reset_selected(id);
            if self.selected.get(id) != before.as_ref() {
                reset.push(id.clone());
            }
        }
        if !reset.is_empty() {
            tracing::debug!(
                target: "dashfilter.mask",
                reset = reset.len(),
                "reset dependent selections"
            );
        }
        reset
    }

    /// Required filters (`enableEmptyFilter`) whose selection is empty.
    #[must_use]
    pub fn required_filters_missing<'a>(
        &self,
        filters: impl IntoIterator<Item = &'a NativeFilter>,
    ) -> Vec<FilterId> {
        filters
            .into_iter()
            .filter(|filter| filter.control_values.enable_empty_filter)
            .filter(|filter| {
                self.selected
                    .get(&filter.id)
                    .is_none_or(|mask| mask.filter_state.is_empty())
            })
            .map(|filter| filter.id.clone())
            .collect()
    }

    /// Keep `id` applied until `deadline`, then drop it on the next purge.
    pub fn schedule_removal(&mut self, id: FilterId, deadline: Instant) {
        self.pending_removal.insert(id, deadline);
    }

    /// Forget a scheduled removal. Returns whether one was pending.
    pub fn cancel_removal(&mut self, id: &FilterId) -> bool {
        self.pending_removal.remove(id).is_some()
    }

    /// Drop every filter whose removal deadline is at or before `now`.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<FilterId> {
        let expired: Vec<FilterId> = self
            .pending_removal
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return expired;
        }
        for id in &expired {
            self.pending_removal.remove(id);
            self.forget(id);
        }
        self.generation += 1;
        self.events.push(MaskEvent::Removed {
            generation: self.generation,
            filter_ids: expired.clone(),
        });
        tracing::debug!(
            target: "dashfilter.mask",
            purged = expired.len(),
            "removal grace expired"
        );
        expired
    }

    /// Drop `id` from both stages right away.
    pub fn remove_now(&mut self, id: &FilterId) -> bool {
        self.pending_removal.remove(id);
        let was_applied = self.applied.contains_key(id);
        self.forget(id);
        if was_applied {
            self.generation += 1;
            self.events.push(MaskEvent::Removed {
                generation: self.generation,
                filter_ids: vec![id.clone()],
            });
        }
        was_applied
    }

    fn forget(&mut self, id: &FilterId) {
        self.selected.remove(id);
        self.applied.remove(id);
        self.defaults.remove(id);
    }

    #[must_use]
    pub fn selected(&self, id: &FilterId) -> Option<&DataMask> {
        self.selected.get(id)
    }

    #[must_use]
    pub fn applied(&self, id: &FilterId) -> Option<&DataMask> {
        self.applied.get(id)
    }

    #[must_use]
    pub fn is_registered(&self, id: &FilterId) -> bool {
        self.defaults.contains_key(id)
    }

    pub fn selected_masks(&self) -> impl Iterator<Item = (&FilterId, &DataMask)> {
        self.selected.iter()
    }

    #[must_use]
    pub fn phase(&self, id: &FilterId) -> MaskPhase {
        if self.pending_removal.contains_key(id) {
            return MaskPhase::PendingRemoval;
        }
        match (self.selected.get(id), self.applied.get(id)) {
            (None, None) => MaskPhase::Unset,
            (selected, applied) if selected == applied => MaskPhase::Applied,
            _ => MaskPhase::Selected,
        }
    }

    /// O(1) view of the applied stage.
    #[must_use]
    pub fn snapshot(&self) -> AppliedSnapshot {
        AppliedSnapshot {
            generation: self.generation,
            masks: self.applied.clone(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when some selected mask differs from its applied counterpart.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.changed_ids().is_empty()
    }

    pub fn pending_removals(&self) -> impl Iterator<Item = (&FilterId, &Instant)> {
        self.pending_removal.iter()
    }

    pub fn drain_events(&mut self) -> Vec<MaskEvent> {
        std::mem::take(&mut self.events)
    }

    fn changed_ids(&self) -> Vec<FilterId> {
        let mut changed: Vec<FilterId> = self
            .selected
            .iter()
            .filter(|(id, mask)| self.applied.get(*id) != Some(*mask))
            .map(|(id, _)| id.clone())
            .collect();
        changed.extend(
            self.applied
                .keys()
                .filter(|id| !self.selected.contains_key(*id))
                .cloned(),
        );
        changed.sort();
        changed
    }
}
