#![forbid(unsafe_code)]

//! Saved filter sets.
//!
//! A filter set is a named snapshot of native filter selections. The filter
//! bar highlights the set matching the current selection and refuses to save
//! a second set with the same contents.

use std::collections::{BTreeMap, BTreeSet};

use dashfilter_core::{DataMask, FilterId};
use serde::{Deserialize, Serialize};

use crate::data_mask::AppliedSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub data_mask: BTreeMap<FilterId, DataMask>,
}

impl FilterSet {
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            data_mask: BTreeMap::new(),
        }
    }

    /// Set capturing `selected`.
    #[must_use]
    pub fn from_selection<'a>(
        id: u64,
        name: impl Into<String>,
        selected: impl IntoIterator<Item = (&'a FilterId, &'a DataMask)>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            data_mask: selected
                .into_iter()
                .map(|(id, mask)| (id.clone(), mask.clone()))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_mask(mut self, id: impl Into<FilterId>, mask: DataMask) -> Self {
        self.data_mask.insert(id.into(), mask);
        self
    }

    /// Same filters with the same filter state; query fragments are ignored.
    #[must_use]
    pub fn matches(&self, selected: &BTreeMap<FilterId, DataMask>) -> bool {
        self.data_mask.len() == selected.len()
            && selected.iter().all(|(id, mask)| {
                self.data_mask
                    .get(id)
                    .is_some_and(|saved| saved.filter_state == mask.filter_state)
            })
    }
}

/// First set matching `selected`, in the given order.
#[must_use]
pub fn find_existing<'a>(
    sets: impl IntoIterator<Item = &'a FilterSet>,
    selected: &BTreeMap<FilterId, DataMask>,
) -> Option<&'a FilterSet> {
    sets.into_iter().find(|set| set.matches(selected))
}

/// True when saving `selected` would duplicate an existing set.
#[must_use]
pub fn is_duplicate<'a>(
    sets: impl IntoIterator<Item = &'a FilterSet>,
    selected: &BTreeMap<FilterId, DataMask>,
) -> bool {
    find_existing(sets, selected).is_some()
}

/// First set matching what is currently applied.
#[must_use]
pub fn matches_applied<'a>(
    sets: impl IntoIterator<Item = &'a FilterSet>,
    applied: &AppliedSnapshot,
    native_ids: &BTreeSet<FilterId>,
) -> Option<&'a FilterSet> {
    let current: BTreeMap<FilterId, DataMask> = applied
        .iter()
        .filter(|(id, _)| native_ids.contains(*id))
        .map(|(id, mask)| (id.clone(), mask.clone()))
        .collect();
    find_existing(sets, &current)
}
