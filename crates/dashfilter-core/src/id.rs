#![forbid(unsafe_code)]

//! Identifier newtypes.
//!
//! Layout node ids and filter ids are opaque strings in the persisted
//! dashboard metadata; panel ids are numeric chart ids. Keeping them as
//! distinct types stops a filter id from being passed where a layout node
//! is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node in the dashboard layout tree (`"ROOT_ID"`, `"TAB-x1"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutNodeId(String);

impl LayoutNodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayoutNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayoutNodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for LayoutNodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Numeric identifier of a visual panel (chart).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PanelId(u64);

impl PanelId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The filter id a chart uses when it emits a cross-filter.
    #[must_use]
    pub fn cross_filter_id(self) -> FilterId {
        FilterId(self.0.to_string())
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PanelId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Opaque filter identifier (`"NATIVE_FILTER-abc"` for native filters, the
/// decimal panel id for cross-filters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(String);

impl FilterId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret this id as a cross-filter source panel, if it is numeric.
    #[must_use]
    pub fn as_panel(&self) -> Option<PanelId> {
        self.0.parse::<u64>().ok().map(PanelId)
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilterId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for FilterId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_filter_id_round_trips_to_panel() {
        let panel = PanelId::new(42);
        assert_eq!(panel.cross_filter_id().as_str(), "42");
        assert_eq!(panel.cross_filter_id().as_panel(), Some(panel));
    }

    #[test]
    fn native_filter_id_is_not_a_panel() {
        assert_eq!(FilterId::new("NATIVE_FILTER-x1").as_panel(), None);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&LayoutNodeId::new("TAB-1")).unwrap();
        assert_eq!(json, "\"TAB-1\"");
        let panel: PanelId = serde_json::from_str("17").unwrap();
        assert_eq!(panel.raw(), 17);
    }
}
