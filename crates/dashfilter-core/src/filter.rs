#![forbid(unsafe_code)]

//! Filter configuration for the three filter sources.
//!
//! - [`NativeFilter`]: dedicated filter controls configured on the dashboard.
//! - [`ChartConfiguration`]: per-chart cross-filter scopes, used when a chart
//!   emits a filter from a user interaction.
//! - [`LegacyFilter`] + [`LegacyFilterScopes`]: older filter-box charts,
//!   scoped per `{chartId, column}` pair.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use smallvec::SmallVec;

use crate::data_mask::DataMask;
use crate::id::{FilterId, LayoutNodeId, PanelId};
use crate::layout::DASHBOARD_ROOT_ID;
use crate::legacy_key::LegacyFilterKey;

/// Declared scope: layout roots whose panels are affected, minus exclusions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterScope {
    pub root_path: Vec<LayoutNodeId>,
    #[serde(default)]
    pub excluded: BTreeSet<PanelId>,
}

impl FilterScope {
    #[must_use]
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<LayoutNodeId>,
    {
        Self {
            root_path: roots.into_iter().map(Into::into).collect(),
            excluded: BTreeSet::new(),
        }
    }

    /// Every panel under the dashboard root.
    #[must_use]
    pub fn whole_dashboard() -> Self {
        Self::new([DASHBOARD_ROOT_ID])
    }

    #[must_use]
    pub fn excluding(mut self, panels: impl IntoIterator<Item = PanelId>) -> Self {
        self.excluded.extend(panels);
        self
    }
}

impl Default for FilterScope {
    fn default() -> Self {
        Self::whole_dashboard()
    }
}

/// Dataset column a native filter reads its options from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Behavioral switches set in the filter configuration form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlValues {
    /// When set, an empty selection is invalid and blocks apply.
    pub enable_empty_filter: bool,
    pub multi_select: bool,
    pub default_to_first_item: bool,
    pub inverse_selection: bool,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Default for ControlValues {
    fn default() -> Self {
        Self {
            enable_empty_filter: false,
            multi_select: true,
            default_to_first_item: false,
            inverse_selection: false,
            other: BTreeMap::new(),
        }
    }
}

/// A native filter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeFilter {
    pub id: FilterId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_filter_type")]
    pub filter_type: String,
    #[serde(default)]
    pub targets: Vec<FilterTarget>,
    /// Declared scope; `None` means the whole dashboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<FilterScope>,
    /// Filters whose applied output narrows this one. Usually zero or one.
    #[serde(default)]
    pub cascade_parent_ids: SmallVec<[FilterId; 1]>,
    #[serde(default)]
    pub control_values: ControlValues,
    #[serde(default)]
    pub default_data_mask: DataMask,
}

fn default_filter_type() -> String {
    "filter_select".to_owned()
}

impl NativeFilter {
    #[must_use]
    pub fn new(id: impl Into<FilterId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            filter_type: default_filter_type(),
            targets: Vec::new(),
            scope: None,
            cascade_parent_ids: SmallVec::new(),
            control_values: ControlValues::default(),
            default_data_mask: DataMask::default(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: FilterScope) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<FilterId>) -> Self {
        self.cascade_parent_ids.push(parent.into());
        self
    }

    #[must_use]
    pub fn with_default(mut self, mask: DataMask) -> Self {
        self.default_data_mask = mask;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.control_values.enable_empty_filter = true;
        self
    }
}

/// Scope a chart uses for the cross-filters it emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CrossFilterScope {
    /// Follow the dashboard-wide cross-filter scope.
    #[default]
    Global,
    Custom(FilterScope),
}

impl Serialize for CrossFilterScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Global => serializer.serialize_str("global"),
            Self::Custom(scope) => scope.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CrossFilterScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Tag(String),
            Scope(FilterScope),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Tag(tag) if tag == "global" => Ok(Self::Global),
            Repr::Tag(other) => Err(serde::de::Error::custom(format!(
                "unknown cross-filter scope tag {other:?}"
            ))),
            Repr::Scope(scope) => Ok(Self::Custom(scope)),
        }
    }
}

/// Cross-filter settings for one chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartCrossFilterConfig {
    pub id: PanelId,
    #[serde(default)]
    pub cross_filter_scope: CrossFilterScope,
}

/// Dashboard-wide cross-filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfiguration {
    #[serde(default)]
    pub charts: BTreeMap<PanelId, ChartCrossFilterConfig>,
    /// Scope applied to charts whose own scope is `global`.
    #[serde(default)]
    pub global_scope: FilterScope,
}

impl ChartConfiguration {
    /// Scope for cross-filters emitted by `panel`, before self-exclusion.
    #[must_use]
    pub fn scope_for(&self, panel: PanelId) -> &FilterScope {
        match self.charts.get(&panel).map(|c| &c.cross_filter_scope) {
            Some(CrossFilterScope::Custom(scope)) => scope,
            Some(CrossFilterScope::Global) | None => &self.global_scope,
        }
    }
}

/// A legacy filter-box chart and its currently selected column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyFilter {
    pub chart_id: PanelId,
    pub component_id: LayoutNodeId,
    #[serde(default)]
    pub columns: BTreeMap<String, Value>,
    #[serde(default)]
    pub is_date_filter: bool,
}

impl LegacyFilter {
    #[must_use]
    pub fn new(chart_id: PanelId, component_id: impl Into<LayoutNodeId>) -> Self {
        Self {
            chart_id,
            component_id: component_id.into(),
            columns: BTreeMap::new(),
            is_date_filter: false,
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>, values: Value) -> Self {
        self.columns.insert(column.into(), values);
        self
    }
}

/// Scope of one legacy filter column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyColumnScope {
    #[serde(default = "root_scope")]
    pub scope: Vec<LayoutNodeId>,
    /// Panels that ignore this column even when under `scope`.
    #[serde(default)]
    pub immune: BTreeSet<PanelId>,
}

fn root_scope() -> Vec<LayoutNodeId> {
    vec![LayoutNodeId::new(DASHBOARD_ROOT_ID)]
}

impl Default for LegacyColumnScope {
    fn default() -> Self {
        Self {
            scope: root_scope(),
            immune: BTreeSet::new(),
        }
    }
}

impl LegacyColumnScope {
    #[must_use]
    pub fn to_filter_scope(&self) -> FilterScope {
        FilterScope {
            root_path: self.scope.clone(),
            excluded: self.immune.clone(),
        }
    }
}

/// Per-column legacy scopes, keyed `"{chartId}_{column}"` when persisted.
pub type LegacyFilterScopes = BTreeMap<LegacyFilterKey, LegacyColumnScope>;
