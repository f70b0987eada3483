#![forbid(unsafe_code)]

//! Query fragments and panel query payloads.
//!
//! [`ExtraFormData`] is the fragment a filter contributes to a panel query.
//! Its keys fall in two groups:
//!
//! - **append keys** (`filters`, `adhoc_filters`): concatenated in merge order;
//! - **override keys** (everything else, e.g. `time_range`): the later
//!   fragment wins.
//!
//! Both rules are associative, so folding fragments left to right gives the
//! same result however the fold is grouped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{FilterId, PanelId};

/// Comparison operator of a simple filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "==")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "NOT IN", alias = "not in")]
    NotIn,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
    #[serde(rename = "TEMPORAL_RANGE")]
    TemporalRange,
}

/// A `{col, op, val}` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilterClause {
    pub col: String,
    pub op: FilterOperator,
    #[serde(default)]
    pub val: Value,
}

impl QueryFilterClause {
    #[must_use]
    pub fn new(col: impl Into<String>, op: FilterOperator, val: Value) -> Self {
        Self {
            col: col.into(),
            op,
            val,
        }
    }

    /// Translate a raw selected value into a clause.
    ///
    /// Arrays become `IN`, scalars `==`. `null` and empty arrays select
    /// nothing and yield `None`.
    #[must_use]
    pub fn from_selected_value(col: impl Into<String>, value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) if items.is_empty() => None,
            Value::Array(_) => Some(Self::new(col, FilterOperator::In, value.clone())),
            _ => Some(Self::new(col, FilterOperator::Equals, value.clone())),
        }
    }
}

/// Query fragment contributed by a filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraFormData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<QueryFilterClause>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adhoc_filters: Vec<Value>,
    #[serde(flatten)]
    pub overrides: BTreeMap<String, Value>,
}

impl ExtraFormData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragment holding only override keys.
    #[must_use]
    pub fn from_overrides<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            overrides: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::default()
        }
    }

    /// Fragment holding a single filter clause.
    #[must_use]
    pub fn with_filter(clause: QueryFilterClause) -> Self {
        Self {
            filters: vec![clause],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.adhoc_filters.is_empty() && self.overrides.is_empty()
    }

    /// Merge `other` into `self`; `other` wins on override collisions.
    pub fn merge_from(&mut self, other: &ExtraFormData) {
        self.filters.extend(other.filters.iter().cloned());
        self.adhoc_filters.extend(other.adhoc_filters.iter().cloned());
        for (key, value) in &other.overrides {
            self.overrides.insert(key.clone(), value.clone());
        }
    }

    /// `self` followed by `other`.
    #[must_use]
    pub fn merged(&self, other: &ExtraFormData) -> Self {
        let mut out = self.clone();
        out.merge_from(other);
        out
    }

    /// Left fold of [`merge_from`](Self::merge_from) over `fragments`.
    pub fn merge_all<'a>(fragments: impl IntoIterator<Item = &'a ExtraFormData>) -> Self {
        let mut out = Self::default();
        for fragment in fragments {
            out.merge_from(fragment);
        }
        out
    }
}

/// Color state folded into panel queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAssignments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
    #[serde(default)]
    pub label_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub shared_label_colors: BTreeMap<String, String>,
}

impl ColorAssignments {
    #[must_use]
    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            color_scheme: Some(scheme.into()),
            ..Self::default()
        }
    }
}

/// A panel's own query before filters are folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseQuery {
    pub slice_id: PanelId,
    #[serde(default)]
    pub viz_type: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl BaseQuery {
    #[must_use]
    pub fn new(slice_id: PanelId, viz_type: impl Into<String>) -> Self {
        Self {
            slice_id,
            viz_type: viz_type.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Final payload handed to the query-execution client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedQuery {
    #[serde(flatten)]
    pub base: BaseQuery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
    pub label_colors: BTreeMap<String, String>,
    pub shared_label_colors: BTreeMap<String, String>,
    /// Legacy equality/membership predicates.
    pub extra_filters: Vec<QueryFilterClause>,
    #[serde(skip_serializing_if = "ExtraFormData::is_empty")]
    pub extra_form_data: ExtraFormData,
    /// Filters that contributed, in merge order.
    #[serde(skip)]
    pub applied_filter_ids: Vec<FilterId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(col: &str, v: Value) -> QueryFilterClause {
        QueryFilterClause::new(col, FilterOperator::In, v)
    }

    #[test]
    fn merge_keeps_parent_and_child_keys() {
        let parent = ExtraFormData::from_overrides([("a", json!(1))]);
        let child = ExtraFormData::from_overrides([("b", json!(2))]);
        let merged = parent.merged(&child);
        assert_eq!(merged.overrides.get("a"), Some(&json!(1)));
        assert_eq!(merged.overrides.get("b"), Some(&json!(2)));
    }

    #[test]
    fn later_override_wins() {
        let a = ExtraFormData::from_overrides([("time_range", json!("Last week"))]);
        let b = ExtraFormData::from_overrides([("time_range", json!("Last year"))]);
        assert_eq!(a.merged(&b).overrides["time_range"], json!("Last year"));
        assert_eq!(b.merged(&a).overrides["time_range"], json!("Last week"));
    }

    #[test]
    fn filters_append_in_order() {
        let a = ExtraFormData::with_filter(clause("country", json!(["FR"])));
        let b = ExtraFormData::with_filter(clause("city", json!(["Paris"])));
        let merged = a.merged(&b);
        let cols: Vec<_> = merged.filters.iter().map(|f| f.col.as_str()).collect();
        assert_eq!(cols, ["country", "city"]);
    }

    #[test]
    fn override_replaces_whole_value() {
        let a = ExtraFormData::from_overrides([("extras", json!({"where": "x", "having": "y"}))]);
        let b = ExtraFormData::from_overrides([("extras", json!({"having": "z"}))]);
        assert_eq!(a.merged(&b).overrides["extras"], json!({"having": "z"}));
    }

    #[test]
    fn selected_value_translation() {
        assert!(QueryFilterClause::from_selected_value("c", &Value::Null).is_none());
        assert!(QueryFilterClause::from_selected_value("c", &json!([])).is_none());
        let scalar = QueryFilterClause::from_selected_value("c", &json!("a")).unwrap();
        assert_eq!(scalar.op, FilterOperator::Equals);
        let list = QueryFilterClause::from_selected_value("c", &json!(["a", "b"])).unwrap();
        assert_eq!(list.op, FilterOperator::In);
    }

    #[test]
    fn extra_form_data_json_shape() {
        let json = json!({
            "filters": [{"col": "country", "op": "IN", "val": ["FR"]}],
            "time_range": "Last week"
        });
        let parsed: ExtraFormData = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed.filters.len(), 1);
        assert_eq!(parsed.overrides["time_range"], json!("Last week"));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn fragment() -> impl Strategy<Value = ExtraFormData> {
            (
                prop::collection::vec(("[a-c]", 0i64..4), 0..3),
                prop::collection::btree_map("[a-d]", 0i64..4, 0..3),
            )
                .prop_map(|(filters, overrides)| ExtraFormData {
                    filters: filters
                        .into_iter()
                        .map(|(c, v)| QueryFilterClause::new(c, FilterOperator::Equals, json!(v)))
                        .collect(),
                    adhoc_filters: Vec::new(),
                    overrides: overrides.into_iter().map(|(k, v)| (k, json!(v))).collect(),
                })
        }

        proptest! {
            #[test]
            fn merge_is_associative(a in fragment(), b in fragment(), c in fragment()) {
                let left = a.merged(&b).merged(&c);
                let right = a.merged(&b.merged(&c));
                prop_assert_eq!(left, right);
            }
        }
    }
}
