#![forbid(unsafe_code)]

//! Data masks: the per-filter pair of UI value and query fragment.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::ExtraFormData;

/// Validation status a filter control attaches to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidateStatus {
    Error,
    Warning,
    Info,
}

/// The filter control's own state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_status: Option<ValidateStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FilterState {
    #[must_use]
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// True when nothing is selected: no value, `null`, or an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.value {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }
}

/// `{filterState, extraFormData, ownState}` for one filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMask {
    #[serde(default)]
    pub filter_state: FilterState,
    #[serde(default)]
    pub extra_form_data: ExtraFormData,
    /// Chart-private state (pagination, sort) carried alongside cross-filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_state: Option<Value>,
}

impl DataMask {
    #[must_use]
    pub fn new(filter_state: FilterState, extra_form_data: ExtraFormData) -> Self {
        Self {
            filter_state,
            extra_form_data,
            own_state: None,
        }
    }

    /// Mask holding a selected value and the fragment it produces.
    #[must_use]
    pub fn with_value(value: Value, extra_form_data: ExtraFormData) -> Self {
        Self::new(FilterState::with_value(value), extra_form_data)
    }

    /// True when the mask contributes nothing to panel queries.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.extra_form_data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_values() {
        assert!(FilterState::default().is_empty());
        assert!(FilterState::with_value(json!(null)).is_empty());
        assert!(FilterState::with_value(json!([])).is_empty());
        assert!(FilterState::with_value(json!("")).is_empty());
        assert!(!FilterState::with_value(json!(["x"])).is_empty());
        assert!(!FilterState::with_value(json!(0)).is_empty());
    }

    #[test]
    fn mask_json_shape() {
        let mask: DataMask = serde_json::from_value(json!({
            "filterState": {"value": ["FR"], "validateStatus": "error"},
            "extraFormData": {"filters": [{"col": "country", "op": "IN", "val": ["FR"]}]}
        }))
        .unwrap();
        assert_eq!(mask.filter_state.validate_status, Some(ValidateStatus::Error));
        assert!(!mask.is_inert());
        assert!(DataMask::default().is_inert());
    }
}
