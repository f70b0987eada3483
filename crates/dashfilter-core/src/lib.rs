#![forbid(unsafe_code)]

//! Core data model for the dashboard filter engine.
//!
//! Everything the engine reads from or hands to its external collaborators
//! lives here: identifiers, the dashboard layout tree shape, native /
//! cross / legacy filter configuration, data masks, query fragments, and
//! the error taxonomy.
//!
//! # Role in the workspace
//! `dashfilter-core` carries no behavior beyond small value helpers
//! (merging query fragments, the legacy filter key codec). The layout crate
//! indexes and resolves scopes over these types; the runtime crate owns the
//! mutable state and aggregation.

pub mod data_mask;
pub mod error;
pub mod filter;
pub mod id;
pub mod layout;
pub mod legacy_key;
pub mod query;

pub use data_mask::{DataMask, FilterState, ValidateStatus};
pub use error::{ConfigurationError, Diagnostic, ResolutionWarning, Severity};
pub use filter::{
    ChartConfiguration, ChartCrossFilterConfig, ControlValues, CrossFilterScope, FilterScope,
    FilterTarget, LegacyColumnScope, LegacyFilter, LegacyFilterScopes, NativeFilter,
};
pub use id::{FilterId, LayoutNodeId, PanelId};
pub use layout::{DASHBOARD_ROOT_ID, Layout, LayoutMeta, LayoutNode, LayoutNodeKind};
pub use legacy_key::{LegacyFilterKey, LegacyKeyError};
pub use query::{
    AugmentedQuery, BaseQuery, ColorAssignments, ExtraFormData, FilterOperator, QueryFilterClause,
};
