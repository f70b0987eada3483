#![forbid(unsafe_code)]

//! Error taxonomy.
//!
//! - [`ConfigurationError`]: the filter configuration itself is broken
//!   (cascade cycle, unknown parent, dangling scope root). Surfaced to the
//!   configuration UI and blocks saving. Never fixed silently.
//! - [`ResolutionWarning`]: the layout is stale or partially written. The
//!   offending reference resolves to an empty set and rendering continues.
//!
//! Neither crosses the panel-render boundary as a failure; both end up in a
//! [`Diagnostic`] list the engine exposes on the side.

use std::fmt;

use crate::id::{FilterId, LayoutNodeId};

/// A broken filter configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// Following cascade parents from the first id returns to it.
    #[error("cascade cycle: {}", display_path(.path))]
    CascadeCycle { path: Vec<FilterId> },
    #[error("filter {filter} names itself as a cascade parent")]
    SelfCascade { filter: FilterId },
    #[error("filter {filter} names unknown cascade parent {parent}")]
    UnknownCascadeParent { filter: FilterId, parent: FilterId },
    #[error("filter {filter} is scoped to layout node {root}, which does not exist")]
    DanglingScopeRoot { filter: FilterId, root: LayoutNodeId },
    #[error("unknown filter {0}")]
    UnknownFilter(FilterId),
    #[error("duplicate filter id {0}")]
    DuplicateFilter(FilterId),
}

fn display_path(path: &[FilterId]) -> String {
    path.iter()
        .map(FilterId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A stale or inconsistent layout reference tolerated during resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionWarning {
    #[error("layout has no root node {0}")]
    MissingRoot(LayoutNodeId),
    #[error("layout node {parent} lists missing child {child}")]
    DanglingChild {
        parent: LayoutNodeId,
        child: LayoutNodeId,
    },
    #[error("layout node {0} is reachable more than once")]
    RevisitedNode(LayoutNodeId),
    #[error("scope root {0} is not in the layout")]
    UnknownScopeRoot(LayoutNodeId),
}

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

/// Side-channel report of a problem met while resolving filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Configuration(ConfigurationError),
    Resolution(ResolutionWarning),
}

impl Diagnostic {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Configuration(_) => Severity::Error,
            Self::Resolution(_) => Severity::Warning,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "configuration error: {e}"),
            Self::Resolution(w) => write!(f, "resolution warning: {w}"),
        }
    }
}

impl From<ConfigurationError> for Diagnostic {
    fn from(value: ConfigurationError) -> Self {
        Self::Configuration(value)
    }
}

impl From<ResolutionWarning> for Diagnostic {
    fn from(value: ResolutionWarning) -> Self {
        Self::Resolution(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = ConfigurationError::CascadeCycle {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "cascade cycle: A -> B -> A");
    }

    #[test]
    fn diagnostic_severity() {
        let d: Diagnostic = ResolutionWarning::MissingRoot("ROOT_ID".into()).into();
        assert_eq!(d.severity(), Severity::Warning);
        let d: Diagnostic = ConfigurationError::UnknownFilter("x".into()).into();
        assert_eq!(d.severity(), Severity::Error);
        assert!(d.to_string().starts_with("configuration error"));
    }
}
