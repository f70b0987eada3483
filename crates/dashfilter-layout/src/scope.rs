#![forbid(unsafe_code)]

//! Scope resolution: declared filter scope → concrete panel set.
//!
//! `resolve(scope) = ⋃ descendant_panels(root) − excluded` over the roots in
//! `scope.root_path`. A root missing from the layout (stale scope after a
//! layout edit) contributes nothing and produces a
//! [`ResolutionWarning::UnknownScopeRoot`].
//!
//! The resolver is pure. It does not know which panel a cross-filter came
//! from; callers add the source panel to `excluded` themselves.

use std::collections::BTreeSet;

use dashfilter_core::{FilterScope, LayoutNodeId, PanelId, ResolutionWarning};

use crate::index::LayoutIndex;

/// Resolves scopes against one [`LayoutIndex`].
#[derive(Debug, Clone, Copy)]
pub struct ScopeResolver<'a> {
    index: &'a LayoutIndex,
}

impl<'a> ScopeResolver<'a> {
    #[must_use]
    pub fn new(index: &'a LayoutIndex) -> Self {
        Self { index }
    }

    /// Panels affected by `scope`.
    #[must_use]
    pub fn resolve(&self, scope: &FilterScope) -> BTreeSet<PanelId> {
        let mut warnings = Vec::new();
        self.resolve_with_warnings(scope, &mut warnings)
    }

    /// Like [`resolve`](Self::resolve), collecting unknown roots into `warnings`.
    pub fn resolve_with_warnings(
        &self,
        scope: &FilterScope,
        warnings: &mut Vec<ResolutionWarning>,
    ) -> BTreeSet<PanelId> {
        let mut panels = BTreeSet::new();
        for root in &scope.root_path {
            if !self.index.contains(root) {
                tracing::warn!(
                    target: "dashfilter.scope",
                    root = %root,
                    "scope root missing from layout; contributes no panels"
                );
                warnings.push(ResolutionWarning::UnknownScopeRoot(root.clone()));
                continue;
            }
            panels.extend(self.index.descendant_panels(root));
        }
        panels.retain(|panel| !scope.excluded.contains(panel));
        panels
    }

    /// Roots of `scope` that are not in the layout.
    pub fn dangling_roots<'s>(
        &'s self,
        scope: &'s FilterScope,
    ) -> impl Iterator<Item = &'s LayoutNodeId> + 's {
        scope
            .root_path
            .iter()
            .filter(move |root| !self.index.contains(root))
    }
}
