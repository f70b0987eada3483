#![forbid(unsafe_code)]

//! Active-tab visibility.
//!
//! A filter is *in scope* when refetching for it could change something the
//! user can see:
//!
//! 1. A dashboard without tabs skips the check: every filter is in scope.
//! 2. Otherwise at least one affected panel must be visible, i.e. have no
//!    TAB ancestors, or have all of its TAB ancestors in the active set.
//!
//! One visible panel is enough. The check only gates background refetches;
//! it never changes which panels a filter applies to.

use std::collections::BTreeSet;

use dashfilter_core::{LayoutNodeId, PanelId};
use serde::{Deserialize, Serialize};

use crate::index::LayoutIndex;

/// Currently open TAB nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveTabs(BTreeSet<LayoutNodeId>);

impl ActiveTabs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, tab: &LayoutNodeId) -> bool {
        self.0.contains(tab)
    }

    pub fn insert(&mut self, tab: impl Into<LayoutNodeId>) -> bool {
        self.0.insert(tab.into())
    }

    pub fn remove(&mut self, tab: &LayoutNodeId) -> bool {
        self.0.remove(tab)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutNodeId> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<LayoutNodeId>> FromIterator<S> for ActiveTabs {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Visibility queries for one layout and one active-tab set.
#[derive(Debug, Clone, Copy)]
pub struct TabVisibility<'a> {
    index: &'a LayoutIndex,
    active: &'a ActiveTabs,
}

impl<'a> TabVisibility<'a> {
    #[must_use]
    pub fn new(index: &'a LayoutIndex, active: &'a ActiveTabs) -> Self {
        Self { index, active }
    }

    /// Panel has no TAB ancestors, or all of them are open.
    #[must_use]
    pub fn is_panel_visible(&self, panel: PanelId) -> bool {
        self.index
            .tab_ancestors(panel)
            .iter()
            .all(|tab| self.active.contains(tab))
    }

    /// See the module docs.
    #[must_use]
    pub fn is_filter_in_scope(&self, affected: &BTreeSet<PanelId>) -> bool {
        if !self.index.has_tabs() {
            return true;
        }
        affected.iter().any(|&panel| self.is_panel_visible(panel))
    }

    /// Visible subset of `panels`.
    #[must_use]
    pub fn visible_panels(&self, panels: &BTreeSet<PanelId>) -> BTreeSet<PanelId> {
        panels
            .iter()
            .copied()
            .filter(|&panel| self.is_panel_visible(panel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashfilter_core::{DASHBOARD_ROOT_ID, Layout, LayoutNode, LayoutNodeKind};

    fn index() -> LayoutIndex {
        LayoutIndex::build(&Layout::from_nodes([
            LayoutNode::new(DASHBOARD_ROOT_ID, LayoutNodeKind::Root)
                .with_children(["TABS", "C0"]),
            LayoutNode::new("TABS", LayoutNodeKind::Tabs).with_children(["T1", "T2"]),
            LayoutNode::new("T1", LayoutNodeKind::Tab).with_children(["C1"]),
            LayoutNode::new("T2", LayoutNodeKind::Tab).with_children(["C2"]),
            LayoutNode::panel("C0", PanelId::new(10)),
            LayoutNode::panel("C1", PanelId::new(1)),
            LayoutNode::panel("C2", PanelId::new(2)),
        ]))
    }

    #[test]
    fn one_visible_panel_is_enough() {
        let index = index();
        let active: ActiveTabs = ["T1"].into_iter().collect();
        let vis = TabVisibility::new(&index, &active);
        assert!(vis.is_filter_in_scope(&[PanelId::new(1), PanelId::new(2)].into()));
        assert!(!vis.is_filter_in_scope(&[PanelId::new(2)].into()));
    }

    #[test]
    fn panels_outside_tabs_are_never_hidden() {
        let index = index();
        let active = ActiveTabs::new();
        let vis = TabVisibility::new(&index, &active);
        assert!(vis.is_panel_visible(PanelId::new(10)));
        assert!(vis.is_filter_in_scope(&[PanelId::new(10), PanelId::new(2)].into()));
        assert_eq!(
            vis.visible_panels(&[PanelId::new(1), PanelId::new(10)].into()),
            [PanelId::new(10)].into()
        );
    }

    #[test]
    fn dashboards_without_tabs_skip_the_check() {
        let index = LayoutIndex::build(&Layout::from_nodes([
            LayoutNode::new(DASHBOARD_ROOT_ID, LayoutNodeKind::Root).with_children(["C1"]),
            LayoutNode::panel("C1", PanelId::new(1)),
        ]));
        let active = ActiveTabs::new();
        let vis = TabVisibility::new(&index, &active);
        assert!(vis.is_filter_in_scope(&BTreeSet::new()));
    }

    #[test]
    fn empty_affected_set_is_out_of_scope_when_tabbed() {
        let index = index();
        let active: ActiveTabs = ["T1", "T2"].into_iter().collect();
        assert!(!TabVisibility::new(&index, &active).is_filter_in_scope(&BTreeSet::new()));
    }
}
