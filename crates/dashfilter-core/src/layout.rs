#![forbid(unsafe_code)]

//! External shape of the dashboard layout tree.
//!
//! The layout is persisted as a flat map `{ nodeId: { type, children,
//! parents, meta } }`. The engine never mutates it; the layout crate builds
//! an index over it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{LayoutNodeId, PanelId};

/// Id of the dashboard root node.
pub const DASHBOARD_ROOT_ID: &str = "ROOT_ID";

/// Type of a layout node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutNodeKind {
    Root,
    Grid,
    /// Container holding the individual `Tab` nodes.
    Tabs,
    Tab,
    Row,
    Column,
    /// A visual panel backed by a chart.
    #[serde(alias = "PANEL")]
    Chart,
    Markdown,
    Header,
    Divider,
}

impl LayoutNodeKind {
    #[must_use]
    pub const fn is_panel(self) -> bool {
        matches!(self, Self::Chart)
    }

    #[must_use]
    pub const fn is_tab(self) -> bool {
        matches!(self, Self::Tab)
    }
}

/// Node metadata. Only panel nodes carry a chart id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<PanelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One node of the layout tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: LayoutNodeId,
    #[serde(rename = "type")]
    pub kind: LayoutNodeKind,
    #[serde(default)]
    pub children: Vec<LayoutNodeId>,
    /// Ancestor ids, root first, as written by the layout editor.
    #[serde(default)]
    pub parents: Vec<LayoutNodeId>,
    #[serde(default)]
    pub meta: LayoutMeta,
}

impl LayoutNode {
    #[must_use]
    pub fn new(id: impl Into<LayoutNodeId>, kind: LayoutNodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
            parents: Vec::new(),
            meta: LayoutMeta::default(),
        }
    }

    /// A panel node for the given chart.
    #[must_use]
    pub fn panel(id: impl Into<LayoutNodeId>, chart_id: PanelId) -> Self {
        let mut node = Self::new(id, LayoutNodeKind::Chart);
        node.meta.chart_id = Some(chart_id);
        node
    }

    #[must_use]
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<LayoutNodeId>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Chart id when this is a panel node with one assigned.
    #[must_use]
    pub fn panel_id(&self) -> Option<PanelId> {
        if self.kind.is_panel() {
            self.meta.chart_id
        } else {
            None
        }
    }
}

/// The full layout map, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    nodes: BTreeMap<LayoutNodeId, LayoutNode>,
}

impl Layout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a layout from nodes, filling in `parents` from the child lists.
    ///
    /// Later nodes with a duplicate id replace earlier ones.
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = LayoutNode>) -> Self {
        let mut layout = Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        };
        layout.fill_parents();
        layout
    }

    pub fn insert(&mut self, node: LayoutNode) -> Option<LayoutNode> {
        self.nodes.insert(node.id.clone(), node)
    }

    pub fn remove(&mut self, id: &LayoutNodeId) -> Option<LayoutNode> {
        self.nodes.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &LayoutNodeId) -> Option<&LayoutNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &LayoutNodeId) -> Option<&mut LayoutNode> {
        self.nodes.get_mut(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.values()
    }

    fn fill_parents(&mut self) {
        let root = LayoutNodeId::new(DASHBOARD_ROOT_ID);
        let mut stack: Vec<(LayoutNodeId, Vec<LayoutNodeId>)> = vec![(root, Vec::new())];
        let mut seen = std::collections::BTreeSet::new();
        while let Some((id, parents)) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            node.parents = parents.clone();
            let mut child_parents = parents;
            child_parents.push(id.clone());
            for child in node.children.iter().rev() {
                stack.push((child.clone(), child_parents.clone()));
            }
        }
    }
}

impl FromIterator<LayoutNode> for Layout {
    fn from_iter<T: IntoIterator<Item = LayoutNode>>(iter: T) -> Self {
        Self::from_nodes(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_nodes_fills_parent_chain() {
        let layout = Layout::from_nodes([
            LayoutNode::new(DASHBOARD_ROOT_ID, LayoutNodeKind::Root).with_children(["GRID"]),
            LayoutNode::new("GRID", LayoutNodeKind::Grid).with_children(["CHART-1"]),
            LayoutNode::panel("CHART-1", PanelId::new(1)),
        ]);
        let chart = layout.get(&"CHART-1".into()).unwrap();
        assert_eq!(
            chart.parents,
            vec![LayoutNodeId::new(DASHBOARD_ROOT_ID), LayoutNodeId::new("GRID")]
        );
    }

    #[test]
    fn deserializes_external_layout_json() {
        let json = r#"{
            "ROOT_ID": {"id": "ROOT_ID", "type": "ROOT", "children": ["CHART-a"]},
            "CHART-a": {"id": "CHART-a", "type": "PANEL", "parents": ["ROOT_ID"], "meta": {"chartId": 7}}
        }"#;
        let layout: Layout = serde_json::from_str(json).unwrap();
        let chart = layout.get(&"CHART-a".into()).unwrap();
        assert_eq!(chart.kind, LayoutNodeKind::Chart);
        assert_eq!(chart.panel_id(), Some(PanelId::new(7)));
    }

    #[test]
    fn non_panel_nodes_have_no_panel_id() {
        let mut node = LayoutNode::new("TAB-1", LayoutNodeKind::Tab);
        node.meta.chart_id = Some(PanelId::new(3));
        assert_eq!(node.panel_id(), None);
    }
}
