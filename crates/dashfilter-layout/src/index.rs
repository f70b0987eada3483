#![forbid(unsafe_code)]

//! Read-only arena index over the dashboard layout tree.
//!
//! # Design
//!
//! Every layout node is copied once into a `Vec` arena and addressed by a
//! `u32` slot. Child lists are resolved to slots at build time; a child id
//! with no node behind it is dropped from the list and reported as a
//! [`ResolutionWarning::DanglingChild`]. A single depth-first walk from the
//! root then records, for every reachable panel, the TAB nodes above it.
//!
//! | Operation               | Time                 |
//! |-------------------------|----------------------|
//! | Build                   | O(nodes + edges)     |
//! | `descendant_panels`     | O(subtree)           |
//! | `tab_ancestors`         | O(1) lookup          |
//!
//! # Failure Modes
//!
//! The layout editor can transiently hand over half-written layouts. None of
//! these are fatal:
//!
//! - missing child ids contribute an empty subtree;
//! - a node reached twice (a cycle, or a node listed under two parents) is
//!   only walked the first time;
//! - a missing root leaves every panel without TAB ancestors.
//!
//! Each case is logged on the `dashfilter.layout` target and kept in
//! [`LayoutIndex::warnings`].

use std::collections::BTreeSet;
use std::sync::Arc;

use dashfilter_core::{
    DASHBOARD_ROOT_ID, Layout, LayoutNodeId, LayoutNodeKind, PanelId, ResolutionWarning,
};
use rustc_hash::FxHashMap;

type Slot = u32;

/// One node in the arena.
#[derive(Debug, Clone)]
pub struct IndexedNode {
    id: LayoutNodeId,
    kind: LayoutNodeKind,
    panel: Option<PanelId>,
    children: Vec<Slot>,
}

impl IndexedNode {
    #[must_use]
    pub fn id(&self) -> &LayoutNodeId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> LayoutNodeKind {
        self.kind
    }

    #[must_use]
    pub fn panel_id(&self) -> Option<PanelId> {
        self.panel
    }
}

/// Indexed, immutable view of one layout version.
#[derive(Debug, Clone, Default)]
pub struct LayoutIndex {
    nodes: Vec<IndexedNode>,
    by_id: FxHashMap<LayoutNodeId, Slot>,
    /// TAB ancestors per reachable panel, nearest first.
    panel_tabs: FxHashMap<PanelId, Vec<LayoutNodeId>>,
    root: Option<Slot>,
    has_tabs: bool,
    warnings: Vec<ResolutionWarning>,
}

impl LayoutIndex {
    /// Index `layout`, rooted at [`DASHBOARD_ROOT_ID`].
    #[must_use]
    pub fn build(layout: &Layout) -> Self {
        Self::build_rooted(layout, &LayoutNodeId::new(DASHBOARD_ROOT_ID))
    }

    /// Index `layout` using a custom root id.
    #[must_use]
    pub fn build_rooted(layout: &Layout, root_id: &LayoutNodeId) -> Self {
        let _span = tracing::debug_span!(
            "layout.index_build",
            nodes = layout.len(),
            warnings = tracing::field::Empty,
        )
        .entered();

        let mut index = Self {
            nodes: Vec::with_capacity(layout.len()),
            ..Self::default()
        };

        for node in layout.nodes() {
            let slot = index.nodes.len() as Slot;
            index.by_id.insert(node.id.clone(), slot);
            index.nodes.push(IndexedNode {
                id: node.id.clone(),
                kind: node.kind,
                panel: node.panel_id(),
                children: Vec::new(),
            });
        }

        for node in layout.nodes() {
            let parent_slot = index.by_id[&node.id];
            let mut children = Vec::with_capacity(node.children.len());
            for child in &node.children {
                match index.by_id.get(child) {
                    Some(&slot) => children.push(slot),
                    None => index.warn(ResolutionWarning::DanglingChild {
                        parent: node.id.clone(),
                        child: child.clone(),
                    }),
                }
            }
            index.nodes[parent_slot as usize].children = children;
        }

        index.root = index.by_id.get(root_id).copied();
        match index.root {
            Some(root) => index.walk_tabs(root),
            None if layout.is_empty() => {}
            None => index.warn(ResolutionWarning::MissingRoot(root_id.clone())),
        }

        tracing::Span::current().record("warnings", index.warnings.len());
        index
    }

    /// Depth-first walk from the root, recording the tab stack at each panel.
    fn walk_tabs(&mut self, root: Slot) {
        let mut visited = vec![false; self.nodes.len()];
        // (slot, number of tabs on the path above and including this node)
        let mut stack: Vec<(Slot, usize)> = vec![(root, 0)];
        let mut tab_path: Vec<LayoutNodeId> = Vec::new();

        while let Some((slot, depth_tabs)) = stack.pop() {
            let node = &self.nodes[slot as usize];
            if visited[slot as usize] {
                let id = node.id.clone();
                self.warn(ResolutionWarning::RevisitedNode(id));
                continue;
            }
            visited[slot as usize] = true;

            tab_path.truncate(depth_tabs);
            let mut tabs_here = depth_tabs;
            if node.kind.is_tab() {
                self.has_tabs = true;
                tab_path.push(node.id.clone());
                tabs_here += 1;
            }
            if let Some(panel) = node.panel {
                let nearest_first: Vec<_> = tab_path.iter().rev().cloned().collect();
                self.panel_tabs.entry(panel).or_insert(nearest_first);
            }
            for &child in node.children.iter().rev() {
                stack.push((child, tabs_here));
            }
        }
    }

    fn warn(&mut self, warning: ResolutionWarning) {
        tracing::warn!(target: "dashfilter.layout", %warning, "tolerating inconsistent layout");
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn contains(&self, id: &LayoutNodeId) -> bool {
        self.by_id.contains_key(id)
    }

    #[must_use]
    pub fn node(&self, id: &LayoutNodeId) -> Option<&IndexedNode> {
        self.by_id.get(id).map(|&slot| &self.nodes[slot as usize])
    }

    #[must_use]
    pub fn root(&self) -> Option<&IndexedNode> {
        self.root.map(|slot| &self.nodes[slot as usize])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any TAB node is reachable from the root.
    #[must_use]
    pub fn has_tabs(&self) -> bool {
        self.has_tabs
    }

    /// Problems tolerated while building.
    #[must_use]
    pub fn warnings(&self) -> &[ResolutionWarning] {
        &self.warnings
    }

    /// `id` and every node below it, pre-order. Empty for an unknown id.
    #[must_use]
    pub fn descendants(&self, id: &LayoutNodeId) -> Descendants<'_> {
        let stack = self.by_id.get(id).copied().into_iter().collect();
        Descendants {
            index: self,
            stack,
            visited: vec![false; self.nodes.len()],
        }
    }

    /// Panels at or below `id`. Empty for an unknown id.
    #[must_use]
    pub fn descendant_panels(&self, id: &LayoutNodeId) -> BTreeSet<PanelId> {
        self.descendants(id).filter_map(IndexedNode::panel_id).collect()
    }

    /// TAB ancestors of `panel`, nearest first. Empty when the panel is not
    /// under any tab or not reachable from the root.
    #[must_use]
    pub fn tab_ancestors(&self, panel: PanelId) -> &[LayoutNodeId] {
        self.panel_tabs.get(&panel).map_or(&[], Vec::as_slice)
    }

    /// All panels reachable from the root.
    #[must_use]
    pub fn panel_ids(&self) -> BTreeSet<PanelId> {
        self.panel_tabs.keys().copied().collect()
    }
}

/// Pre-order iterator over a subtree. Each node is yielded at most once.
pub struct Descendants<'a> {
    index: &'a LayoutIndex,
    stack: Vec<Slot>,
    visited: Vec<bool>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a IndexedNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(slot) = self.stack.pop() {
            if std::mem::replace(&mut self.visited[slot as usize], true) {
                continue;
            }
            let node = &self.index.nodes[slot as usize];
            self.stack.extend(node.children.iter().rev());
            return Some(node);
        }
        None
    }
}

/// Keeps the index for the most recent layout and rebuilds only when the
/// layout is structurally different.
#[derive(Debug, Clone, Default)]
pub struct LayoutIndexCache {
    layout: Layout,
    index: Arc<LayoutIndex>,
    rebuilds: u64,
}

impl LayoutIndexCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `layout`. Returns `true` when the index was rebuilt.
    pub fn update(&mut self, layout: &Layout) -> bool {
        if self.rebuilds > 0 && self.layout == *layout {
            tracing::trace!(target: "dashfilter.layout", "layout unchanged; keeping index");
            return false;
        }
        self.layout = layout.clone();
        self.index = Arc::new(LayoutIndex::build(layout));
        self.rebuilds += 1;
        true
    }

    #[must_use]
    pub fn index(&self) -> &Arc<LayoutIndex> {
        &self.index
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of builds performed so far.
    #[must_use]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}
