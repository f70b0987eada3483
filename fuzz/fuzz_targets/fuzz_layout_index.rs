#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use dashfilter_core::{DASHBOARD_ROOT_ID, FilterScope, Layout, LayoutNode, LayoutNodeKind, PanelId};
use dashfilter_layout::{ActiveTabs, LayoutIndex, ScopeResolver, TabVisibility};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzNode {
    kind: u8,
    chart: Option<u8>,
    children: Vec<u8>,
}

#[derive(Debug, Arbitrary)]
struct FuzzLayout {
    nodes: Vec<FuzzNode>,
    scope_roots: Vec<u8>,
    excluded: Vec<u8>,
    active_tabs: Vec<u8>,
}

fn node_id(i: u8) -> String {
    if i == 0 {
        DASHBOARD_ROOT_ID.to_owned()
    } else {
        format!("N{i}")
    }
}

fn kind(raw: u8) -> LayoutNodeKind {
    match raw % 6 {
        0 => LayoutNodeKind::Row,
        1 => LayoutNodeKind::Column,
        2 => LayoutNodeKind::Tabs,
        3 => LayoutNodeKind::Tab,
        4 => LayoutNodeKind::Chart,
        _ => LayoutNodeKind::Header,
    }
}

fuzz_target!(|input: FuzzLayout| {
    if input.nodes.len() > 64 {
        return;
    }

    // Children may reference missing nodes, form cycles, or be shared.
    let nodes = input.nodes.iter().enumerate().map(|(i, n)| {
        let id = node_id(i as u8);
        let node = if i == 0 {
            LayoutNode::new(id, LayoutNodeKind::Root)
        } else {
            match (kind(n.kind), n.chart) {
                (LayoutNodeKind::Chart, Some(chart)) => {
                    LayoutNode::panel(id, PanelId::new(chart.into()))
                }
                (k, _) => LayoutNode::new(id, k),
            }
        };
        node.with_children(n.children.iter().take(16).map(|c| node_id(*c)))
    });
    let layout = Layout::from_nodes(nodes);

    // Building never panics and never loops.
    let index = LayoutIndex::build(&layout);
    let all: BTreeSet<PanelId> = layout.nodes().filter_map(LayoutNode::panel_id).collect();
    assert!(index.panel_ids().is_subset(&all));

    let scope = FilterScope::new(input.scope_roots.iter().take(8).map(|r| node_id(*r)))
        .excluding(input.excluded.iter().map(|p| PanelId::new((*p).into())));
    let resolved = ScopeResolver::new(&index).resolve(&scope);

    // Resolution stays inside the layout's panels and honors exclusions.
    assert!(resolved.is_subset(&all));
    assert!(resolved.iter().all(|p| !scope.excluded.contains(p)));

    let tabs: ActiveTabs = input.active_tabs.iter().map(|t| node_id(*t)).collect();
    let visibility = TabVisibility::new(&index, &tabs);
    let visible = visibility.visible_panels(&resolved);
    assert!(visible.is_subset(&resolved));
    if !resolved.is_empty() && !index.has_tabs() {
        assert!(visibility.is_filter_in_scope(&resolved));
    }
});
