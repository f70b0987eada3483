//! Property tests for the engine's state transitions.
//!
//! 1. Apply atomicity: before `apply` nothing selected is visible in the
//!    applied snapshot; after it, every registered filter's applied mask
//!    equals its selection.
//! 2. Cross-filter order: the active list is the same whatever order the
//!    charts emitted in.
//! 3. Cascade chains: the merged upstream output of a chain equals merging
//!    the applied fragments root first.
//! 4. Cache stability: reading an augmented query twice with no change in
//!    between yields the same object.

#![forbid(unsafe_code)]

use std::sync::Arc;

use dashfilter_core::{
    BaseQuery, DASHBOARD_ROOT_ID, DataMask, ExtraFormData, FilterId, FilterOperator, Layout,
    LayoutNode, LayoutNodeKind, NativeFilter, PanelId, QueryFilterClause,
};
use dashfilter_runtime::DashboardFilterEngine;
use proptest::prelude::*;
use serde_json::json;
use web_time::Instant;

const PANELS: u64 = 6;

fn flat_layout() -> Layout {
    let charts: Vec<String> = (1..=PANELS).map(|i| format!("CHART-{i}")).collect();
    let mut nodes = vec![
        LayoutNode::new(DASHBOARD_ROOT_ID, LayoutNodeKind::Root).with_children(["ROW"]),
        LayoutNode::new("ROW", LayoutNodeKind::Row).with_children(charts.clone()),
    ];
    nodes.extend(
        charts
            .iter()
            .zip(1..=PANELS)
            .map(|(id, chart)| LayoutNode::panel(id.as_str(), PanelId::new(chart))),
    );
    Layout::from_nodes(nodes)
}

fn mask(col: &str, value: u32) -> DataMask {
    DataMask::with_value(
        json!([value]),
        ExtraFormData::with_filter(QueryFilterClause::new(col, FilterOperator::In, json!([value]))),
    )
}

fn engine_with_filters(count: usize) -> DashboardFilterEngine {
    let mut engine = DashboardFilterEngine::default();
    engine.set_layout(&flat_layout());
    let filters = (0..count).map(|i| NativeFilter::new(format!("F{i}"))).collect();
    engine
        .set_filters(filters, Instant::now())
        .expect("independent filters are valid");
    engine
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn apply_is_all_or_nothing(
        count in 1usize..8,
        selections in prop::collection::vec((any::<usize>(), 0u32..5), 0..20),
    ) {
        let mut engine = engine_with_filters(count);
        let before = engine.applied_snapshot();

        for (slot, value) in &selections {
            let id = FilterId::new(format!("F{}", slot % count));
            engine.update_selected(&id, mask("c", *value)).unwrap();
        }
        let untouched = engine.applied_snapshot();
        for i in 0..count {
            let id = FilterId::new(format!("F{i}"));
            prop_assert_eq!(untouched.get(&id), before.get(&id));
        }

        engine.apply().unwrap();
        let after = engine.applied_snapshot();
        for i in 0..count {
            let id = FilterId::new(format!("F{i}"));
            prop_assert_eq!(after.get(&id), engine.selected(&id));
        }
        prop_assert!(engine.is_apply_disabled());
        prop_assert!(after.generation() >= before.generation());
    }

    #[test]
    fn cross_filter_order_is_emission_independent(
        emitters in prop::collection::btree_set(1u64..=PANELS, 1..5),
        rotation in any::<usize>(),
    ) {
        let ordered: Vec<u64> = emitters.iter().copied().collect();
        let mut rotated = ordered.clone();
        let len = rotated.len();
        rotated.rotate_left(rotation % len);

        let run = |order: &[u64]| {
            let mut engine = engine_with_filters(1);
            for panel in order {
                engine.emit_cross_filter(PanelId::new(*panel), mask("x", *panel as u32));
            }
            engine
                .active_filters()
                .iter()
                .map(|e| (e.filter_id.clone(), e.affected_panel_ids.clone()))
                .collect::<Vec<_>>()
        };
        let a = run(&ordered);
        let b = run(&rotated);
        prop_assert_eq!(&a, &b);
        for (id, panels) in &a {
            let emitter = id.as_panel().unwrap();
            prop_assert!(!panels.contains(&emitter));
        }
    }

    #[test]
    fn chain_output_merges_root_first(values in prop::collection::vec(0u32..100, 1..6)) {
        let filters: Vec<NativeFilter> = (0..values.len())
            .map(|i| {
                let filter = NativeFilter::new(format!("L{i}"));
                if i == 0 { filter } else { filter.with_parent(format!("L{}", i - 1)) }
            })
            .collect();
        let mut engine = DashboardFilterEngine::default();
        engine.set_layout(&flat_layout());
        engine.set_filters(filters, Instant::now()).unwrap();

        // Root first so child resets never wipe a later selection.
        let mut fragments = Vec::new();
        for (i, value) in values.iter().enumerate() {
            let fragment = ExtraFormData::from_overrides([(format!("k{i}"), json!(value))]);
            let id = FilterId::new(format!("L{i}"));
            engine
                .update_selected(&id, DataMask::with_value(json!(value), fragment.clone()))
                .unwrap();
            fragments.push(fragment);
        }
        engine.apply().unwrap();

        let leaf = FilterId::new(format!("L{}", values.len() - 1));
        let merged = engine.merged_upstream_output(&leaf).unwrap();
        prop_assert_eq!(merged, ExtraFormData::merge_all(&fragments));
    }

    #[test]
    fn unchanged_state_returns_same_query(
        count in 1usize..5,
        panel in 1u64..=PANELS,
        value in 0u32..5,
    ) {
        let mut engine = engine_with_filters(count);
        engine.update_selected(&FilterId::new("F0"), mask("c", value)).unwrap();
        engine.apply().unwrap();

        let base = BaseQuery::new(PanelId::new(panel), "table");
        let first = engine.get_augmented_query(PanelId::new(panel), &base);
        let second = engine.get_augmented_query(PanelId::new(panel), &base);
        prop_assert!(Arc::ptr_eq(&first, &second));
        prop_assert_eq!(first.applied_filter_ids.len(), 1);
    }
}
