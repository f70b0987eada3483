//! End-to-end dashboard scenarios driven through [`DashboardFilterEngine`].
//!
//! The tabbed fixture mirrors a saved dashboard: two tabs, three charts, a
//! country filter on the whole dashboard and a city filter cascading from it.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use dashfilter_core::{
    BaseQuery, ChartConfiguration, ColorAssignments, DASHBOARD_ROOT_ID, DataMask, ExtraFormData,
    FilterOperator, FilterScope, Layout, LayoutNode, LayoutNodeKind, LegacyColumnScope,
    LegacyFilter, LegacyFilterKey, LegacyFilterScopes, NativeFilter, PanelId, QueryFilterClause,
};
use dashfilter_layout::ActiveTabs;
use dashfilter_runtime::{
    DashboardFilterEngine, EngineConfig, EngineEvent, FilterSet, FilterSource, is_duplicate,
};
use serde::Deserialize;
use serde_json::json;
use web_time::{Duration, Instant};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardFixture {
    layout: Layout,
    native_filters: Vec<NativeFilter>,
    chart_configuration: ChartConfiguration,
}

fn fixture() -> DashboardFixture {
    serde_json::from_str(include_str!("fixtures/tabbed_dashboard.json"))
        .expect("fixture parses")
}

fn fixture_engine() -> DashboardFilterEngine {
    let fx = fixture();
    let mut engine = DashboardFilterEngine::default();
    engine.set_layout(&fx.layout);
    engine.set_chart_configuration(fx.chart_configuration);
    engine
        .set_filters(fx.native_filters, Instant::now())
        .expect("fixture configuration is valid");
    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-sales"]));
    engine
}

fn select(col: &str, values: &[&str]) -> DataMask {
    DataMask::with_value(
        json!(values),
        ExtraFormData::with_filter(QueryFilterClause::new(col, FilterOperator::In, json!(values))),
    )
}

fn base(panel: u64) -> BaseQuery {
    BaseQuery::new(PanelId::new(panel), "table").with_param("row_limit", json!(1000))
}

// ============================================================================
// Tabs and scope
// ============================================================================

#[test]
fn filter_with_one_visible_panel_is_in_scope() {
    // T1 (active) holds P1, T2 (inactive) holds P2; F is scoped to the root.
    let layout = Layout::from_nodes([
        LayoutNode::new(DASHBOARD_ROOT_ID, LayoutNodeKind::Root).with_children(["TABS"]),
        LayoutNode::new("TABS", LayoutNodeKind::Tabs).with_children(["T1", "T2"]),
        LayoutNode::new("T1", LayoutNodeKind::Tab).with_children(["P1"]),
        LayoutNode::new("T2", LayoutNodeKind::Tab).with_children(["P2"]),
        LayoutNode::panel("P1", PanelId::new(1)),
        LayoutNode::panel("P2", PanelId::new(2)),
    ]);
    let mut engine = DashboardFilterEngine::default();
    engine.set_layout(&layout);
    engine.set_active_tabs(ActiveTabs::from_iter(["T1"]));
    engine
        .set_filters(
            vec![NativeFilter::new("F").with_scope(FilterScope::whole_dashboard())],
            Instant::now(),
        )
        .unwrap();

    engine.update_selected(&"F".into(), select("country", &["FR"])).unwrap();
    engine.apply().unwrap();

    let active = engine.active_filters();
    let entry = active.get(&"F".into()).unwrap();
    assert!(entry.affected_panel_ids.contains(&PanelId::new(1)));
    assert!(entry.affected_panel_ids.contains(&PanelId::new(2)));
    assert!(entry.in_scope);
}

#[test]
fn filter_only_on_hidden_tab_is_out_of_scope() {
    let mut engine = fixture_engine();
    engine
        .update_selected(&"NATIVE_FILTER-city".into(), select("city", &["Lyon"]))
        .unwrap();
    engine.apply().unwrap();

    let active = engine.active_filters();
    let city = active.get(&"NATIVE_FILTER-city".into()).unwrap();
    // Excluded chart 3 drops out; chart 2 is on the inactive ops tab.
    assert_eq!(city.affected_panel_ids, BTreeSet::from([PanelId::new(2)]));
    assert!(!city.in_scope);

    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-ops"]));
    assert!(engine.active_filters().get(&"NATIVE_FILTER-city".into()).unwrap().in_scope);
}

fn refreshed(events: &[EngineEvent]) -> Vec<BTreeSet<PanelId>> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::PanelsNeedRefresh { panels } => Some(panels.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn hidden_only_filter_does_not_trigger_refresh() {
    let mut engine = fixture_engine();
    engine.drain_events();
    engine
        .update_selected(&"NATIVE_FILTER-city".into(), select("city", &["Lyon"]))
        .unwrap();
    engine.apply().unwrap();

    let events = engine.drain_events();
    assert!(events.iter().any(|e| matches!(e, EngineEvent::DataMaskApplied { .. })));
    assert!(refreshed(&events).is_empty(), "got {events:?}");

    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-ops"]));
    assert_eq!(
        refreshed(&engine.drain_events()),
        vec![BTreeSet::from([PanelId::new(2)])]
    );

    // Reported once; switching back and forth again is quiet.
    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-sales"]));
    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-ops"]));
    assert!(engine.drain_events().is_empty());
}

#[test]
fn opening_tab_refreshes_panels_changed_while_hidden() {
    let mut engine = fixture_engine();
    engine.drain_events();
    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["FR"]))
        .unwrap();
    engine.apply().unwrap();

    // Only the sales chart is on screen.
    assert_eq!(
        refreshed(&engine.drain_events()),
        vec![BTreeSet::from([PanelId::new(1)])]
    );

    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-ops"]));
    assert_eq!(
        refreshed(&engine.drain_events()),
        vec![BTreeSet::from([PanelId::new(2), PanelId::new(3)])]
    );
}

// ============================================================================
// Cascade
// ============================================================================

#[test]
fn cascade_merges_parent_and_child_output() {
    let mut engine = DashboardFilterEngine::default();
    engine
        .set_filters(
            vec![NativeFilter::new("Parent"), NativeFilter::new("Child").with_parent("Parent")],
            Instant::now(),
        )
        .unwrap();
    engine
        .update_selected(
            &"Parent".into(),
            DataMask::with_value(json!("x"), ExtraFormData::from_overrides([("a", json!(1))])),
        )
        .unwrap();
    engine.apply().unwrap();
    engine
        .update_selected(
            &"Child".into(),
            DataMask::with_value(json!("y"), ExtraFormData::from_overrides([("b", json!(2))])),
        )
        .unwrap();
    engine.apply().unwrap();

    let merged = engine.merged_upstream_output(&"Child".into()).unwrap();
    assert_eq!(
        merged,
        ExtraFormData::from_overrides([("a", json!(1)), ("b", json!(2))])
    );
    assert_eq!(
        engine.dependencies(&"Child".into()).unwrap(),
        ExtraFormData::from_overrides([("a", json!(1))])
    );
}

#[test]
fn cyclic_cascade_is_rejected_with_path() {
    let mut engine = DashboardFilterEngine::default();
    let err = engine
        .set_filters(
            vec![
                NativeFilter::new("A").with_parent("B"),
                NativeFilter::new("B").with_parent("A"),
            ],
            Instant::now(),
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "filter configuration rejected: cascade cycle: A -> B -> A"
    );
}

// ============================================================================
// Cross-filters
// ============================================================================

#[test]
fn cross_filter_scopes_follow_chart_configuration() {
    let mut engine = fixture_engine();
    engine.emit_cross_filter(PanelId::new(2), select("region", &["EU"]));
    engine.emit_cross_filter(PanelId::new(3), select("segment", &["SMB"]));

    let active = engine.active_filters();
    let from_two = active.get(&"2".into()).unwrap();
    assert_eq!(from_two.source, FilterSource::Cross);
    // Custom scope excludes chart 1; the emitter always drops out.
    assert_eq!(from_two.affected_panel_ids, BTreeSet::from([PanelId::new(3)]));
    let from_three = active.get(&"3".into()).unwrap();
    assert_eq!(
        from_three.affected_panel_ids,
        BTreeSet::from([PanelId::new(1), PanelId::new(2)])
    );
}

// ============================================================================
// Augmentation cache
// ============================================================================

#[test]
fn unchanged_inputs_return_identical_query_object() {
    let mut engine = fixture_engine();
    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["FR"]))
        .unwrap();
    engine.apply().unwrap();

    let first = engine.get_augmented_query(PanelId::new(1), &base(1));
    // Unrelated state change forces re-aggregation with the same result.
    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-ops"]));
    let second = engine.get_augmented_query(PanelId::new(1), &base(1));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cache_stats().hits, 1);

    // A filter that does not reach panel 1 leaves its query alone.
    engine
        .update_selected(&"NATIVE_FILTER-city".into(), select("city", &["Lyon"]))
        .unwrap();
    engine.apply().unwrap();
    let third = engine.get_augmented_query(PanelId::new(1), &base(1));
    assert!(Arc::ptr_eq(&first, &third));
}

#[test]
fn color_scheme_change_rebuilds_query() {
    let mut engine = fixture_engine();
    let before = engine.get_augmented_query(PanelId::new(1), &base(1));
    engine.set_color_assignments(ColorAssignments::with_scheme("supersetColors"));
    let after = engine.get_augmented_query(PanelId::new(1), &base(1));
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.color_scheme.as_deref(), Some("supersetColors"));
    assert_eq!(after.extra_form_data, before.extra_form_data);
}

#[test]
fn augmented_query_carries_filters_in_merge_order() {
    let mut engine = fixture_engine();
    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["FR"]))
        .unwrap();
    engine.apply().unwrap();
    engine.emit_cross_filter(PanelId::new(3), select("segment", &["SMB"]));

    let query = engine.get_augmented_query(PanelId::new(2), &base(2));
    let cols: Vec<&str> = query
        .extra_form_data
        .filters
        .iter()
        .map(|c| c.col.as_str())
        .collect();
    assert_eq!(cols, ["country", "segment"]);

    let json = serde_json::to_value(query.as_ref()).unwrap();
    assert_eq!(json["slice_id"], json!(2));
    assert_eq!(json["extra_form_data"]["filters"][0]["op"], json!("IN"));
}

// ============================================================================
// Removal grace period
// ============================================================================

#[test]
fn deleted_filter_lingers_for_grace_period() {
    let start = Instant::now();
    let mut engine = DashboardFilterEngine::new(EngineConfig {
        removal_grace_ms: 200,
        ..EngineConfig::default()
    });
    let fx = fixture();
    engine.set_layout(&fx.layout);
    engine.set_active_tabs(ActiveTabs::from_iter(["TAB-sales"]));
    engine.set_filters(fx.native_filters.clone(), start).unwrap();
    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["FR"]))
        .unwrap();
    engine.apply().unwrap();
    engine.drain_events();

    let remaining: Vec<NativeFilter> = fx
        .native_filters
        .into_iter()
        .filter(|f| f.id.as_str() != "NATIVE_FILTER-country")
        .map(|mut f| {
            f.cascade_parent_ids.clear();
            f
        })
        .collect();
    engine.set_filters(remaining, start).unwrap();
    let query = engine.get_augmented_query(PanelId::new(1), &base(1));
    assert_eq!(query.extra_form_data.filters.len(), 1);

    assert!(engine.tick(start + Duration::from_millis(199)).is_empty());
    assert_eq!(engine.tick(start + Duration::from_millis(200)).len(), 1);
    let query = engine.get_augmented_query(PanelId::new(1), &base(1));
    assert!(query.extra_form_data.is_empty());

    let events = engine.drain_events();
    assert!(events.iter().any(|e| matches!(e, EngineEvent::FiltersRemoved { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::PanelsNeedRefresh { panels } if panels.contains(&PanelId::new(1))
    )));
}

// ============================================================================
// Requests
// ============================================================================

#[test]
fn superseded_response_is_discarded() {
    let mut engine = fixture_engine();
    let stale = engine.issue_request(PanelId::new(1), &base(1));

    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["DE"]))
        .unwrap();
    engine.apply().unwrap();
    let fresh = engine.issue_request(PanelId::new(1), &base(1));

    assert!(stale.token().is_cancelled());
    assert!(!engine.accept_response(&stale));
    assert!(engine.accept_response(&fresh));
    assert_eq!(fresh.query().applied_filter_ids.len(), 1);
}

#[test]
fn reissuing_unchanged_query_keeps_ticket() {
    let mut engine = fixture_engine();
    let first = engine.issue_request(PanelId::new(1), &base(1));
    let second = engine.issue_request(PanelId::new(1), &base(1));
    assert_eq!(first.seq(), second.seq());
    assert!(!first.token().is_cancelled());
}

// ============================================================================
// Filter sets and legacy filters
// ============================================================================

#[test]
fn saving_same_selection_twice_is_a_duplicate() {
    let mut engine = fixture_engine();
    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["FR"]))
        .unwrap();
    let saved = FilterSet::new(1, "France")
        .with_mask("NATIVE_FILTER-country", select("country", &["FR"]))
        .with_mask("NATIVE_FILTER-city", DataMask::default());
    let sets = vec![saved];

    assert_eq!(engine.find_matching_filter_set(&sets).map(|s| s.id), Some(1));
    let current = sets[0].data_mask.clone();
    assert!(is_duplicate(&sets, &current));

    engine
        .update_selected(&"NATIVE_FILTER-country".into(), select("country", &["DE"]))
        .unwrap();
    assert!(engine.find_matching_filter_set(&sets).is_none());
}

#[test]
fn legacy_filter_box_reaches_scoped_panels() {
    let mut engine = fixture_engine();
    let mut scopes = LegacyFilterScopes::new();
    scopes.insert(
        "3_region".parse::<LegacyFilterKey>().unwrap(),
        LegacyColumnScope {
            scope: vec!["TAB-ops".into()],
            immune: [PanelId::new(2)].into(),
        },
    );
    engine.set_legacy_filters(
        vec![
            LegacyFilter::new(PanelId::new(3), "CHART-p3")
                .with_column("region", json!(["EU", "NA"]))
                .with_column("year", json!(2024)),
        ],
        scopes,
    );

    // region: ops tab minus immune chart 2 minus the filter box itself.
    assert!(engine.get_active_filters(PanelId::new(2)).iter().all(|f| f.column != "region"));
    let on_one = engine.get_active_filters(PanelId::new(1));
    assert_eq!(on_one.len(), 1);
    assert_eq!(on_one[0].column, "year");
    assert_eq!(on_one[0].values, json!(2024));

    let query = engine.get_augmented_query(PanelId::new(1), &base(1));
    assert_eq!(query.extra_filters.len(), 1);
    assert_eq!(query.extra_filters[0].op, FilterOperator::Equals);
}
