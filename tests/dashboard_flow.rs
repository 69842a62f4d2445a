//! 仪表盘端到端：跨组件查找与消息、错误历史、响应信封

use std::sync::Arc;
use std::time::Duration;

use nodedeck::config::AppConfig;
use nodedeck::core::{Dashboard, HostOptions, Message, Phase, Repertoire};
use nodedeck::render::{MemorySurface, RenderTarget, Selector};
use nodedeck::widgets::{
    AddressList, AddressListRequest, DhtManager, DhtManagerRequest, InMemoryTransport, NodeControl, NodeControlRequest,
};
use serde_json::json;

const LISTEN: [&str; 2] = ["/ip4/127.0.0.1/tcp/4001", "/ip4/127.0.0.1/udp/4001/quic-v1"];

fn setup() -> (Arc<MemorySurface>, Dashboard) {
    let surface = Arc::new(MemorySurface::new());
    let dashboard = Dashboard::new(surface.clone());
    (surface, dashboard)
}

fn address_rows(surface: &MemorySurface, scope: u64) -> Vec<String> {
    surface
        .query_all(scope, &Selector::parse("li.address").unwrap())
        .into_iter()
        .filter_map(|node| surface.attribute(node, "data-address"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_node_control_finds_late_address_list() {
    let (surface, dashboard) = setup();
    let transport = Arc::new(InMemoryTransport::new("QmLocal").with_listen_addrs(LISTEN).running());

    let node = dashboard.host(
        NodeControl::new(transport).with_address_list("main"),
        HostOptions::new().id("main"),
    );
    let list = dashboard.host(AddressList, HostOptions::new().id("main"));

    let (node_phase, list_phase) = tokio::join!(node.attach(), async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        list.attach().await
    });
    assert_eq!(node_phase, Phase::Registered);
    assert_eq!(list_phase, Phase::Registered);

    assert_eq!(address_rows(&surface, list.handle().mount()), LISTEN);
    let count = surface
        .query(list.handle().mount(), &Selector::parse("span.count").unwrap())
        .and_then(|n| surface.text(n));
    assert_eq!(count.as_deref(), Some("2"));
    assert!(dashboard.errors().is_empty());
}

#[tokio::test]
async fn test_start_and_stop_sync_address_list() {
    let (surface, dashboard) = setup();
    let transport = Arc::new(InMemoryTransport::new("QmLocal").with_listen_addrs(LISTEN));
    let list = dashboard.host(AddressList, HostOptions::new().id("main"));
    let node = dashboard.host(
        NodeControl::new(transport).with_address_list("main"),
        HostOptions::new().id("main"),
    );
    list.attach().await;
    node.attach().await;
    assert!(address_rows(&surface, list.handle().mount()).is_empty());

    let started = node.handle().dispatch(Message::new("START_NODE")).await;
    assert!(started.success);
    assert_eq!(started.get("published"), Some(&json!(2)));
    assert_eq!(address_rows(&surface, list.handle().mount()).len(), 2);

    let stopped = node.handle().dispatch(Message::new("STOP_NODE")).await;
    assert!(stopped.success);
    assert!(address_rows(&surface, list.handle().mount()).is_empty());
}

#[tokio::test]
async fn test_unknown_type_lists_each_repertoire() {
    let (_surface, dashboard) = setup();
    let transport = Arc::new(InMemoryTransport::new("QmLocal"));
    let node = dashboard.host(NodeControl::new(transport.clone()), HostOptions::new().id("n"));
    let dht = dashboard.host(DhtManager::new(transport), HostOptions::new().id("d"));
    let list = dashboard.host(AddressList, HostOptions::new().id("a"));
    node.attach().await;
    dht.attach().await;
    list.attach().await;

    let cases = [
        (node.handle(), NodeControlRequest::TAGS),
        (dht.handle(), DhtManagerRequest::TAGS),
        (list.handle(), AddressListRequest::TAGS),
    ];
    for (handle, tags) in cases {
        let resp = handle.dispatch(Message::new("NOT_A_REAL_TYPE")).await;
        let expected: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({ "success": false, "error": "Unknown message type", "availableTypes": expected })
        );
    }
    assert!(dashboard.errors().is_empty());
}

#[tokio::test]
async fn test_error_history_keeps_ten_most_recent() {
    let (_surface, dashboard) = setup();
    let list = dashboard.host(AddressList, HostOptions::new().id("a"));
    list.attach().await;

    for i in 0..11 {
        let resp = list
            .handle()
            .dispatch(Message::with_data("ADD_ADDRESS", json!({ "address": format!("bad-{i}") })))
            .await;
        assert!(!resp.success);
    }

    let records = dashboard.errors().snapshot();
    assert_eq!(records.len(), 10);
    assert!(records[0].message.ends_with("bad-10"));
    assert!(records[9].message.ends_with("bad-1"));
    assert!(records.iter().all(|r| r.component_name == "address-list" && r.source == "postMessage"));
    assert!(records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let encoded = serde_json::to_value(&records[0]).unwrap();
    assert!(encoded.get("componentName").is_some());
    assert_eq!(encoded["details"]["type"], json!("ADD_ADDRESS"));

    dashboard.errors().clear();
    assert!(dashboard.errors().is_empty());
}

#[tokio::test]
async fn test_missing_id_fails_only_that_widget() {
    let (surface, dashboard) = setup();
    let transport = Arc::new(InMemoryTransport::new("QmLocal"));
    let good = dashboard.host(DhtManager::new(transport.clone()), HostOptions::new().id("ok"));
    let bad = dashboard.host(DhtManager::new(transport), HostOptions::new().id("   "));

    assert_eq!(good.attach().await, Phase::Registered);
    assert_eq!(bad.attach().await, Phase::Failed);
    assert_eq!(dashboard.directory().len(), 1);
    assert_eq!(dashboard.errors().count_source("connectedCallback"), 1);
    assert!(surface
        .query(bad.handle().mount(), &Selector::parse("div.component-error").unwrap())
        .is_some());

    let resp = good.handle().dispatch(Message::new("GET_STATS")).await;
    assert!(resp.success);
}

#[tokio::test]
async fn test_dashboard_from_config_applies_capacity() {
    let mut cfg = AppConfig::default();
    cfg.errors.capacity = 2;
    let dashboard = Dashboard::from_config(&cfg, Arc::new(MemorySurface::new()));
    let list = dashboard.host(AddressList, HostOptions::new().id("a"));
    list.attach().await;

    for _ in 0..3 {
        list.handle()
            .dispatch(Message::with_data("REMOVE_ADDRESS", json!({})))
            .await;
    }
    assert_eq!(dashboard.errors().len(), 2);
    assert_eq!(dashboard.errors().capacity(), 2);
}
