//! Nodedeck 演示仪表盘
//!
//! 入口：加载配置、初始化日志，在内存渲染目标上挂载三个组件，演示跨组件查找与消息分发，
//! 最后打印渲染结果与错误历史。用法：`nodedeck [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use nodedeck::config::load_config;
use nodedeck::core::{Dashboard, HostOptions, Message};
use nodedeck::observability;
use nodedeck::render::MemorySurface;
use nodedeck::widgets::{AddressList, DhtManager, InMemoryTransport, NodeControl};
use serde_json::json;

const REMOTE: &str = "/ip4/192.168.1.20/tcp/4001/p2p/QmRemotePeer";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    tracing::debug!(?cfg, "Config loaded");

    let surface = Arc::new(MemorySurface::new());
    let dashboard = Dashboard::from_config(&cfg, surface.clone());

    let transport = Arc::new(
        InMemoryTransport::new("QmLocalNode")
            .with_listen_addrs(["/ip4/127.0.0.1/tcp/4001", "/ip4/127.0.0.1/udp/4001/quic-v1"])
            .with_peer("QmRemotePeer", [REMOTE]),
    );

    let node = dashboard.host(
        NodeControl::new(transport.clone()).with_address_list("main"),
        HostOptions::new().id("main"),
    );
    let addresses = dashboard.host(AddressList, HostOptions::new().id("main"));
    let dht = dashboard.host(DhtManager::new(transport.clone()), HostOptions::new().id("main"));
    // 缺少实例 ID：只有这一个实例失败
    let orphan = dashboard.host(AddressList, HostOptions::new());

    let (node_phase, list_phase, dht_phase, orphan_phase) =
        tokio::join!(node.attach(), addresses.attach(), dht.attach(), orphan.attach());
    tracing::info!(?node_phase, ?list_phase, ?dht_phase, ?orphan_phase, "Components attached");

    let node_handle = node.handle();
    let started = node_handle.dispatch(Message::new("START_NODE")).await;
    println!("START_NODE -> {}", serde_json::to_string(&started)?);

    let dialed = node_handle
        .dispatch(Message::with_data("DIAL", json!({ "addr": REMOTE })))
        .await;
    println!("DIAL -> {}", serde_json::to_string(&dialed)?);

    let dht_handle = dashboard
        .directory()
        .lookup_component("dht-manager", "main", None)
        .await
        .context("dht-manager not registered")?;
    for message in [
        Message::new("REFRESH"),
        Message::with_data("FIND_PEER", json!({ "peerId": "QmRemotePeer" })),
        Message::new("UNKNOWN_THING"),
    ] {
        let kind = message.kind.clone();
        let response = dht_handle.dispatch(message).await;
        println!("{kind} -> {}", serde_json::to_string(&response)?);
    }

    let listed = addresses.handle().dispatch(Message::new("GET_ADDRESSES")).await;
    println!("GET_ADDRESSES -> {}", serde_json::to_string(&listed)?);

    println!("\n--- document ---\n{}", surface.document_html());
    println!(
        "\n--- error history ---\n{}",
        serde_json::to_string_pretty(&dashboard.errors().snapshot())?
    );

    node.disconnect().await;
    addresses.disconnect().await;
    dht.disconnect().await;
    dashboard.teardown();
    Ok(())
}
