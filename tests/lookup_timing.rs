//! 目录查找的时间特性（暂停时钟，结果确定）

use std::sync::Arc;
use std::time::Duration;

use nodedeck::core::{ComponentKey, Dashboard, HostOptions, LookupOptions, LookupOutcome};
use nodedeck::render::MemorySurface;
use nodedeck::widgets::{DhtManager, InMemoryTransport};
use tokio::time::Instant;

fn dashboard() -> Dashboard {
    Dashboard::new(Arc::new(MemorySurface::new()))
}

fn dht(dashboard: &Dashboard, id: &str) -> nodedeck::core::ComponentHost<DhtManager> {
    let transport = Arc::new(InMemoryTransport::new("QmLocal"));
    dashboard.host(DhtManager::new(transport), HostOptions::new().id(id))
}

#[tokio::test(start_paused = true)]
async fn test_late_registration_resolves_within_one_interval() {
    let dashboard = dashboard();
    let host = dht(&dashboard, "dht-manager-1");

    let started = Instant::now();
    let attach = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        host.attach().await
    };
    let lookup = dashboard
        .directory()
        .lookup_component("dht-manager", "dht-manager-1", Some(Duration::from_millis(5000)));

    let (_, found) = tokio::join!(attach, lookup);
    let elapsed = started.elapsed();

    let found = found.expect("registered while pending");
    assert!(found.same_instance(host.handle()));
    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed <= Duration::from_millis(350));
}

#[tokio::test(start_paused = true)]
async fn test_never_registered_resolves_none_after_two_checks() {
    let dashboard = dashboard();
    let report = dashboard
        .directory()
        .lookup_with(
            &ComponentKey::new("dht-manager", "missing"),
            LookupOptions::default()
                .timeout(Duration::from_millis(200))
                .poll_interval(Duration::from_millis(100)),
        )
        .await;

    assert!(matches!(report.outcome, LookupOutcome::TimedOut));
    assert_eq!(report.checks, 2);
    assert_eq!(report.elapsed, Duration::from_millis(200));
    // 超时不是错误
    assert!(dashboard.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_bounds_hold_for_odd_timeouts() {
    let dashboard = dashboard();
    for timeout_ms in [1u64, 99, 150, 1234] {
        let timeout = Duration::from_millis(timeout_ms);
        let started = Instant::now();
        let found = dashboard
            .directory()
            .lookup_component("dht-manager", "nobody", Some(timeout))
            .await;
        let elapsed = started.elapsed();
        assert!(found.is_none());
        assert!(elapsed >= timeout, "{timeout_ms}ms resolved early: {elapsed:?}");
        assert!(elapsed <= timeout + Duration::from_millis(100));
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_registration_wins() {
    let dashboard = dashboard();
    let first = dht(&dashboard, "dup");
    let second = dht(&dashboard, "dup");
    first.attach().await;
    second.attach().await;

    let found = dashboard
        .directory()
        .lookup_component("dht-manager", "dup", None)
        .await
        .expect("registered");
    assert!(found.same_instance(second.handle()));
    assert!(!found.same_instance(first.handle()));
}

#[tokio::test(start_paused = true)]
async fn test_present_key_resolves_immediately() {
    let dashboard = dashboard();
    let host = dht(&dashboard, "here");
    host.attach().await;

    let started = Instant::now();
    let found = dashboard.directory().lookup_component("dht-manager", "here", None).await;
    assert!(found.is_some());
    assert_eq!(started.elapsed(), Duration::ZERO);
}
