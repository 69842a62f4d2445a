//! 节点传输层抽象
//!
//! 组件只做薄薄一层界面逻辑，真正的节点操作（启动、拨号、DHT 查询）交给 Transport。
//! InMemoryTransport 是确定性的进程内实现，供演示与测试使用。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::ComponentError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Node is not running")]
    NotRunning,

    #[error("Node is already running")]
    AlreadyRunning,

    #[error("Invalid multiaddr: {0}")]
    InvalidAddress(String),

    #[error("Dial {addr} failed: {reason}")]
    DialFailed { addr: String, reason: String },
}

impl From<TransportError> for ComponentError {
    fn from(err: TransportError) -> Self {
        ComponentError::Transport(err.to_string())
    }
}

/// 节点状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub running: bool,
    pub peer_id: String,
    pub listen_addrs: Vec<String>,
    pub connected_peers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: String,
    pub addrs: Vec<String>,
}

/// DHT 路由表统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DhtStats {
    pub routing_table_size: usize,
    pub refreshes: u64,
    /// 最近一次刷新的毫秒时间戳
    pub last_refresh: Option<i64>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn status(&self) -> Result<NodeStatus, TransportError>;

    async fn start(&self) -> Result<NodeStatus, TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    async fn dial(&self, addr: &str) -> Result<PeerInfo, TransportError>;

    async fn dht_stats(&self) -> Result<DhtStats, TransportError>;

    async fn find_peer(&self, peer_id: &str) -> Result<Option<PeerInfo>, TransportError>;

    async fn refresh(&self) -> Result<DhtStats, TransportError>;
}

/// multiaddr 的最小校验：以 `/` 开头且至少有协议与值两段
pub fn validate_multiaddr(addr: &str) -> Result<(), TransportError> {
    let segments: Vec<&str> = addr.split('/').skip(1).collect();
    if !addr.starts_with('/') || segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(TransportError::InvalidAddress(addr.to_string()));
    }
    Ok(())
}

/// 从 `/.../p2p/<peer>` 取出 peer id
pub fn peer_of(addr: &str) -> Option<&str> {
    let (_, rest) = addr.rsplit_once("/p2p/")?;
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

#[derive(Debug, Default)]
struct Node {
    running: bool,
    connected: BTreeSet<String>,
    /// 路由表：peer id → 地址
    routing: BTreeMap<String, Vec<String>>,
    refreshes: u64,
    last_refresh: Option<i64>,
}

/// 进程内传输层
#[derive(Debug)]
pub struct InMemoryTransport {
    peer_id: String,
    listen_addrs: Vec<String>,
    /// 可被 FIND_PEER / REFRESH 发现的对端
    network: BTreeMap<String, Vec<String>>,
    node: RwLock<Node>,
}

impl InMemoryTransport {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            listen_addrs: Vec::new(),
            network: BTreeMap::new(),
            node: RwLock::new(Node::default()),
        }
    }

    pub fn with_listen_addrs<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listen_addrs = addrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_peer<I, S>(mut self, peer_id: impl Into<String>, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network
            .insert(peer_id.into(), addrs.into_iter().map(Into::into).collect());
        self
    }

    /// 构造时直接处于运行状态
    pub fn running(self) -> Self {
        self.node.write().unwrap_or_else(PoisonError::into_inner).running = true;
        self
    }

    fn snapshot(&self, node: &Node) -> NodeStatus {
        NodeStatus {
            running: node.running,
            peer_id: self.peer_id.clone(),
            listen_addrs: if node.running {
                self.listen_addrs.clone()
            } else {
                Vec::new()
            },
            connected_peers: node.connected.iter().cloned().collect(),
        }
    }

    fn stats(node: &Node) -> DhtStats {
        DhtStats {
            routing_table_size: node.routing.len(),
            refreshes: node.refreshes,
            last_refresh: node.last_refresh,
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn status(&self) -> Result<NodeStatus, TransportError> {
        let node = self.node.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self.snapshot(&node))
    }

    async fn start(&self) -> Result<NodeStatus, TransportError> {
        let mut node = self.node.write().unwrap_or_else(PoisonError::into_inner);
        if node.running {
            return Err(TransportError::AlreadyRunning);
        }
        node.running = true;
        tracing::info!(peer_id = %self.peer_id, addrs = self.listen_addrs.len(), "Node started");
        Ok(self.snapshot(&node))
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let mut node = self.node.write().unwrap_or_else(PoisonError::into_inner);
        if !node.running {
            return Err(TransportError::NotRunning);
        }
        node.running = false;
        node.connected.clear();
        tracing::info!(peer_id = %self.peer_id, "Node stopped");
        Ok(())
    }

    async fn dial(&self, addr: &str) -> Result<PeerInfo, TransportError> {
        validate_multiaddr(addr)?;
        let mut node = self.node.write().unwrap_or_else(PoisonError::into_inner);
        if !node.running {
            return Err(TransportError::NotRunning);
        }
        let peer = peer_of(addr).ok_or_else(|| TransportError::DialFailed {
            addr: addr.to_string(),
            reason: "no /p2p/ component".to_string(),
        })?;
        if !self.network.contains_key(peer) {
            return Err(TransportError::DialFailed {
                addr: addr.to_string(),
                reason: "peer unreachable".to_string(),
            });
        }

        node.connected.insert(peer.to_string());
        let addrs = node.routing.entry(peer.to_string()).or_default();
        if !addrs.iter().any(|a| a == addr) {
            addrs.push(addr.to_string());
        }
        Ok(PeerInfo {
            peer_id: peer.to_string(),
            addrs: addrs.clone(),
        })
    }

    async fn dht_stats(&self) -> Result<DhtStats, TransportError> {
        let node = self.node.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Self::stats(&node))
    }

    async fn find_peer(&self, peer_id: &str) -> Result<Option<PeerInfo>, TransportError> {
        let node = self.node.read().unwrap_or_else(PoisonError::into_inner);
        if !node.running {
            return Err(TransportError::NotRunning);
        }
        Ok(node
            .routing
            .get(peer_id)
            .or_else(|| self.network.get(peer_id))
            .map(|addrs| PeerInfo {
                peer_id: peer_id.to_string(),
                addrs: addrs.clone(),
            }))
    }

    async fn refresh(&self) -> Result<DhtStats, TransportError> {
        let mut node = self.node.write().unwrap_or_else(PoisonError::into_inner);
        if !node.running {
            return Err(TransportError::NotRunning);
        }
        for (peer, addrs) in &self.network {
            node.routing.entry(peer.clone()).or_insert_with(|| addrs.clone());
        }
        node.refreshes += 1;
        node.last_refresh = Some(chrono::Utc::now().timestamp_millis());
        Ok(Self::stats(&node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE: &str = "/ip4/10.0.0.2/tcp/4001/p2p/QmRemote";

    fn transport() -> InMemoryTransport {
        InMemoryTransport::new("QmLocal")
            .with_listen_addrs(["/ip4/127.0.0.1/tcp/4001"])
            .with_peer("QmRemote", [REMOTE])
    }

    #[test]
    fn test_validate_multiaddr() {
        assert!(validate_multiaddr("/ip4/127.0.0.1/tcp/4001").is_ok());
        assert!(validate_multiaddr("127.0.0.1:4001").is_err());
        assert!(validate_multiaddr("/ip4").is_err());
        assert!(validate_multiaddr("/ip4//tcp/1").is_err());
    }

    #[test]
    fn test_peer_of() {
        assert_eq!(peer_of(REMOTE), Some("QmRemote"));
        assert_eq!(peer_of("/ip4/1.2.3.4/tcp/1"), None);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let t = transport();
        assert!(!t.status().await.unwrap().running);
        assert!(t.status().await.unwrap().listen_addrs.is_empty());

        let status = t.start().await.unwrap();
        assert_eq!(status.listen_addrs, vec!["/ip4/127.0.0.1/tcp/4001"]);
        assert_eq!(t.start().await, Err(TransportError::AlreadyRunning));

        t.stop().await.unwrap();
        assert_eq!(t.stop().await, Err(TransportError::NotRunning));
    }

    #[tokio::test]
    async fn test_dial_and_find() {
        let t = transport().running();
        let peer = t.dial(REMOTE).await.unwrap();
        assert_eq!(peer.peer_id, "QmRemote");
        assert_eq!(t.status().await.unwrap().connected_peers, vec!["QmRemote"]);
        assert_eq!(t.dht_stats().await.unwrap().routing_table_size, 1);

        assert!(t.find_peer("QmRemote").await.unwrap().is_some());
        assert!(t.find_peer("QmNobody").await.unwrap().is_none());

        let err = t.dial("/ip4/10.0.0.9/tcp/1/p2p/QmNobody").await.unwrap_err();
        assert!(matches!(err, TransportError::DialFailed { .. }));
    }

    #[tokio::test]
    async fn test_refresh_requires_running() {
        let t = transport();
        assert_eq!(t.refresh().await, Err(TransportError::NotRunning));
        t.start().await.unwrap();
        let stats = t.refresh().await.unwrap();
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.routing_table_size, 1);
        assert!(stats.last_refresh.is_some());
    }

    #[test]
    fn test_into_component_error() {
        let err: ComponentError = TransportError::NotRunning.into();
        assert_eq!(err, ComponentError::Transport("Node is not running".into()));
    }
}
