//! 组件生命周期阶段与合法迁移
//!
//! Constructing → Attaching → Ready → Registered；Registered 可进入 Disconnected 或 Adopted。
//! Failed 表示本实例在挂载中失败（缺少实例 ID、ready 钩子出错、重复键被拒），只影响该实例。
//! Disconnected / Failed 可以重新 Attaching（元素重新插入渲染树）。

use serde::Serialize;

/// 生命周期阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Constructing,
    Attaching,
    Ready,
    Registered,
    Disconnected,
    Adopted,
    Failed,
}

impl Phase {
    /// 是否允许从 self 迁移到 next
    pub fn can_transition(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Constructing, Attaching)
                | (Attaching, Ready)
                | (Attaching, Failed)
                | (Ready, Registered)
                | (Ready, Failed)
                | (Registered, Disconnected)
                | (Registered, Adopted)
                | (Adopted, Adopted)
                | (Adopted, Disconnected)
                | (Failed, Disconnected)
                | (Failed, Attaching)
                | (Disconnected, Attaching)
        )
    }

    /// 样式与 ready 已建立：attribute changed 钩子从此开始生效
    pub fn hooks_enabled(self) -> bool {
        matches!(self, Phase::Ready | Phase::Registered | Phase::Adopted)
    }

    /// 仍在渲染树中
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Phase::Attaching | Phase::Ready | Phase::Registered | Phase::Adopted | Phase::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Phase::Constructing,
            Phase::Attaching,
            Phase::Ready,
            Phase::Registered,
            Phase::Adopted,
            Phase::Disconnected,
            Phase::Attaching,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Phase::Constructing.can_transition(Phase::Registered));
        assert!(!Phase::Attaching.can_transition(Phase::Registered));
        assert!(!Phase::Disconnected.can_transition(Phase::Registered));
        assert!(!Phase::Constructing.can_transition(Phase::Disconnected));
    }

    #[test]
    fn test_hooks_enabled_only_after_ready() {
        assert!(!Phase::Constructing.hooks_enabled());
        assert!(!Phase::Attaching.hooks_enabled());
        assert!(Phase::Ready.hooks_enabled());
        assert!(Phase::Registered.hooks_enabled());
        assert!(!Phase::Disconnected.hooks_enabled());
    }
}
