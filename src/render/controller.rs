//! 组件控制器：负责绑定 / 解绑事件处理
//!
//! 每次渲染后编排器会 teardown 再 init 控制器，保证监听器总是绑在最新的节点上。
//! init 在渲染门内执行，不能在其中再次调用渲染。

use std::sync::Arc;

use super::selector::Selector;
use super::surface::{Event, ListenerId, RenderTarget};
use super::RebindPolicy;
use crate::core::{ComponentError, ComponentHandle};

/// 控制器
pub trait Controller: Send + Sync {
    /// 绑定事件；通过 ctx.on 注册的监听器由编排器跟踪，teardown 时自动解绑
    fn init(&mut self, ctx: &mut ControllerContext<'_>) -> Result<(), ComponentError>;

    /// 释放控制器自己持有的资源（定时器、订阅等）
    fn teardown(&mut self) {}
}

/// init 期间可用的绑定上下文
pub struct ControllerContext<'a> {
    handle: &'a ComponentHandle,
    surface: &'a dyn RenderTarget,
    bindings: &'a mut Vec<ListenerId>,
}

impl<'a> ControllerContext<'a> {
    pub fn handle(&self) -> &ComponentHandle {
        self.handle
    }

    /// 给组件根内所有匹配 selector 的元素绑定事件，返回绑定数量
    pub fn on<F>(&mut self, selector: &str, event: &str, handler: F) -> Result<usize, ComponentError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let selector = Selector::parse(selector)?;
        let handler: Arc<dyn Fn(&Event) + Send + Sync> = Arc::new(handler);
        let mut bound = 0;
        for node in self.surface.query_all(self.handle.mount(), &selector) {
            if let Some(id) = self.surface.listen(node, event, Arc::clone(&handler)) {
                self.bindings.push(id);
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// 绑定到组件宿主节点本身（事件委托）
    pub fn on_root<F>(&mut self, event: &str, handler: F) -> bool
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        match self.surface.listen(self.handle.mount(), event, Arc::new(handler)) {
            Some(id) => {
                self.bindings.push(id);
                true
            }
            None => false,
        }
    }
}

/// 句柄上的控制器槽位
#[derive(Default)]
pub(crate) struct ControllerSlot {
    controller: Option<Box<dyn Controller>>,
    bindings: Vec<ListenerId>,
    bound_generation: Option<u64>,
    rebinds: u64,
}

impl ControllerSlot {
    pub(crate) fn new(controller: Option<Box<dyn Controller>>) -> Self {
        Self {
            controller,
            ..Default::default()
        }
    }

    /// 重新挂载时装回控制器（断开时已被销毁）
    pub(crate) fn install(&mut self, controller: Option<Box<dyn Controller>>) {
        if self.controller.is_none() {
            self.controller = controller;
        }
    }

    pub(crate) fn rebinds(&self) -> u64 {
        self.rebinds
    }

    pub(crate) fn is_present(&self) -> bool {
        self.controller.is_some()
    }

    /// teardown + init；OnChange 策略下结构代数未变则跳过。返回是否真的重新绑定
    pub(crate) fn rebind(&mut self, handle: &ComponentHandle, policy: RebindPolicy) -> Result<bool, ComponentError> {
        let surface = handle.surface();
        let generation = surface.generation();
        if self.controller.is_none() {
            return Ok(false);
        }
        if policy == RebindPolicy::OnChange && self.bound_generation == Some(generation) {
            tracing::debug!(component = handle.component_type(), generation, "Skip controller rebind");
            return Ok(false);
        }

        self.release(surface.as_ref());
        let Some(controller) = self.controller.as_mut() else {
            return Ok(false);
        };
        let mut ctx = ControllerContext {
            handle,
            surface: surface.as_ref(),
            bindings: &mut self.bindings,
        };
        controller.init(&mut ctx)?;
        self.bound_generation = Some(generation);
        self.rebinds += 1;
        tracing::debug!(
            component = handle.component_type(),
            listeners = self.bindings.len(),
            "Controller rebound"
        );
        Ok(true)
    }

    /// 断开时销毁控制器
    pub(crate) fn destroy(&mut self, surface: &dyn RenderTarget) {
        self.release(surface);
        self.controller = None;
        self.bound_generation = None;
    }

    fn release(&mut self, surface: &dyn RenderTarget) {
        if let Some(controller) = self.controller.as_mut() {
            controller.teardown();
        }
        for id in self.bindings.drain(..) {
            surface.unlisten(id);
        }
    }
}
