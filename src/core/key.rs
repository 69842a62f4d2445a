//! 组件键：`{componentType}:{instanceId}`，区分大小写

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ComponentError;

/// 目录中的组件键（类型标签 + 外部分配的实例 ID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    component_type: String,
    instance_id: String,
}

impl ComponentKey {
    pub fn new(component_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            instance_id: instance_id.into(),
        }
    }

    /// 注册时使用：实例 ID 缺失或为空（含纯空白）时返回 MissingInstanceId
    pub fn for_instance(component_type: &str, instance_id: Option<&str>) -> Result<Self, ComponentError> {
        match instance_id.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(Self::new(component_type, id)),
            _ => Err(ComponentError::MissingInstanceId(component_type.to_string())),
        }
    }

    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component_type, self.instance_id)
    }
}

impl FromStr for ComponentKey {
    type Err = ComponentError;

    /// 按第一个 `:` 切分，实例 ID 本身可以包含 `:`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((component_type, id)) => Self::for_instance(component_type, Some(id)),
            None => Err(ComponentError::MissingInstanceId(s.to_string())),
        }
    }
}
