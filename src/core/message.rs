//! 消息分发协议：Message / Response 信封与每个组件类型的封闭消息集合
//!
//! 调用方发送 `{type, data?}`；组件类型用一个 serde 邻接标签枚举（`tag = "type", content = "data"`）
//! 声明它的全部消息，并实现 Repertoire 给出标签表。未知标签返回自描述的失败响应。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ComponentError;

/// 处理器返回的负载，会被展开到 Response 顶层
pub type Payload = Map<String, Value>;

/// 请求信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Message {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
        }
    }

    pub fn with_data(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
        }
    }
}

/// 响应信封：`{success, error?, availableTypes?, ...payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_types: Option<Vec<String>>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Response {
    pub fn ok() -> Self {
        Self::ok_with(Payload::new())
    }

    pub fn ok_with(payload: Payload) -> Self {
        Self {
            success: true,
            error: None,
            available_types: None,
            payload,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            available_types: None,
            payload: Payload::new(),
        }
    }

    /// 未知消息类型：列出该组件类型声明的全部标签
    pub fn unknown_type(tags: &[&str]) -> Self {
        Self {
            available_types: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..Self::failure("Unknown message type")
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

/// 组件类型的封闭消息集合
///
/// 实现者一般是 `#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]` 枚举，
/// `TAGS` 必须与枚举变体一一对应。
pub trait Repertoire: DeserializeOwned + Send + Sized + 'static {
    const TAGS: &'static [&'static str];

    /// 当前请求对应的标签（日志用）
    fn tag(&self) -> &'static str;

    /// 把信封解码为具体请求；未声明的标签返回 UnknownMessageType，负载不合法返回 InvalidPayload
    fn decode(message: &Message) -> Result<Self, ComponentError> {
        if !Self::TAGS.contains(&message.kind.as_str()) {
            return Err(ComponentError::UnknownMessageType(message.kind.clone()));
        }

        let mut envelope = Map::new();
        envelope.insert("type".to_string(), Value::String(message.kind.clone()));
        if let Some(data) = message.data.as_ref().filter(|d| !d.is_null()) {
            envelope.insert("data".to_string(), data.clone());
        }

        serde_json::from_value(Value::Object(envelope)).map_err(|e| ComponentError::InvalidPayload {
            kind: message.kind.clone(),
            reason: e.to_string(),
        })
    }
}

/// 从 json! 对象构造 Payload；非对象值放到 data 字段下
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
    enum Probe {
        GetStats,
        FindPeer {
            #[serde(rename = "peerId")]
            peer_id: String,
        },
    }

    impl Repertoire for Probe {
        const TAGS: &'static [&'static str] = &["GET_STATS", "FIND_PEER"];

        fn tag(&self) -> &'static str {
            match self {
                Probe::GetStats => "GET_STATS",
                Probe::FindPeer { .. } => "FIND_PEER",
            }
        }
    }

    #[test]
    fn test_decode_unit_and_struct_variants() {
        assert_eq!(Probe::decode(&Message::new("GET_STATS")).unwrap(), Probe::GetStats);
        let find = Probe::decode(&Message::with_data("FIND_PEER", json!({"peerId": "12D3"}))).unwrap();
        assert_eq!(find, Probe::FindPeer { peer_id: "12D3".into() });
        assert_eq!(find.tag(), "FIND_PEER");
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = Probe::decode(&Message::new("NOT_A_REAL_TYPE")).unwrap_err();
        assert_eq!(err, ComponentError::UnknownMessageType("NOT_A_REAL_TYPE".into()));
    }

    #[test]
    fn test_decode_bad_payload_for_known_tag() {
        let err = Probe::decode(&Message::new("FIND_PEER")).unwrap_err();
        assert!(matches!(err, ComponentError::InvalidPayload { ref kind, .. } if kind == "FIND_PEER"));
    }

    #[test]
    fn test_unknown_type_response_shape() {
        let json = serde_json::to_value(Response::unknown_type(Probe::TAGS)).unwrap();
        assert_eq!(
            json,
            json!({
                "success": false,
                "error": "Unknown message type",
                "availableTypes": ["GET_STATS", "FIND_PEER"]
            })
        );
    }

    #[test]
    fn test_payload_is_flattened() {
        let response = Response::ok_with(payload(json!({"peers": 4})));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, json!({"success": true, "peers": 4}));
        assert_eq!(response.get("peers"), Some(&json!(4)));
    }
}
