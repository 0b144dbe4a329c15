use serde::Serialize;
use simd_json::base::ValueAsScalar;
use simd_json::owned::{Object, Value};

/// 消息段 (Segment)
#[derive(Debug, Serialize, Clone)]
pub struct Segment {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: Object,
}

impl Segment {
    pub fn new(type_: &str, data: Object) -> Self {
        Self {
            type_: type_.to_string(),
            data,
        }
    }
}

/// 消息链 (Message Chain)
#[derive(Debug, Serialize, Clone, Default)]
pub struct Message(Vec<Segment>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通用添加方法：手动构建 Segment
    pub fn add(mut self, type_: &str, data: Object) -> Self {
        self.0.push(Segment::new(type_, data));
        self
    }

    /// 纯文本
    pub fn text(self, text: impl Into<String>) -> Self {
        let mut data = Object::new();
        data.insert("text".into(), Value::from(text.into()));
        self.add("text", data)
    }

    /// 回复 (引用消息)
    pub fn reply(self, message_id: impl ToString) -> Self {
        let mut data = Object::new();
        data.insert("id".into(), Value::from(message_id.to_string()));
        self.add("reply", data)
    }

    /// 拼接所有文本段（用于控制台展示）
    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .filter(|s| s.type_ == "text")
            .filter_map(|s| s.data.get("text").and_then(|v| v.as_str()))
            .collect()
    }
}
