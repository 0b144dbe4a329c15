use crate::config::AppConfig;
use simd_json::OwnedValue;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsArray, ValueObjectAccessAsScalar};
use std::sync::{Arc, RwLock};

pub type Event = OwnedValue;

/// 统一的上下文：事件数据 + 共享配置
/// 在插件流水线中通过 Move 传递，插件返回 Some(ctx) 表示继续向后传递。
#[derive(Clone)]
pub struct Context {
    pub event: EventType,
    pub config: Arc<RwLock<AppConfig>>,
    /// 事件来源的适配器名称 (onebot / console / system)
    pub adapter: &'static str,
}

impl Context {
    /// 系统级上下文（用于插件 on_init 生命周期）
    pub fn system(config: Arc<RwLock<AppConfig>>) -> Self {
        Self {
            event: EventType::Init,
            config,
            adapter: "system",
        }
    }

    /// 尝试将当前事件视为 OneBot 消息事件
    pub fn as_message(&self) -> Option<MessageEvent<'_>> {
        if let EventType::Onebot(event) = &self.event
            && event.get_str("post_type") == Some("message")
        {
            return Some(MessageEvent(event));
        }
        None
    }

    /// 获取事件的 Post Type (如果是 OneBot 事件)
    pub fn post_type(&self) -> Option<&str> {
        match &self.event {
            EventType::Onebot(event) => event.get_str("post_type"),
            EventType::Init => None,
        }
    }

    /// 当前配置的指令前缀快照
    pub fn prefixes(&self) -> Vec<String> {
        self.config
            .read()
            .map(|c| c.command_prefix.clone())
            .unwrap_or_default()
    }
}

/// 事件类型
#[derive(Debug, Clone)]
pub enum EventType {
    /// 来自 OneBot 的原始事件
    Onebot(Event),
    /// 系统初始化事件
    Init,
}

/// 消息事件封装，提供便捷的强类型访问
pub struct MessageEvent<'a>(pub &'a Event);

impl<'a> MessageEvent<'a> {
    /// 获取群号 (如果是群消息)
    pub fn group_id(&self) -> Option<i64> {
        self.0
            .get_i64("group_id")
            .or_else(|| self.0.get_u64("group_id").map(|v| v as i64))
    }

    /// 获取用户 ID
    pub fn user_id(&self) -> i64 {
        self.0
            .get_i64("user_id")
            .or_else(|| self.0.get_u64("user_id").map(|v| v as i64))
            .unwrap_or(0)
    }

    /// 获取消息 ID
    pub fn message_id(&self) -> i64 {
        self.0
            .get_i64("message_id")
            .or_else(|| self.0.get_u64("message_id").map(|v| v as i64))
            .unwrap_or(0)
    }

    /// 消息段数组
    pub fn segments(&self) -> &'a [OwnedValue] {
        self.0
            .get_array("message")
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// 获取发送者显示名称 (优先名片，其次昵称)
    pub fn sender_name(&self) -> &'a str {
        let sender = self.0.get("sender");
        sender
            .and_then(|s| s.get_str("card"))
            .filter(|s| !s.is_empty())
            .or_else(|| sender.and_then(|s| s.get_str("nickname")))
            .unwrap_or("Unknown")
    }
}
