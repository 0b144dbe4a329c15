use crate::config::{AppConfig, BotConfig};
use crate::event::{Context, Event, EventType};
use crate::message::Message;
use crate::{error, info, plugins, warn};
use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, StreamExt};
use http::HeaderValue;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};

pub type BotError = Box<dyn std::error::Error + Send + Sync>;

pub type TraitSink =
    Box<dyn Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin>;
pub type LockedWriter = Arc<AsyncMutex<TraitSink>>;

#[derive(Serialize)]
struct ActionFrame<T> {
    action: &'static str,
    params: T,
}

#[derive(Serialize)]
struct SendParams<'a> {
    message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    message: &'a Message,
}

/// 适配器入口函数 (Adapter Entry)
pub fn entry(bot_config: BotConfig, global_config: Arc<RwLock<AppConfig>>) -> BoxFuture<'static, ()> {
    Box::pin(async move { run_bot_loop(bot_config, global_config).await })
}

/// OneBot 协议的主循环：断线后 3 秒重连
pub async fn run_bot_loop(bot_config: BotConfig, global_config: Arc<RwLock<AppConfig>>) {
    let bot_url = bot_config
        .url
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    loop {
        match connect_and_listen(&bot_config, global_config.clone()).await {
            Ok(()) => warn!(target: "Bot", "Bot [{}] 连接断开，3秒后重连...", bot_url),
            Err(e) => {
                error!(target: "Bot", "Bot [{}] 连接失败: {}。3秒后重试...", bot_url, e)
            }
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
}

async fn connect_and_listen(
    config: &BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
) -> Result<(), BotError> {
    let url = config.url.as_deref().ok_or("OneBot URL 未配置")?;

    let mut request = url.into_client_request()?;

    if let Some(token) = &config.access_token
        && !token.is_empty()
    {
        let token_header = format!("Bearer {}", token);
        request
            .headers_mut()
            .insert("Authorization", HeaderValue::from_str(&token_header)?);
    }

    let (ws_stream, _) = connect_async(request).await?;
    info!(target: "Bot", "Bot [{}] 连接成功！(OneBot)", url);

    let (write_half, mut read_half) = ws_stream.split();
    let writer: LockedWriter = Arc::new(AsyncMutex::new(Box::new(write_half)));

    while let Some(message) = read_half.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                let mut data = text.as_bytes().to_vec();
                let writer = writer.clone();
                let config = global_config.clone();

                // 每帧独立任务，下载等耗时指令不阻塞后续事件
                tokio::spawn(async move {
                    if let Err(e) = process_frame(&mut data, writer, config, "onebot").await {
                        error!(target: "Bot", "Event processing error: {}", e);
                    }
                });
            }
            Ok(WsMessage::Close(_)) => return Ok(()),
            Err(e) => return Err(Box::new(e)),
            _ => {}
        }
    }
    Ok(())
}

/// 解析一帧 JSON 并交给插件流水线；无法解析的帧直接丢弃
pub async fn process_frame(
    data: &mut [u8],
    writer: LockedWriter,
    config: Arc<RwLock<AppConfig>>,
    adapter: &'static str,
) -> Result<(), BotError> {
    let event: Event = match simd_json::to_owned_value(data) {
        Ok(v) => v,
        Err(_) => return Ok(()),
    };

    let ctx = Context {
        event: EventType::Onebot(event),
        config,
        adapter,
    };

    plugins::run(ctx, writer).await?;
    Ok(())
}

/// 发送消息：有群号发群聊，否则发私聊
pub async fn send_msg(
    writer: LockedWriter,
    group_id: Option<i64>,
    user_id: Option<i64>,
    message: &Message,
) -> Result<(), BotError> {
    let (message_type, group_id, user_id) = if let Some(gid) = group_id.filter(|&id| id != 0) {
        ("group", Some(gid), None)
    } else if let Some(uid) = user_id.filter(|&id| id != 0) {
        ("private", None, Some(uid))
    } else {
        return Ok(());
    };

    let frame = ActionFrame {
        action: "send_msg",
        params: SendParams {
            message_type,
            group_id,
            user_id,
            message,
        },
    };

    let json_str = simd_json::to_string(&frame)?;
    send_frame_raw(writer, json_str).await
}

/// 回复当前消息事件的来源（群聊或私聊）
pub async fn reply(ctx: &Context, writer: LockedWriter, message: &Message) -> Result<(), BotError> {
    let Some(msg) = ctx.as_message() else {
        return Ok(());
    };
    send_msg(writer, msg.group_id(), Some(msg.user_id()), message).await
}

pub async fn send_frame_raw(writer: LockedWriter, json_str: String) -> Result<(), BotError> {
    let mut guard = writer.lock().await;
    guard.send(WsMessage::Text(json_str.into())).await?;
    Ok(())
}
