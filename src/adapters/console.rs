use crate::adapters::onebot::{LockedWriter, process_frame};
use crate::config::{AppConfig, BotConfig};
use crate::message::Message;
use crate::{info, warn};
use futures_util::Sink;
use futures_util::future::BoxFuture;
use serde::Serialize;
use simd_json::OwnedValue;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsArray, ValueObjectAccessAsScalar};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

const CONSOLE_USER_ID: i64 = 1;

#[derive(Serialize)]
struct MockSender {
    user_id: i64,
    nickname: &'static str,
    card: &'static str,
}

#[derive(Serialize)]
struct MockMessageEvent<'a> {
    post_type: &'static str,
    message_type: &'static str,
    time: i64,
    self_id: i64,
    sub_type: &'static str,
    user_id: i64,
    message_id: i64,
    sender: MockSender,
    raw_message: &'a str,
    message: Message,
}

/// 控制台适配器入口：每行输入模拟一条私聊消息
pub fn entry(
    _bot_config: BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        info!(target: "Console", "已启动控制台模式。请输入指令 (例如: /bili-help)");

        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        let writer: LockedWriter = Arc::new(AsyncMutex::new(Box::new(ConsoleSink)));

        while let Ok(Some(line)) = reader.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let now = chrono::Local::now();
            let event = MockMessageEvent {
                post_type: "message",
                message_type: "private",
                time: now.timestamp(),
                self_id: 0,
                sub_type: "friend",
                user_id: CONSOLE_USER_ID,
                message_id: now.timestamp_millis(),
                sender: MockSender {
                    user_id: CONSOLE_USER_ID,
                    nickname: "ConsoleUser",
                    card: "",
                },
                raw_message: line,
                message: Message::new().text(line),
            };

            let mut json_bytes = match simd_json::to_vec(&event) {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "Console", "构造模拟消息失败: {}", e);
                    continue;
                }
            };

            // 控制台按顺序处理，一次一条
            if let Err(e) = process_frame(
                &mut json_bytes,
                writer.clone(),
                global_config.clone(),
                "console",
            )
            .await
            {
                warn!(target: "Console", "处理消息时出错: {}", e);
            }
        }
    })
}

/// 把发出的 send_msg 帧渲染成纯文本
fn render_frame(frame: &OwnedValue) -> Option<String> {
    if frame.get_str("action")? != "send_msg" {
        return None;
    }
    let segments = frame.get("params")?.get_array("message")?;
    let text = segments
        .iter()
        .filter_map(|seg| match seg.get_str("type")? {
            "text" => seg.get("data")?.get_str("text").map(str::to_string),
            other => Some(format!("[{}]", other)),
        })
        .collect::<String>();
    Some(text)
}

struct ConsoleSink;

impl Sink<WsMessage> for ConsoleSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        if let WsMessage::Text(text) = item {
            let mut data = text.as_bytes().to_vec();
            match simd_json::to_owned_value(&mut data) {
                Ok(val) => match render_frame(&val) {
                    Some(reply) => println!("\x1b[36m[Bot Reply] > \x1b[0m{}", reply),
                    None => println!(
                        "\x1b[90m[API Call] > {}\x1b[0m",
                        val.get_str("action").unwrap_or("unknown")
                    ),
                },
                Err(_) => println!("\x1b[36m[Bot Raw] > \x1b[0m{}", text.as_str()),
            }
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_reply_text() {
        let mut raw = br#"{"action":"send_msg","params":{"message_type":"private","user_id":1,"message":[{"type":"reply","data":{"id":"9"}},{"type":"text","data":{"text":"hi"}}]}}"#.to_vec();
        let frame = simd_json::to_owned_value(&mut raw).unwrap();
        assert_eq!(render_frame(&frame).as_deref(), Some("[reply]hi"));

        let mut raw = br#"{"action":"get_login_info","params":{}}"#.to_vec();
        let frame = simd_json::to_owned_value(&mut raw).unwrap();
        assert_eq!(render_frame(&frame), None);
    }
}
