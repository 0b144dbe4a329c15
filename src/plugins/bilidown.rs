use crate::adapters::onebot::{LockedWriter, reply};
use crate::command::match_command;
use crate::config::build_config;
use crate::event::Context;
use crate::message::Message;
use crate::plugins::{PluginError, get_config, get_data_dir};
use crate::{debug, info};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use toml::Value;

pub mod cookie;
pub mod error;
pub mod invoker;
pub mod link;
pub mod naming;
pub mod router;
pub mod store;
pub mod verifier;

use invoker::TokioRunner;
use router::{BiliDown, Command};
use store::ConfigStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// 插件配置文档文件名（位于 data/bilidown/ 下）
    pub config_file: String,
    /// Cookie 验证使用的账号信息接口
    pub verify_endpoint: String,
    pub request_timeout_secs: u64,
    /// 回复中附带的 BBDown 输出行数
    pub output_tail_lines: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            config_file: "config.json".to_string(),
            verify_endpoint: verifier::DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 10,
            output_tail_lines: 8,
        }
    }
}

static SERVICE: OnceLock<BiliDown> = OnceLock::new();

fn command_names() -> &'static [&'static str] {
    static NAMES: OnceLock<Vec<&'static str>> = OnceLock::new();
    NAMES.get_or_init(Command::all_names)
}

pub fn default_config() -> Value {
    build_config(PluginConfig::default())
}

pub fn init(ctx: Context) -> BoxFuture<'static, Result<(), PluginError>> {
    Box::pin(async move {
        let config: PluginConfig = get_config(&ctx, "bilidown").unwrap_or_default();
        let path = get_data_dir("bilidown").await?.join(&config.config_file);

        let store = ConfigStore::open(&path).await;
        info!(target: "BiliDown", "配置文件: {}", store.path().display());

        let service = BiliDown::new(
            store,
            Arc::new(TokioRunner),
            &config.verify_endpoint,
            Duration::from_secs(config.request_timeout_secs.max(1)),
            config.output_tail_lines,
        )?;

        SERVICE
            .set(service)
            .map_err(|_| "bilidown 插件重复初始化")?;
        Ok(())
    })
}

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(service) = SERVICE.get() else {
            return Ok(Some(ctx));
        };
        let Some(m) = match_command(&ctx, command_names()) else {
            return Ok(Some(ctx));
        };
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };

        debug!(
            target: "BiliDown",
            "[{}] {}({}) 触发指令 {}",
            ctx.adapter,
            msg.sender_name(),
            msg.user_id(),
            m.name
        );
        let message_id = msg.message_id();

        if let Some(ack) = service.ack_text(&m.name, &m.args) {
            let notice = Message::new().reply(message_id).text(ack);
            reply(&ctx, writer.clone(), &notice).await?;
        }

        if let Some(text) = service.dispatch(&m.name, &m.args).await {
            let answer = Message::new().reply(message_id).text(text);
            reply(&ctx, writer, &answer).await?;
        }

        // 指令已被消费，不再向后传递
        Ok(None)
    })
}
