use anyhow::Context as _;
use ayjx_bilidown::adapters::find_adapter;
use ayjx_bilidown::config::AppConfig;
use ayjx_bilidown::event::Context;
use ayjx_bilidown::{error, info, log, plugins, warn};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = PathBuf::from(CONFIG_PATH);
    let config = AppConfig::load_or_init(&config_path, plugins::default_configs()).await;
    log::set_debug(config.debug);

    let bots = config.bots.clone();
    let shared = Arc::new(RwLock::new(config));

    plugins::do_init(Context::system(shared.clone()))
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("插件初始化失败")?;

    let mut started = 0;
    for bot in bots.into_iter().filter(|b| b.enabled) {
        let Some(adapter) = find_adapter(&bot.protocol) else {
            warn!(target: "System", "未知的协议类型: {}", bot.protocol);
            continue;
        };
        info!(target: "System", "启动适配器: {}", adapter.protocol);
        tokio::spawn((adapter.handler)(bot, shared.clone()));
        started += 1;
    }

    if started == 0 {
        error!(target: "System", "没有启用任何 Bot，请检查 {}", CONFIG_PATH);
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("监听退出信号失败")?;
    info!(target: "System", "收到退出信号，正在关闭...");
    Ok(())
}
