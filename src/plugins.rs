use crate::adapters::onebot::LockedWriter;
use crate::event::Context;
use crate::{error, info};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::fs;
use toml::Value;

pub mod bilidown;

pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

pub type PluginHandler =
    fn(Context, LockedWriter) -> BoxFuture<'static, Result<Option<Context>, PluginError>>;

pub type PluginInitHandler = fn(Context) -> BoxFuture<'static, Result<(), PluginError>>;

pub struct Plugin {
    pub name: &'static str,
    pub handler: PluginHandler,
    pub on_init: Option<PluginInitHandler>,
    pub default_config: fn() -> Value,
}

static PLUGINS: OnceLock<Vec<Plugin>> = OnceLock::new();

/// 获取全局插件列表
pub fn get_plugins() -> &'static [Plugin] {
    PLUGINS.get_or_init(|| {
        vec![Plugin {
            name: "bilidown",
            handler: bilidown::handle,
            on_init: Some(bilidown::init),
            default_config: bilidown::default_config,
        }]
    })
}

/// 所有插件的默认配置段，用于生成 / 补齐 config.toml
pub fn default_configs() -> Vec<(&'static str, Value)> {
    get_plugins()
        .iter()
        .map(|p| (p.name, (p.default_config)()))
        .collect()
}

fn enabled_plugins(ctx: &Context) -> HashSet<String> {
    match ctx.config.read() {
        Ok(guard) => guard
            .plugins
            .keys()
            .filter(|name| guard.plugin_enabled(name))
            .cloned()
            .collect(),
        Err(_) => HashSet::new(),
    }
}

/// 执行所有插件的初始化逻辑
pub async fn do_init(ctx: Context) -> Result<(), PluginError> {
    let plugins = get_plugins();
    let enabled = enabled_plugins(&ctx);

    info!(
        target: "System",
        "正在加载插件系统 (已启用 {}/{})",
        plugins.iter().filter(|p| enabled.contains(p.name)).count(),
        plugins.len()
    );

    for plugin in plugins {
        if !enabled.contains(plugin.name) {
            continue;
        }

        match plugin.on_init {
            Some(init_fn) => match init_fn(ctx.clone()).await {
                Ok(_) => info!(target: "Plugin", "✅ [{}] 就绪 (Init Success)", plugin.name),
                Err(e) => error!(target: "Plugin", "❌ [{}] 初始化失败: {}", plugin.name, e),
            },
            None => info!(target: "Plugin", "✅ [{}] 就绪", plugin.name),
        }
    }
    Ok(())
}

/// 运行插件流水线；心跳等元事件不进入插件
pub async fn run(mut ctx: Context, writer: LockedWriter) -> Result<(), PluginError> {
    if ctx.post_type() == Some("meta_event") {
        return Ok(());
    }

    let enabled = enabled_plugins(&ctx);

    for plugin in get_plugins() {
        if !enabled.contains(plugin.name) {
            continue;
        }

        match (plugin.handler)(ctx, writer.clone()).await? {
            Some(next_ctx) => ctx = next_ctx,
            None => return Ok(()),
        }
    }

    Ok(())
}

// ================= 工具函数 =================

/// 插件数据目录：<可执行文件目录>/data/<插件名>
pub async fn get_data_dir(plugin_name: &str) -> Result<PathBuf, PluginError> {
    let mut path = std::env::current_exe()?
        .parent()
        .ok_or("Cannot get parent dir")?
        .to_path_buf();
    path.push("data");
    path.push(plugin_name);
    if !path.exists() {
        fs::create_dir_all(&path).await?;
    }
    Ok(path)
}

pub fn get_config<T>(ctx: &Context, plugin_name: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let guard = ctx.config.read().ok()?;
    guard
        .plugins
        .get(plugin_name)
        .and_then(|v| T::deserialize(v.clone()).ok())
}
