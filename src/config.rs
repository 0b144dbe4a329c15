use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use toml::Value;

use crate::{info, warn};

pub type ConfigError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    // 全局指令前缀（支持多个，如 ["/", "#"]）
    #[serde(default = "default_prefix")]
    pub command_prefix: Vec<String>,

    // 是否输出 Debug 日志
    #[serde(default)]
    pub debug: bool,

    // Bot 连接配置
    #[serde(default = "default_bots")]
    pub bots: Vec<BotConfig>,

    // 插件配置
    #[serde(flatten)]
    pub plugins: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BotConfig {
    // 是否启用此 Bot
    #[serde(default = "default_true")]
    pub enabled: bool,

    // 协议类型 (例如 "onebot")
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_prefix() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_protocol() -> String {
    "onebot".to_string()
}

fn default_bots() -> Vec<BotConfig> {
    vec![
        // 控制台适配器：本地调试用
        BotConfig {
            enabled: true,
            protocol: "console".to_string(),
            url: None,
            access_token: None,
        },
        // OneBot 适配器：生成配置占位符，默认禁用以防误连
        BotConfig {
            enabled: false,
            protocol: "onebot".to_string(),
            url: Some("ws://127.0.0.1:3001".to_string()),
            access_token: Some("YOUR_TOKEN_HERE".to_string()),
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_prefix(),
            debug: false,
            bots: default_bots(),
            plugins: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// 加载配置；文件不存在或缺少插件段时，用默认值补齐并写回。
    /// 解析失败时退回默认配置，但不覆盖原文件，避免误删用户配置。
    pub async fn load_or_init(path: &Path, plugin_defaults: Vec<(&str, Value)>) -> Self {
        let (mut cfg, mut dirty, parsed) = match tokio::fs::read_to_string(path).await {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(cfg) => (cfg, false, true),
                Err(e) => {
                    warn!(target: "Config", "解析 {} 失败，使用默认配置: {}", path.display(), e);
                    (AppConfig::default(), false, false)
                }
            },
            Err(_) => {
                info!(target: "Config", "未找到 {}，正在生成默认配置", path.display());
                (AppConfig::default(), true, true)
            }
        };

        for (name, value) in plugin_defaults {
            if !cfg.plugins.contains_key(name) {
                cfg.plugins.insert(name.to_string(), value);
                dirty = true;
            }
        }

        if dirty && parsed {
            if let Err(e) = cfg.save(path).await {
                warn!(target: "Config", "写入 {} 失败: {}", path.display(), e);
            }
        }

        cfg
    }

    /// 原子写入（写临时文件 -> Rename 覆盖）
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        write_atomic(path.to_path_buf(), content.into_bytes()).await?;
        Ok(())
    }

    /// 检查某个插件是否启用
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins
            .get(name)
            .and_then(|v| v.get("enabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// 在阻塞线程中执行：确保父目录存在 -> 写临时文件 -> 落盘 -> Rename
pub async fn write_atomic(path: PathBuf, content: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = tmp_path_for(&path);
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 辅助函数：构建默认配置 Value，并确保包含 enabled 字段
pub fn build_config<T: Serialize>(data: T) -> Value {
    let mut val = Value::try_from(data).unwrap_or(Value::Table(Default::default()));
    if let Value::Table(ref mut map) = val
        && !map.contains_key("enabled")
    {
        map.insert("enabled".to_string(), Value::Boolean(true));
    }
    val
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_default_file_with_plugin_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let defaults = vec![("demo", build_config(HashMap::<String, String>::new()))];
        let cfg = AppConfig::load_or_init(&path, defaults).await;

        assert!(path.exists());
        assert!(cfg.plugin_enabled("demo"));
        assert_eq!(cfg.command_prefix, vec!["/".to_string()]);

        let reloaded = AppConfig::load_or_init(&path, Vec::new()).await;
        assert!(reloaded.plugin_enabled("demo"));
    }

    #[tokio::test]
    async fn malformed_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "command_prefix = [").unwrap();

        let cfg = AppConfig::load_or_init(&path, vec![("demo", Value::Table(Default::default()))]).await;

        assert!(cfg.plugins.contains_key("demo"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "command_prefix = [");
    }

    #[test]
    fn build_config_injects_enabled() {
        #[derive(Serialize)]
        struct Demo {
            value: u32,
        }
        let v = build_config(Demo { value: 3 });
        assert_eq!(v.get("enabled").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(v.get("value").and_then(|v| v.as_integer()), Some(3));
    }
}
