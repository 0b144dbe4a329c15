use super::error::{BiliError, BiliResult};
use crate::config::write_atomic;
use crate::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;
use tokio::sync::Mutex as AsyncMutex;

/// 默认清晰度偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "")]
    Auto,
    #[serde(rename = "8K")]
    Q8K,
    #[serde(rename = "4K")]
    Q4K,
    #[serde(rename = "1080P60")]
    Q1080P60,
    #[serde(rename = "1080P")]
    Q1080P,
    #[serde(rename = "720P60")]
    Q720P60,
    #[serde(rename = "720P")]
    Q720P,
    #[serde(rename = "480P")]
    Q480P,
    #[serde(rename = "360P")]
    Q360P,
}

impl Quality {
    pub const CHOICES: [Quality; 8] = [
        Quality::Q8K,
        Quality::Q4K,
        Quality::Q1080P60,
        Quality::Q1080P,
        Quality::Q720P60,
        Quality::Q720P,
        Quality::Q480P,
        Quality::Q360P,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Auto => "",
            Quality::Q8K => "8K",
            Quality::Q4K => "4K",
            Quality::Q1080P60 => "1080P60",
            Quality::Q1080P => "1080P",
            Quality::Q720P60 => "720P60",
            Quality::Q720P => "720P",
            Quality::Q480P => "480P",
            Quality::Q360P => "360P",
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Quality::Auto)
    }

    pub fn expected() -> String {
        let list: Vec<&str> = Self::CHOICES.iter().map(|q| q.as_str()).collect();
        format!("可选 {} 或 auto", list.join("/"))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Auto => f.write_str("自动选择"),
            q => f.write_str(q.as_str()),
        }
    }
}

impl FromStr for Quality {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") || s == "自动" {
            return Ok(Quality::Auto);
        }
        Self::CHOICES
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// 文件里出现无法识别的清晰度时退回自动，而不是让整个文档失效
fn lenient_quality<'de, D>(deserializer: D) -> Result<Quality, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultOptions {
    #[serde(deserialize_with = "lenient_quality")]
    pub quality: Quality,
    pub download_danmaku: bool,
    pub download_subtitle: bool,
}

impl Default for DefaultOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Auto,
            download_danmaku: false,
            download_subtitle: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub single_video_pattern: String,
    pub multi_video_pattern: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            single_video_pattern: "<视频标题>[<清晰度>]".to_string(),
            multi_video_pattern: "<视频标题>/[P<分P序号补零>]<分P标题>[<清晰度>]".to_string(),
        }
    }
}

/// 插件配置文档 (JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub bbdown_path: String,
    pub download_path: String,
    pub cookie: String,
    pub classify_by_owner: bool,
    pub default_options: DefaultOptions,
    pub naming: NamingConfig,
    /// 未识别的顶层字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            bbdown_path: "BBDown".to_string(),
            download_path: "./downloads".to_string(),
            cookie: String::new(),
            classify_by_owner: true,
            default_options: DefaultOptions::default(),
            naming: NamingConfig::default(),
            extra: Map::new(),
        }
    }
}

/// 可通过指令修改的配置项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BbdownPath,
    DownloadPath,
    ClassifyByOwner,
    Quality,
    Danmaku,
    Subtitle,
    SinglePattern,
    MultiPattern,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 8] = [
        ConfigKey::BbdownPath,
        ConfigKey::DownloadPath,
        ConfigKey::ClassifyByOwner,
        ConfigKey::Quality,
        ConfigKey::Danmaku,
        ConfigKey::Subtitle,
        ConfigKey::SinglePattern,
        ConfigKey::MultiPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::BbdownPath => "bbdown_path",
            ConfigKey::DownloadPath => "download_path",
            ConfigKey::ClassifyByOwner => "classify_by_owner",
            ConfigKey::Quality => "quality",
            ConfigKey::Danmaku => "danmaku",
            ConfigKey::Subtitle => "subtitle",
            ConfigKey::SinglePattern => "single_pattern",
            ConfigKey::MultiPattern => "multi_pattern",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ConfigKey::BbdownPath => "BBDown 可执行文件路径",
            ConfigKey::DownloadPath => "下载保存路径",
            ConfigKey::ClassifyByOwner => "按 UP 主名称分文件夹（true/false 或 是/否）",
            ConfigKey::Quality => {
                "默认清晰度（8K/4K/1080P60/1080P/720P60/720P/480P/360P，auto 表示自动）"
            }
            ConfigKey::Danmaku => "是否下载弹幕（true/false 或 是/否）",
            ConfigKey::Subtitle => "是否下载字幕（true/false 或 是/否）",
            ConfigKey::SinglePattern => "单个视频命名格式",
            ConfigKey::MultiPattern => "分P视频命名格式",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = BiliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| BiliError::UnknownConfigKey(s.to_string()))
    }
}

/// 解析布尔值：true/false、是/否 以及常见同义词，大小写不敏感
pub fn parse_bool(key: &str, value: &str) -> BiliResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "是" | "开启" => Ok(true),
        "false" | "0" | "no" | "off" | "否" | "关闭" => Ok(false),
        _ => Err(BiliError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "可选 true/false 或 是/否".to_string(),
        }),
    }
}

/// 加载结果
#[derive(Debug)]
pub struct Loaded {
    pub document: ConfigDocument,
    /// 文件缺失、损坏或有字段被补齐，需要写回
    pub needs_write: bool,
}

/// 配置存储：内存快照 + JSON 文件。
/// 文件写入串行化并原子替换；并发的 set 之间不做协调，后写入者生效。
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<ConfigDocument>,
    save_lock: AsyncMutex<()>,
}

impl ConfigStore {
    /// 打开存储：加载文件，必要时写回补齐后的文档
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = Self::load(&path).await;
        let store = Self {
            path,
            current: RwLock::new(loaded.document.clone()),
            save_lock: AsyncMutex::new(()),
        };

        if loaded.needs_write
            && let Err(e) = store.save(&loaded.document).await
        {
            warn!(target: "BiliDown", "写回配置文件 {} 失败: {}", store.path.display(), e);
        }
        store
    }

    /// 读取配置文件，从不失败：缺失或损坏时返回默认值
    pub async fn load(path: &Path) -> Loaded {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(target: "BiliDown", "读取 {} 失败，使用默认配置: {}", path.display(), e);
                return Loaded {
                    document: ConfigDocument::default(),
                    needs_write: true,
                };
            }
        };

        let raw: JsonValue = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "BiliDown", "配置文件 JSON 无效，使用默认配置: {}", e);
                return Loaded {
                    document: ConfigDocument::default(),
                    needs_write: true,
                };
            }
        };

        match ConfigDocument::deserialize(&raw) {
            Ok(document) => {
                // 补齐字段或修正非法值后，序列化结果会与原文不同
                let needs_write = serde_json::to_value(&document).map_or(true, |v| v != raw);
                Loaded {
                    document,
                    needs_write,
                }
            }
            Err(e) => {
                warn!(target: "BiliDown", "配置文件存在类型错误的字段，已按字段恢复: {}", e);
                Loaded {
                    document: salvage(&raw),
                    needs_write: true,
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前配置快照
    pub fn snapshot(&self) -> ConfigDocument {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 持久化完整文档（原子替换），成功后更新内存快照
    pub async fn save(&self, doc: &ConfigDocument) -> BiliResult<()> {
        let bytes = serde_json::to_vec_pretty(doc).map_err(std::io::Error::other)?;

        {
            let _guard = self.save_lock.lock().await;
            write_atomic(self.path.clone(), bytes).await?;
        }

        match self.current.write() {
            Ok(mut guard) => *guard = doc.clone(),
            Err(poisoned) => *poisoned.into_inner() = doc.clone(),
        }
        Ok(())
    }

    /// 校验并修改一个配置项；校验失败时不做任何修改
    pub async fn set(&self, key: &str, value: &str) -> BiliResult<ConfigDocument> {
        let key: ConfigKey = key.parse()?;
        let value = value.trim();
        let mut doc = self.snapshot();

        match key {
            ConfigKey::BbdownPath => doc.bbdown_path = value.to_string(),
            ConfigKey::DownloadPath => {
                tokio::fs::create_dir_all(value).await?;
                doc.download_path = value.to_string();
            }
            ConfigKey::ClassifyByOwner => doc.classify_by_owner = parse_bool(key.as_str(), value)?,
            ConfigKey::Quality => {
                doc.default_options.quality =
                    value.parse().map_err(|_| BiliError::InvalidValue {
                        key: key.as_str().to_string(),
                        value: value.to_string(),
                        expected: Quality::expected(),
                    })?;
            }
            ConfigKey::Danmaku => {
                doc.default_options.download_danmaku = parse_bool(key.as_str(), value)?
            }
            ConfigKey::Subtitle => {
                doc.default_options.download_subtitle = parse_bool(key.as_str(), value)?
            }
            ConfigKey::SinglePattern => doc.naming.single_video_pattern = value.to_string(),
            ConfigKey::MultiPattern => doc.naming.multi_video_pattern = value.to_string(),
        }

        self.save(&doc).await?;
        Ok(doc)
    }

    /// 保存规范化后的 Cookie
    pub async fn set_cookie(&self, canonical: String) -> BiliResult<ConfigDocument> {
        let mut doc = self.snapshot();
        doc.cookie = canonical;
        self.save(&doc).await?;
        Ok(doc)
    }
}

/// 逐字段合并到默认文档上：能通过类型校验的字段保留，其余取默认值。
/// 嵌套的 default_options / naming 按子字段处理，未知字段原样保留。
fn salvage(raw: &JsonValue) -> ConfigDocument {
    let mut merged = serde_json::to_value(ConfigDocument::default()).unwrap_or_default();

    if let Some(fields) = raw.as_object() {
        for (key, value) in fields {
            match (merged.get(key), value) {
                (Some(JsonValue::Object(_)), JsonValue::Object(inner)) => {
                    for (sub_key, sub_value) in inner {
                        let mut trial = merged.clone();
                        trial[key][sub_key] = sub_value.clone();
                        if ConfigDocument::deserialize(&trial).is_ok() {
                            merged = trial;
                        }
                    }
                }
                _ => {
                    let mut trial = merged.clone();
                    trial[key] = value.clone();
                    if ConfigDocument::deserialize(&trial).is_ok() {
                        merged = trial;
                    } else {
                        debug!(target: "BiliDown", "字段 {} 类型错误，使用默认值", key);
                    }
                }
            }
        }
    }

    ConfigDocument::deserialize(&merged).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).await;
        (dir, store)
    }

    #[tokio::test]
    async fn missing_file_yields_defaults_and_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let loaded = ConfigStore::load(&path).await;
        assert!(loaded.needs_write);
        assert_eq!(loaded.document, ConfigDocument::default());

        let _store = ConfigStore::open(&path).await;
        let again = ConfigStore::load(&path).await;
        assert!(!again.needs_write);
        assert_eq!(again.document.bbdown_path, "BBDown");
    }

    #[tokio::test]
    async fn malformed_json_recovers_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = ConfigStore::load(&path).await;
        assert!(loaded.needs_write);
        assert_eq!(loaded.document, ConfigDocument::default());
    }

    #[tokio::test]
    async fn backfills_missing_fields_and_keeps_unknown_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cookie":"SESSDATA=a","default_options":{"quality":"720P"},"alist":{"enabled":false}}"#,
        )
        .unwrap();

        let loaded = ConfigStore::load(&path).await;
        assert!(loaded.needs_write);
        assert_eq!(loaded.document.cookie, "SESSDATA=a");
        assert_eq!(loaded.document.default_options.quality, Quality::Q720P);
        assert!(loaded.document.default_options.download_subtitle);
        assert_eq!(loaded.document.download_path, "./downloads");

        let store = ConfigStore::open(&path).await;
        assert_eq!(store.snapshot().extra["alist"]["enabled"], JsonValue::Bool(false));

        let written: JsonValue = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["naming"]["single_video_pattern"], "<视频标题>[<清晰度>]");
        assert_eq!(written["alist"]["enabled"], false);
    }

    #[tokio::test]
    async fn mistyped_field_only_resets_itself() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cookie":"SESSDATA=keepme","alist":{"x":1},"default_options":{"download_danmaku":"yes","quality":"720P"},"naming":7}"#,
        )
        .unwrap();

        let loaded = ConfigStore::load(&path).await;
        assert!(loaded.needs_write);
        let doc = &loaded.document;
        assert_eq!(doc.cookie, "SESSDATA=keepme");
        assert_eq!(doc.extra["alist"]["x"], 1);
        assert!(!doc.default_options.download_danmaku);
        assert_eq!(doc.default_options.quality, Quality::Q720P);
        assert_eq!(doc.naming, NamingConfig::default());

        let store = ConfigStore::open(&path).await;
        assert_eq!(store.snapshot().cookie, "SESSDATA=keepme");

        let written: JsonValue = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["cookie"], "SESSDATA=keepme");
        assert_eq!(written["alist"]["x"], 1);
        assert_eq!(written["default_options"]["download_danmaku"], false);
    }

    #[tokio::test]
    async fn unknown_stored_quality_falls_back_to_auto() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"default_options":{"quality":"9999P"}}"#).unwrap();

        let loaded = ConfigStore::load(&path).await;
        assert!(loaded.needs_write);
        assert_eq!(loaded.document.default_options.quality, Quality::Auto);
    }

    #[tokio::test]
    async fn set_quality_validates_before_mutating() {
        let (_dir, store) = fresh_store().await;

        let doc = store.set("quality", "1080P").await.unwrap();
        assert_eq!(doc.default_options.quality, Quality::Q1080P);

        let err = store.set("quality", "9999P").await.unwrap_err();
        assert!(matches!(err, BiliError::InvalidValue { .. }));
        assert_eq!(store.snapshot().default_options.quality, Quality::Q1080P);

        let persisted = ConfigStore::load(store.path()).await.document;
        assert_eq!(persisted.default_options.quality, Quality::Q1080P);

        let doc = store.set("quality", "auto").await.unwrap();
        assert!(doc.default_options.quality.is_auto());
    }

    #[tokio::test]
    async fn booleans_accept_localized_tokens() {
        let (_dir, store) = fresh_store().await;

        assert!(store.set("danmaku", "是").await.unwrap().default_options.download_danmaku);
        assert!(!store.set("danmaku", "否").await.unwrap().default_options.download_danmaku);
        assert!(store.set("danmaku", "TRUE").await.unwrap().default_options.download_danmaku);
        assert!(!store.set("subtitle", "off").await.unwrap().default_options.download_subtitle);

        let err = store.set("danmaku", "maybe").await.unwrap_err();
        assert!(matches!(err, BiliError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let (_dir, store) = fresh_store().await;
        let err = store.set("nonexistent", "x").await.unwrap_err();
        assert!(matches!(err, BiliError::UnknownConfigKey(k) if k == "nonexistent"));
    }

    #[tokio::test]
    async fn patterns_keep_inner_spaces() {
        let (_dir, store) = fresh_store().await;
        let doc = store
            .set("single_pattern", "<UP主名称> - <视频标题>")
            .await
            .unwrap();
        assert_eq!(doc.naming.single_video_pattern, "<UP主名称> - <视频标题>");
    }

    #[tokio::test]
    async fn download_path_is_created() {
        let (dir, store) = fresh_store().await;
        let target = dir.path().join("videos").join("bili");
        let doc = store
            .set("download_path", target.to_str().unwrap())
            .await
            .unwrap();
        assert!(target.is_dir());
        assert_eq!(doc.download_path, target.to_str().unwrap());
    }

    #[tokio::test]
    async fn save_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let store = ConfigStore::open(blocker.join("config.json")).await;
        let err = store.set_cookie("SESSDATA=a".into()).await.unwrap_err();
        assert!(matches!(err, BiliError::Persistence(_)));
        assert_eq!(store.snapshot().cookie, "");
    }
}
