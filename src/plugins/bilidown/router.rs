use super::cookie::Cookie;
use super::error::{BiliError, BiliResult};
use super::invoker::{DownloadOverlay, Invoker, ProcessRunner};
use super::link::{self, ShortLinkResolver};
use super::naming::NAMING_HELP;
use super::store::{ConfigDocument, ConfigKey, ConfigStore};
use super::verifier::CookieVerifier;
use crate::{info, warn};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Download,
    SetConfig,
    ShowConfig,
    SetCookie,
    TestCookie,
    ShowNamingParams,
    Help,
}

/// 指令别名表（区分大小写）
pub const ALIASES: &[(Command, &[&str])] = &[
    (Command::Download, &["bili", "bilibili", "b站", "B站"]),
    (
        Command::SetConfig,
        &["bili-set", "bilibili-set", "b站设置", "B站设置"],
    ),
    (
        Command::ShowConfig,
        &["bili-config", "bilibili-config", "b站配置", "B站配置"],
    ),
    (
        Command::SetCookie,
        &["bili-cookie", "bilibili-cookie", "b站cookie", "B站cookie"],
    ),
    (
        Command::TestCookie,
        &[
            "bili-test-cookie",
            "bilibili-test-cookie",
            "b站测试cookie",
            "B站测试cookie",
            "测试cookie",
        ],
    ),
    (
        Command::ShowNamingParams,
        &["bili-naming", "bilibili-naming", "b站命名", "B站命名"],
    ),
    (
        Command::Help,
        &["bili-help", "bilibili-help", "b站帮助", "B站帮助", "bili帮助"],
    ),
];

impl Command {
    pub fn resolve(name: &str) -> Option<Self> {
        ALIASES
            .iter()
            .find(|(_, names)| names.contains(&name))
            .map(|(cmd, _)| *cmd)
    }

    /// 所有别名，供指令匹配使用
    pub fn all_names() -> Vec<&'static str> {
        ALIASES
            .iter()
            .flat_map(|(_, names)| names.iter().copied())
            .collect()
    }
}

const DOWNLOAD_USAGE: &str = "\
用法: /bili <链接或BV号> [选项]
示例: /bili https://b23.tv/uKe83H7
示例: /bili BV1qt4y1X7TW q=1080P 弹幕=是 p=1-3
示例: /bili 【标题-哔哩哔哩】 https://b23.tv/xxx
选项: quality|q|清晰度=8K/4K/1080P60/1080P/720P60/720P/480P/360P/auto
      danmaku|弹幕=是/否  subtitle|字幕=是/否  page|p|分P=ALL/N/N-M/N,M";

const COOKIE_USAGE: &str = "\
用法: /bili-cookie <cookie>
支持格式:
1. 浏览器格式: SESSDATA=xxx; bili_jct=xxx; DedeUserID=xxx
2. Netscape 导出文件（制表符分隔）
3. JSON: {\"SESSDATA\":\"xxx\",\"bili_jct\":\"xxx\"}
4. 每行一个 key=value";

const HELP: &str = "\
📺 B站视频下载 (BBDown)

/bili <链接或BV号> [选项]     下载视频
/bili-set <配置项> <值>       修改配置
/bili-config                  查看当前配置
/bili-cookie <cookie>         设置 Cookie
/bili-test-cookie [cookie]    测试 Cookie 是否有效
/bili-naming                  查看文件命名参数
/bili-help                    显示本帮助

支持完整链接、b23.tv 短链、BV 号和移动端分享文案
下载选项: q=1080P 弹幕=是 字幕=否 p=1-3";

/// 指令执行服务：持有配置存储与各外部能力
pub struct BiliDown {
    store: ConfigStore,
    invoker: Invoker,
    verifier: CookieVerifier,
    resolver: ShortLinkResolver,
}

impl BiliDown {
    pub fn new(
        store: ConfigStore,
        runner: Arc<dyn ProcessRunner>,
        verify_endpoint: &str,
        timeout: Duration,
        tail_lines: usize,
    ) -> BiliResult<Self> {
        Ok(Self {
            store,
            invoker: Invoker::new(runner, tail_lines),
            verifier: CookieVerifier::new(verify_endpoint, timeout)?,
            resolver: ShortLinkResolver::new(timeout)?,
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// 耗时操作开始前的提示文本
    pub fn ack_text(&self, name: &str, args: &str) -> Option<&'static str> {
        match Command::resolve(name)? {
            Command::Download if !args.trim().is_empty() => Some("⏳ 正在下载，请稍候..."),
            Command::TestCookie
                if !args.trim().is_empty() || !self.store.snapshot().cookie.is_empty() =>
            {
                Some("⏳ 正在测试 Cookie，请稍候...")
            }
            _ => None,
        }
    }

    /// 分发指令。名称不属于本插件时返回 None；
    /// 所有错误都在这里被渲染成回复文本。
    pub async fn dispatch(&self, name: &str, args: &str) -> Option<String> {
        let command = Command::resolve(name)?;
        let reply = match self.execute(command, args).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "BiliDown", "{} 执行失败: {}", name, e.label());
                e.render()
            }
        };
        Some(reply)
    }

    async fn execute(&self, command: Command, args: &str) -> BiliResult<String> {
        match command {
            Command::Download => self.download(args).await,
            Command::SetConfig => self.set_config(args).await,
            Command::ShowConfig => Ok(render_config(&self.store.snapshot())),
            Command::SetCookie => self.set_cookie(args).await,
            Command::TestCookie => self.test_cookie(args).await,
            Command::ShowNamingParams => Ok(NAMING_HELP.to_string()),
            Command::Help => Ok(HELP.to_string()),
        }
    }

    async fn download(&self, args: &str) -> BiliResult<String> {
        let args = args.trim();
        if args.is_empty() {
            return Ok(DOWNLOAD_USAGE.to_string());
        }

        let tokens: Vec<&str> = args.split_whitespace().collect();
        // 首个参数不是目标时，当作分享文案整体扫描
        let target = tokens
            .first()
            .and_then(|first| link::find_target(first))
            .or_else(|| link::find_target(args))
            .ok_or(BiliError::InvalidTarget)?;

        let mut overlay = DownloadOverlay::default();
        for token in &tokens {
            if let Some((key, value)) = token.split_once('=') {
                overlay.apply(key, value)?;
            }
        }

        let target = if link::is_short_link(&target) {
            self.resolver.resolve(&target).await?
        } else {
            target
        };

        let doc = self.store.snapshot();
        let result = self.invoker.invoke(&target, &overlay, &doc).await?;
        info!(target: "BiliDown", "下载完成: {}", target);

        let mut text = format!(
            "✅ 下载完成\n🎬 {}\n📁 保存位置: {}",
            target,
            result.work_dir.display()
        );
        if !result.tail.is_empty() {
            text.push_str("\n\n");
            text.push_str(&result.tail);
        }
        Ok(text)
    }

    async fn set_config(&self, args: &str) -> BiliResult<String> {
        let args = args.trim();
        let Some(key) = args.split_whitespace().next() else {
            return Ok(config_usage());
        };
        let value = args[key.len()..].trim();
        if value.is_empty() {
            // 先校验 key，未知配置项优先报错
            let key: ConfigKey = key.parse()?;
            return Err(BiliError::MissingArgument(format!(
                "用法: /bili-set {} <值>\n说明: {}",
                key.as_str(),
                key.describe()
            )));
        }

        let doc = self.store.set(key, value).await?;
        info!(target: "BiliDown", "配置项 {} 已更新", key);
        Ok(format!("✅ 配置已更新: {} = {}\n\n{}", key, value, render_config(&doc)))
    }

    async fn set_cookie(&self, args: &str) -> BiliResult<String> {
        if args.trim().is_empty() {
            return Err(BiliError::MissingArgument(COOKIE_USAGE.to_string()));
        }

        let (cookie, shape) = Cookie::parse_with_shape(args)?;
        self.store.set_cookie(cookie.to_string()).await?;
        info!(
            target: "BiliDown",
            "Cookie 已更新（{} 格式，{} 项）",
            shape.name(),
            cookie.len()
        );

        let mut text = format!(
            "✅ Cookie 已保存（识别为{}格式，共 {} 项）\n{}",
            shape.name(),
            cookie.len(),
            cookie.masked()
        );
        let missing = cookie.missing_required();
        if !missing.is_empty() {
            text.push_str(&format!(
                "\n⚠️ 缺少关键字段: {}，部分视频可能无法下载高清晰度",
                missing.join(", ")
            ));
        }
        text.push_str("\n💡 可使用 /bili-test-cookie 验证是否有效");
        Ok(text)
    }

    async fn test_cookie(&self, args: &str) -> BiliResult<String> {
        let provided = args.trim();
        let raw = if provided.is_empty() {
            self.store.snapshot().cookie
        } else {
            provided.to_string()
        };
        if raw.trim().is_empty() {
            return Err(BiliError::NoCookieConfigured);
        }

        let identity = self.verifier.verify(&raw).await?;
        Ok(format!(
            "✅ Cookie 有效\n👤 用户名: {}\n🆔 UID: {}\n⭐ 等级: LV{}\n💎 会员: {}",
            identity.name, identity.mid, identity.level, identity.vip
        ))
    }
}

fn yes_no(v: bool) -> &'static str {
    if v { "是" } else { "否" }
}

fn render_config(doc: &ConfigDocument) -> String {
    let opts = &doc.default_options;
    format!(
        "⚙️ B站下载配置\n\
         BBDown路径: {}\n\
         下载路径: {}\n\
         Cookie: {}\n\
         按UP主分类: {}\n\
         默认清晰度: {}\n\
         下载弹幕: {}\n\
         下载字幕: {}\n\
         单视频命名: {}\n\
         分P命名: {}",
        doc.bbdown_path,
        doc.download_path,
        if doc.cookie.is_empty() { "未设置" } else { "已设置" },
        yes_no(doc.classify_by_owner),
        opts.quality,
        yes_no(opts.download_danmaku),
        yes_no(opts.download_subtitle),
        doc.naming.single_video_pattern,
        doc.naming.multi_video_pattern,
    )
}

fn config_usage() -> String {
    let mut text = String::from("用法: /bili-set <配置项> <值>\n可用配置项:");
    for key in ConfigKey::ALL {
        text.push_str(&format!("\n  {} - {}", key.as_str(), key.describe()));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_alias_resolves() {
        for (cmd, names) in ALIASES {
            for name in *names {
                assert_eq!(Command::resolve(name), Some(*cmd), "{name}");
            }
        }
        assert_eq!(Command::resolve("BILI"), None);
        assert_eq!(Command::resolve("echo"), None);
    }

    #[test]
    fn alias_names_are_unique() {
        let mut names = Command::all_names();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn config_rendering_hides_cookie() {
        let doc = ConfigDocument {
            cookie: "SESSDATA=secret".into(),
            ..ConfigDocument::default()
        };
        let text = render_config(&doc);
        assert!(text.contains("Cookie: 已设置"));
        assert!(!text.contains("secret"));
        assert!(text.contains("默认清晰度: 自动选择"));
    }
}
