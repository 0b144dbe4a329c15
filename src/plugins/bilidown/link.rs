use super::error::{BiliError, BiliResult};
use crate::{debug, warn};
use regex::Regex;
use reqwest::{Client, StatusCode, header, redirect};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://www.bilibili.com/";

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:https?://)?(?:b23\.tv|(?:www\.|m\.)?bilibili\.com)/[A-Za-z0-9_/?=&%#.\-]+")
            .unwrap()
    })
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"BV1[A-Za-z0-9]{9}|\bav\d+\b").unwrap())
}

/// 从任意文本（包括移动端分享文案）中找出第一个可下载的目标
pub fn find_target(text: &str) -> Option<String> {
    if let Some(m) = url_regex().find(text) {
        let url = m.as_str();
        return Some(if url.starts_with("http") {
            url.to_string()
        } else {
            format!("https://{url}")
        });
    }

    id_regex().find(text).map(|m| m.as_str().to_string())
}

pub fn is_short_link(target: &str) -> bool {
    Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "b23.tv"))
        .unwrap_or(false)
}

fn on_bilibili(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h == "bilibili.com" || h.ends_with(".bilibili.com"))
}

/// b23.tv 短链解析
pub struct ShortLinkResolver {
    direct: Client,
    follow: Client,
}

impl ShortLinkResolver {
    pub fn new(timeout: Duration) -> BiliResult<Self> {
        let build = |policy: redirect::Policy| {
            Client::builder()
                .timeout(timeout)
                .user_agent(BROWSER_UA)
                .redirect(policy)
                .build()
                .map_err(|e| BiliError::Network(e.to_string()))
        };

        Ok(Self {
            direct: build(redirect::Policy::none())?,
            follow: build(redirect::Policy::limited(10))?,
        })
    }

    /// 先读 Location 头，拿不到再跟随重定向；两种方式的结果都必须落在 bilibili.com
    pub async fn resolve(&self, short: &str) -> BiliResult<String> {
        let base = Url::parse(short).map_err(|_| BiliError::ShortLinkUnresolved(short.to_string()))?;

        match self.direct.get(base.clone()).header(header::REFERER, REFERER).send().await {
            Ok(resp) if resp.status().is_redirection() => {
                if let Some(location) = resp
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    && let Ok(resolved) = base.join(location)
                {
                    if on_bilibili(&resolved) {
                        debug!(target: "BiliDown", "短链解析成功（重定向）: {} -> {}", short, resolved);
                        return Ok(resolved.into());
                    }
                    debug!(target: "BiliDown", "重定向目标不是 B 站: {}，改为跟随请求", resolved);
                }
            }
            Ok(resp) => {
                debug!(target: "BiliDown", "短链未返回重定向 ({})，改为跟随请求", resp.status());
            }
            Err(e) => {
                warn!(target: "BiliDown", "短链请求失败: {} ({})", short, e);
            }
        }

        let resp = self
            .follow
            .get(base)
            .header(header::REFERER, REFERER)
            .send()
            .await
            .map_err(|e| BiliError::Network(e.to_string()))?;

        let final_url = resp.url().clone();
        if resp.status() == StatusCode::OK && on_bilibili(&final_url) {
            debug!(target: "BiliDown", "短链解析成功（跟随重定向）: {} -> {}", short, final_url);
            return Ok(final_url.into());
        }

        warn!(target: "BiliDown", "短链解析结果不是 B 站链接: {} -> {}", short, final_url);
        Err(BiliError::ShortLinkUnresolved(short.to_string()))
    }
}
