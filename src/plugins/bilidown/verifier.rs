use super::cookie::Cookie;
use super::error::{BiliError, BiliResult};
use crate::debug;
use reqwest::{Client, header};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.bilibili.com/x/space/myinfo";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<MyInfo>,
}

#[derive(Debug, Deserialize)]
struct MyInfo {
    name: String,
    mid: u64,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default)]
    level_info: Option<LevelInfo>,
    #[serde(default)]
    vip: VipInfo,
}

#[derive(Debug, Deserialize)]
struct LevelInfo {
    current_level: u32,
}

#[derive(Debug, Default, Deserialize)]
struct VipInfo {
    #[serde(default)]
    status: i64,
    #[serde(default, rename = "type")]
    vip_type: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VipStatus {
    None,
    Monthly,
    Annual,
}

impl fmt::Display for VipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VipStatus::None => "未开通",
            VipStatus::Monthly => "大会员",
            VipStatus::Annual => "年度大会员",
        })
    }
}

/// Cookie 对应的账号信息
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    pub mid: u64,
    pub level: u32,
    pub vip: VipStatus,
}

impl From<MyInfo> for Identity {
    fn from(info: MyInfo) -> Self {
        let level = info
            .level
            .or(info.level_info.map(|l| l.current_level))
            .unwrap_or(0);
        let vip = match (info.vip.status, info.vip.vip_type) {
            (0, _) => VipStatus::None,
            (_, 2) => VipStatus::Annual,
            _ => VipStatus::Monthly,
        };
        Self {
            name: info.name,
            mid: info.mid,
            level,
            vip,
        }
    }
}

pub struct CookieVerifier {
    client: Client,
    endpoint: String,
}

impl CookieVerifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> BiliResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| BiliError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// 规范化 Cookie 后请求一次账号信息
    pub async fn verify(&self, raw: &str) -> BiliResult<Identity> {
        let cookie = Cookie::parse(raw)?;

        let resp = self
            .client
            .get(&self.endpoint)
            .header(header::COOKIE, cookie.to_string())
            .header(header::REFERER, "https://www.bilibili.com/")
            .send()
            .await
            .map_err(|e| BiliError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BiliError::Network(format!("HTTP {status}")));
        }

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| BiliError::Network(format!("响应解析失败: {e}")))?;

        debug!(target: "BiliDown", "账号信息接口返回 code={}", body.code);

        if body.code != 0 {
            let message = if body.message.is_empty() {
                format!("code {}", body.code)
            } else {
                body.message
            };
            return Err(BiliError::CookieInvalid(message));
        }

        body.data
            .map(Identity::from)
            .ok_or_else(|| BiliError::CookieInvalid("未获取到用户信息".to_string()))
    }
}
