use thiserror::Error;

/// 下载插件的领域错误。所有变体都在指令路由层被渲染成用户可读的文本，
/// 不会继续向框架传播。
#[derive(Error, Debug)]
pub enum BiliError {
    #[error("无法从输入中识别出任何 Cookie 键值对")]
    CookieFormat,
    #[error("Cookie 已被服务器拒绝: {0}")]
    CookieInvalid(String),
    #[error("未知的配置项: {0}")]
    UnknownConfigKey(String),
    #[error("配置项 {key} 的值无效: {value}（{expected}）")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
    #[error("配置文件读写失败: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("尚未配置 Cookie，也没有在指令中提供")]
    NoCookieConfigured,
    #[error("BBDown 执行失败 ({status})\n{tail}")]
    DownloadFailed { status: String, tail: String },
    #[error("找不到 BBDown 可执行文件: {0}")]
    ExecutableNotFound(String),
    #[error("缺少参数\n{0}")]
    MissingArgument(String),
    #[error("无法从输入中提取有效的 B 站视频链接")]
    InvalidTarget,
    #[error("无法解析 B 站短链: {0}")]
    ShortLinkUnresolved(String),
    #[error("网络请求失败: {0}")]
    Network(String),
}

pub type BiliResult<T> = Result<T, BiliError>;

impl BiliError {
    /// 稳定的错误类别标签，作为回复文本的前缀
    pub fn label(&self) -> &'static str {
        match self {
            BiliError::CookieFormat => "Cookie格式错误",
            BiliError::CookieInvalid(_) => "Cookie无效",
            BiliError::UnknownConfigKey(_) => "未知配置项",
            BiliError::InvalidValue { .. } => "配置值无效",
            BiliError::Persistence(_) => "配置保存失败",
            BiliError::NoCookieConfigured => "未配置Cookie",
            BiliError::DownloadFailed { .. } => "下载失败",
            BiliError::ExecutableNotFound(_) => "找不到BBDown",
            BiliError::MissingArgument(_) => "缺少参数",
            BiliError::InvalidTarget => "链接无效",
            BiliError::ShortLinkUnresolved(_) => "短链解析失败",
            BiliError::Network(_) => "网络错误",
        }
    }

    /// 面向用户的补救建议
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            BiliError::CookieFormat => Some(
                "支持浏览器格式 (a=b; c=d)、Netscape 导出文件、JSON 与逐行 key=value，请检查粘贴内容",
            ),
            BiliError::CookieInvalid(_) => {
                Some("Cookie 可能已过期，请重新从浏览器复制后使用 /bili-cookie 设置")
            }
            BiliError::UnknownConfigKey(_) => Some("发送 /bili-set 查看可用配置项"),
            BiliError::InvalidValue { .. } => Some("发送 /bili-set 查看每个配置项的可选值"),
            BiliError::Persistence(_) => Some("请检查数据目录是否可写"),
            BiliError::NoCookieConfigured => {
                Some("请先使用 /bili-cookie <cookie> 设置 Cookie，或在指令后直接附带 Cookie")
            }
            BiliError::DownloadFailed { .. } => {
                Some("请检查链接是否有效、Cookie 是否过期，或所选清晰度是否需要大会员")
            }
            BiliError::ExecutableNotFound(_) => Some(
                "请确认 BBDown 已安装并在 PATH 中，或使用 /bili-set bbdown_path <完整路径> 指定 (check bbdown_path)",
            ),
            BiliError::MissingArgument(_) => None,
            BiliError::InvalidTarget => {
                Some("支持 https://www.bilibili.com/video/BV...、https://b23.tv/... 或 BV 号")
            }
            BiliError::ShortLinkUnresolved(_) => Some("请改用完整链接或 BV 号"),
            BiliError::Network(_) => Some("请检查网络连接后重试"),
        }
    }

    /// 本类错误回复文本的固定前缀
    pub fn prefix(&self) -> String {
        format!("❌ [{}]", self.label())
    }

    /// 渲染为最终回复文本
    pub fn render(&self) -> String {
        let mut text = format!("{} {}", self.prefix(), self);
        if let Some(hint) = self.hint() {
            text.push_str("\n💡 ");
            text.push_str(hint);
        }
        text
    }
}
