//! 文件命名格式：中文占位符 → BBDown 英文占位符

use std::sync::OnceLock;

const SINGLE_FALLBACK: &str = "<videoTitle>[<dfn>]";
const MULTI_FALLBACK: &str = "<videoTitle>/[P<pageNumberWithZero>]<pageTitle>[<dfn>]";
const OWNER_FOLDER: &str = "<ownerName>/";

const PLACEHOLDERS: &[(&str, &str)] = &[
    ("<视频标题>", "<videoTitle>"),
    ("<BV号>", "<bvid>"),
    ("<AID>", "<aid>"),
    ("<CID>", "<cid>"),
    ("<清晰度>", "<dfn>"),
    ("<分辨率>", "<res>"),
    ("<帧率>", "<fps>"),
    ("<视频编码>", "<videoCodecs>"),
    ("<视频码率>", "<videoBandwidth>"),
    ("<音频编码>", "<audioCodecs>"),
    ("<音频码率>", "<audioBandwidth>"),
    ("<UP主名称>", "<ownerName>"),
    ("<UP主MID>", "<ownerMid>"),
    ("<发布时间>", "<publishDate>"),
    ("<API类型>", "<apiType>"),
    ("<分P序号>", "<pageNumber>"),
    ("<分P序号补零>", "<pageNumberWithZero>"),
    ("<分P标题>", "<pageTitle>"),
    // 小写写法
    ("<bv号>", "<bvid>"),
    ("<aid>", "<aid>"),
    ("<cid>", "<cid>"),
    ("<up主名称>", "<ownerName>"),
    ("<up主mid>", "<ownerMid>"),
    ("<api类型>", "<apiType>"),
    ("<分p序号>", "<pageNumber>"),
    ("<分p序号补零>", "<pageNumberWithZero>"),
    ("<分p标题>", "<pageTitle>"),
];

/// 按名称长度降序排列，保证 `<分P序号补零>` 先于 `<分P序号>` 替换
fn sorted_placeholders() -> &'static [(&'static str, &'static str)] {
    static SORTED: OnceLock<Vec<(&'static str, &'static str)>> = OnceLock::new();
    SORTED.get_or_init(|| {
        let mut list = PLACEHOLDERS.to_vec();
        list.sort_by_key(|(zh, _)| std::cmp::Reverse(zh.len()));
        list
    })
}

/// 把中文占位符替换为 BBDown 识别的英文占位符
pub fn translate(pattern: &str) -> String {
    sorted_placeholders()
        .iter()
        .fold(pattern.to_string(), |acc, (zh, en)| acc.replace(zh, en))
}

/// 生成最终传给 BBDown 的命名格式
pub fn resolve_pattern(pattern: &str, multi: bool, classify_by_owner: bool) -> String {
    let pattern = pattern.trim();
    let mut resolved = if pattern.is_empty() {
        let fallback = if multi { MULTI_FALLBACK } else { SINGLE_FALLBACK };
        fallback.to_string()
    } else {
        translate(pattern)
    };

    if classify_by_owner && !has_owner_folder(&resolved) {
        resolved.insert_str(0, OWNER_FOLDER);
    }
    resolved
}

/// 只看文件夹层级，文件名里的 `<ownerName>` 不算
fn has_owner_folder(pattern: &str) -> bool {
    let lower = pattern.to_lowercase();
    lower.starts_with("<ownername>/") || lower.contains("/<ownername>/")
}

pub const NAMING_HELP: &str = "\
📝 文件命名格式可用参数（直接使用中文参数名即可）

【单个视频可用参数】
<视频标题>      视频标题
<BV号>          BV 号（如 BV1234567890）
<AID> / <CID>   视频 AID / CID
<清晰度>        清晰度（如 1080P、4K）
<分辨率>        分辨率（如 1920x1080）
<帧率>          帧率（如 30、60）
<视频编码>      视频编码（如 avc、hevc）
<视频码率>      视频码率
<音频编码>      音频编码
<音频码率>      音频码率
<UP主名称>      UP 主名字
<UP主MID>       UP 主 MID
<发布时间>      发布时间（如 2024-01-01_12-00-00）
<API类型>       API 类型（TV/APP/INTL/WEB）

【分P视频额外参数】
<分P序号>       分P序号（如 1、2、10）
<分P序号补零>   带前导零的分P序号（如 01、02、10）
<分P标题>       分P标题

📌 示例
<视频标题>[<清晰度>]
  → 我的视频[1080P].mp4
<UP主名称>-<视频标题>-<清晰度>
  → 张三-我的视频-1080P.mp4
<视频标题>/[P<分P序号补零>]<分P标题>[<清晰度>]
  → 我的视频/[P01]第一集[1080P].mp4

💡 开启 classify_by_owner 时会自动在最外层加上 UP 主文件夹
💡 使用 /bili-set single_pattern <格式> 或 /bili-set multi_pattern <格式> 修改";
