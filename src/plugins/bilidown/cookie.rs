//! Cookie 格式识别与规范化。
//!
//! 依次尝试 JSON、Netscape、浏览器 (分号分隔)、逐行 key=value 四种形态，
//! 命中的第一种即为结果；最终输出统一为 `k=v; k=v`。

use super::error::{BiliError, BiliResult};
use serde_json::Value as JsonValue;
use std::fmt;

/// 需要登录态的操作依赖的键
pub const REQUIRED_KEYS: [&str; 3] = ["SESSDATA", "DedeUserID", "bili_jct"];

/// 展示时需要打码的键
const SENSITIVE_KEYS: [&str; 5] = ["SESSDATA", "DedeUserID", "DedeUserID__ckMd5", "bili_jct", "sid"];

/// 识别出的输入形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieShape {
    Json,
    Netscape,
    Header,
    Lines,
}

impl CookieShape {
    pub fn name(&self) -> &'static str {
        match self {
            CookieShape::Json => "JSON",
            CookieShape::Netscape => "Netscape",
            CookieShape::Header => "浏览器格式",
            CookieShape::Lines => "逐行键值对",
        }
    }
}

/// 有序的 Cookie 键值对集合；同名键后者覆盖前者但保留首次出现的位置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    pairs: Vec<(String, String)>,
}

impl Cookie {
    /// 解析任意受支持形态的 Cookie 文本
    pub fn parse(raw: &str) -> BiliResult<Self> {
        Self::parse_with_shape(raw).map(|(cookie, _)| cookie)
    }

    /// 解析并返回命中的形态
    pub fn parse_with_shape(raw: &str) -> BiliResult<(Self, CookieShape)> {
        // `Cookie:` 头名与形态无关，先剥掉
        let raw = strip_header_name(raw.trim()).trim();
        if raw.is_empty() {
            return Err(BiliError::CookieFormat);
        }

        let (pairs, shape) = if let Some(pairs) = parse_json(raw) {
            (pairs, CookieShape::Json)
        } else if let Some(pairs) = parse_netscape(raw) {
            (pairs, CookieShape::Netscape)
        } else if raw.contains(';') {
            (parse_header(raw), CookieShape::Header)
        } else {
            (parse_lines(raw), CookieShape::Lines)
        };

        let mut cookie = Cookie::default();
        for (key, value) in pairs {
            cookie.insert(key, value);
        }

        if cookie.is_empty() {
            return Err(BiliError::CookieFormat);
        }
        Ok((cookie, shape))
    }

    /// 插入一对键值；不合法的键值对被静默丢弃
    fn insert(&mut self, key: String, value: String) {
        let key = key.trim();
        let value = value.trim();
        if !is_valid_pair(key, value) {
            return;
        }

        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 缺失的必需键
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| self.get(k).is_none_or(str::is_empty))
            .collect()
    }

    /// 打码后的展示形式
    pub fn masked(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if SENSITIVE_KEYS.contains(&k.as_str()) {
                    format!("{}=***", k)
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// 从任意文本中抹去本 Cookie 的值（用于外部程序输出回显）
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.replace(&self.to_string(), "***");
        for (_, value) in &self.pairs {
            // 过短的值替换会误伤正常文本
            if value.len() >= 6 {
                out = out.replace(value.as_str(), "***");
            }
        }
        out
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// 规范化为 `k=v; k=v`
pub fn normalize(raw: &str) -> BiliResult<String> {
    Cookie::parse(raw).map(|c| c.to_string())
}

/// `#` 开头的键在逐行形态里会被当成注释，任何形态都不接受
fn is_valid_pair(key: &str, value: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('#')
        && !key.contains(['=', ';', '\r', '\n'])
        && !value.contains([';', '\r', '\n'])
}

/// 严格 JSON：对象，或浏览器插件导出的 [{name, value}] 数组
fn parse_json(raw: &str) -> Option<Vec<(String, String)>> {
    match serde_json::from_str::<JsonValue>(raw).ok()? {
        JsonValue::Object(map) => Some(
            map.into_iter()
                .map(|(k, v)| (k, json_to_string(v)))
                .collect(),
        ),
        JsonValue::Array(items) => {
            let pairs: Vec<_> = items
                .into_iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?.to_string();
                    let value = item.get("value").cloned().unwrap_or(JsonValue::Null);
                    Some((name, json_to_string(value)))
                })
                .collect();
            (!pairs.is_empty()).then_some(pairs)
        }
        _ => None,
    }
}

fn json_to_string(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Netscape cookie 文件：存在至少一行 >= 7 个制表符分隔字段时命中。
/// `#HttpOnly_` 前缀标记的是 HttpOnly cookie（如 SESSDATA），不是注释。
fn parse_netscape(raw: &str) -> Option<Vec<(String, String)>> {
    let rows: Vec<Vec<&str>> = raw
        .lines()
        .map(str::trim)
        .map(|line| line.strip_prefix("#HttpOnly_").unwrap_or(line))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split('\t').collect::<Vec<_>>())
        .filter(|fields| fields.len() >= 7)
        .collect();

    if rows.is_empty() {
        return None;
    }

    Some(
        rows.into_iter()
            .map(|fields| (fields[5].to_string(), fields[6].to_string()))
            .collect(),
    )
}

/// 浏览器 / 请求头格式：`a=b; c=d`
fn parse_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';').filter_map(split_pair).collect()
}

fn strip_header_name(raw: &str) -> &str {
    match raw.split_once(':') {
        Some((name, rest)) if name.trim().eq_ignore_ascii_case("cookie") => rest,
        _ => raw,
    }
}

/// 逐行 `key=value`
fn parse_lines(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(split_pair)
        .collect()
}

fn split_pair(piece: &str) -> Option<(String, String)> {
    let (k, v) = piece.split_once('=')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pair_set(canonical: &str) -> BTreeMap<String, String> {
        Cookie::parse(canonical)
            .unwrap()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn json_object_keeps_all_pairs() {
        let out = normalize(r#"{"SESSDATA":"a","bili_jct":"b"}"#).unwrap();
        assert!(out.contains("SESSDATA=a"));
        assert!(out.contains("bili_jct=b"));
    }

    #[test]
    fn json_values_are_coerced() {
        let out = normalize(r#"{"DedeUserID": 12345, "flag": true, "empty": null}"#).unwrap();
        let set = pair_set(&out);
        assert_eq!(set["DedeUserID"], "12345");
        assert_eq!(set["flag"], "true");
        assert_eq!(set["empty"], "");
    }

    #[test]
    fn json_array_export_is_accepted() {
        let raw = r#"[{"name":"SESSDATA","value":"x","domain":".bilibili.com"},{"name":"bili_jct","value":"y"}]"#;
        let (cookie, shape) = Cookie::parse_with_shape(raw).unwrap();
        assert_eq!(shape, CookieShape::Json);
        assert_eq!(cookie.to_string(), "SESSDATA=x; bili_jct=y");
    }

    #[test]
    fn all_shapes_yield_same_pairs() {
        let header = "SESSDATA=x; bili_jct=y";
        let json = r#"{"SESSDATA":"x","bili_jct":"y"}"#;
        let netscape = "# Netscape HTTP Cookie File\n\n\
            .bilibili.com\tTRUE\t/\tFALSE\t1767225600\tSESSDATA\tx\n\
            .bilibili.com\tTRUE\t/\tFALSE\t1767225600\tbili_jct\ty\n";
        let lines = "SESSDATA=x\nbili_jct=y\n";

        let expected = pair_set(&normalize(header).unwrap());
        for (raw, shape) in [
            (json, CookieShape::Json),
            (netscape, CookieShape::Netscape),
            (header, CookieShape::Header),
            (lines, CookieShape::Lines),
        ] {
            let (cookie, detected) = Cookie::parse_with_shape(raw).unwrap();
            assert_eq!(detected, shape, "input: {raw:?}");
            assert_eq!(pair_set(&cookie.to_string()), expected, "input: {raw:?}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "SESSDATA=abc%2C123; DedeUserID=42; bili_jct=ff00",
            "  SESSDATA = a ;; =orphan; junk ; bili_jct=b ",
            r#"{"SESSDATA":"a=b","x":"has;semicolon","y":"1"}"#,
            "Cookie: buvid3=zz; SESSDATA=q",
            "a=1\nb=2\n# comment\nnot-a-pair",
            "SESSDATA=first; SESSDATA=second; other=1",
            ".bilibili.com\tTRUE\t/\tFALSE\t0\tSESSDATA\tv a l\n",
            "#a=1; b=2",
            r##"{"#a":"1","b":"2"}"##,
            "Cookie: SESSDATA=abc",
        ];
        for raw in inputs {
            let once = normalize(raw).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "input: {raw:?}");
        }
    }

    #[test]
    fn malformed_pieces_are_skipped() {
        let out = normalize("  SESSDATA = a ;; =orphan; junk ; bili_jct=b ").unwrap();
        assert_eq!(out, "SESSDATA=a; bili_jct=b");

        let out = normalize(r#"{"ok":"1","bad":"x;y"}"#).unwrap();
        assert_eq!(out, "ok=1");
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let out = normalize("SESSDATA=first; other=1; SESSDATA=second").unwrap();
        assert_eq!(out, "SESSDATA=second; other=1");
    }

    #[test]
    fn header_name_is_stripped() {
        let out = normalize("Cookie: SESSDATA=a; bili_jct=b").unwrap();
        assert_eq!(out, "SESSDATA=a; bili_jct=b");

        // 单个键值对没有 `;`，走逐行形态，也要去掉头名
        let (cookie, shape) = Cookie::parse_with_shape("Cookie: SESSDATA=abc").unwrap();
        assert_eq!(shape, CookieShape::Lines);
        assert_eq!(cookie.to_string(), "SESSDATA=abc");
        assert_eq!(normalize("cookie:SESSDATA=abc\nbili_jct=x").unwrap(), "SESSDATA=abc; bili_jct=x");

        assert!(matches!(normalize("Cookie:"), Err(BiliError::CookieFormat)));
    }

    #[test]
    fn hash_keys_are_dropped_in_every_shape() {
        assert_eq!(normalize("#a=1; b=2").unwrap(), "b=2");
        assert_eq!(normalize(r##"{"#a":"1","b":"2"}"##).unwrap(), "b=2");

        for raw in ["#a=1;", r##"{"#a":"1"}"##] {
            assert!(
                matches!(normalize(raw), Err(BiliError::CookieFormat)),
                "input: {raw:?}"
            );
        }
    }

    #[test]
    fn netscape_httponly_rows_are_kept() {
        let raw = "# Netscape HTTP Cookie File\n\
            #HttpOnly_.bilibili.com\tTRUE\t/\tFALSE\t0\tSESSDATA\tx\n\
            .bilibili.com\tTRUE\t/\tFALSE\t0\tbuvid3\ty\n";
        let (cookie, shape) = Cookie::parse_with_shape(raw).unwrap();
        assert_eq!(shape, CookieShape::Netscape);
        assert_eq!(cookie.get("SESSDATA"), Some("x"));
        assert_eq!(cookie.to_string(), "SESSDATA=x; buvid3=y");

        // 只有 HttpOnly 行时同样命中
        let only = "#HttpOnly_.bilibili.com\tTRUE\t/\tFALSE\t0\tSESSDATA\tx";
        assert_eq!(normalize(only).unwrap(), "SESSDATA=x");
    }

    #[test]
    fn garbage_is_rejected() {
        for raw in ["", "   ", "not a cookie at all???", "{}", "[]", "# only a comment"] {
            assert!(
                matches!(normalize(raw), Err(BiliError::CookieFormat)),
                "input: {raw:?}"
            );
        }
    }

    #[test]
    fn masks_sensitive_values() {
        let cookie = Cookie::parse("SESSDATA=secret; DedeUserID=42; buvid3=visible").unwrap();
        assert_eq!(cookie.masked(), "SESSDATA=***; DedeUserID=***; buvid3=visible");
    }

    #[test]
    fn reports_missing_required_keys() {
        let cookie = Cookie::parse("SESSDATA=a; buvid3=b").unwrap();
        assert_eq!(cookie.missing_required(), vec!["DedeUserID", "bili_jct"]);
    }

    #[test]
    fn redacts_values_from_output() {
        let cookie = Cookie::parse("SESSDATA=verysecretvalue; bili_jct=abcdef123").unwrap();
        let text = "using cookie SESSDATA=verysecretvalue; bili_jct=abcdef123 ok";
        let redacted = cookie.redact(text);
        assert!(!redacted.contains("verysecretvalue"));
        assert!(!redacted.contains("abcdef123"));
    }
}
