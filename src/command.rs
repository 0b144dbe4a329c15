use crate::event::Context;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};

pub struct CommandMatch {
    /// 命中的指令名（别名原文）
    pub name: String,
    /// 指令名之后的参数文本（保留换行和制表符）
    pub args: String,
}

/// 解析指令：过滤头部的 Reply/At/空白，匹配 [Prefix][Name]，返回参数文本。
/// `names` 中存在互为前缀的别名时（如 `bili` 与 `bili-set`），取最长的命中项。
pub fn match_command(ctx: &Context, names: &[&str]) -> Option<CommandMatch> {
    let prefixes = ctx.prefixes();
    let msg = ctx.as_message()?;

    for (i, segment) in msg.segments().iter().enumerate() {
        let type_ = segment.get_str("type")?;
        let data = segment.get("data")?;

        match type_ {
            "reply" | "at" => {}
            "text" => {
                let raw_text = data.get_str("text").unwrap_or("");
                if raw_text.trim_start().is_empty() {
                    continue;
                }

                // 第一个有效文本节点决定是否为指令
                let (name, rest) = split_command(raw_text, &prefixes, names)?;

                let mut args = rest.to_string();
                for seg in msg.segments().iter().skip(i + 1) {
                    if seg.get_str("type") == Some("text")
                        && let Some(text) = seg.get("data").and_then(|d| d.get_str("text"))
                    {
                        args.push_str(text);
                    }
                }

                return Some(CommandMatch {
                    name: name.to_string(),
                    args,
                });
            }
            _ => return None,
        }
    }

    None
}

/// 纯文本版本的指令切分：返回 (命中的指令名, 去掉分隔空白后的参数)
pub fn split_command<'t, 'n>(
    text: &'t str,
    prefixes: &[String],
    names: &[&'n str],
) -> Option<(&'n str, &'t str)> {
    let trimmed = text.trim_start();

    for prefix in prefixes {
        let Some(body) = trimmed.strip_prefix(prefix.as_str()) else {
            continue;
        };

        let best = names
            .iter()
            .copied()
            .filter(|name| {
                body.strip_prefix(*name)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            })
            .max_by_key(|name| name.len());

        if let Some(name) = best {
            let rest = &body[name.len()..];
            return Some((name, strip_separator(rest)));
        }
    }

    None
}

/// 只去掉指令与参数之间同一行内的空白，保留参数自身的换行结构
fn strip_separator(rest: &str) -> &str {
    let rest = rest.trim_start_matches([' ', '\u{3000}']);
    rest.strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))
        .unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &["bili", "bili-set", "b站", "b站设置"];

    fn prefixes() -> Vec<String> {
        vec!["/".to_string(), "#".to_string()]
    }

    #[test]
    fn prefers_longest_alias() {
        let (name, rest) = split_command("/bili-set quality 1080P", &prefixes(), NAMES).unwrap();
        assert_eq!(name, "bili-set");
        assert_eq!(rest, "quality 1080P");

        let (name, rest) = split_command("#b站设置 danmaku 是", &prefixes(), NAMES).unwrap();
        assert_eq!(name, "b站设置");
        assert_eq!(rest, "danmaku 是");
    }

    #[test]
    fn requires_word_boundary() {
        assert!(split_command("/bilix BV1", &prefixes(), NAMES).is_none());
        assert!(split_command("bili BV1", &prefixes(), NAMES).is_none());

        let (name, rest) = split_command("  /bili", &prefixes(), NAMES).unwrap();
        assert_eq!(name, "bili");
        assert_eq!(rest, "");
    }

    fn onebot_ctx(raw: &str) -> Context {
        let mut bytes = raw.as_bytes().to_vec();
        let event = simd_json::to_owned_value(&mut bytes).unwrap();
        Context {
            event: crate::event::EventType::Onebot(event),
            config: Default::default(),
            adapter: "onebot",
        }
    }

    #[test]
    fn skips_leading_reply_and_at() {
        let ctx = onebot_ctx(
            r#"{"post_type":"message","message_type":"group","group_id":1,"user_id":2,"message_id":3,
                "message":[{"type":"reply","data":{"id":"99"}},{"type":"at","data":{"qq":"10"}},
                {"type":"text","data":{"text":" /bili-set danmaku "}},{"type":"text","data":{"text":"是"}}]}"#,
        );
        let m = match_command(&ctx, NAMES).unwrap();
        assert_eq!(m.name, "bili-set");
        assert_eq!(m.args, "danmaku 是");

        let ctx = onebot_ctx(
            r#"{"post_type":"message","message":[{"type":"image","data":{}},{"type":"text","data":{"text":"/bili BV1"}}]}"#,
        );
        assert!(match_command(&ctx, NAMES).is_none());
    }

    #[test]
    fn keeps_multiline_arguments() {
        let text = "/bili\n# Netscape HTTP Cookie File\n.bilibili.com\tTRUE\t/\tFALSE\t0\tSESSDATA\tx";
        let (_, rest) = split_command(text, &prefixes(), NAMES).unwrap();
        assert!(rest.starts_with("# Netscape"));
        assert!(rest.contains('\t'));
    }
}
