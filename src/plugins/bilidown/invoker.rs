use super::cookie::Cookie;
use super::error::{BiliError, BiliResult};
use super::naming;
use super::store::{ConfigDocument, Quality, parse_bool};
use crate::{debug, info, warn};
use async_trait::async_trait;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

/// 外部进程的运行结果
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// 被信号终止时为 None
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// 进程执行能力，测试中可替换为假实现
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput>;
}

/// 基于 tokio::process 的真实实现
pub struct TokioRunner;

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<ProcessOutput> {
        let resolved = which::which(program)
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("{program}: {e}")))?;

        let output = tokio::process::Command::new(resolved)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn pages_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(?:-\d+)?(?:,\d+(?:-\d+)?)*$").unwrap())
}

/// 单次下载的临时选项，未设置的字段使用配置中的默认值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadOverlay {
    pub quality: Option<Quality>,
    pub danmaku: Option<bool>,
    pub subtitle: Option<bool>,
    pub pages: Option<String>,
}

impl DownloadOverlay {
    /// 应用一个 key=value 选项；不认识的 key 返回 Ok(false)
    pub fn apply(&mut self, key: &str, value: &str) -> BiliResult<bool> {
        let value = value.trim();
        match key.to_lowercase().as_str() {
            "quality" | "q" | "清晰度" => {
                self.quality = Some(value.parse().map_err(|_| BiliError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    expected: Quality::expected(),
                })?);
            }
            "danmaku" | "弹幕" => self.danmaku = Some(parse_bool(key, value)?),
            "subtitle" | "字幕" => self.subtitle = Some(parse_bool(key, value)?),
            "page" | "p" | "分p" => {
                let pages = value.replace('，', ",").replace(' ', "");
                if pages.eq_ignore_ascii_case("all") {
                    self.pages = Some("ALL".to_string());
                } else if pages_regex().is_match(&pages) {
                    self.pages = Some(pages);
                } else {
                    return Err(BiliError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "可选 ALL、N、N-M 或 N,M".to_string(),
                    });
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// 下载成功的结果
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub work_dir: PathBuf,
    pub tail: String,
}

/// 组装 BBDown 参数，顺序固定
pub fn build_args(
    target: &str,
    overlay: &DownloadOverlay,
    doc: &ConfigDocument,
    work_dir: &Path,
) -> Vec<String> {
    let defaults = &doc.default_options;
    let mut args = vec![target.to_string()];

    if !doc.cookie.is_empty() {
        args.push("-c".into());
        args.push(doc.cookie.clone());
    }

    let quality = overlay.quality.unwrap_or(defaults.quality);
    if !quality.is_auto() {
        args.push("--dfn-priority".into());
        args.push(quality.as_str().into());
    }

    if overlay.danmaku.unwrap_or(defaults.download_danmaku) {
        args.push("--download-danmaku".into());
    }

    if !overlay.subtitle.unwrap_or(defaults.download_subtitle) {
        args.push("--skip-subtitle".into());
    }

    if let Some(pages) = overlay.pages.as_deref()
        && pages != "ALL"
    {
        args.push("-p".into());
        args.push(pages.into());
    }

    let naming = &doc.naming;
    args.push("--file-pattern".into());
    args.push(naming::resolve_pattern(
        &naming.single_video_pattern,
        false,
        doc.classify_by_owner,
    ));
    args.push("--multi-file-pattern".into());
    args.push(naming::resolve_pattern(
        &naming.multi_video_pattern,
        true,
        doc.classify_by_owner,
    ));

    args.push("--work-dir".into());
    args.push(work_dir.to_string_lossy().into_owned());
    args
}

/// 下载调用器：合并选项、执行 BBDown、整理输出
pub struct Invoker {
    runner: Arc<dyn ProcessRunner>,
    tail_lines: usize,
}

impl Invoker {
    pub fn new(runner: Arc<dyn ProcessRunner>, tail_lines: usize) -> Self {
        Self {
            runner,
            tail_lines: tail_lines.max(1),
        }
    }

    pub async fn invoke(
        &self,
        target: &str,
        overlay: &DownloadOverlay,
        doc: &ConfigDocument,
    ) -> BiliResult<DownloadResult> {
        let work_dir = std::path::absolute(&doc.download_path).map_err(|e| {
            BiliError::DownloadFailed {
                status: "下载目录无效".to_string(),
                tail: e.to_string(),
            }
        })?;
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| BiliError::DownloadFailed {
                status: "无法创建下载目录".to_string(),
                tail: format!("{}: {}", work_dir.display(), e),
            })?;

        let args = build_args(target, overlay, doc, &work_dir);
        let cookie = Cookie::parse(&doc.cookie).ok();
        info!(
            target: "BiliDown",
            "执行: {}",
            mask_command_line(&doc.bbdown_path, &args)
        );

        let output = match self.runner.run(&doc.bbdown_path, &args).await {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(target: "BiliDown", "找不到 BBDown: {} ({})", doc.bbdown_path, e);
                return Err(BiliError::ExecutableNotFound(doc.bbdown_path.clone()));
            }
            Err(e) => {
                return Err(BiliError::DownloadFailed {
                    status: "启动失败".to_string(),
                    tail: e.to_string(),
                });
            }
        };

        let mut tail = tail_of(&output, self.tail_lines);
        if let Some(cookie) = &cookie {
            tail = cookie.redact(&tail);
        }

        if !output.success() {
            let status = match output.code {
                Some(code) => format!("退出码 {code}"),
                None => "进程被终止".to_string(),
            };
            warn!(target: "BiliDown", "BBDown 执行失败 ({})", status);
            return Err(BiliError::DownloadFailed { status, tail });
        }

        debug!(target: "BiliDown", "BBDown 输出尾部:\n{}", tail);
        Ok(DownloadResult { work_dir, tail })
    }
}

/// `-c` 之后的 Cookie 替换为 ***
fn mask_command_line(program: &str, args: &[String]) -> String {
    let mut parts = vec![program.to_string()];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "-c";
        if arg.contains(char::is_whitespace) {
            parts.push(format!("\"{arg}\""));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}

/// 取 stdout + stderr 中最后几行非空输出
fn tail_of(output: &ProcessOutput, n: usize) -> String {
    let lines: Vec<&str> = output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ConfigDocument {
        ConfigDocument {
            cookie: "SESSDATA=secretvalue; bili_jct=abc".to_string(),
            ..ConfigDocument::default()
        }
    }

    #[test]
    fn argument_order_with_defaults() {
        let args = build_args("BV1qt4y1X7TW", &DownloadOverlay::default(), &doc(), Path::new("/dl"));
        assert_eq!(
            args,
            vec![
                "BV1qt4y1X7TW",
                "-c",
                "SESSDATA=secretvalue; bili_jct=abc",
                "--file-pattern",
                "<ownerName>/<videoTitle>[<dfn>]",
                "--multi-file-pattern",
                "<ownerName>/<videoTitle>/[P<pageNumberWithZero>]<pageTitle>[<dfn>]",
                "--work-dir",
                "/dl",
            ]
        );
    }

    #[test]
    fn overlay_wins_over_defaults() {
        let mut overlay = DownloadOverlay::default();
        assert!(overlay.apply("q", "4k").unwrap());
        assert!(overlay.apply("弹幕", "是").unwrap());
        assert!(overlay.apply("subtitle", "false").unwrap());
        assert!(overlay.apply("分P", "1-3,5").unwrap());
        assert!(!overlay.apply("unknown", "x").unwrap());

        let mut doc = doc();
        doc.cookie.clear();
        let args = build_args("BV1qt4y1X7TW", &overlay, &doc, Path::new("/dl"));
        assert_eq!(
            &args[..8],
            &[
                "BV1qt4y1X7TW",
                "--dfn-priority",
                "4K",
                "--download-danmaku",
                "--skip-subtitle",
                "-p",
                "1-3,5",
                "--file-pattern",
            ]
        );
    }

    #[test]
    fn all_pages_is_not_passed() {
        let mut overlay = DownloadOverlay::default();
        overlay.apply("page", "all").unwrap();
        let args = build_args("BV1qt4y1X7TW", &overlay, &doc(), Path::new("/dl"));
        assert!(!args.iter().any(|a| a == "-p"));
    }

    #[test]
    fn invalid_overlay_values_are_rejected() {
        let mut overlay = DownloadOverlay::default();
        assert!(matches!(
            overlay.apply("quality", "9999P"),
            Err(BiliError::InvalidValue { .. })
        ));
        assert!(matches!(
            overlay.apply("p", "first"),
            Err(BiliError::InvalidValue { .. })
        ));
        assert_eq!(overlay, DownloadOverlay::default());
    }

    #[test]
    fn command_line_masks_cookie() {
        let args = build_args("BV1qt4y1X7TW", &DownloadOverlay::default(), &doc(), Path::new("/dl"));
        let line = mask_command_line("BBDown", &args);
        assert!(line.starts_with("BBDown BV1qt4y1X7TW -c ***"));
        assert!(!line.contains("secretvalue"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let output = ProcessOutput {
            code: Some(1),
            stdout: "a\nb\n\nc\n".to_string(),
            stderr: "d\n".to_string(),
        };
        assert_eq!(tail_of(&output, 2), "c\nd");
        assert_eq!(tail_of(&output, 10), "a\nb\nc\nd");
    }
}
