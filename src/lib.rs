//! Ayjx 运行时 + B 站下载插件 (BBDown)
//!
//! 适配器把 OneBot 帧包装成 [`event::Context`] 交给插件流水线，
//! `bilidown` 插件负责指令解析、配置存储与调用外部下载器。

pub mod adapters;
pub mod command;
pub mod config;
pub mod event;
pub mod log;
pub mod message;
pub mod plugins;

pub use plugins::bilidown;
