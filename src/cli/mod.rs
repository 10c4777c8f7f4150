//! 命令行前端
//!
//! 终端凭据输入与输出渲染，由 `main.rs` 使用

pub mod prompt;
pub mod render;

pub use prompt::TerminalPrompt;
pub use render::{OutputFormat, Renderer};
