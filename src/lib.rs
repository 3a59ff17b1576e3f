// Plughost Library
// 导出主要模块供测试使用

pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod logging;
pub mod plugins;

pub use health::*;
