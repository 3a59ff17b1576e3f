// API 处理器模块

pub mod dispatch;
pub mod plugin;

pub use dispatch::*;
pub use plugin::*;
