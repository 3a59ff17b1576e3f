// API 模块
// 插件管理接口和插件路由分发

pub mod handlers;
pub mod routes;

pub use routes::*;
