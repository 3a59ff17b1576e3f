// 插件系统模块
// 插件契约、运行时路由表、设置存储和插件管理器

pub mod builtin;
pub mod plugin_interface;
pub mod plugin_manager;
pub mod plugin_registry;
pub mod route_table;
pub mod settings_store;

#[cfg(test)]
mod tests;

pub use builtin::builtin_sources;
pub use plugin_interface::*;
pub use plugin_manager::*;
pub use plugin_registry::*;
pub use route_table::*;
pub use settings_store::*;
