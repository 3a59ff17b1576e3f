// 插件来源注册表
// 静态列出可发现的插件，替代运行时扫描目录

use std::sync::Arc;

use crate::errors::PlugHostError;
use crate::plugins::plugin_interface::Plugin;

/// 插件工厂，每次发现都会创建新实例
pub type PluginFactory = Box<dyn Fn() -> Result<Arc<dyn Plugin>, PlugHostError> + Send + Sync>;

/// 插件来源
pub struct PluginSource {
    id: String,
    factory: PluginFactory,
}

impl PluginSource {
    /// 使用可能失败的工厂创建来源
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Plugin>, PlugHostError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            factory: Box::new(factory),
        }
    }

    /// 使用不会失败的构造函数创建来源
    pub fn of<P, F>(id: impl Into<String>, build: F) -> Self
    where
        P: Plugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::new(id, move || Ok(Arc::new(build()) as Arc<dyn Plugin>))
    }

    /// 插件 ID，对应来源目录名
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instantiate(&self) -> Result<Arc<dyn Plugin>, PlugHostError> {
        (self.factory)()
    }
}

impl std::fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSource").field("id", &self.id).finish()
    }
}
