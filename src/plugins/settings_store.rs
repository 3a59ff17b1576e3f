// 插件设置存储
// 按插件 ID 持久化元数据覆盖

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::PlugHostError;
use crate::plugins::plugin_interface::PluginSettings;

/// 原始覆盖记录，键为字段名
pub type SettingsOverrides = Map<String, Value>;

/// 设置存储接口
///
/// 存储自身不加锁，并发写入由插件管理器串行化。
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// 读取全部记录；后端资源不存在时返回空映射
    async fn load(&self) -> Result<HashMap<String, SettingsOverrides>, PlugHostError>;

    /// 读-改-写：替换或创建 `plugin_id` 对应的记录
    async fn save(&self, plugin_id: &str, settings: &PluginSettings) -> Result<(), PlugHostError>;
}

/// JSON 文件设置存储
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, PlugHostError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(PlugHostError::storage(format!(
                    "读取设置文件 {} 失败: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(PlugHostError::storage(format!(
                "设置文件 {} 顶层必须是对象",
                self.path.display()
            ))),
            Err(e) => Err(PlugHostError::storage(format!(
                "解析设置文件 {} 失败: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn load(&self) -> Result<HashMap<String, SettingsOverrides>, PlugHostError> {
        let document = self.read_document().await?;

        // 非对象的条目没有可用字段，按缺省处理
        let records = document
            .into_iter()
            .filter_map(|(id, value)| match value {
                Value::Object(record) => Some((id, record)),
                _ => None,
            })
            .collect();

        Ok(records)
    }

    async fn save(&self, plugin_id: &str, settings: &PluginSettings) -> Result<(), PlugHostError> {
        let mut document = self.read_document().await?;

        let snapshot = match serde_json::to_value(settings)? {
            Value::Object(fields) => fields,
            _ => return Err(PlugHostError::internal("插件设置序列化结果不是对象")),
        };

        // 保留记录中其他键，只覆盖已知字段
        let entry = document
            .entry(plugin_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(record) = entry {
            record.extend(snapshot);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PlugHostError::storage(format!("创建设置目录 {} 失败: {}", parent.display(), e))
            })?;
        }

        let content = serde_json::to_string_pretty(&Value::Object(document))?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            PlugHostError::storage(format!("写入设置文件 {} 失败: {}", self.path.display(), e))
        })?;

        debug!(plugin_id = %plugin_id, path = %self.path.display(), "插件设置已保存");
        Ok(())
    }
}
