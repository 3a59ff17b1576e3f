// 插件接口规范
// 定义插件契约、元数据和可修改的属性

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use utoipa::ToSchema;

use plughost_common::{PluginId, UNORDERED_POSITION};

use crate::errors::PlugHostError;
use crate::plugins::route_table::RouteGroup;

/// 插件接口
/// 所有插件必须实现此接口
pub trait Plugin: Send + Sync {
    /// 获取插件默认元数据
    ///
    /// 返回值只是代码中的默认值，设置覆盖由管理器在发现阶段合并。
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::default()
    }

    /// 声明插件路由
    ///
    /// 每次实例化只调用一次，只能声明处理函数，不能做 I/O。
    fn register_routes(&self, routes: &mut RouteGroup);
}

/// 插件元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    /// Nerd Font 图标
    pub icon: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub enabled: bool,
    /// 排序位置，-1 表示排在最后
    pub position: i64,
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self {
            name: "Unnamed Plugin".to_string(),
            icon: String::new(),
            description: "No description provided.".to_string(),
            version: "0.1".to_string(),
            author: "Unknown".to_string(),
            enabled: true,
            position: UNORDERED_POSITION,
        }
    }
}

impl PluginMetadata {
    /// 合并设置覆盖
    ///
    /// 只处理可识别的字段，未知键直接忽略；类型不符的值记录警告后跳过。
    pub fn update_from_settings(&mut self, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            let Ok(attribute) = key.parse::<PluginAttribute>() else {
                continue;
            };

            if let Err(e) = self.set_attribute(attribute, value) {
                warn!(attribute = %attribute, error = %e, "忽略类型不符的插件设置");
            }
        }
    }

    /// 设置单个属性，值类型必须匹配
    pub fn set_attribute(
        &mut self,
        attribute: PluginAttribute,
        value: &Value,
    ) -> Result<(), PlugHostError> {
        match attribute {
            PluginAttribute::Name => self.name = expect_string(attribute, value)?,
            PluginAttribute::Icon => self.icon = expect_string(attribute, value)?,
            PluginAttribute::Description => self.description = expect_string(attribute, value)?,
            PluginAttribute::Version => self.version = expect_string(attribute, value)?,
            PluginAttribute::Author => self.author = expect_string(attribute, value)?,
            PluginAttribute::Enabled => {
                self.enabled = value.as_bool().ok_or_else(|| {
                    PlugHostError::validation(attribute.as_str(), "必须是布尔值")
                })?
            }
            PluginAttribute::Position => {
                self.position = value.as_i64().ok_or_else(|| {
                    PlugHostError::validation(attribute.as_str(), "必须是整数")
                })?
            }
        }

        Ok(())
    }
}

fn expect_string(attribute: PluginAttribute, value: &Value) -> Result<String, PlugHostError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PlugHostError::validation(attribute.as_str(), "必须是字符串"))
}

/// 允许通过管理接口修改的插件属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginAttribute {
    Name,
    Icon,
    Description,
    Version,
    Author,
    Enabled,
    Position,
}

impl PluginAttribute {
    pub const ALL: [PluginAttribute; 7] = [
        Self::Name,
        Self::Icon,
        Self::Description,
        Self::Version,
        Self::Author,
        Self::Enabled,
        Self::Position,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Icon => "icon",
            Self::Description => "description",
            Self::Version => "version",
            Self::Author => "author",
            Self::Enabled => "enabled",
            Self::Position => "position",
        }
    }
}

impl fmt::Display for PluginAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginAttribute {
    type Err = PlugHostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attribute| attribute.as_str() == s)
            .ok_or_else(|| PlugHostError::invalid_attribute(s))
    }
}

/// 持久化的插件设置记录
///
/// 每次写入都是完整快照，字段顺序与设置文件一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    pub enabled: bool,
    pub position: i64,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub version: String,
    pub author: String,
}

impl From<&PluginMetadata> for PluginSettings {
    fn from(metadata: &PluginMetadata) -> Self {
        Self {
            enabled: metadata.enabled,
            position: metadata.position,
            name: metadata.name.clone(),
            icon: metadata.icon.clone(),
            description: metadata.description.clone(),
            version: metadata.version.clone(),
            author: metadata.author.clone(),
        }
    }
}

/// 插件信息（管理接口返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PluginInfo {
    pub id: PluginId,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub enabled: bool,
    pub position: i64,
}

impl PluginInfo {
    pub fn new(id: &str, metadata: &PluginMetadata) -> Self {
        Self {
            id: id.to_string(),
            name: metadata.name.clone(),
            icon: metadata.icon.clone(),
            description: metadata.description.clone(),
            version: metadata.version.clone(),
            author: metadata.author.clone(),
            enabled: metadata.enabled,
            position: metadata.position,
        }
    }
}
