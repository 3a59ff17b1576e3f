// 插件管理器
// 负责插件发现、设置合并、启用/禁用时的路由挂载与卸载，以及设置持久化

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use plughost_common::position_sort_key;

use crate::errors::PlugHostError;
use crate::plugins::{
    plugin_interface::{Plugin, PluginAttribute, PluginInfo, PluginMetadata, PluginSettings},
    plugin_registry::PluginSource,
    route_table::{MountHandle, RouteGroup, RouteTable},
    settings_store::SettingsStore,
};

/// 已发现插件的描述符
pub struct PluginDescriptor {
    id: String,
    metadata: PluginMetadata,
    instance: Arc<dyn Plugin>,
    routes: RouteGroup,
    /// 仅在启用且存在路由时有值
    mounted: Option<MountHandle>,
}

impl PluginDescriptor {
    pub fn info(&self) -> PluginInfo {
        PluginInfo::new(&self.id, &self.metadata)
    }

    pub fn instance(&self) -> &Arc<dyn Plugin> {
        &self.instance
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }
}

/// 实例化并通过检查、尚未合并设置的插件
struct Candidate {
    id: String,
    instance: Arc<dyn Plugin>,
    routes: RouteGroup,
}

#[derive(Default)]
struct ManagerState {
    /// 按发现顺序排列
    descriptors: Vec<PluginDescriptor>,
    index: HashMap<String, usize>,
}

impl ManagerState {
    fn descriptor_mut(&mut self, id: &str) -> Result<&mut PluginDescriptor, PlugHostError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| PlugHostError::plugin_not_found(id))?;
        Ok(&mut self.descriptors[position])
    }

    fn descriptor(&self, id: &str) -> Result<&PluginDescriptor, PlugHostError> {
        self.index
            .get(id)
            .map(|position| &self.descriptors[*position])
            .ok_or_else(|| PlugHostError::plugin_not_found(id))
    }
}

/// 重新发现的结果
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ReloadSummary {
    /// 成功发现的插件数
    pub discovered: usize,
    /// 已挂载路由的插件数
    pub mounted: usize,
    /// 被跳过的来源数
    pub skipped: usize,
}

/// 插件管理器
///
/// 所有修改注册表、路由挂载和设置存储的操作都在同一把锁内执行。
pub struct PluginManager {
    sources: Vec<PluginSource>,
    store: Arc<dyn SettingsStore>,
    routes: Arc<RouteTable>,
    /// 插件路由挂载前缀，例如 `/plugins`
    prefix: String,
    state: Mutex<ManagerState>,
}

impl PluginManager {
    /// 创建新的插件管理器，注册表为空，需调用 `reload` 发现插件
    pub fn new(
        sources: Vec<PluginSource>,
        store: Arc<dyn SettingsStore>,
        routes: Arc<RouteTable>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            sources,
            store,
            routes,
            prefix: prefix.into(),
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn route_table(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// 插件路由前缀
    pub fn plugin_prefix(&self, id: &str) -> String {
        format!("{}/{}", self.prefix, id)
    }

    /// 重新发现所有插件
    ///
    /// 单个来源失败只会被跳过；设置存储读取失败时保留原注册表并返回错误。
    pub async fn reload(&self) -> Result<ReloadSummary, PlugHostError> {
        info!(sources = self.sources.len(), "开始发现插件");

        // 实例化和声明路由不持有锁
        let mut summary = ReloadSummary::default();
        let mut candidates = Vec::with_capacity(self.sources.len());
        let mut seen = HashSet::new();
        for source in &self.sources {
            match Self::instantiate(source, &seen) {
                Ok(candidate) => {
                    seen.insert(candidate.id.clone());
                    candidates.push(candidate);
                }
                Err(e) => {
                    warn!(source_id = %source.id(), error = %e, "跳过不符合要求的插件");
                    summary.skipped += 1;
                }
            }
        }

        let mut state = self.state.lock().await;
        let overrides = self.store.load().await?;

        for descriptor in state.descriptors.iter_mut() {
            if let Some(handle) = descriptor.mounted.take() {
                self.routes.unmount(handle).await;
            }
        }
        state.descriptors.clear();
        state.index.clear();

        for candidate in candidates {
            let mut metadata = candidate.instance.metadata();
            if let Some(record) = overrides.get(&candidate.id) {
                metadata.update_from_settings(record);
            }

            let mut descriptor = PluginDescriptor {
                id: candidate.id,
                metadata,
                instance: candidate.instance,
                routes: candidate.routes,
                mounted: None,
            };

            if descriptor.metadata.enabled {
                if let Err(e) = self.switch_routes(&mut descriptor, true).await {
                    warn!(plugin_id = %descriptor.id, error = %e, "挂载插件路由失败，插件保持禁用");
                    descriptor.metadata.enabled = false;
                }
            }
            if descriptor.mounted.is_some() {
                summary.mounted += 1;
            }

            debug!(
                plugin_id = %descriptor.id,
                enabled = descriptor.metadata.enabled,
                position = descriptor.metadata.position,
                "插件已加载"
            );
            let position = state.descriptors.len();
            state.index.insert(descriptor.id.clone(), position);
            state.descriptors.push(descriptor);
        }

        summary.discovered = state.descriptors.len();
        info!(
            discovered = summary.discovered,
            mounted = summary.mounted,
            skipped = summary.skipped,
            "插件发现完成"
        );
        Ok(summary)
    }

    fn instantiate(source: &PluginSource, seen: &HashSet<String>) -> Result<Candidate, PlugHostError> {
        let id = source.id();
        if id.is_empty() {
            return Err(PlugHostError::discovery(id, "插件 ID 不能为空"));
        }
        if id.contains('/') {
            return Err(PlugHostError::discovery(id, "插件 ID 不能包含 /"));
        }
        if seen.contains(id) {
            return Err(PlugHostError::discovery(id, "插件 ID 重复"));
        }

        let instance = source
            .instantiate()
            .map_err(|e| PlugHostError::discovery(id, e.to_string()))?;

        let mut routes = RouteGroup::new();
        instance.register_routes(&mut routes);
        routes
            .validate()
            .map_err(|e| PlugHostError::discovery(id, e))?;

        Ok(Candidate {
            id: id.to_string(),
            instance,
            routes,
        })
    }

    /// 已启用插件，按位置升序，-1 排在最后，同位置保持发现顺序
    pub async fn list(&self) -> Vec<PluginInfo> {
        let state = self.state.lock().await;
        let mut plugins: Vec<PluginInfo> = state
            .descriptors
            .iter()
            .filter(|d| d.metadata.enabled)
            .map(PluginDescriptor::info)
            .collect();
        plugins.sort_by_key(|p| position_sort_key(p.position));
        plugins
    }

    /// 所有已发现插件，按发现顺序
    pub async fn all(&self) -> Vec<PluginInfo> {
        let state = self.state.lock().await;
        state.descriptors.iter().map(PluginDescriptor::info).collect()
    }

    pub async fn get(&self, id: &str) -> Result<PluginInfo, PlugHostError> {
        let state = self.state.lock().await;
        state.descriptor(id).map(PluginDescriptor::info)
    }

    pub async fn enable(&self, id: &str) -> Result<PluginInfo, PlugHostError> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: &str) -> Result<PluginInfo, PlugHostError> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<PluginInfo, PlugHostError> {
        let mut attributes = Map::new();
        attributes.insert(PluginAttribute::Enabled.as_str().to_string(), Value::Bool(enabled));
        self.update_attributes(id, &attributes).await
    }

    /// 设置排序位置，不影响挂载状态
    pub async fn set_position(&self, id: &str, position: i64) -> Result<PluginInfo, PlugHostError> {
        let mut attributes = Map::new();
        attributes.insert(PluginAttribute::Position.as_str().to_string(), Value::from(position));
        self.update_attributes(id, &attributes).await
    }

    /// 更新单个属性
    pub async fn update_attribute(
        &self,
        id: &str,
        attribute: &str,
        value: Value,
    ) -> Result<PluginInfo, PlugHostError> {
        let mut attributes = Map::new();
        attributes.insert(attribute.to_string(), value);
        self.update_attributes(id, &attributes).await
    }

    /// 批量更新属性
    ///
    /// 先检查插件是否存在，再校验全部属性名和值类型，任何一项不合法都不做修改。
    /// 修改 `enabled` 会同步挂载或卸载路由。持久化失败时回滚内存状态和路由。
    pub async fn update_attributes(
        &self,
        id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<PluginInfo, PlugHostError> {
        let mut state = self.state.lock().await;
        let descriptor = state.descriptor_mut(id)?;

        let mut updated = descriptor.metadata.clone();
        for (key, value) in attributes {
            let attribute: PluginAttribute = key.parse()?;
            updated.set_attribute(attribute, value)?;
        }

        if attributes.is_empty() {
            return Ok(descriptor.info());
        }

        let previous = std::mem::replace(&mut descriptor.metadata, updated);
        let enabled = descriptor.metadata.enabled;
        if let Err(e) = self.switch_routes(descriptor, enabled).await {
            descriptor.metadata = previous;
            return Err(e);
        }

        if let Err(e) = self.persist(descriptor).await {
            error!(plugin_id = %id, error = %e, "保存插件设置失败，回滚修改");
            let enabled = previous.enabled;
            descriptor.metadata = previous;
            if let Err(rollback) = self.switch_routes(descriptor, enabled).await {
                error!(plugin_id = %id, error = %rollback, "回滚路由挂载失败");
            }
            return Err(e);
        }

        info!(
            plugin_id = %id,
            attributes = ?attributes.keys().collect::<Vec<_>>(),
            enabled = descriptor.metadata.enabled,
            "插件属性已更新"
        );
        Ok(descriptor.info())
    }

    /// 让挂载状态与 `enabled` 一致，已处于目标状态时不做任何事
    async fn switch_routes(
        &self,
        descriptor: &mut PluginDescriptor,
        enabled: bool,
    ) -> Result<(), PlugHostError> {
        if enabled {
            if descriptor.mounted.is_none() && !descriptor.routes.is_empty() {
                let prefix = self.plugin_prefix(&descriptor.id);
                let handle = self
                    .routes
                    .mount(&descriptor.routes, &prefix, &descriptor.id)
                    .await?;
                descriptor.mounted = Some(handle);
            }
        } else if let Some(handle) = descriptor.mounted.take() {
            self.routes.unmount(handle).await;
        }
        Ok(())
    }

    async fn persist(&self, descriptor: &PluginDescriptor) -> Result<(), PlugHostError> {
        self.store
            .save(&descriptor.id, &PluginSettings::from(&descriptor.metadata))
            .await
    }
}
