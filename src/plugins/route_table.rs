// 插件路由表
// actix 的路由树在 worker 启动时固定，插件路由由这里在运行时挂载、卸载和匹配

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use actix_web::{http::Method, web, HttpRequest, HttpResponse};
use futures::future::LocalBoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::PlugHostError;

/// 路由处理函数返回的 future
pub type HandlerFuture = LocalBoxFuture<'static, Result<HttpResponse, PlugHostError>>;

/// 路由处理函数
pub type RouteHandler = Arc<dyn Fn(PluginRequest) -> HandlerFuture + Send + Sync>;

/// 传递给插件处理函数的请求
pub struct PluginRequest {
    pub http: HttpRequest,
    pub payload: web::Payload,
    params: HashMap<String, String>,
}

impl PluginRequest {
    pub fn new(http: HttpRequest, payload: web::Payload, params: HashMap<String, String>) -> Self {
        Self {
            http,
            payload,
            params,
        }
    }

    /// 获取路径参数
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// 获取必需的路径参数
    pub fn require_param(&self, name: &str) -> Result<&str, PlugHostError> {
        self.param(name)
            .ok_or_else(|| PlugHostError::validation(name, "缺少路径参数"))
    }
}

/// 单条路由声明
#[derive(Clone)]
pub struct RouteDefinition {
    pub method: Method,
    pub path: String,
    pub handler: RouteHandler,
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// 插件路由组
///
/// 插件在 `register_routes` 中向路由组声明处理函数，整组作为一个单元挂载和卸载。
#[derive(Debug, Clone, Default)]
pub struct RouteGroup {
    routes: Vec<RouteDefinition>,
}

impl RouteGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明路由
    pub fn route<F, Fut>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, PlugHostError>> + 'static,
    {
        let handler: RouteHandler =
            Arc::new(move |req: PluginRequest| -> HandlerFuture { Box::pin(handler(req)) });

        self.routes.push(RouteDefinition {
            method,
            path: path.to_string(),
            handler,
        });
        self
    }

    pub fn get<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, PlugHostError>> + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(PluginRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, PlugHostError>> + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 检查所有路由路径格式
    pub fn validate(&self) -> Result<(), String> {
        for route in &self.routes {
            PathPattern::parse(&route.path)
                .map_err(|e| format!("{} {}: {}", route.method, route.path, e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// 路径模板，例如 `/commands/status/{task_id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(path: &str) -> Result<Self, String> {
        if !path.starts_with('/') {
            return Err("路径必须以 / 开头".to_string());
        }

        let mut segments = Vec::new();
        for raw in path.split('/').filter(|s| !s.is_empty()) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    if name.is_empty() || name.contains(['{', '}']) {
                        return Err(format!("无效的路径参数: {}", raw));
                    }
                    if segments.contains(&Segment::Param(name.to_string())) {
                        return Err(format!("重复的路径参数: {}", name));
                    }
                    Segment::Param(name.to_string())
                }
                None if raw.contains(['{', '}']) => {
                    return Err(format!("无效的路径段: {}", raw));
                }
                None => Segment::Static(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// 拼接前缀和路由路径
    pub fn join(prefix: &PathPattern, route: &PathPattern) -> Self {
        let mut segments = prefix.segments.clone();
        segments.extend(route.segments.iter().cloned());
        Self { segments }
    }

    fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    /// 参数名不影响冲突判断
    fn same_shape(&self, other: &PathPattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Static(a), Segment::Static(b)) => a == b,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    _ => false,
                })
    }

    fn matches(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Static(expected) if expected == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

/// 挂载句柄
///
/// 精确标识一次 `mount` 新增的路由；不可克隆，卸载时按值消费。
#[derive(Debug)]
pub struct MountHandle {
    mount_id: u64,
    tag: String,
    slots: Vec<usize>,
}

impl MountHandle {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn route_count(&self) -> usize {
        self.slots.len()
    }
}

/// 路由匹配结果
pub enum RouteMatch {
    Found {
        handler: RouteHandler,
        params: HashMap<String, String>,
    },
    MethodNotAllowed,
    NotFound,
}

struct MountedRoute {
    mount_id: u64,
    seq: u64,
    method: Method,
    pattern: PathPattern,
    handler: RouteHandler,
}

#[derive(Default)]
struct TableState {
    /// 路由条目 arena，卸载后留空并复用
    slots: Vec<Option<MountedRoute>>,
    free: Vec<usize>,
    /// tag -> 当前有效的 mount_id
    by_tag: HashMap<String, Vec<u64>>,
    next_mount_id: u64,
    next_seq: u64,
}

impl TableState {
    fn insert(&mut self, route: MountedRoute) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(route);
                slot
            }
            None => {
                self.slots.push(Some(route));
                self.slots.len() - 1
            }
        }
    }

    fn live(&self) -> impl Iterator<Item = &MountedRoute> {
        self.slots.iter().flatten()
    }
}

/// 运行时路由表
#[derive(Default)]
pub struct RouteTable {
    state: RwLock<TableState>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `prefix` 下挂载整个路由组
    ///
    /// 与已挂载路由的方法和路径模板重复时返回 Conflict，不会挂载任何路由。
    pub async fn mount(
        &self,
        group: &RouteGroup,
        prefix: &str,
        tag: &str,
    ) -> Result<MountHandle, PlugHostError> {
        let prefix_pattern = PathPattern::parse(prefix)
            .map_err(|e| PlugHostError::validation("prefix", e))?;

        let mut prepared = Vec::with_capacity(group.len());
        for route in group.routes() {
            let pattern = PathPattern::parse(&route.path)
                .map_err(|e| PlugHostError::validation("path", e))?;
            prepared.push((
                route.method.clone(),
                PathPattern::join(&prefix_pattern, &pattern),
                route.handler.clone(),
            ));
        }

        let mut state = self.state.write().await;

        for (i, (method, pattern, _)) in prepared.iter().enumerate() {
            let clashes_live = state
                .live()
                .any(|r| &r.method == method && r.pattern.same_shape(pattern));
            let clashes_group = prepared[..i]
                .iter()
                .any(|(m, p, _)| m == method && p.same_shape(pattern));
            if clashes_live || clashes_group {
                return Err(PlugHostError::conflict(format!(
                    "路由已存在: {} {}{}",
                    method,
                    prefix,
                    group.routes()[i].path
                )));
            }
        }

        let mount_id = state.next_mount_id;
        state.next_mount_id += 1;

        let mut slots = Vec::with_capacity(prepared.len());
        for (method, pattern, handler) in prepared {
            let seq = state.next_seq;
            state.next_seq += 1;
            slots.push(state.insert(MountedRoute {
                mount_id,
                seq,
                method,
                pattern,
                handler,
            }));
        }

        state
            .by_tag
            .entry(tag.to_string())
            .or_default()
            .push(mount_id);

        info!(tag = %tag, prefix = %prefix, routes = slots.len(), "挂载路由组");

        Ok(MountHandle {
            mount_id,
            tag: tag.to_string(),
            slots,
        })
    }

    /// 卸载句柄对应的路由，返回移除的条目数
    pub async fn unmount(&self, handle: MountHandle) -> usize {
        let mut state = self.state.write().await;
        let mut removed = 0;

        for slot in &handle.slots {
            let owned = state
                .slots
                .get(*slot)
                .and_then(Option::as_ref)
                .is_some_and(|r| r.mount_id == handle.mount_id);
            if owned {
                state.slots[*slot] = None;
                state.free.push(*slot);
                removed += 1;
            }
        }

        if let Some(ids) = state.by_tag.get_mut(&handle.tag) {
            ids.retain(|id| *id != handle.mount_id);
            if ids.is_empty() {
                state.by_tag.remove(&handle.tag);
            }
        }

        info!(tag = %handle.tag, routes = removed, "卸载路由组");
        removed
    }

    /// 按方法和路径查找处理函数
    ///
    /// 多个模板同时匹配时优先参数少的，其次是先挂载的。
    pub async fn resolve(&self, method: &Method, path: &str) -> RouteMatch {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let state = self.state.read().await;

        let mut path_matched = false;
        let mut best: Option<(&MountedRoute, HashMap<String, String>)> = None;

        for route in state.live() {
            let Some(params) = route.pattern.matches(&parts) else {
                continue;
            };
            path_matched = true;
            if &route.method != method {
                continue;
            }

            let better = match &best {
                None => true,
                Some((current, _)) => {
                    (route.pattern.param_count(), route.seq)
                        < (current.pattern.param_count(), current.seq)
                }
            };
            if better {
                best = Some((route, params));
            }
        }

        match best {
            Some((route, params)) => RouteMatch::Found {
                handler: route.handler.clone(),
                params,
            },
            None if path_matched => {
                debug!(method = %method, path = %path, "路径存在但方法不匹配");
                RouteMatch::MethodNotAllowed
            }
            None => RouteMatch::NotFound,
        }
    }

    /// 某个 tag 当前有效的挂载次数
    pub async fn handles_for(&self, tag: &str) -> usize {
        self.state
            .read()
            .await
            .by_tag
            .get(tag)
            .map_or(0, Vec::len)
    }

    /// 当前挂载的路由条目总数
    pub async fn route_count(&self) -> usize {
        self.state.read().await.live().count()
    }
}
