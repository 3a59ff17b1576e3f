// 插件管理 API 处理器

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::plugins::{PluginInfo, PluginManager, ReloadSummary};

/// 插件列表查询参数
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPluginsQuery {
    /// 只返回已启用插件，并按位置排序
    pub enabled_only: Option<bool>,
}

/// 插件列表响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PluginListResponse {
    pub plugins: Vec<PluginInfo>,
}

/// 操作结果
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// 重新发现结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    pub status: String,
    pub summary: ReloadSummary,
}

/// 列出插件
#[utoipa::path(
    get,
    path = "/plugins",
    params(ListPluginsQuery),
    responses(
        (status = 200, description = "插件列表", body = PluginListResponse)
    ),
    tag = "Plugins"
)]
pub async fn list_plugins(
    manager: web::Data<PluginManager>,
    query: web::Query<ListPluginsQuery>,
) -> ActixResult<HttpResponse> {
    let plugins = if query.enabled_only.unwrap_or(false) {
        manager.list().await
    } else {
        manager.all().await
    };

    Ok(HttpResponse::Ok().json(PluginListResponse { plugins }))
}

/// 重新发现插件
#[utoipa::path(
    post,
    path = "/plugins/reload",
    responses(
        (status = 200, description = "重新发现完成", body = ReloadResponse),
        (status = 500, description = "设置存储读取失败")
    ),
    tag = "Plugins"
)]
pub async fn reload_plugins(manager: web::Data<PluginManager>) -> ActixResult<HttpResponse> {
    let summary = manager.reload().await?;

    Ok(HttpResponse::Ok().json(ReloadResponse {
        status: format!("Discovered {} plugins.", summary.discovered),
        summary,
    }))
}

/// 启用插件
#[utoipa::path(
    post,
    path = "/plugins/{plugin_id}/enable",
    params(("plugin_id" = String, Path, description = "插件 ID")),
    responses(
        (status = 200, description = "插件已启用", body = StatusResponse),
        (status = 404, description = "插件不存在"),
        (status = 500, description = "设置保存失败")
    ),
    tag = "Plugins"
)]
pub async fn enable_plugin(
    manager: web::Data<PluginManager>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let plugin_id = path.into_inner();
    manager.enable(&plugin_id).await?;

    info!(plugin_id = %plugin_id, "插件已启用");
    Ok(HttpResponse::Ok().json(StatusResponse::new(format!(
        "Plugin '{}' has been enabled.",
        plugin_id
    ))))
}

/// 禁用插件
#[utoipa::path(
    post,
    path = "/plugins/{plugin_id}/disable",
    params(("plugin_id" = String, Path, description = "插件 ID")),
    responses(
        (status = 200, description = "插件已禁用", body = StatusResponse),
        (status = 404, description = "插件不存在"),
        (status = 500, description = "设置保存失败")
    ),
    tag = "Plugins"
)]
pub async fn disable_plugin(
    manager: web::Data<PluginManager>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let plugin_id = path.into_inner();
    manager.disable(&plugin_id).await?;

    info!(plugin_id = %plugin_id, "插件已禁用");
    Ok(HttpResponse::Ok().json(StatusResponse::new(format!(
        "Plugin '{}' has been disabled.",
        plugin_id
    ))))
}

/// 设置插件位置
#[utoipa::path(
    post,
    path = "/plugins/{plugin_id}/position/{position}",
    params(
        ("plugin_id" = String, Path, description = "插件 ID"),
        ("position" = i64, Path, description = "排序位置，-1 表示排在最后")
    ),
    responses(
        (status = 200, description = "位置已更新", body = StatusResponse),
        (status = 400, description = "位置不是整数"),
        (status = 404, description = "插件不存在")
    ),
    tag = "Plugins"
)]
pub async fn set_plugin_position(
    manager: web::Data<PluginManager>,
    path: web::Path<(String, i64)>,
) -> ActixResult<HttpResponse> {
    let (plugin_id, position) = path.into_inner();
    manager.set_position(&plugin_id, position).await?;

    Ok(HttpResponse::Ok().json(StatusResponse::new(format!(
        "Plugin '{}' position set to {}.",
        plugin_id, position
    ))))
}

/// 更新插件属性
///
/// 请求体中的所有属性先整体校验，任何一个不在允许列表中都不会修改插件。
#[utoipa::path(
    post,
    path = "/plugins/{plugin_id}/update",
    params(("plugin_id" = String, Path, description = "插件 ID")),
    responses(
        (status = 200, description = "插件已更新", body = StatusResponse),
        (status = 400, description = "属性不允许修改或值类型错误"),
        (status = 404, description = "插件不存在")
    ),
    tag = "Plugins"
)]
pub async fn update_plugin(
    manager: web::Data<PluginManager>,
    path: web::Path<String>,
    body: web::Json<Map<String, Value>>,
) -> ActixResult<HttpResponse> {
    let plugin_id = path.into_inner();
    manager.update_attributes(&plugin_id, &body).await?;

    Ok(HttpResponse::Ok().json(StatusResponse::new(format!(
        "Plugin '{}' updated successfully.",
        plugin_id
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::configure_routes;
    use crate::config::PluginsConfig;
    use crate::plugins::{builtin_sources, JsonFileSettingsStore, RouteTable};
    use actix_web::{
        http::StatusCode,
        test::{call_service, init_service, read_body_json, TestRequest},
        App,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn plugins_config(dir: &TempDir) -> PluginsConfig {
        let mut config = PluginsConfig::default();
        config.settings_file = dir
            .path()
            .join("plugins_settings.json")
            .to_string_lossy()
            .into_owned();
        config.log_viewer.allowed_dirs = vec![dir.path().to_string_lossy().into_owned()];
        config
    }

    async fn manager_for(config: &PluginsConfig) -> web::Data<PluginManager> {
        let manager = PluginManager::new(
            builtin_sources(config),
            Arc::new(JsonFileSettingsStore::new(config.settings_path())),
            Arc::new(RouteTable::new()),
            config.route_prefix.clone(),
        );
        manager.reload().await.unwrap();
        web::Data::new(manager)
    }

    macro_rules! test_app {
        ($config:expr, $manager:expr) => {{
            let config = $config.clone();
            init_service(
                App::new()
                    .app_data($manager.clone())
                    .configure(move |cfg| configure_routes(cfg, &config)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn test_list_all_plugins() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        let resp = call_service(&app, TestRequest::get().uri("/plugins").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: PluginListResponse = read_body_json(resp).await;
        let ids: Vec<_> = body.plugins.iter().map(|p| p.id.as_str()).collect();
        for expected in [
            "system_monitor",
            "log_viewer",
            "service_manager",
            "command_executor",
            "datetime_display",
            "sample_plugin",
        ] {
            assert!(ids.contains(&expected), "缺少插件 {}", expected);
        }
    }

    #[actix_web::test]
    async fn test_enable_disable_and_plugin_routes() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/sample_plugin/info").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let info: Value = read_body_json(resp).await;
        assert_eq!(info["name"], "Sample Plugin");

        let resp = call_service(
            &app,
            TestRequest::post().uri("/plugins/sample_plugin/disable").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let status: StatusResponse = read_body_json(resp).await;
        assert_eq!(status.status, "Plugin 'sample_plugin' has been disabled.");

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/sample_plugin/info").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = call_service(
            &app,
            TestRequest::post().uri("/plugins/sample_plugin/enable").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/sample_plugin/info").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_unknown_plugin_returns_404() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        for uri in [
            "/plugins/nope/enable",
            "/plugins/nope/disable",
            "/plugins/nope/position/3",
        ] {
            let resp = call_service(&app, TestRequest::post().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/plugins/nope/update")
                .set_json(serde_json::json!({ "icon": "X" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_update_rejects_unknown_attribute_without_changes() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/plugins/log_viewer/update")
                .set_json(serde_json::json!({ "name": "Renamed", "color": "red" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let plugin = manager.get("log_viewer").await.unwrap();
        assert_eq!(plugin.name, "Log Viewer");
        assert!(!config.settings_path().exists());
    }

    #[actix_web::test]
    async fn test_update_and_position() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/plugins/log_viewer/update")
                .set_json(serde_json::json!({ "icon": "X", "author": "ops" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = call_service(
            &app,
            TestRequest::post().uri("/plugins/log_viewer/position/9").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = call_service(
            &app,
            TestRequest::post().uri("/plugins/log_viewer/position/abc").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let plugin = manager.get("log_viewer").await.unwrap();
        assert_eq!(plugin.icon, "X");
        assert_eq!(plugin.author, "ops");
        assert_eq!(plugin.position, 9);
    }

    #[actix_web::test]
    async fn test_enabled_only_listing_is_sorted() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        manager.disable("log_viewer").await.unwrap();
        let app = test_app!(config, manager);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins?enabled_only=true").to_request(),
        )
        .await;
        let body: PluginListResponse = read_body_json(resp).await;
        let ids: Vec<_> = body.plugins.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "system_monitor",
                "service_manager",
                "command_executor",
                "datetime_display",
                "sample_plugin"
            ]
        );
    }

    #[actix_web::test]
    async fn test_plugin_route_errors() {
        let dir = TempDir::new().unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        let resp = call_service(
            &app,
            TestRequest::post().uri("/plugins/sample_plugin/info").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/sample_plugin/missing").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/plugins/service_manager/services/ssh/start")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/plugins/service_manager/services/nginx/explode")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call_service(
            &app,
            TestRequest::post()
                .uri("/plugins/command_executor/commands/rm_everything")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/plugins/command_executor/commands/status/unknown")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_builtin_plugin_endpoints() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.log"), "hello\n").unwrap();
        let config = plugins_config(&dir);
        let manager = manager_for(&config).await;
        let app = test_app!(config, manager);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/log_viewer/logs").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        let files = body["log_files"].as_array().unwrap();
        assert!(files.iter().any(|f| f.as_str().unwrap().ends_with("app.log")));

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/command_executor/commands").to_request(),
        )
        .await;
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["commands"].as_array().unwrap().len(), 3);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/plugins/datetime_display/current_datetime")
                .to_request(),
        )
        .await;
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["current_datetime"].as_str().unwrap().len(), 19);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/plugins/system_monitor/metrics").to_request(),
        )
        .await;
        let body: Value = read_body_json(resp).await;
        assert!(body.get("cpu_percent").is_some());
    }

    #[actix_web::test]
    async fn test_plugins_scope_absent_when_loading_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = plugins_config(&dir);
        config.load_plugins = false;
        let manager = web::Data::new(PluginManager::new(
            Vec::new(),
            Arc::new(JsonFileSettingsStore::new(config.settings_path())),
            Arc::new(RouteTable::new()),
            config.route_prefix.clone(),
        ));
        let app = test_app!(config, manager);

        let resp = call_service(&app, TestRequest::get().uri("/plugins").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = call_service(&app, TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
