// API 路由定义
// 定义管理接口、插件路由分发和文档端点

use actix_web::{web, Scope};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers::{dispatch, plugin};
use crate::config::PluginsConfig;
use crate::errors::PlugHostError;
use crate::health;

/// API 文档聚合
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Plughost API",
        description = "插件宿主管理接口文档",
        version = "0.1.0"
    ),
    paths(
        health::health_check,
        plugin::list_plugins,
        plugin::reload_plugins,
        plugin::enable_plugin,
        plugin::disable_plugin,
        plugin::set_plugin_position,
        plugin::update_plugin,
    ),
    components(schemas(
        health::HealthResponse,
        crate::plugins::PluginInfo,
        crate::plugins::ReloadSummary,
        plugin::PluginListResponse,
        plugin::StatusResponse,
        plugin::ReloadResponse,
    )),
    tags(
        (name = "Health", description = "健康检查相关接口"),
        (name = "Plugins", description = "插件管理相关接口"),
    )
)]
pub struct ApiDoc;

/// 插件作用域
///
/// 管理接口注册为固定路由，其余请求交给运行时路由表分发。
pub fn plugin_scope(prefix: &str) -> Scope {
    web::scope(prefix)
        .app_data(web::PathConfig::default().error_handler(|err, _req| {
            PlugHostError::validation("path", err.to_string()).into()
        }))
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            PlugHostError::validation("body", err.to_string()).into()
        }))
        .route("", web::get().to(plugin::list_plugins))
        .route("/reload", web::post().to(plugin::reload_plugins))
        .route("/{plugin_id}/enable", web::post().to(plugin::enable_plugin))
        .route("/{plugin_id}/disable", web::post().to(plugin::disable_plugin))
        .route(
            "/{plugin_id}/position/{position}",
            web::post().to(plugin::set_plugin_position),
        )
        .route("/{plugin_id}/update", web::post().to(plugin::update_plugin))
        .default_service(web::to(dispatch::dispatch_plugin_route))
}

/// 配置全部路由
///
/// 关闭插件加载时不注册插件作用域，`/plugins` 下的请求返回 404。
pub fn configure_routes(cfg: &mut web::ServiceConfig, plugins: &PluginsConfig) {
    cfg.route("/", web::get().to(health::index))
        .route("/health", web::get().to(health::health_check));

    if plugins.load_plugins {
        cfg.service(plugin_scope(&plugins.route_prefix));
    }

    cfg.service(SwaggerUi::new("/docs/{_:.*}").url("/openapi.json", ApiDoc::openapi()));
}
