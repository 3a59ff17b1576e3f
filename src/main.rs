use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use plughost::api::configure_routes;
use plughost::config::ConfigLoader;
use plughost::errors::ErrorHandlerMiddleware;
use plughost::logging::LoggingSetup;
use plughost::plugins::{builtin_sources, JsonFileSettingsStore, PluginManager, RouteTable};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // 初始化配置
    let config = ConfigLoader::init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    // 初始化结构化日志系统，guard 需要持有到进程退出
    let _log_guard = LoggingSetup::init(&config.logging)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    tracing::info!("🚀 启动 Plughost v{}", config.environment.version);
    ConfigLoader::print_summary(config);

    // 插件管理器
    let plugins_config = config.plugins.clone();
    let manager = PluginManager::new(
        builtin_sources(&plugins_config),
        Arc::new(JsonFileSettingsStore::new(plugins_config.settings_path())),
        Arc::new(RouteTable::new()),
        plugins_config.route_prefix.clone(),
    );

    if plugins_config.load_plugins {
        let summary = manager
            .reload()
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        tracing::info!(
            discovered = summary.discovered,
            mounted = summary.mounted,
            skipped = summary.skipped,
            "插件加载完成"
        );
    } else {
        tracing::info!("LOAD_PLUGINS 已关闭，跳过插件加载");
    }

    let manager = web::Data::new(manager);

    tracing::info!("🌐 服务器启动地址: http://{}:{}", config.server.host, config.server.port);
    tracing::info!("📋 健康检查: http://{}:{}/health", config.server.host, config.server.port);
    tracing::info!("📖 接口文档: http://{}:{}/docs/", config.server.host, config.server.port);

    // 启动 HTTP 服务器
    let mut server = HttpServer::new(move || {
        let plugins_config = plugins_config.clone();
        App::new()
            // CORS 配置
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            // 添加错误处理中间件
            .wrap(ErrorHandlerMiddleware)
            // 添加 tracing 中间件
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(manager.clone())
            .configure(move |cfg| configure_routes(cfg, &plugins_config))
    })
    .keep_alive(Duration::from_secs(config.server.keep_alive))
    .client_request_timeout(Duration::from_millis(config.server.client_timeout))
    .client_disconnect_timeout(Duration::from_millis(config.server.client_shutdown));

    // 配置服务器参数
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server
        .bind((config.server.host.clone(), config.server.port))?
        .run()
        .await
}
