// 配置加载器
// 处理配置文件加载和环境变量解析

use crate::config::AppConfig;
use plughost_common::CommonError;
use config::ConfigError;
use dotenvy::dotenv;
use std::sync::OnceLock;
use tracing::{info, warn};

/// 全局配置实例
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 初始化配置
    pub fn init() -> Result<&'static AppConfig, CommonError> {
        // 加载 .env 文件
        if let Err(e) = dotenv() {
            warn!("无法加载 .env 文件: {}", e);
        }

        // 加载配置
        let config = AppConfig::load()
            .map_err(convert_config_error)?;

        // 验证配置
        config.validate()?;

        // 存储到全局变量
        CONFIG.set(config).map_err(|_| {
            CommonError::internal("配置已经初始化")
        })?;

        let config = Self::get()?;

        info!("配置加载成功");
        info!("环境: {}", config.environment.name);
        info!("版本: {}", config.environment.version);
        info!("服务器: {}:{}", config.server.host, config.server.port);

        Ok(config)
    }

    /// 获取配置
    pub fn get() -> Result<&'static AppConfig, CommonError> {
        CONFIG
            .get()
            .ok_or_else(|| CommonError::internal("配置未初始化，请先调用 ConfigLoader::init()"))
    }

    /// 打印配置摘要
    pub fn print_summary(config: &AppConfig) {
        info!(
            environment = %config.environment.name,
            version = %config.environment.version,
            debug = config.environment.debug,
            host = %config.server.host,
            port = config.server.port,
            workers = ?config.server.workers,
            log_level = %config.logging.level,
            load_plugins = config.plugins.load_plugins,
            settings_file = %config.plugins.settings_file,
            route_prefix = %config.plugins.route_prefix,
            "=== Plughost 配置摘要 ==="
        );
    }
}

/// 配置错误转换辅助函数
pub fn convert_config_error(err: ConfigError) -> CommonError {
    CommonError::configuration(format!("配置错误: {}", err))
}
