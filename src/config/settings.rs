// 应用程序设置和配置
// 定义配置结构体和加载逻辑

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use plughost_common::CommonError;

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
    pub environment: EnvironmentConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
    pub client_shutdown: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_enabled: bool,
    pub file_path: Option<String>,
}

/// 插件系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// 启动时是否执行插件发现
    pub load_plugins: bool,
    /// 插件设置覆盖文件
    pub settings_file: String,
    /// 插件路由挂载前缀
    pub route_prefix: String,
    pub log_viewer: LogViewerConfig,
    pub service_manager: ServiceManagerConfig,
    pub command_executor: CommandExecutorConfig,
}

/// 日志查看插件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogViewerConfig {
    pub allowed_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
}

/// 服务管理插件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceManagerConfig {
    pub excluded_services: Vec<String>,
}

/// 命令执行插件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecutorConfig {
    /// 任务状态表容量
    pub max_tasks: usize,
}

/// 环境配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    pub debug: bool,
    pub version: String,
}

impl AppConfig {
    /// 从环境变量和配置文件加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::builder();

        // 1. 加载默认配置
        config = config.add_source(Config::try_from(&AppConfig::default())?);

        // 2. 尝试加载配置文件
        if Path::new("config.toml").exists() {
            config = config.add_source(File::with_name("config"));
        }

        // 3. 加载环境变量（优先级最高）
        config = config.add_source(
            Environment::with_prefix("PLUGHOST")
                .prefix_separator("_")
                .separator("__")
        );

        // 4. 兼容旧的 LOAD_PLUGINS 开关
        if let Some(load_plugins) = parse_load_plugins(std::env::var("LOAD_PLUGINS").ok()) {
            config = config.set_override("plugins.load_plugins", load_plugins)?;
        }

        // 5. 构建配置
        let config = config.build()?;

        // 6. 反序列化为结构体
        let mut app_config: AppConfig = config.try_deserialize()?;

        // 7. 设置版本信息
        app_config.environment.version = env!("CARGO_PKG_VERSION").to_string();

        Ok(app_config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), CommonError> {
        use crate::config::ConfigValidator;

        match ConfigValidator::validate_all(self) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let error_messages: Vec<String> = errors.iter()
                    .map(|e| e.to_string())
                    .collect();
                Err(CommonError::configuration(
                    format!("配置验证失败: {}", error_messages.join("; "))
                ))
            }
        }
    }

    /// 获取环境类型
    pub fn is_development(&self) -> bool {
        self.environment.name == "development"
    }

    /// 获取环境类型
    pub fn is_production(&self) -> bool {
        self.environment.name == "production"
    }
}

impl PluginsConfig {
    /// 设置文件路径
    pub fn settings_path(&self) -> PathBuf {
        PathBuf::from(&self.settings_file)
    }
}

/// 解析 LOAD_PLUGINS 环境变量，只有 "true"（不区分大小写）视为开启
pub fn parse_load_plugins(raw: Option<String>) -> Option<bool> {
    raw.map(|value| value.trim().eq_ignore_ascii_case("true"))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: None,
                keep_alive: 75,
                client_timeout: 5000,
                client_shutdown: 5000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
                file_enabled: false,
                file_path: None,
            },
            plugins: PluginsConfig::default(),
            environment: EnvironmentConfig {
                name: "development".to_string(),
                debug: true,
                version: "0.1.0".to_string(),
            },
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            load_plugins: true,
            settings_file: "settings/plugins_settings.json".to_string(),
            route_prefix: "/plugins".to_string(),
            log_viewer: LogViewerConfig {
                allowed_dirs: vec!["/var/log".to_string()],
                excluded_files: vec![
                    "/var/log/secure".to_string(),
                    "/var/log/auth.log".to_string(),
                ],
            },
            service_manager: ServiceManagerConfig {
                excluded_services: vec!["ssh".to_string(), "networking".to_string()],
            },
            command_executor: CommandExecutorConfig { max_tasks: 256 },
        }
    }
}
