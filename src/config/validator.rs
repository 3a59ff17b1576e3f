// 配置验证器
// 提供详细的配置验证逻辑

use crate::config::AppConfig;
use plughost_common::CommonError;
use std::path::Path;

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证完整配置
    pub fn validate_all(config: &AppConfig) -> Result<(), Vec<CommonError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_server(&config.server) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_logging(&config.logging) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_plugins(&config.plugins) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_environment(&config.environment) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 验证服务器配置
    pub fn validate_server(config: &crate::config::ServerConfig) -> Result<(), CommonError> {
        if config.port == 0 {
            return Err(CommonError::validation("服务器端口不能为 0"));
        }

        if config.host.is_empty() {
            return Err(CommonError::validation("服务器主机地址不能为空"));
        }

        if let Some(workers) = config.workers {
            if workers == 0 {
                return Err(CommonError::validation("工作线程数不能为 0"));
            }
            if workers > 32 {
                return Err(CommonError::validation("工作线程数不建议超过 32"));
            }
        }

        Ok(())
    }

    /// 验证日志配置
    pub fn validate_logging(config: &crate::config::LoggingConfig) -> Result<(), CommonError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.level.as_str()) {
            return Err(CommonError::validation(
                format!("无效的日志级别: {}，有效值: {:?}", config.level, valid_levels)
            ));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&config.format.as_str()) {
            return Err(CommonError::validation(
                format!("无效的日志格式: {}，有效值: {:?}", config.format, valid_formats)
            ));
        }

        if config.file_enabled {
            if let Some(ref path) = config.file_path {
                let log_dir = Path::new(path).parent().unwrap_or(Path::new("."));
                if !log_dir.as_os_str().is_empty() && !log_dir.exists() {
                    if let Err(e) = std::fs::create_dir_all(log_dir) {
                        return Err(CommonError::validation(
                            format!("无法创建日志目录: {}", e)
                        ));
                    }
                }
            } else {
                return Err(CommonError::validation("启用文件日志时必须指定日志文件路径"));
            }
        }

        Ok(())
    }

    /// 验证插件配置
    pub fn validate_plugins(config: &crate::config::PluginsConfig) -> Result<(), CommonError> {
        if config.settings_file.trim().is_empty() {
            return Err(CommonError::validation("插件设置文件路径不能为空"));
        }

        if !config.route_prefix.starts_with('/') {
            return Err(CommonError::validation("插件路由前缀必须以 / 开头"));
        }

        if config.route_prefix.len() > 1 && config.route_prefix.ends_with('/') {
            return Err(CommonError::validation("插件路由前缀不能以 / 结尾"));
        }

        if config.command_executor.max_tasks == 0 {
            return Err(CommonError::validation("命令任务表容量不能为 0"));
        }

        Ok(())
    }

    /// 验证环境配置
    pub fn validate_environment(config: &crate::config::EnvironmentConfig) -> Result<(), CommonError> {
        let valid_environments = ["development", "test", "production"];
        if !valid_environments.contains(&config.name.as_str()) {
            return Err(CommonError::validation(
                format!("无效的环境名称: {}，有效值: {:?}", config.name, valid_environments)
            ));
        }

        if config.version.is_empty() {
            return Err(CommonError::validation("版本号不能为空"));
        }

        Ok(())
    }
}
