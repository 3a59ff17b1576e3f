// 统一错误类型定义

use actix_web::{HttpResponse, ResponseError};
use plughost_common::CommonError;
use serde::{Deserialize, Serialize};

use thiserror::Error;
use tracing::error;

/// Plughost 统一错误类型
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details")]
pub enum PlugHostError {
    /// 配置错误
    #[error("配置错误: {message}")]
    Configuration { message: String },

    /// 验证错误
    #[error("验证错误: {field} - {message}")]
    Validation { field: String, message: String },

    /// 资源未找到
    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    /// 插件属性不在允许列表中
    #[error("不允许修改的属性: {attribute}")]
    InvalidAttribute { attribute: String },

    /// 禁止访问
    #[error("禁止访问: {message}")]
    Forbidden { message: String },

    /// 方法不允许
    #[error("方法不允许: {method} {path}")]
    MethodNotAllowed { method: String, path: String },

    /// 资源冲突
    #[error("资源冲突: {message}")]
    Conflict { message: String },

    /// 设置存储读写失败
    #[error("设置存储错误: {message}")]
    Storage { message: String },

    /// 插件发现失败（单个候选插件）
    #[error("插件发现失败: {source_id} - {message}")]
    Discovery { source_id: String, message: String },

    /// 外部命令执行失败
    #[error("外部命令错误: {command} - {message}")]
    ExternalCommand { command: String, message: String },

    /// 内部服务器错误
    #[error("内部服务器错误: {message}")]
    Internal { message: String },

    /// 超时错误
    #[error("请求超时: {operation}")]
    Timeout { operation: String },
}

impl PlugHostError {
    /// 获取错误代码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidAttribute { .. } => "INVALID_ATTRIBUTE",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Discovery { .. } => "DISCOVERY_ERROR",
            Self::ExternalCommand { .. } => "EXTERNAL_COMMAND_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration { .. } => 500,
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::InvalidAttribute { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::MethodNotAllowed { .. } => 405,
            Self::Conflict { .. } => 409,
            Self::Storage { .. } => 500,
            Self::Discovery { .. } => 500,
            Self::ExternalCommand { .. } => 500,
            Self::Internal { .. } => 500,
            Self::Timeout { .. } => 408,
        }
    }

    /// 是否为客户端错误
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code(), 400..=499)
    }

    /// 是否为服务器错误
    pub fn is_server_error(&self) -> bool {
        matches!(self.status_code(), 500..=599)
    }

    /// 是否应该记录错误日志
    pub fn should_log(&self) -> bool {
        !self.is_client_error()
    }

    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 创建插件未找到错误
    pub fn plugin_not_found(plugin_id: &str) -> Self {
        Self::NotFound {
            resource: format!("plugin:{}", plugin_id),
        }
    }

    /// 创建非法属性错误
    pub fn invalid_attribute(attribute: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
        }
    }

    /// 创建禁止访问错误
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// 创建方法不允许错误
    pub fn method_not_allowed(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
            path: path.into(),
        }
    }

    /// 创建冲突错误
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// 创建存储错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// 创建插件发现错误
    pub fn discovery(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// 创建外部命令错误
    pub fn external_command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 创建超时错误
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}

/// 实现 ResponseError trait 以便与 Actix Web 集成
impl ResponseError for PlugHostError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        // 记录错误日志
        if self.should_log() {
            error!(
                error_code = %self.error_code(),
                error_message = %self,
                "处理请求时发生错误"
            );
        }

        // 构建错误响应
        crate::errors::ErrorResponse::from_error(self).into_http_response()
    }
}

/// 从 CommonError 转换
impl From<CommonError> for PlugHostError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Validation { message } => Self::validation("general", message),
            CommonError::NotFound { resource } => Self::not_found(resource),
            CommonError::Configuration { message } => Self::configuration(message),
            CommonError::Internal { message } => Self::internal(message),
        }
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for PlugHostError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(format!("配置加载错误: {}", err))
    }
}

/// 从 std::io::Error 转换
impl From<std::io::Error> for PlugHostError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found("文件或目录"),
            std::io::ErrorKind::PermissionDenied => Self::forbidden("文件访问权限不足"),
            std::io::ErrorKind::TimedOut => Self::timeout("文件操作"),
            _ => Self::internal(format!("IO 错误: {}", err)),
        }
    }
}

/// 从 serde_json::Error 转换
impl From<serde_json::Error> for PlugHostError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation("json", format!("JSON 解析错误: {}", err))
    }
}
