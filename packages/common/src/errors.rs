// 通用错误类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 通用错误类型
///
/// 配置层和工具函数使用，不依赖 Web 框架；主 crate 会把它转换为
/// 带 HTTP 语义的错误。
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum CommonError {
    #[error("验证失败: {message}")]
    Validation { message: String },

    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    #[error("配置错误: {message}")]
    Configuration { message: String },

    #[error("内部错误: {message}")]
    Internal { message: String },
}

impl CommonError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
