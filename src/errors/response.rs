// 错误响应格式化

use crate::errors::PlugHostError;
use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};


/// 错误响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
    pub timestamp: DateTime<Utc>,
}

/// 错误详情
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// 从 PlugHostError 创建错误响应
    pub fn from_error(error: &PlugHostError) -> Self {
        // 根据错误类型设置详细信息
        let details = match error {
            PlugHostError::Validation { field, .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            PlugHostError::InvalidAttribute { attribute } => {
                Some(serde_json::json!({ "attribute": attribute }))
            }
            PlugHostError::MethodNotAllowed { method, path } => {
                Some(serde_json::json!({ "method": method, "path": path }))
            }
            PlugHostError::Discovery { source_id, .. } => {
                Some(serde_json::json!({ "source_id": source_id }))
            }
            PlugHostError::ExternalCommand { command, .. } => {
                Some(serde_json::json!({ "command": command }))
            }
            PlugHostError::Timeout { operation } => {
                Some(serde_json::json!({ "operation": operation }))
            }
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetail {
                code: error.error_code().to_string(),
                message: error.to_string(),
                details,
            },
            timestamp: Utc::now(),
        }
    }

    /// 转换为 HTTP 响应
    pub fn into_http_response(self) -> HttpResponse {
        let status_code = match self.error.code.as_str() {
            "CONFIGURATION_ERROR" => 500,
            "VALIDATION_ERROR" => 400,
            "NOT_FOUND" => 404,
            "INVALID_ATTRIBUTE" => 400,
            "FORBIDDEN" => 403,
            "METHOD_NOT_ALLOWED" => 405,
            "CONFLICT" => 409,
            "STORAGE_ERROR" => 500,
            "DISCOVERY_ERROR" => 500,
            "EXTERNAL_COMMAND_ERROR" => 500,
            "INTERNAL_ERROR" => 500,
            "TIMEOUT_ERROR" => 408,
            _ => 500,
        };

        HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status_code)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        )
        .json(self)
    }
}
