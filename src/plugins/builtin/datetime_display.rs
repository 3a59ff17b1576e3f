// 日期时间插件

use std::time::Duration;

use actix_web::HttpResponse;
use chrono::Local;
use serde_json::json;

use crate::errors::PlugHostError;
use crate::plugins::builtin::spawn_ticker;
use crate::plugins::plugin_interface::{Plugin, PluginMetadata};
use crate::plugins::route_table::{PluginRequest, RouteGroup};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 本地时间，格式 `YYYY-MM-DD HH:MM:SS`
pub fn current_datetime() -> String {
    Local::now().format(DATETIME_FORMAT).to_string()
}

pub struct DateTimeDisplayPlugin;

impl DateTimeDisplayPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn current(_req: PluginRequest) -> Result<HttpResponse, PlugHostError> {
        Ok(HttpResponse::Ok().json(json!({ "current_datetime": current_datetime() })))
    }

    async fn datetime_ws(req: PluginRequest) -> Result<HttpResponse, PlugHostError> {
        let (response, session, stream) = actix_ws::handle(&req.http, req.payload)
            .map_err(|e| PlugHostError::validation("websocket", e.to_string()))?;

        spawn_ticker(session, stream, Duration::from_secs(1), || Some(current_datetime()));
        Ok(response)
    }
}

impl Default for DateTimeDisplayPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DateTimeDisplayPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "Date & Time".to_string(),
            icon: "\u{f64f}".to_string(),
            description: "Display current date and time.".to_string(),
            version: "1.0".to_string(),
            author: "Your Name".to_string(),
            enabled: true,
            position: 5,
        }
    }

    fn register_routes(&self, routes: &mut RouteGroup) {
        routes
            .get("/current_datetime", Self::current)
            .get("/ws/datetime", Self::datetime_ws);
    }
}
