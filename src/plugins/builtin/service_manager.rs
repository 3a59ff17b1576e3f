// 服务管理插件
// 通过 systemctl 列出和控制系统服务

use std::str::FromStr;
use std::sync::Arc;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ServiceManagerConfig;
use crate::errors::PlugHostError;
use crate::plugins::plugin_interface::{Plugin, PluginMetadata};
use crate::plugins::route_table::{PluginRequest, RouteGroup};

static SERVICE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_\-\.@]+$").expect("服务名正则表达式无效")
});

/// systemctl 列出的服务单元
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceUnit {
    pub name: String,
    pub load: String,
    pub active: String,
    pub sub: String,
    pub description: String,
}

/// 允许的服务操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
            Self::Restart => "restarted",
        }
    }
}

impl FromStr for ServiceAction {
    type Err = PlugHostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            _ => Err(PlugHostError::validation("action", "Invalid action.")),
        }
    }
}

/// 服务访问控制
#[derive(Debug, Clone)]
pub struct ServiceGuard {
    excluded: Vec<String>,
}

impl ServiceGuard {
    pub fn new(config: &ServiceManagerConfig) -> Self {
        Self {
            excluded: config.excluded_services.clone(),
        }
    }

    pub fn is_valid_name(name: &str) -> bool {
        SERVICE_NAME_PATTERN.is_match(name)
    }

    /// `ssh` 同时排除 `ssh.service`
    pub fn is_excluded(&self, name: &str) -> bool {
        let unit = name.strip_suffix(".service").unwrap_or(name);
        self.excluded
            .iter()
            .any(|excluded| excluded == name || excluded == unit)
    }

    /// 校验服务名和操作
    pub fn check(&self, name: &str, action: &str) -> Result<ServiceAction, PlugHostError> {
        if !Self::is_valid_name(name) {
            return Err(PlugHostError::validation("service_name", "Invalid service name."));
        }
        if self.is_excluded(name) {
            return Err(PlugHostError::forbidden("Control of this service is not allowed."));
        }
        action.parse()
    }

    /// 解析 `systemctl list-units --no-legend` 输出
    pub fn parse_units(&self, output: &str) -> Vec<ServiceUnit> {
        output
            .lines()
            .filter_map(|line| {
                // 失败的单元行首带有状态标记
                let mut parts = line
                    .split_whitespace()
                    .skip_while(|part| !part.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()));
                let name = parts.next()?.to_string();
                let load = parts.next()?.to_string();
                let active = parts.next()?.to_string();
                let sub = parts.next()?.to_string();
                let description = parts.collect::<Vec<_>>().join(" ");
                Some(ServiceUnit {
                    name,
                    load,
                    active,
                    sub,
                    description,
                })
            })
            .filter(|unit| !self.is_excluded(&unit.name))
            .collect()
    }
}

pub struct ServiceManagerPlugin {
    guard: Arc<ServiceGuard>,
}

impl ServiceManagerPlugin {
    pub fn new(config: &ServiceManagerConfig) -> Self {
        Self {
            guard: Arc::new(ServiceGuard::new(config)),
        }
    }
}

async fn list_services(guard: Arc<ServiceGuard>) -> Result<HttpResponse, PlugHostError> {
    let output = Command::new("systemctl")
        .args(["list-units", "--type=service", "--all", "--no-pager", "--no-legend"])
        .output()
        .await
        .map_err(|e| PlugHostError::external_command("systemctl", e.to_string()))?;

    if !output.status.success() {
        warn!(status = ?output.status.code(), "systemctl list-units 执行失败");
        return Err(PlugHostError::external_command(
            "systemctl",
            "Failed to list services.",
        ));
    }

    let services = guard.parse_units(&String::from_utf8_lossy(&output.stdout));
    Ok(HttpResponse::Ok().json(json!({ "services": services })))
}

async fn control_service(
    guard: Arc<ServiceGuard>,
    req: PluginRequest,
) -> Result<HttpResponse, PlugHostError> {
    let service_name = req.require_param("service_name")?;
    let action = guard.check(service_name, req.require_param("action")?)?;

    let output = Command::new("sudo")
        .args(["systemctl", action.as_str(), service_name])
        .output()
        .await
        .map_err(|e| PlugHostError::external_command("systemctl", e.to_string()))?;

    if !output.status.success() {
        warn!(
            service = %service_name,
            action = %action.as_str(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "服务操作失败"
        );
        return Err(PlugHostError::external_command(
            "systemctl",
            format!("Failed to {} service {}.", action.as_str(), service_name),
        ));
    }

    info!(service = %service_name, action = %action.as_str(), "服务操作成功");
    Ok(HttpResponse::Ok().json(json!({
        "status": format!("Service {} {} successfully.", service_name, action.past_tense())
    })))
}

impl Plugin for ServiceManagerPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "Service Manager".to_string(),
            icon: "\u{f085}".to_string(),
            description: "Manage system services.".to_string(),
            version: "1.0".to_string(),
            author: "Your Name".to_string(),
            enabled: true,
            position: 3,
        }
    }

    fn register_routes(&self, routes: &mut RouteGroup) {
        let guard = self.guard.clone();
        routes.get("/services", move |_req: PluginRequest| list_services(guard.clone()));

        let guard = self.guard.clone();
        routes.post("/services/{service_name}/{action}", move |req: PluginRequest| {
            control_service(guard.clone(), req)
        });
    }
}
