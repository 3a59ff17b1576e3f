// 系统监控插件
// 提供 CPU、内存、磁盘和网络指标

use std::path::Path;
use std::time::Duration;

use actix_web::HttpResponse;
use serde::Serialize;
use sysinfo::{Disks, Networks, System};
use tracing::warn;

use crate::errors::PlugHostError;
use crate::plugins::builtin::spawn_ticker;
use crate::plugins::plugin_interface::{Plugin, PluginMetadata};
use crate::plugins::route_table::{PluginRequest, RouteGroup};

/// 推送间隔
const PUSH_INTERVAL: Duration = Duration::from_secs(1);

/// 单次 REST 采样时 CPU 使用率的测量窗口
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory: MemoryMetrics,
    pub disk: DiskMetrics,
    pub network: NetworkMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskMetrics {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkMetrics {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

/// 指标采样器，CPU 使用率依赖两次刷新之间的差值
pub struct MetricsSampler {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl MetricsSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    pub fn sample(&mut self) -> SystemMetrics {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();
        self.networks.refresh();

        let cpus = self.system.cpus();
        let cpu_percent = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let total_memory = self.system.total_memory();
        let used_memory = self.system.used_memory();

        // 根分区
        let (disk_total, disk_free) = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .map(|disk| (disk.total_space(), disk.available_space()))
            .unwrap_or((0, 0));
        let disk_used = disk_total.saturating_sub(disk_free);

        let network = self
            .networks
            .list()
            .values()
            .fold(NetworkMetrics::default(), |mut acc, data| {
                acc.bytes_sent += data.total_transmitted();
                acc.bytes_recv += data.total_received();
                acc.packets_sent += data.total_packets_transmitted();
                acc.packets_recv += data.total_packets_received();
                acc
            });

        SystemMetrics {
            cpu_percent,
            memory: MemoryMetrics {
                total: total_memory,
                used: used_memory,
                available: self.system.available_memory(),
                percent: percent(used_memory, total_memory),
            },
            disk: DiskMetrics {
                total: disk_total,
                used: disk_used,
                free: disk_free,
                percent: percent(disk_used, disk_total),
            },
            network,
        }
    }
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SystemMonitorPlugin;

impl SystemMonitorPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn metrics(_req: PluginRequest) -> Result<HttpResponse, PlugHostError> {
        let mut sampler = MetricsSampler::new();
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
        Ok(HttpResponse::Ok().json(sampler.sample()))
    }

    async fn metrics_ws(req: PluginRequest) -> Result<HttpResponse, PlugHostError> {
        let (response, session, stream) = actix_ws::handle(&req.http, req.payload)
            .map_err(|e| PlugHostError::validation("websocket", e.to_string()))?;

        let mut sampler = MetricsSampler::new();
        spawn_ticker(session, stream, PUSH_INTERVAL, move || {
            match serde_json::to_string(&sampler.sample()) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!(error = %e, "序列化系统指标失败");
                    None
                }
            }
        });

        Ok(response)
    }
}

impl Default for SystemMonitorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for SystemMonitorPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "System Monitor".to_string(),
            icon: "\u{f85a}".to_string(),
            description: "Monitor CPU, memory, disk, and network usage.".to_string(),
            version: "1.0".to_string(),
            author: "Your Name".to_string(),
            enabled: true,
            position: 1,
        }
    }

    fn register_routes(&self, routes: &mut RouteGroup) {
        routes
            .get("/metrics", Self::metrics)
            .get("/ws/metrics", Self::metrics_ws);
    }
}
