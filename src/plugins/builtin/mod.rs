// 内置插件
// 按发现顺序静态注册

pub mod command_executor;
pub mod datetime_display;
pub mod log_viewer;
pub mod sample_plugin;
pub mod service_manager;
pub mod system_monitor;

use std::time::Duration;

use actix_ws::{Message, MessageStream, Session};
use tracing::debug;

use crate::config::PluginsConfig;
use crate::plugins::plugin_registry::PluginSource;

pub use command_executor::{CommandExecutorPlugin, CommandTask, TaskStatus, TaskStore};
pub use datetime_display::DateTimeDisplayPlugin;
pub use log_viewer::{LogAccessPolicy, LogViewerPlugin};
pub use sample_plugin::SamplePlugin;
pub use service_manager::ServiceManagerPlugin;
pub use system_monitor::SystemMonitorPlugin;

/// 内置插件来源，ID 即插件目录名
pub fn builtin_sources(config: &PluginsConfig) -> Vec<PluginSource> {
    let log_viewer = config.log_viewer.clone();
    let service_manager = config.service_manager.clone();
    let max_tasks = config.command_executor.max_tasks;

    vec![
        PluginSource::of("system_monitor", SystemMonitorPlugin::new),
        PluginSource::of("log_viewer", move || LogViewerPlugin::new(&log_viewer)),
        PluginSource::of("service_manager", move || {
            ServiceManagerPlugin::new(&service_manager)
        }),
        PluginSource::of("command_executor", move || {
            CommandExecutorPlugin::new(max_tasks)
        }),
        PluginSource::of("datetime_display", DateTimeDisplayPlugin::new),
        PluginSource::of("sample_plugin", SamplePlugin::new),
    ]
}

/// 按固定间隔向 WebSocket 推送文本帧，直到客户端断开或 `next_frame` 返回 None
pub(crate) fn spawn_ticker<F>(
    mut session: Session,
    mut stream: MessageStream,
    period: Duration,
    mut next_frame: F,
) where
    F: FnMut() -> Option<String> + 'static,
{
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(frame) = next_frame() else {
                        break;
                    };
                    if session.text(frame).await.is_err() {
                        debug!("WebSocket 客户端已断开");
                        return;
                    }
                }
                message = stream.recv() => match message {
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        debug!("WebSocket 客户端已断开");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }

        let _ = session.close(None).await;
    });
}
