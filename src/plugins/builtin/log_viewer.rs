// 日志查看插件
// 列出允许访问的日志文件，并通过 WebSocket 实时推送新增内容

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::config::LogViewerConfig;
use crate::errors::PlugHostError;
use crate::plugins::plugin_interface::{Plugin, PluginMetadata};
use crate::plugins::route_table::{PluginRequest, RouteGroup};

/// 轮询日志文件的间隔
const TAIL_INTERVAL: Duration = Duration::from_millis(100);

const FILE_DELETED_MESSAGE: &str = "Log file deleted.";

/// 日志文件访问策略
#[derive(Debug, Clone)]
pub struct LogAccessPolicy {
    allowed_dirs: Vec<PathBuf>,
    excluded_files: Vec<PathBuf>,
}

impl LogAccessPolicy {
    pub fn new(config: &LogViewerConfig) -> Self {
        Self {
            allowed_dirs: config.allowed_dirs.iter().map(PathBuf::from).collect(),
            excluded_files: config.excluded_files.iter().map(PathBuf::from).collect(),
        }
    }

    /// 解析符号链接后，文件必须位于允许目录内且不在排除列表中
    pub fn is_allowed(&self, path: &Path) -> bool {
        let Ok(real_path) = std::fs::canonicalize(path) else {
            return false;
        };

        let inside_allowed = self.allowed_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|dir| real_path.starts_with(dir))
                .unwrap_or(false)
        });

        let excluded = self.excluded_files.iter().any(|file| {
            file == &real_path
                || std::fs::canonicalize(file)
                    .map(|file| file == real_path)
                    .unwrap_or(false)
        });

        inside_allowed && !excluded
    }

    /// 递归列出允许目录下所有可访问的文件
    pub fn list_files(&self) -> Vec<String> {
        let mut files = Vec::new();

        for root in &self.allowed_dirs {
            let mut pending = vec![root.clone()];
            while let Some(dir) = pending.pop() {
                let entries = match std::fs::read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!(dir = %dir.display(), error = %e, "跳过无法读取的目录");
                        continue;
                    }
                };

                for entry in entries.flatten() {
                    let path = entry.path();
                    match entry.file_type() {
                        Ok(file_type) if file_type.is_dir() => pending.push(path),
                        Ok(_) if self.is_allowed(&path) => {
                            files.push(path.to_string_lossy().into_owned());
                        }
                        _ => {}
                    }
                }
            }
        }

        files.sort();
        files
    }
}

/// 客户端发送的路径经过 URL 编码
///
/// 只做百分号解码，字面的 `+` 不当作空格，无效的 `%` 原样保留。
pub fn decode_path(raw: &str) -> String {
    let escaped = raw
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");

    form_urlencoded::parse(escaped.as_bytes())
        .map(|(key, _)| key.into_owned())
        .next()
        .unwrap_or_default()
}

/// 一次轮询的结果
#[derive(Debug, PartialEq, Eq)]
pub enum TailEvent {
    Lines(Vec<String>),
    Deleted,
}

/// 从文件末尾开始跟踪新增的完整行
pub struct LogTail {
    path: PathBuf,
    position: u64,
    partial: String,
}

impl LogTail {
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let position = tokio::fs::metadata(&path).await?.len();
        Ok(Self {
            path,
            position,
            partial: String::new(),
        })
    }

    pub async fn poll(&mut self) -> std::io::Result<TailEvent> {
        let length = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TailEvent::Deleted),
            Err(e) => return Err(e),
        };

        // 文件被截断后从头读取
        if length < self.position {
            self.position = 0;
            self.partial.clear();
        }
        if length == self.position {
            return Ok(TailEvent::Lines(Vec::new()));
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.position)).await?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).await?;
        self.position += buffer.len() as u64;

        self.partial.push_str(&String::from_utf8_lossy(&buffer));
        let mut lines = Vec::new();
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            lines.push(line);
        }

        Ok(TailEvent::Lines(lines))
    }
}

pub struct LogViewerPlugin {
    policy: Arc<LogAccessPolicy>,
}

impl LogViewerPlugin {
    pub fn new(config: &LogViewerConfig) -> Self {
        Self {
            policy: Arc::new(LogAccessPolicy::new(config)),
        }
    }
}

async fn list_logs(policy: Arc<LogAccessPolicy>) -> Result<HttpResponse, PlugHostError> {
    let log_files = tokio::task::spawn_blocking(move || policy.list_files())
        .await
        .map_err(|e| PlugHostError::internal(format!("列出日志文件失败: {}", e)))?;

    Ok(HttpResponse::Ok().json(json!({ "log_files": log_files })))
}

async fn stream_log(
    policy: Arc<LogAccessPolicy>,
    mut session: Session,
    mut stream: MessageStream,
) {
    // 第一条文本帧是要跟踪的文件路径
    let log_file = loop {
        match stream.recv().await {
            Some(Ok(Message::Text(text))) => break decode_path(&text),
            Some(Ok(Message::Ping(bytes))) => {
                if session.pong(&bytes).await.is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => {}
        }
    };

    if !policy.is_allowed(Path::new(&log_file)) {
        warn!(path = %log_file, "拒绝访问日志文件");
        let _ = session
            .close(Some(CloseReason {
                code: CloseCode::Policy,
                description: Some("Access to this file is forbidden.".to_string()),
            }))
            .await;
        return;
    }

    let mut tail = match LogTail::open(&log_file).await {
        Ok(tail) => tail,
        Err(e) => {
            warn!(path = %log_file, error = %e, "打开日志文件失败");
            let _ = session.close(Some(CloseCode::Error.into())).await;
            return;
        }
    };

    info!(path = %log_file, "开始跟踪日志文件");
    let mut ticker = tokio::time::interval(TAIL_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => match tail.poll().await {
                Ok(TailEvent::Lines(lines)) => {
                    for line in lines {
                        if session.text(line).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(TailEvent::Deleted) => {
                    let _ = session.text(FILE_DELETED_MESSAGE).await;
                    break;
                }
                Err(e) => {
                    warn!(path = %log_file, error = %e, "读取日志文件失败");
                    let _ = session.close(Some(CloseCode::Error.into())).await;
                    return;
                }
            },
            message = stream.recv() => match message {
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(path = %log_file, "日志查看客户端已断开");
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = session.close(None).await;
}

impl Plugin for LogViewerPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "Log Viewer".to_string(),
            icon: "\u{f0f6}".to_string(),
            description: "View logs in real-time.".to_string(),
            version: "1.0".to_string(),
            author: "Your Name".to_string(),
            enabled: true,
            position: 2,
        }
    }

    fn register_routes(&self, routes: &mut RouteGroup) {
        let policy = self.policy.clone();
        routes.get("/logs", move |_req: PluginRequest| list_logs(policy.clone()));

        let policy = self.policy.clone();
        routes.get("/ws/logs", move |req: PluginRequest| {
            let policy = policy.clone();
            async move {
                let (response, session, stream) = actix_ws::handle(&req.http, req.payload)
                    .map_err(|e| PlugHostError::validation("websocket", e.to_string()))?;
                actix_web::rt::spawn(stream_log(policy, session, stream));
                Ok(response)
            }
        });
    }
}
