// 命令执行插件
// 后台执行预定义的命令，并通过任务 ID 查询执行状态

use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;

use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::PlugHostError;
use crate::plugins::plugin_interface::{Plugin, PluginMetadata};
use crate::plugins::route_table::{PluginRequest, RouteGroup};

/// 允许执行的命令
#[derive(Debug, Clone)]
pub struct AllowedCommand {
    pub key: String,
    pub description: String,
    pub program: Vec<String>,
}

impl AllowedCommand {
    pub fn new(key: &str, description: &str, program: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            program: program.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// 默认命令表
pub fn default_commands() -> Vec<AllowedCommand> {
    vec![
        AllowedCommand::new(
            "update_system",
            "Update the system package list",
            &["sudo", "apt-get", "update"],
        ),
        AllowedCommand::new(
            "upgrade_system",
            "Upgrade all packages to the newest version",
            &["sudo", "apt-get", "upgrade", "-y"],
        ),
        AllowedCommand::new("reboot_system", "Reboot the system", &["sudo", "reboot"]),
    ]
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 命令任务记录
#[derive(Debug, Clone, Serialize)]
pub struct CommandTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub command_key: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub error: Option<String>,
}

#[derive(Default)]
struct TaskStoreState {
    tasks: HashMap<String, CommandTask>,
    /// 创建顺序
    order: VecDeque<String>,
}

/// 有界任务状态表
///
/// 满载时淘汰最早结束的任务；全部任务仍在执行时拒绝新任务。
pub struct TaskStore {
    max_tasks: usize,
    state: Mutex<TaskStoreState>,
}

impl TaskStore {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            max_tasks: max_tasks.max(1),
            state: Mutex::new(TaskStoreState::default()),
        }
    }

    /// 创建 pending 状态的任务
    pub async fn create(&self, command_key: &str) -> Result<CommandTask, PlugHostError> {
        let mut state = self.state.lock().await;

        if state.tasks.len() >= self.max_tasks {
            let evict = state
                .order
                .iter()
                .position(|id| state.tasks.get(id).is_some_and(|t| t.status.is_finished()));
            match evict {
                Some(index) => {
                    if let Some(id) = state.order.remove(index) {
                        state.tasks.remove(&id);
                    }
                }
                None => {
                    return Err(PlugHostError::conflict("Too many commands are still running."));
                }
            }
        }

        let task = CommandTask {
            task_id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            command_key: command_key.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            error: None,
        };
        state.order.push_back(task.task_id.clone());
        state.tasks.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    pub async fn get(&self, task_id: &str) -> Option<CommandTask> {
        self.state.lock().await.tasks.get(task_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    /// pending -> running
    pub async fn mark_running(&self, task_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(task_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Running;
                true
            }
            Some(task) => {
                warn!(task_id = %task_id, status = ?task.status, "忽略非法的任务状态转换");
                false
            }
            None => false,
        }
    }

    /// running -> completed | failed
    pub async fn finish(&self, task_id: &str, outcome: Result<(), String>) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Running {
            warn!(task_id = %task_id, status = ?task.status, "忽略非法的任务状态转换");
            return false;
        }

        task.completed_at = Some(Utc::now());
        match outcome {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.success = Some(true);
            }
            Err(error) => {
                task.status = TaskStatus::Failed;
                task.success = Some(false);
                task.error = Some(error);
            }
        }
        true
    }
}

async fn run_command(tasks: Arc<TaskStore>, task_id: String, program: Vec<String>) {
    if !tasks.mark_running(&task_id).await {
        return;
    }

    let outcome = match program.split_first() {
        Some((binary, args)) => Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| e.to_string())
            .and_then(|status| {
                if status.success() {
                    Ok(())
                } else {
                    Err(match status.code() {
                        Some(code) => format!("Return code: {}", code),
                        None => "Terminated by signal".to_string(),
                    })
                }
            }),
        None => Err("Empty command".to_string()),
    };

    match &outcome {
        Ok(()) => info!(task_id = %task_id, "命令执行完成"),
        Err(e) => warn!(task_id = %task_id, error = %e, "命令执行失败"),
    }
    tasks.finish(&task_id, outcome).await;
}

pub struct CommandExecutorPlugin {
    commands: Arc<Vec<AllowedCommand>>,
    tasks: Arc<TaskStore>,
}

impl CommandExecutorPlugin {
    pub fn new(max_tasks: usize) -> Self {
        Self::with_commands(default_commands(), max_tasks)
    }

    pub fn with_commands(commands: Vec<AllowedCommand>, max_tasks: usize) -> Self {
        Self {
            commands: Arc::new(commands),
            tasks: Arc::new(TaskStore::new(max_tasks)),
        }
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }
}

async fn execute_command(
    commands: Arc<Vec<AllowedCommand>>,
    tasks: Arc<TaskStore>,
    req: PluginRequest,
) -> Result<HttpResponse, PlugHostError> {
    let command_key = req.require_param("command_key")?;
    let command = commands
        .iter()
        .find(|c| c.key == command_key)
        .ok_or_else(|| PlugHostError::validation("command_key", "Invalid command."))?;

    let task = tasks.create(command_key).await?;
    info!(task_id = %task.task_id, command_key = %command_key, "提交后台命令");

    // 后台执行，不阻塞当前请求
    tokio::spawn(run_command(
        tasks.clone(),
        task.task_id.clone(),
        command.program.clone(),
    ));

    Ok(HttpResponse::Ok().json(json!({
        "task_id": task.task_id,
        "status": "Command execution started."
    })))
}

async fn command_status(
    tasks: Arc<TaskStore>,
    req: PluginRequest,
) -> Result<HttpResponse, PlugHostError> {
    let task_id = req.require_param("task_id")?;
    let task = tasks
        .get(task_id)
        .await
        .ok_or_else(|| PlugHostError::not_found(format!("task:{}", task_id)))?;
    Ok(HttpResponse::Ok().json(task))
}

impl Plugin for CommandExecutorPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "Command Executor".to_string(),
            icon: "\u{f120}".to_string(),
            description: "Execute predefined shell commands.".to_string(),
            version: "1.0".to_string(),
            author: "Your Name".to_string(),
            enabled: true,
            position: 4,
        }
    }

    fn register_routes(&self, routes: &mut RouteGroup) {
        let commands = self.commands.clone();
        routes.get("/commands", move |_req: PluginRequest| {
            let listing: Vec<_> = commands
                .iter()
                .map(|c| json!({ "key": c.key, "description": c.description }))
                .collect();
            async move { Ok::<_, PlugHostError>(HttpResponse::Ok().json(json!({ "commands": listing }))) }
        });

        let commands = self.commands.clone();
        let tasks = self.tasks.clone();
        routes.post("/commands/{command_key}", move |req: PluginRequest| {
            execute_command(commands.clone(), tasks.clone(), req)
        });

        let tasks = self.tasks.clone();
        routes.get("/commands/status/{task_id}", move |req: PluginRequest| {
            command_status(tasks.clone(), req)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_transitions() {
        let store = TaskStore::new(4);
        let task = store.create("update_system").await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        // pending 不能直接结束
        assert!(!store.finish(&task.task_id, Ok(())).await);

        assert!(store.mark_running(&task.task_id).await);
        assert!(!store.mark_running(&task.task_id).await);
        assert!(store.finish(&task.task_id, Err("Return code: 1".to_string())).await);

        let task = store.get(&task.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.success, Some(false));
        assert_eq!(task.error.as_deref(), Some("Return code: 1"));
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_store_evicts_oldest_finished() {
        let store = TaskStore::new(2);
        let first = store.create("a").await.unwrap();
        let second = store.create("b").await.unwrap();

        // 全部未结束时拒绝
        assert!(matches!(
            store.create("c").await,
            Err(PlugHostError::Conflict { .. })
        ));

        store.mark_running(&second.task_id).await;
        store.finish(&second.task_id, Ok(())).await;

        let third = store.create("c").await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.get(&first.task_id).await.is_some());
        assert!(store.get(&second.task_id).await.is_none());
        assert!(store.get(&third.task_id).await.is_some());
    }

    async fn wait_finished(store: &TaskStore, task_id: &str) -> CommandTask {
        for _ in 0..100 {
            if let Some(task) = store.get(task_id).await {
                if task.status.is_finished() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("任务没有在预期时间内结束");
    }

    #[tokio::test]
    async fn test_run_command_records_outcome() {
        let store = Arc::new(TaskStore::new(4));

        let ok = store.create("ok").await.unwrap();
        run_command(store.clone(), ok.task_id.clone(), vec!["true".to_string()]).await;
        let ok = wait_finished(&store, &ok.task_id).await;
        assert_eq!(ok.status, TaskStatus::Completed);
        assert_eq!(ok.success, Some(true));

        let failed = store.create("fail").await.unwrap();
        run_command(store.clone(), failed.task_id.clone(), vec!["false".to_string()]).await;
        let failed = wait_finished(&store, &failed.task_id).await;
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Return code: 1"));

        let missing = store.create("missing").await.unwrap();
        run_command(
            store.clone(),
            missing.task_id.clone(),
            vec!["/nonexistent/plughost-command".to_string()],
        )
        .await;
        let missing = wait_finished(&store, &missing.task_id).await;
        assert_eq!(missing.status, TaskStatus::Failed);
        assert!(missing.error.is_some());
    }
}
