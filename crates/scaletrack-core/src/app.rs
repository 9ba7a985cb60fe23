use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use scaletrack_shared::{TaskCreate, TaskId, TaskStatus};
use tracing::{debug, info, instrument, warn};

use crate::backend::{TaskBackend, TaskQuery};
use crate::classify::is_overdue;
use crate::cli::{AddArgs, Command};
use crate::commands::TaskCommands;
use crate::datastore::FileBackend;
use crate::datetime::{Clock, parse_due_expr, parse_due_time_expr};
use crate::error::TaskError;
use crate::group::group_by_due_date;
use crate::render::Renderer;
use crate::sync::SyncBridge;

const RELOAD_WAIT: Duration = Duration::from_secs(2);

/// Everything one CLI invocation works with.
pub struct App {
    pub backend: Arc<FileBackend>,
    pub commands: TaskCommands,
    pub clock: Clock,
    pub renderer: Renderer,
}

impl App {
    #[instrument(skip(self))]
    pub async fn dispatch(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Upcoming => self.show_upcoming().await,
            Command::Agenda => self.show_agenda().await,
            Command::List { status } => self.list(status).await,
            Command::Add(args) => {
                let input = self.build_input(args)?;
                let bridge = self.attach_sync();
                let task = self.commands.add_task(input).await?;
                println!("Created task {}.", task.id.short());
                self.show_after_sync(bridge).await
            }
            Command::Done { id } => {
                let id = self.resolve_id(&id).await?;
                let bridge = self.attach_sync();
                let task = self.commands.complete_task(id).await?;
                println!("Completed task {} '{}'.", id.short(), task.title);
                self.show_after_sync(bridge).await
            }
            Command::Delete { id } => {
                let id = self.resolve_id(&id).await?;
                let bridge = self.attach_sync();
                self.commands.remove_task(id).await?;
                println!("Deleted task {}.", id.short());
                self.show_after_sync(bridge).await
            }
        }
    }

    async fn show_upcoming(&self) -> anyhow::Result<()> {
        self.commands.refresh_tasks().await?;
        let snapshot = self.commands.snapshot();
        self.renderer
            .print_task_table(&snapshot.tasks, self.clock.today())
    }

    async fn show_agenda(&self) -> anyhow::Result<()> {
        self.commands.refresh_tasks().await?;
        let today = self.clock.today();
        let groups = group_by_due_date(&self.commands.snapshot().tasks, today);
        self.renderer.print_agenda(&groups, today)
    }

    async fn list(&self, status: Option<TaskStatus>) -> anyhow::Result<()> {
        let owner = self
            .commands
            .store()
            .session()
            .ok_or(TaskError::AuthRequired)?
            .owner;
        let today = self.clock.today();

        // Overdue is derived, never stored.
        let query = match status {
            Some(TaskStatus::Overdue) => TaskQuery::with_status(TaskStatus::Pending),
            Some(other) => TaskQuery::with_status(other),
            None => TaskQuery::all(),
        };
        let mut tasks = self
            .backend
            .select(owner, query)
            .await
            .map_err(TaskError::Fetch)?;
        if status == Some(TaskStatus::Overdue) {
            tasks.retain(|task| is_overdue(task, today));
        }
        debug!(count = tasks.len(), ?status, "listing tasks");
        self.renderer.print_task_table(&tasks, today)
    }

    /// Subscribes the store to the backend's change feed before a write.
    fn attach_sync(&self) -> SyncBridge {
        SyncBridge::spawn(self.commands.store().clone(), self.backend.as_ref())
    }

    /// Waits for the realtime reload the write triggered, then shows the
    /// upcoming view.
    async fn show_after_sync(&self, bridge: SyncBridge) -> anyhow::Result<()> {
        let mut reloads = bridge.reloads();
        match tokio::time::timeout(RELOAD_WAIT, reloads.changed()).await {
            Ok(Ok(())) => {
                info!(reloads = *reloads.borrow(), "upcoming view refreshed");
            }
            Ok(Err(_)) | Err(_) => {
                warn!("no realtime reload observed; refreshing directly");
                self.commands.refresh_tasks().await?;
            }
        }
        bridge.shutdown();

        println!();
        let snapshot = self.commands.snapshot();
        self.renderer
            .print_task_table(&snapshot.tasks, self.clock.today())
    }

    fn build_input(&self, args: AddArgs) -> anyhow::Result<TaskCreate> {
        let due_date = parse_due_expr(&args.due, self.clock.today())?;
        let due_time = args
            .time
            .as_deref()
            .map(parse_due_time_expr)
            .transpose()?;
        let mut input = TaskCreate::new(args.title.join(" "), due_date);
        input.due_time = due_time;
        input.priority = args.priority;
        input.description = args.description;
        input.related = args.related;
        Ok(input)
    }

    /// Accepts a full id or a unique prefix of one of the owner's tasks.
    async fn resolve_id(&self, raw: &str) -> anyhow::Result<TaskId> {
        if let Ok(id) = raw.parse::<TaskId>() {
            return Ok(id);
        }

        let owner = self
            .commands
            .store()
            .session()
            .ok_or(TaskError::AuthRequired)?
            .owner;
        let prefix = raw.trim().to_ascii_lowercase().replace('-', "");
        if prefix.is_empty() {
            return Err(anyhow!("task id cannot be empty"));
        }

        let tasks = self
            .backend
            .select(owner, TaskQuery::all())
            .await
            .map_err(TaskError::Fetch)
            .context("failed to resolve task id")?;
        let mut matches = tasks
            .iter()
            .filter(|task| task.id.0.simple().to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.id),
            (Some(_), Some(_)) => Err(anyhow!("task id prefix '{raw}' is ambiguous")),
            (None, _) => Err(anyhow!("no task matches '{raw}'")),
        }
    }
}
