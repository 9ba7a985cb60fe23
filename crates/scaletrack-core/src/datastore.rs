use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use scaletrack_shared::{
    ChangeEvent, ChangeKind, OwnerId, Task, TaskCreate, TaskId, TaskStatus,
};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::backend::{ChangeFeed, ChangeHub, TaskBackend, TaskQuery};
use crate::error::BackendError;

/// `tasks` table kept as JSONL under a data directory. Each write rewrites
/// the file atomically and publishes a change event to in-process
/// subscribers.
#[derive(Debug)]
pub struct FileBackend {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    write_lock: Mutex<()>,
    changes: ChangeHub,
}

impl FileBackend {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")
                .with_context(|| format!("failed to create {}", tasks_path.display()))?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened task datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            write_lock: Mutex::new(()),
            changes: ChangeHub::new(),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_all(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_all(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    fn emit(&self, kind: ChangeKind) {
        let delivered = self.changes.publish(ChangeEvent::tasks(kind, Utc::now()));
        debug!(?kind, delivered, "published task change");
    }
}

#[async_trait]
impl TaskBackend for FileBackend {
    #[instrument(skip(self))]
    async fn select(&self, owner: OwnerId, query: TaskQuery) -> Result<Vec<Task>, BackendError> {
        let rows = self.load_all()?;
        Ok(query.apply(owner, rows.iter()))
    }

    #[instrument(skip(self, input), fields(title_len = input.title.len()))]
    async fn insert(&self, owner: OwnerId, input: TaskCreate) -> Result<Task, BackendError> {
        input.validate().map_err(BackendError::Rejected)?;
        let task = input.into_task(owner, Utc::now());
        {
            let _guard = self.write_lock.lock();
            let mut rows = self.load_all()?;
            rows.push(task.clone());
            self.save_all(&rows)?;
        }
        self.emit(ChangeKind::Insert);
        Ok(task)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        owner: OwnerId,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Task, BackendError> {
        let updated = {
            let _guard = self.write_lock.lock();
            let mut rows = self.load_all()?;
            let row = rows
                .iter_mut()
                .find(|task| task.id == id && task.owner == owner)
                .ok_or(BackendError::NotFound(id))?;
            row.status = status;
            row.updated_at = Utc::now().max(row.updated_at);
            let updated = row.clone();
            self.save_all(&rows)?;
            updated
        };
        self.emit(ChangeKind::Update);
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete(&self, owner: OwnerId, id: TaskId) -> Result<(), BackendError> {
        {
            let _guard = self.write_lock.lock();
            let mut rows = self.load_all()?;
            let idx = rows
                .iter()
                .position(|task| task.id == id && task.owner == owner)
                .ok_or(BackendError::NotFound(id))?;
            rows.remove(idx);
            self.save_all(&rows)?;
        }
        self.emit(ChangeKind::Delete);
        Ok(())
    }
}

impl ChangeFeed for FileBackend {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe(table)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
