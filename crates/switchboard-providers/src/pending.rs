//! Pending task store — requests that exhausted every provider.
//!
//! Tasks are replayed by [`PendingTaskStore::retry_all`]. When the store has
//! a path it is written as pretty JSON after every mutation and re-read
//! before every access, under an advisory lock, so short-lived CLI runs and
//! a long-running `serve` can share it. Completion callbacks live in memory
//! only.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use switchboard_core::types::{ChatRequest, ChatResponse};
use switchboard_core::utils::char_prefix;

use crate::error::RouterError;
use crate::failover::FailoverController;

/// Replay attempts before a task is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const STORE_VERSION: u32 = 1;
const ID_HEX_LEN: usize = 12;
const ID_CONTENT_CHARS: usize = 50;

// ─────────────────────────────────────────────
// Callback type
// ─────────────────────────────────────────────

/// Invoked with the response when a queued request finally succeeds.
pub type OnCompleteFn = Arc<
    dyn Fn(ChatResponse) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async closure as an [`OnCompleteFn`].
pub fn on_complete<F, Fut>(f: F) -> OnCompleteFn
where
    F: Fn(ChatResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(
        move |response: ChatResponse| -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> {
            Box::pin(f(response))
        },
    )
}

// ─────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────

/// A request waiting for replay.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub id: String,
    pub request: ChatRequest,
    pub created_at: DateTime<Utc>,
    /// Failed deliveries so far, the original one included.
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(skip)]
    pub on_complete: Option<OnCompleteFn>,
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("attempts", &self.attempts)
            .field("last_error", &self.last_error)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PendingQueue {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Creation order.
    #[serde(default)]
    pub tasks: Vec<PendingTask>,
}

fn default_version() -> u32 {
    STORE_VERSION
}

/// Result of replaying one task.
#[derive(Clone, Debug)]
pub enum RetryOutcome {
    Success {
        task_id: String,
        response: ChatResponse,
    },
    /// Still queued.
    Failed {
        task_id: String,
        error: String,
        attempts: u32,
    },
    /// Retry budget spent; the task is gone.
    Dropped {
        task_id: String,
        error: String,
        attempts: u32,
    },
}

impl RetryOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            RetryOutcome::Success { task_id, .. }
            | RetryOutcome::Failed { task_id, .. }
            | RetryOutcome::Dropped { task_id, .. } => task_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }
}

/// Task id: first 12 hex chars of SHA-256 over the creation timestamp and the
/// first 50 characters of the first message. Not unique by content.
pub fn task_id(request: &ChatRequest, created_at: &DateTime<Utc>) -> String {
    hash_id(&[
        created_at.to_rfc3339().as_str(),
        char_prefix(request.first_content(), ID_CONTENT_CHARS),
    ])
}

fn hash_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_HEX_LEN);
    id
}

// ─────────────────────────────────────────────
// File locking
// ─────────────────────────────────────────────

/// Held around every read-modify-write of the store file.
const DATA_LOCK_SUFFIX: &str = ".lock";
/// Held for a whole replay sweep.
const SWEEP_LOCK_SUFFIX: &str = ".sweep.lock";

/// Exclusive advisory lock on a sidecar file, released on drop.
struct FileLock {
    file: std::fs::File,
}

impl FileLock {
    async fn acquire(path: PathBuf) -> anyhow::Result<Self> {
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            FileExt::lock_exclusive(&file)
                .with_context(|| format!("failed to lock {}", path.display()))?;
            Ok(FileLock { file })
        })
        .await
        .context("lock task failed")?
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `None` when the file does not exist yet.
async fn read_queue(path: &Path) -> anyhow::Result<Option<PendingQueue>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let queue = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse pending store {}", path.display()))?;
    Ok(Some(queue))
}

// ─────────────────────────────────────────────
// PendingTaskStore
// ─────────────────────────────────────────────

/// Queue of fully-failed requests.
///
/// With a path, the file is the shared source of truth: every read and
/// mutation re-reads it under an advisory lock, so several processes can use
/// one store file. Tasks another process removed disappear here too.
pub struct PendingTaskStore {
    queue: Mutex<PendingQueue>,
    /// Held for the whole of `retry_all`.
    sweep: Mutex<()>,
    max_retries: u32,
    path: Option<PathBuf>,
}

impl fmt::Debug for PendingTaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTaskStore")
            .field("max_retries", &self.max_retries)
            .field("path", &self.path)
            .finish()
    }
}

impl PendingTaskStore {
    /// `path = None` keeps tasks in memory only.
    pub fn new(max_retries: u32, path: Option<PathBuf>) -> Self {
        Self {
            queue: Mutex::new(PendingQueue {
                version: STORE_VERSION,
                tasks: Vec::new(),
            }),
            sweep: Mutex::new(()),
            max_retries: max_retries.max(1),
            path,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, None)
    }

    // ─────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────

    /// Merge persisted tasks ahead of any already in memory. Ids the store
    /// already holds are not added twice. Returns how many tasks were added.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let _lock = FileLock::acquire(sidecar(path, DATA_LOCK_SUFFIX)).await?;
        let Some(loaded) = read_queue(path).await? else {
            debug!(path = %path.display(), "no pending store file, starting empty");
            return Ok(0);
        };

        let mut queue = self.queue.lock().await;
        let mut local = std::mem::take(&mut queue.tasks);
        let mut merged = Vec::with_capacity(loaded.tasks.len() + local.len());
        let mut added = 0;
        for mut task in loaded.tasks {
            match local.iter().position(|t| t.id == task.id) {
                Some(index) => task.on_complete = local.remove(index).on_complete,
                None => added += 1,
            }
            merged.push(task);
        }
        let memory_only = !local.is_empty();
        merged.append(&mut local);
        queue.tasks = merged;
        if memory_only {
            self.write(&queue).await?;
        }

        info!(path = %path.display(), tasks = added, "loaded pending tasks");
        Ok(added)
    }

    async fn write(&self, queue: &PendingQueue) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(queue)?;
        let tmp = sidecar(path, ".tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        debug!(path = %path.display(), tasks = queue.tasks.len(), "saved pending store");
        Ok(())
    }

    /// Persist while the caller still holds the queue lock.
    async fn persist(&self, queue: &PendingQueue) {
        if let Err(e) = self.write(queue).await {
            error!(error = %e, "failed to persist pending tasks");
        }
    }

    /// Adopt the file's view of the queue, keeping in-memory callbacks by id.
    /// A missing or unreadable file leaves memory as it is.
    async fn refresh(&self, queue: &mut PendingQueue) {
        let Some(path) = &self.path else {
            return;
        };
        match read_queue(path).await {
            Ok(Some(on_disk)) => {
                let mut callbacks: HashMap<String, OnCompleteFn> = queue
                    .tasks
                    .drain(..)
                    .filter_map(|t| {
                        let PendingTask { id, on_complete, .. } = t;
                        on_complete.map(|cb| (id, cb))
                    })
                    .collect();
                queue.tasks = on_disk
                    .tasks
                    .into_iter()
                    .map(|mut t| {
                        t.on_complete = callbacks.remove(&t.id);
                        t
                    })
                    .collect();
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to re-read pending store, using in-memory queue"),
        }
    }

    /// `None` without a path, or when the lock can't be taken (logged).
    async fn lock_file(&self, suffix: &str) -> Option<FileLock> {
        let path = self.path.as_ref()?;
        match FileLock::acquire(sidecar(path, suffix)).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                error!(error = %e, "failed to lock pending store, continuing unlocked");
                None
            }
        }
    }

    /// Apply `f` to the freshest queue and persist the result.
    async fn mutate<R>(&self, f: impl FnOnce(&mut PendingQueue) -> R) -> R {
        let _lock = self.lock_file(DATA_LOCK_SUFFIX).await;
        let mut queue = self.queue.lock().await;
        self.refresh(&mut queue).await;
        let result = f(&mut queue);
        self.persist(&queue).await;
        result
    }

    async fn read<R>(&self, f: impl FnOnce(&PendingQueue) -> R) -> R {
        let _lock = self.lock_file(DATA_LOCK_SUFFIX).await;
        let mut queue = self.queue.lock().await;
        self.refresh(&mut queue).await;
        f(&queue)
    }

    // ─────────────────────────────────────────
    // Queue management
    // ─────────────────────────────────────────

    pub async fn enqueue(&self, request: ChatRequest) -> String {
        self.enqueue_with(request, None, None).await
    }

    pub async fn enqueue_with_callback(&self, request: ChatRequest, on_complete: OnCompleteFn) -> String {
        self.enqueue_with(request, None, Some(on_complete)).await
    }

    /// Queue a request that just failed once. The id is made unique within
    /// the store by rehashing on collision.
    pub async fn enqueue_with(
        &self,
        request: ChatRequest,
        last_error: Option<String>,
        on_complete: Option<OnCompleteFn>,
    ) -> String {
        let created_at = Utc::now();
        let (id, pending) = self
            .mutate(|queue| {
                let mut id = task_id(&request, &created_at);
                let mut salt = 0u32;
                while queue.tasks.iter().any(|t| t.id == id) {
                    salt += 1;
                    id = hash_id(&[id.as_str(), salt.to_string().as_str()]);
                }

                queue.tasks.push(PendingTask {
                    id: id.clone(),
                    request,
                    created_at,
                    attempts: 1,
                    last_error,
                    on_complete,
                });
                (id, queue.tasks.len())
            })
            .await;
        info!(task_id = %id, pending, "request queued for retry");
        id
    }

    pub async fn count(&self) -> usize {
        self.read(|queue| queue.tasks.len()).await
    }

    /// Snapshot in creation order.
    pub async fn list(&self) -> Vec<PendingTask> {
        self.read(|queue| queue.tasks.clone()).await
    }

    pub async fn get(&self, id: &str) -> Option<PendingTask> {
        self.read(|queue| queue.tasks.iter().find(|t| t.id == id).cloned())
            .await
    }

    // ─────────────────────────────────────────
    // Replay
    // ─────────────────────────────────────────

    /// Replay every task once through `controller`, in creation order.
    ///
    /// Only one sweep runs at a time, across processes sharing the store
    /// file too; a concurrent call waits for the first. The queue is not
    /// locked across network calls, so new failures can be enqueued
    /// mid-sweep (they are picked up by the next sweep).
    pub async fn retry_all(&self, controller: &FailoverController) -> Vec<RetryOutcome> {
        let _sweep = self.sweep.lock().await;
        let _sweep_file = self.lock_file(SWEEP_LOCK_SUFFIX).await;

        let max = self.max_retries;
        let (expired, snapshot) = self
            .mutate(|queue| {
                let (expired, live): (Vec<_>, Vec<_>) =
                    queue.tasks.drain(..).partition(|t| t.attempts >= max);
                queue.tasks = live;
                (expired, queue.tasks.clone())
            })
            .await;

        let mut outcomes: Vec<RetryOutcome> = expired
            .into_iter()
            .map(|task| {
                warn!(task_id = %task.id, attempts = task.attempts, "dropping pending task, retry budget spent");
                RetryOutcome::Dropped {
                    error: task.last_error.unwrap_or_default(),
                    task_id: task.id,
                    attempts: task.attempts,
                }
            })
            .collect();

        if snapshot.is_empty() {
            return outcomes;
        }
        info!(tasks = snapshot.len(), "retrying pending tasks");

        for task in snapshot {
            let result = controller.dispatch(&task.request).await;
            let outcome = match result {
                Ok(response) => self.complete(task, response).await,
                Err(e) => self.record_retry_failure(&task.id, failure_text(&e)).await,
            };
            if let Some(outcome) = outcome {
                outcomes.push(outcome);
            }
        }

        outcomes
    }

    async fn complete(&self, task: PendingTask, response: ChatResponse) -> Option<RetryOutcome> {
        self.mutate(|queue| queue.tasks.retain(|t| t.id != task.id))
            .await;
        info!(task_id = %task.id, provider = %response.provider, "pending task delivered");

        if let Some(callback) = &task.on_complete {
            if let Err(e) = callback(response.clone()).await {
                error!(task_id = %task.id, error = %e, "pending task callback failed");
            }
        }

        Some(RetryOutcome::Success {
            task_id: task.id,
            response,
        })
    }

    async fn record_retry_failure(&self, id: &str, error: String) -> Option<RetryOutcome> {
        let max = self.max_retries;
        self.mutate(|queue| {
            let index = queue.tasks.iter().position(|t| t.id == id)?;

            let task = &mut queue.tasks[index];
            task.attempts += 1;
            task.last_error = Some(error.clone());
            let attempts = task.attempts;

            if attempts >= max {
                queue.tasks.remove(index);
                warn!(task_id = %id, attempts, error = %error, "pending task dropped after final retry");
                Some(RetryOutcome::Dropped {
                    task_id: id.to_string(),
                    error,
                    attempts,
                })
            } else {
                debug!(task_id = %id, attempts, "pending task still failing");
                Some(RetryOutcome::Failed {
                    task_id: id.to_string(),
                    error,
                    attempts,
                })
            }
        })
        .await
    }
}

fn failure_text(e: &RouterError) -> String {
    match e {
        RouterError::AllFailed { last_error } => last_error.clone(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::FailoverPolicy;
    use crate::provider::Provider;
    use crate::registry::ProviderRegistry;
    use crate::testing::{Behaviour, ScriptedExecutor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use switchboard_core::types::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(vec![Message::user(text)])
    }

    fn controller(
        executor: Arc<ScriptedExecutor>,
        store: Arc<PendingTaskStore>,
    ) -> FailoverController {
        let registry = Arc::new(ProviderRegistry::new(vec![Provider::new(
            "a",
            "http://localhost",
            "k",
            vec!["m".into()],
            1,
        )]));
        let policy = FailoverPolicy {
            max_attempts_per_provider: 1,
            retry_delay: Duration::from_millis(0),
            ..FailoverPolicy::default()
        };
        FailoverController::new(registry, executor, store, policy)
    }

    #[test]
    fn test_task_id_shape() {
        let now = Utc::now();
        let id = task_id(&request("hello"), &now);
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, task_id(&request("hello"), &now));
        assert_ne!(id, task_id(&request("other"), &now));
    }

    #[test]
    fn test_task_id_uses_content_prefix() {
        let now = Utc::now();
        let a = "x".repeat(50);
        let b = format!("{a}yyyy");
        assert_eq!(task_id(&request(&a), &now), task_id(&request(&b), &now));
    }

    #[test]
    fn test_task_id_empty_request() {
        let id = task_id(&ChatRequest::new(vec![]), &Utc::now());
        assert_eq!(id.len(), 12);
    }

    #[tokio::test]
    async fn test_enqueue_starts_at_one() {
        let store = PendingTaskStore::in_memory();
        let id = store.enqueue(request("hi")).await;
        assert_eq!(store.count().await, 1);
        let task = store.get(&id).await.unwrap();
        assert_eq!(task.attempts, 1);
        assert!(task.on_complete.is_none());
    }

    #[tokio::test]
    async fn test_identical_requests_get_distinct_ids() {
        let store = PendingTaskStore::in_memory();
        let a = store.enqueue(request("same")).await;
        let b = store.enqueue(request("same")).await;
        assert_ne!(a, b);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_retry_success_removes_and_calls_back() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);
        let store = Arc::new(PendingTaskStore::in_memory());
        let controller = controller(executor, store.clone());

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let callback = on_complete(move |response| {
            let seen = seen.clone();
            async move {
                assert_eq!(response.content, "ok from a");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let id = store.enqueue_with_callback(request("hi"), callback).await;

        let outcomes = store.retry_all(&controller).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[0].task_id(), id);
        assert_eq!(store.count().await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_error_does_not_fail_retry() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);
        let store = Arc::new(PendingTaskStore::in_memory());
        let controller = controller(executor, store.clone());

        let callback = on_complete(|_| async { Err(anyhow::anyhow!("chat went away")) });
        store.enqueue_with_callback(request("hi"), callback).await;

        let outcomes = store.retry_all(&controller).await;
        assert!(outcomes[0].is_success());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_task_dropped_after_max_retries() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Fail);
        let store = Arc::new(PendingTaskStore::in_memory());
        let controller = controller(executor, store.clone());
        let id = store.enqueue(request("hi")).await;

        let first = store.retry_all(&controller).await;
        assert!(matches!(
            &first[0],
            RetryOutcome::Failed { attempts: 2, error, .. } if error.contains("a is down")
        ));
        assert_eq!(store.get(&id).await.unwrap().attempts, 2);

        let second = store.retry_all(&controller).await;
        assert!(matches!(&second[0], RetryOutcome::Dropped { attempts: 3, .. }));
        assert_eq!(store.count().await, 0);

        assert!(store.retry_all(&controller).await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_failure_does_not_enqueue_duplicates() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Fail);
        let store = Arc::new(PendingTaskStore::in_memory());
        let controller = controller(executor, store.clone());
        store.enqueue(request("hi")).await;

        store.retry_all(&controller).await;
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_retry_in_creation_order() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::script(&[true, false, true]));
        let store = Arc::new(PendingTaskStore::in_memory());
        let controller = controller(executor, store.clone());

        let first = store.enqueue(request("first")).await;
        let second = store.enqueue(request("second")).await;
        let third = store.enqueue(request("third")).await;

        let outcomes = store.retry_all(&controller).await;
        let ids: Vec<&str> = outcomes.iter().map(RetryOutcome::task_id).collect();
        assert_eq!(ids, [first.as_str(), second.as_str(), third.as_str()]);
        assert!(outcomes[0].is_success());
        assert!(matches!(outcomes[1], RetryOutcome::Failed { .. }));
        assert!(outcomes[2].is_success());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pending.json");

        let store = PendingTaskStore::new(3, Some(path.clone()));
        let id = store
            .enqueue_with(request("persist me"), Some("HTTP 500".into()), None)
            .await;
        assert!(path.exists());

        let reopened = PendingTaskStore::new(3, Some(path.clone()));
        assert_eq!(reopened.load().await.unwrap(), 1);
        let task = reopened.get(&id).await.unwrap();
        assert_eq!(task.request.first_content(), "persist me");
        assert_eq!(task.last_error.as_deref(), Some("HTTP 500"));
        assert_eq!(task.attempts, 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json["tasks"][0].get("createdAt").is_some());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingTaskStore::new(3, Some(dir.path().join("none.json")));
        assert_eq!(store.load().await.unwrap(), 0);
        assert_eq!(PendingTaskStore::in_memory().load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = PendingTaskStore::new(3, Some(path));
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_loaded_task_over_budget_is_dropped_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        {
            let store = PendingTaskStore::new(5, Some(path.clone()));
            let id = store.enqueue(request("old")).await;
            let mut queue = store.queue.lock().await;
            queue.tasks[0].attempts = 4;
            store.persist(&queue).await;
            drop(queue);
            assert_eq!(store.get(&id).await.unwrap().attempts, 4);
        }

        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);
        let store = Arc::new(PendingTaskStore::new(3, Some(path)));
        store.load().await.unwrap();
        let controller = controller(executor.clone(), store.clone());

        let outcomes = store.retry_all(&controller).await;
        assert!(matches!(outcomes[0], RetryOutcome::Dropped { attempts: 4, .. }));
        assert_eq!(executor.calls().len(), 0);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_do_not_double_process() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);
        let store = Arc::new(PendingTaskStore::in_memory());
        let controller = Arc::new(controller(executor.clone(), store.clone()));
        store.enqueue(request("once")).await;

        let (s1, c1) = (store.clone(), controller.clone());
        let (s2, c2) = (store.clone(), controller.clone());
        let (a, b) = tokio::join!(
            tokio::spawn(async move { s1.retry_all(&c1).await }),
            tokio::spawn(async move { s2.retry_all(&c2).await }),
        );
        let total = a.unwrap().len() + b.unwrap().len();
        assert_eq!(total, 1);
        assert_eq!(executor.calls_to("a"), 1);
    }

    #[tokio::test]
    async fn test_load_twice_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        PendingTaskStore::new(3, Some(path.clone()))
            .enqueue(request("only once"))
            .await;

        let store = PendingTaskStore::new(3, Some(path));
        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(store.load().await.unwrap(), 0);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_load_keeps_memory_only_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let on_disk = PendingTaskStore::new(3, Some(path.clone()))
            .enqueue(request("from disk"))
            .await;

        // Queued before the file was loaded; still goes to disk.
        let store = PendingTaskStore::new(3, None);
        let local = store.enqueue(request("local")).await;
        let store = PendingTaskStore {
            path: Some(path.clone()),
            ..store
        };
        assert_eq!(store.load().await.unwrap(), 1);

        let ids: Vec<String> = store.list().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, [on_disk.clone(), local.clone()]);

        let reopened = PendingTaskStore::new(3, Some(path));
        assert_eq!(reopened.load().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stores_sharing_a_file_keep_each_others_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        // A long-lived store loads first, then a second one writes behind it.
        let long_lived = PendingTaskStore::new(3, Some(path.clone()));
        long_lived.load().await.unwrap();
        let short_lived = PendingTaskStore::new(3, Some(path.clone()));
        let from_short = short_lived.enqueue(request("from chat")).await;
        let from_long = long_lived.enqueue(request("from serve")).await;

        assert_eq!(long_lived.count().await, 2);
        assert!(long_lived.get(&from_short).await.is_some());
        assert_eq!(short_lived.count().await, 2);

        let reopened = PendingTaskStore::new(3, Some(path));
        assert_eq!(reopened.load().await.unwrap(), 2);
        assert!(reopened.get(&from_short).await.is_some());
        assert!(reopened.get(&from_long).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_replays_task_queued_by_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);

        let sweeper = Arc::new(PendingTaskStore::new(3, Some(path.clone())));
        sweeper.load().await.unwrap();
        let controller = controller(executor.clone(), sweeper.clone());

        let other = PendingTaskStore::new(3, Some(path));
        let id = other.enqueue(request("queued elsewhere")).await;

        let outcomes = sweeper.retry_all(&controller).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].task_id(), id);
        assert!(outcomes[0].is_success());
        assert_eq!(other.count().await, 0);
    }

    #[tokio::test]
    async fn test_callback_survives_writes_from_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);

        let store = Arc::new(PendingTaskStore::new(3, Some(path.clone())));
        let controller = controller(executor, store.clone());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let callback = on_complete(move |_response| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        store
            .enqueue_with_callback(request("with callback"), callback)
            .await;
        PendingTaskStore::new(3, Some(path))
            .enqueue(request("without"))
            .await;

        let outcomes = store.retry_all(&controller).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweeps_from_two_stores_on_one_file_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on_chat("a", Behaviour::Succeed);

        let first = Arc::new(PendingTaskStore::new(3, Some(path.clone())));
        let second = Arc::new(PendingTaskStore::new(3, Some(path)));
        let c1 = Arc::new(controller(executor.clone(), first.clone()));
        let c2 = Arc::new(controller(executor.clone(), second.clone()));
        first.enqueue(request("once")).await;

        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.retry_all(&c1).await }),
            tokio::spawn(async move { second.retry_all(&c2).await }),
        );
        let total = a.unwrap().len() + b.unwrap().len();
        assert_eq!(total, 1);
        assert_eq!(executor.calls_to("a"), 1);
    }
}
