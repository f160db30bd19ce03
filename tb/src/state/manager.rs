//! StateManager - actor that owns the board snapshot
//!
//! Mutations are sent as commands over a channel and applied one at a time by
//! a single actor task. For each mutation the actor updates the shared
//! snapshot, saves the whole snapshot through the [`KvStore`], notifies
//! listeners and only then replies. Saves therefore never overlap, and the
//! next command is not taken until the previous save has finished.
//!
//! Reads go straight to the shared snapshot, so they see a mutation as soon
//! as it is applied in memory, even while its save is still in flight.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use kvstore::{KvError, KvStore, KvStoreExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::domain::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskStatus};

use super::listeners::{ListenerRegistry, Subscription};
use super::messages::{StateCommand, StateError, StateResponse};
use super::snapshot::{Snapshot, TaskBuckets, TaskMove};

/// Key holding the project list
pub const PROJECTS_KEY: &str = "projects";

/// Key holding the three task buckets
pub const TASKS_KEY: &str = "tasks";

/// Command channel depth
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Event channel depth
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Durability events broadcast by the actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Initial load finished and listeners were notified
    Loaded { projects: usize, tasks: usize },
    /// Initial load failed; the board starts empty
    LoadFailed { error: String },
    /// A mutation was saved
    Saved,
    /// A mutation was applied in memory but could not be saved
    SaveFailed { key: &'static str, error: String },
}

/// Outcome of the initial load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    /// The board started empty because the persisted state could not be read
    Failed(String),
}

impl LoadState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    snapshot: Arc<RwLock<Snapshot>>,
    listeners: Arc<ListenerRegistry>,
    /// Broadcast sender for durability notifications
    event_tx: broadcast::Sender<StateEvent>,
    load_rx: watch::Receiver<LoadState>,
}

impl StateManager {
    /// Spawn a new StateManager actor over `store`
    ///
    /// The board starts empty; loading the persisted state begins immediately
    /// in the actor. Commands sent before the load finishes are applied after
    /// it. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn KvStore>) -> Self {
        debug!("spawn: called");
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (load_tx, load_rx) = watch::channel(LoadState::Pending);

        let snapshot = Arc::new(RwLock::new(Snapshot::default()));
        let listeners = Arc::new(ListenerRegistry::default());

        let actor = Actor {
            store,
            snapshot: Arc::clone(&snapshot),
            listeners: Arc::clone(&listeners),
            event_tx: event_tx.clone(),
        };
        tokio::spawn(actor_loop(actor, rx, load_tx));

        info!("StateManager spawned");

        Self {
            tx,
            snapshot,
            listeners,
            event_tx,
            load_rx,
        }
    }

    // === Reads ===

    /// Copy of the current in-memory snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run `f` against the current snapshot without copying it
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.with_snapshot(|s| s.project(id).cloned())
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.with_snapshot(|s| s.task(id).cloned())
    }

    /// Whether the initial load has finished (successfully or not)
    pub fn is_loaded(&self) -> bool {
        self.load_rx.borrow().is_finished()
    }

    /// Current state of the initial load
    pub fn load_state(&self) -> LoadState {
        self.load_rx.borrow().clone()
    }

    /// Why the initial load failed, if it did
    ///
    /// After a failed load the in-memory board is empty; saving it would
    /// overwrite whatever is still persisted.
    pub fn load_error(&self) -> Option<String> {
        match &*self.load_rx.borrow() {
            LoadState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Wait until the initial load has finished
    pub async fn wait_loaded(&self) -> StateResponse<()> {
        debug!("wait_loaded: called");
        let mut rx = self.load_rx.clone();
        rx.wait_for(LoadState::is_finished)
            .await
            .map_err(|_| StateError::LoadAborted)?;
        Ok(())
    }

    // === Subscriptions ===

    /// Register `listener` to be called with the snapshot after every change
    ///
    /// The listener is not called immediately; the first call happens after
    /// the initial load or the next applied mutation, whichever comes first.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        debug!(listener_id = id, "subscribe: registered listener");
        Subscription::new(id, &self.listeners)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Subscribe to load/save events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    // === Project operations ===

    /// Create a project and return it
    pub async fn add_project(&self, project: NewProject) -> StateResponse<Project> {
        debug!(name = %project.name, "add_project: called");
        self.request(|reply| StateCommand::AddProject { project, reply }).await
    }

    /// Shallow-merge `patch` into a project; `None` if no project has `id`
    pub async fn update_project(&self, id: &str, patch: ProjectPatch) -> StateResponse<Option<Project>> {
        debug!(%id, ?patch, "update_project: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::UpdateProject { id, patch, reply }).await
    }

    /// Delete a project; false if no project has `id`
    pub async fn delete_project(&self, id: &str) -> StateResponse<bool> {
        debug!(%id, "delete_project: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::DeleteProject { id, reply }).await
    }

    // === Task operations ===

    /// Create a task and return it
    pub async fn add_task(&self, task: NewTask) -> StateResponse<Task> {
        debug!(title = %task.title, "add_task: called");
        self.request(|reply| StateCommand::AddTask { task, reply }).await
    }

    /// Shallow-merge `patch` into a task; `None` if no task has `id`
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> StateResponse<Option<Task>> {
        debug!(%id, ?patch, "update_task: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::UpdateTask { id, patch, reply }).await
    }

    /// Move a task from `from` to the end of `to`
    pub async fn move_task(&self, id: &str, from: TaskStatus, to: TaskStatus) -> StateResponse<bool> {
        self.move_task_to(id, from, to, None).await
    }

    /// Move a task from `from` to position `index` of `to` (`None` appends)
    pub async fn move_task_to(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        index: Option<usize>,
    ) -> StateResponse<bool> {
        debug!(%id, %from, %to, ?index, "move_task_to: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::MoveTask {
            id,
            from,
            to,
            index,
            reply,
        })
        .await
    }

    /// Apply a drag-and-drop reorder gesture
    pub async fn reorder(&self, mv: TaskMove) -> StateResponse<bool> {
        debug!(?mv, "reorder: called");
        self.request(|reply| StateCommand::Reorder { mv, reply }).await
    }

    /// Delete a task from whichever bucket holds it
    pub async fn delete_task(&self, id: &str) -> StateResponse<bool> {
        debug!(%id, "delete_task: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::DeleteTask { id, reply }).await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }
}

/// State owned by the actor task
struct Actor {
    store: Arc<dyn KvStore>,
    snapshot: Arc<RwLock<Snapshot>>,
    listeners: Arc<ListenerRegistry>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl Actor {
    /// Apply `f` to the shared snapshot under the write lock
    fn write<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn current(&self) -> Snapshot {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn emit(&self, event: StateEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Read the persisted board and replace the empty default with it
    async fn load(&self) -> LoadState {
        debug!("load: called");
        match self.read_persisted().await {
            Ok(mut loaded) => {
                let repaired = loaded.normalize();
                if repaired > 0 {
                    warn!(repaired, "Loaded tasks whose status did not match their bucket");
                }
                let projects = loaded.projects.len();
                let tasks = loaded.tasks.len();
                self.write(|s| *s = loaded);
                info!(projects, tasks, "Loaded board state");

                let current = self.current();
                self.listeners.notify(&current);
                self.emit(StateEvent::Loaded { projects, tasks });
                LoadState::Loaded
            }
            Err(e) => {
                error!(error = %e, "Failed to load board state, starting empty");
                self.emit(StateEvent::LoadFailed { error: e.to_string() });
                LoadState::Failed(e.to_string())
            }
        }
    }

    async fn read_persisted(&self) -> Result<Snapshot, KvError> {
        let projects: Vec<Project> = self.store.get_as(PROJECTS_KEY).await?.unwrap_or_default();
        let tasks: TaskBuckets = self.store.get_as(TASKS_KEY).await?.unwrap_or_default();
        Ok(Snapshot::new(projects, tasks))
    }

    /// Save the current snapshot, then notify listeners
    ///
    /// A failed save is logged and broadcast; the in-memory change stands and
    /// listeners are still notified.
    async fn commit(&self, op: &'static str) {
        let current = self.current();

        match self.save(&current).await {
            Ok(()) => {
                debug!(op, "commit: saved");
                self.emit(StateEvent::Saved);
            }
            Err((key, e)) => {
                error!(op, key, error = %e, "Failed to save board state");
                self.emit(StateEvent::SaveFailed {
                    key,
                    error: e.to_string(),
                });
            }
        }

        let delivered = self.listeners.notify(&current);
        debug!(op, delivered, "commit: listeners notified");
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), (&'static str, KvError)> {
        self.store
            .set_as(PROJECTS_KEY, &snapshot.projects)
            .await
            .map_err(|e| (PROJECTS_KEY, e))?;
        self.store
            .set_as(TASKS_KEY, &snapshot.tasks)
            .await
            .map_err(|e| (TASKS_KEY, e))
    }
}

/// The actor loop that owns all writes and processes commands
async fn actor_loop(actor: Actor, mut rx: mpsc::Receiver<StateCommand>, load_tx: watch::Sender<LoadState>) {
    debug!("StateManager actor started");

    let outcome = actor.load().await;
    let _ = load_tx.send(outcome);

    while let Some(cmd) = rx.recv().await {
        match cmd {
            // Project operations
            StateCommand::AddProject { project, reply } => {
                debug!(name = %project.name, "actor_loop: AddProject command");
                let created = actor.write(|s| s.add_project(project, Utc::now()));
                actor.commit("add_project").await;
                let _ = reply.send(created);
            }

            StateCommand::UpdateProject { id, patch, reply } => {
                debug!(%id, "actor_loop: UpdateProject command");
                let updated = actor.write(|s| s.update_project(&id, &patch, Utc::now()));
                if updated.is_some() {
                    actor.commit("update_project").await;
                }
                let _ = reply.send(updated);
            }

            StateCommand::DeleteProject { id, reply } => {
                debug!(%id, "actor_loop: DeleteProject command");
                let removed = actor.write(|s| s.delete_project(&id));
                if removed {
                    actor.commit("delete_project").await;
                }
                let _ = reply.send(removed);
            }

            // Task operations
            StateCommand::AddTask { task, reply } => {
                debug!(title = %task.title, "actor_loop: AddTask command");
                let created = actor.write(|s| s.add_task(task, Utc::now()));
                actor.commit("add_task").await;
                let _ = reply.send(created);
            }

            StateCommand::UpdateTask { id, patch, reply } => {
                debug!(%id, "actor_loop: UpdateTask command");
                let updated = actor.write(|s| s.update_task(&id, &patch));
                if updated.is_some() {
                    actor.commit("update_task").await;
                }
                let _ = reply.send(updated);
            }

            StateCommand::MoveTask {
                id,
                from,
                to,
                index,
                reply,
            } => {
                debug!(%id, %from, %to, ?index, "actor_loop: MoveTask command");
                let moved = actor.write(|s| s.move_task(&id, from, to, index));
                if moved {
                    actor.commit("move_task").await;
                }
                let _ = reply.send(moved);
            }

            StateCommand::Reorder { mv, reply } => {
                debug!(?mv, "actor_loop: Reorder command");
                let moved = actor.write(|s| s.reorder(mv));
                if moved {
                    actor.commit("reorder").await;
                }
                let _ = reply.send(moved);
            }

            StateCommand::DeleteTask { id, reply } => {
                debug!(%id, "actor_loop: DeleteTask command");
                let removed = actor.write(|s| s.delete_task(&id));
                if removed {
                    actor.commit("delete_task").await;
                }
                let _ = reply.send(removed);
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kvstore::MemoryStore;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// MemoryStore wrapper with failure injection and an optional write gate
    #[derive(Default)]
    struct TestStore {
        inner: MemoryStore,
        fail_get: AtomicBool,
        fail_set: AtomicBool,
        sets: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl KvStore for TestStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(KvError::Unavailable("get disabled".to_string()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), KvError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(KvError::Unavailable("set disabled".to_string()));
            }
            self.inner.set(key, value).await
        }
    }

    fn persisted_doc() -> Vec<(&'static str, Value)> {
        vec![
            (
                PROJECTS_KEY,
                json!([{
                    "id": "proj-aaaaaaaaaaaa",
                    "name": "Existing",
                    "type": "web",
                    "description": "",
                    "status": "not_started",
                    "tasks": [],
                    "createdAt": "2024-01-01T00:00:00Z",
                    "updatedAt": "2024-01-02T00:00:00Z"
                }]),
            ),
            (
                TASKS_KEY,
                json!({
                    "todo": [{
                        "id": "task-bbbbbbbbbbbb",
                        "title": "Loaded task",
                        "description": "",
                        "priority": "high",
                        "status": "todo",
                        "createdAt": "2024-01-01T00:00:00Z"
                    }],
                    "inProgress": [],
                    "completed": []
                }),
            ),
        ]
    }

    async fn spawn_loaded(store: Arc<TestStore>) -> StateManager {
        let manager = StateManager::spawn(store);
        manager.wait_loaded().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_subscriber_before_load_sees_loaded_snapshot_once() {
        let store = Arc::new(TestStore {
            inner: MemoryStore::with_entries(persisted_doc()),
            ..Default::default()
        });
        let manager = StateManager::spawn(store);

        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _sub = manager.subscribe(move |s| sink.lock().unwrap().push(s.clone()));

        manager.wait_loaded().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].projects.len(), 1);
        assert_eq!(seen[0].tasks.todo[0].title, "Loaded task");
        assert_eq!(manager.snapshot(), seen[0]);
    }

    #[tokio::test]
    async fn test_load_with_nothing_persisted() {
        let manager = spawn_loaded(Arc::new(TestStore::default())).await;
        assert!(manager.is_loaded());
        assert_eq!(manager.load_state(), LoadState::Loaded);
        assert!(manager.load_error().is_none());
        assert_eq!(manager.snapshot(), Snapshot::default());
    }

    #[tokio::test]
    async fn test_load_failure_leaves_empty_board() {
        let store = Arc::new(TestStore {
            inner: MemoryStore::with_entries(persisted_doc()),
            fail_get: AtomicBool::new(true),
            ..Default::default()
        });
        let manager = StateManager::spawn(store);
        let mut events = manager.subscribe_events();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.wait_loaded().await.unwrap();

        assert_eq!(manager.snapshot(), Snapshot::default());
        assert_eq!(manager.load_error().as_deref(), Some("Store unavailable: get disabled"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(events.try_recv().unwrap(), StateEvent::LoadFailed { .. }));

        // Still usable
        manager.add_task(NewTask::new("after failure")).await.unwrap();
        assert_eq!(manager.snapshot().tasks.todo.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_document_counts_as_load_failure() {
        let store = Arc::new(TestStore {
            inner: MemoryStore::with_entries([(PROJECTS_KEY, json!("not a list"))]),
            ..Default::default()
        });
        let manager = StateManager::spawn(store);
        let mut events = manager.subscribe_events();
        manager.wait_loaded().await.unwrap();

        assert!(manager.snapshot().projects.is_empty());
        assert!(matches!(manager.load_state(), LoadState::Failed(_)));
        assert!(matches!(events.try_recv().unwrap(), StateEvent::LoadFailed { .. }));
    }

    #[tokio::test]
    async fn test_add_project_persists_then_notifies() {
        let store = Arc::new(TestStore::default());
        let manager = spawn_loaded(Arc::clone(&store)).await;

        let probe = Arc::clone(&store);
        let sets_at_notify: Arc<Mutex<Vec<usize>>> = Arc::default();
        let sink = Arc::clone(&sets_at_notify);
        let _sub = manager.subscribe(move |_| {
            sink.lock().unwrap().push(probe.sets.load(Ordering::SeqCst));
        });

        let project = manager.add_project(NewProject::new("X")).await.unwrap();

        // Both keys were written before listeners ran
        assert_eq!(*sets_at_notify.lock().unwrap(), vec![2]);
        let persisted = store.inner.get(PROJECTS_KEY).await.unwrap().unwrap();
        assert_eq!(persisted[0]["id"], json!(project.id));
        assert_eq!(persisted[0]["name"], json!("X"));
    }

    #[tokio::test]
    async fn test_save_failure_keeps_change_and_still_notifies() {
        let store = Arc::new(TestStore {
            fail_set: AtomicBool::new(true),
            ..Default::default()
        });
        let manager = spawn_loaded(Arc::clone(&store)).await;
        let mut events = manager.subscribe_events();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let task = manager.add_task(NewTask::new("unsaved")).await.unwrap();

        assert_eq!(manager.task(&task.id), Some(task));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            StateEvent::SaveFailed {
                key: PROJECTS_KEY,
                error: "Store unavailable: set disabled".to_string(),
            }
        );
        assert!(store.inner.get(TASKS_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_noop_mutations_skip_save_and_notify() {
        let store = Arc::new(TestStore::default());
        let manager = spawn_loaded(Arc::clone(&store)).await;
        manager.add_task(NewTask::new("only")).await.unwrap();
        let sets_before = store.sets.load(Ordering::SeqCst);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let before = manager.snapshot();

        assert!(!manager.delete_task("task-000000000000").await.unwrap());
        assert!(!manager.delete_project("proj-000000000000").await.unwrap());
        assert!(manager.update_task("missing", TaskPatch::new()).await.unwrap().is_none());
        assert!(
            manager
                .update_project("missing", ProjectPatch::new())
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            !manager
                .move_task("missing", TaskStatus::Todo, TaskStatus::Completed)
                .await
                .unwrap()
        );
        assert!(
            !manager
                .reorder(TaskMove {
                    source: TaskStatus::Todo,
                    source_index: 0,
                    destination: TaskStatus::Todo,
                    destination_index: 0,
                })
                .await
                .unwrap()
        );

        assert_eq!(manager.snapshot(), before);
        assert_eq!(store.sets.load(Ordering::SeqCst), sets_before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reads_see_mutation_while_save_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(TestStore {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let manager = spawn_loaded(Arc::clone(&store)).await;

        let writer = manager.clone();
        let pending = tokio::spawn(async move { writer.add_task(NewTask::new("in flight")).await });

        // Wait until the actor has applied the change and is blocked on the save
        for _ in 0..100 {
            if !manager.snapshot().tasks.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(manager.snapshot().tasks.todo[0].title, "in flight");
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
        assert!(!pending.is_finished());

        gate.add_permits(2);
        let task = pending.await.unwrap().unwrap();
        assert_eq!(task.title, "in flight");
        assert_eq!(store.sets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_back_to_back_mutations_persist_final_state() {
        let store = Arc::new(TestStore::default());
        let manager = spawn_loaded(Arc::clone(&store)).await;

        let (a, b, c) = tokio::join!(
            manager.add_task(NewTask::new("a")),
            manager.add_task(NewTask::new("b")),
            manager.add_task(NewTask::new("c")),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        let (_, _) = tokio::join!(
            manager.move_task(&a.id, TaskStatus::Todo, TaskStatus::Completed),
            manager.delete_task(&b.id),
        );

        let persisted: TaskBuckets = store.get_as(TASKS_KEY).await.unwrap().unwrap();
        assert_eq!(persisted, manager.snapshot().tasks);
        assert_eq!(persisted.todo.len(), 1);
        assert_eq!(persisted.todo[0].id, c.id);
        assert_eq!(persisted.completed[0].id, a.id);
    }

    #[tokio::test]
    async fn test_update_task_status_goes_through_move() {
        let manager = spawn_loaded(Arc::new(TestStore::default())).await;
        let a = manager.add_task(NewTask::new("a")).await.unwrap();
        manager.add_task(NewTask::new("b")).await.unwrap();

        let updated = manager
            .update_task(&a.id, TaskPatch::new().with_status(TaskStatus::Completed))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Completed);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.tasks.locate(&a.id), Some((TaskStatus::Completed, 0)));
        assert_eq!(snapshot.tasks.todo.len(), 1);
        snapshot.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let manager = spawn_loaded(Arc::new(TestStore::default())).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.add_project(NewProject::new("one")).await.unwrap();
        sub.unsubscribe();
        manager.add_project(NewProject::new("two")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let manager = spawn_loaded(Arc::new(TestStore::default())).await;
        manager.shutdown().await.unwrap();
        tokio::task::yield_now().await;

        let result = manager.add_task(NewTask::new("late")).await;
        assert!(matches!(result, Err(StateError::ChannelError)));
    }

    #[tokio::test]
    async fn test_saved_event_per_mutation() {
        let manager = spawn_loaded(Arc::new(TestStore::default())).await;
        let mut events = manager.subscribe_events();

        manager.add_project(NewProject::new("p")).await.unwrap();
        assert_eq!(events.try_recv().unwrap(), StateEvent::Saved);
        assert!(events.try_recv().is_err());
    }
}
