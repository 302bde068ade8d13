use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tasklane_core::dashboard::Dashboard;
use tasklane_core::error::TaskError;
use tasklane_core::gateway::TaskGateway;
use tasklane_core::mutation::{DeleteOutcome, MutationCoordinator};
use tasklane_core::session::{Session, SessionRecord};
use tasklane_core::view::{FetchOutcome, ViewQuery, ViewStore};
use tasklane_shared::{
    SortKey, StatusFilter, TaskCreate, TaskDto, TaskPatch, TasksListArgs,
};
use tempfile::{TempDir, tempdir};
use uuid::Uuid;

/// In-memory task service that filters and sorts like the real one and
/// records every call it receives.
#[derive(Default)]
struct RecordingGateway {
    tasks: Mutex<Vec<TaskDto>>,
    list_calls: Mutex<Vec<TasksListArgs>>,
    create_calls: Mutex<Vec<TaskCreate>>,
    delete_calls: Mutex<Vec<Uuid>>,
    next_failure: Mutex<Option<TaskError>>,
    clock: Mutex<u32>,
}

impl RecordingGateway {
    fn seeded(titles: &[(&str, bool)]) -> Arc<Self> {
        let gateway = Arc::new(Self::default());
        for (title, completed) in titles {
            let mut task = gateway.make_task(title, None);
            task.completed = *completed;
            gateway.tasks.lock().push(task);
        }
        gateway
    }

    fn make_task(&self, title: &str, description: Option<String>) -> TaskDto {
        let stamp = self.stamp();
        TaskDto {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: title.to_string(),
            description,
            completed: false,
            created_at: stamp.clone(),
            updated_at: stamp,
        }
    }

    fn stamp(&self) -> String {
        let mut clock = self.clock.lock();
        *clock += 1;
        format!("2025-01-01T00:00:{:02}", *clock)
    }

    fn fail_next(&self, err: TaskError) {
        *self.next_failure.lock() = Some(err);
    }

    fn take_failure(&self) -> Result<(), TaskError> {
        match self.next_failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn list_calls(&self) -> Vec<TasksListArgs> {
        self.list_calls.lock().clone()
    }

    fn id_of(&self, title: &str) -> Uuid {
        self.tasks
            .lock()
            .iter()
            .find(|task| task.title == title)
            .map(|task| task.id)
            .expect("seeded task")
    }
}

#[async_trait]
impl TaskGateway for RecordingGateway {
    async fn list(&self, args: &TasksListArgs) -> Result<Vec<TaskDto>, TaskError> {
        self.list_calls.lock().push(args.clone());
        self.take_failure()?;

        let filter = args.filter.unwrap_or_default();
        let needle = args.search.clone().unwrap_or_default().to_lowercase();
        let mut tasks: Vec<TaskDto> = self
            .tasks
            .lock()
            .iter()
            .filter(|task| filter.admits(task.completed))
            .filter(|task| {
                needle.is_empty()
                    || task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();

        match args.sort_by.unwrap_or_default() {
            SortKey::Title => tasks.sort_by(|a, b| a.title.cmp(&b.title)),
            SortKey::UpdatedAt => tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            SortKey::CreatedAt => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        Ok(tasks)
    }

    async fn get(&self, id: Uuid) -> Result<TaskDto, TaskError> {
        self.take_failure()?;
        self.tasks
            .lock()
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound("Task not found".to_string()))
    }

    async fn create(&self, payload: &TaskCreate) -> Result<TaskDto, TaskError> {
        self.create_calls.lock().push(payload.clone());
        self.take_failure()?;
        let task = self.make_task(&payload.title, payload.description.clone());
        self.tasks.lock().push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<TaskDto, TaskError> {
        self.take_failure()?;
        let stamp = self.stamp();
        let mut tasks = self.tasks.lock();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound("Task not found".to_string()))?;
        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(description) = &patch.description {
            task.description = Some(description.clone());
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        task.updated_at = stamp;
        Ok(task.clone())
    }

    async fn toggle_complete(&self, id: Uuid) -> Result<TaskDto, TaskError> {
        self.take_failure()?;
        let stamp = self.stamp();
        let mut tasks = self.tasks.lock();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound("Task not found".to_string()))?;
        task.completed = !task.completed;
        task.updated_at = stamp;
        Ok(task.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        self.delete_calls.lock().push(id);
        self.take_failure()?;
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Err(TaskError::NotFound("Task not found".to_string()));
        }
        Ok(())
    }
}

fn signed_in() -> Arc<Session> {
    Session::in_memory(Some(SessionRecord {
        access_token: "token-abc".to_string(),
        user: None,
    }))
}

fn dashboard(gateway: &Arc<RecordingGateway>) -> Dashboard {
    let gateway: Arc<dyn TaskGateway> = gateway.clone();
    Dashboard::new(signed_in(), gateway, Duration::from_millis(300))
}

fn titles(dashboard: &Dashboard) -> Vec<String> {
    dashboard.tasks().iter().map(|t| t.title.clone()).collect()
}

#[tokio::test]
async fn filter_sort_and_search_reach_the_gateway_together() {
    let gateway = RecordingGateway::seeded(&[("Write report", true), ("Walk dog", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");

    dash.set_status_filter(StatusFilter::Completed)
        .await
        .expect("filter");
    dash.set_sort_key(SortKey::Title).await.expect("sort");

    let last = gateway.list_calls().pop().expect("list issued");
    assert_eq!(last.filter, Some(StatusFilter::Completed));
    assert_eq!(last.sort_by, Some(SortKey::Title));
    assert_eq!(last.search, None);
    assert_eq!(titles(&dash), vec!["Write report"]);
}

#[tokio::test]
async fn typing_settles_into_one_search_fetch() {
    let gateway = RecordingGateway::seeded(&[("abc task", false), ("other", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    let mounted_calls = gateway.list_calls().len();

    let t0 = Instant::now();
    dash.type_search("a", t0);
    dash.type_search("ab", t0 + Duration::from_millis(100));
    dash.type_search("abc", t0 + Duration::from_millis(200));
    assert_eq!(dash.raw_search(), "abc");

    let early = dash
        .tick(t0 + Duration::from_millis(450))
        .await
        .expect("tick");
    assert!(early.is_none());

    let settled = dash
        .tick(t0 + Duration::from_millis(500))
        .await
        .expect("tick");
    assert!(matches!(settled, Some(FetchOutcome::Applied { count: 1, .. })));

    let calls = gateway.list_calls();
    assert_eq!(calls.len(), mounted_calls + 1);
    assert_eq!(calls[mounted_calls].search.as_deref(), Some("abc"));
    assert_eq!(dash.query().search_text, "abc");
}

#[tokio::test]
async fn unmount_drops_pending_search() {
    let gateway = RecordingGateway::seeded(&[]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");

    let t0 = Instant::now();
    dash.type_search("late", t0);
    dash.unmount();

    let after = dash
        .tick(t0 + Duration::from_secs(1))
        .await
        .expect("tick");
    assert!(after.is_none());
    assert_eq!(gateway.list_calls().len(), 1);
}

#[tokio::test]
async fn toggle_flips_completion_after_refresh() {
    let gateway = RecordingGateway::seeded(&[("Pay rent", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    let id = gateway.id_of("Pay rent");
    let tick = dash.store().refresh_tick();

    let toggled = dash.toggle_complete(id).await.expect("toggle");
    assert!(toggled.value.completed);
    assert!(dash.tasks()[0].completed);
    assert_eq!(dash.store().refresh_tick(), tick + 1);
}

#[tokio::test]
async fn empty_title_never_reaches_the_gateway() {
    let gateway = RecordingGateway::seeded(&[]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");

    dash.open_create();
    dash.form_mut().set_title("   ");
    let err = dash.submit_form().await.expect_err("rejected");

    assert!(matches!(err, TaskError::ValidationFailure(_)));
    assert!(gateway.create_calls.lock().is_empty());
    assert!(dash.form().is_open());
}

#[tokio::test]
async fn declined_delete_changes_nothing() {
    let gateway = RecordingGateway::seeded(&[("Keep me", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    let id = gateway.id_of("Keep me");
    let list_calls = gateway.list_calls().len();

    let outcome = dash
        .delete(id, &|_: &str| false)
        .await
        .expect("delete");

    assert_eq!(outcome, DeleteOutcome::Declined);
    assert!(gateway.delete_calls.lock().is_empty());
    assert_eq!(gateway.list_calls().len(), list_calls);
    assert_eq!(titles(&dash), vec!["Keep me"]);
}

#[tokio::test]
async fn confirmed_delete_refreshes_without_the_task() {
    let gateway = RecordingGateway::seeded(&[("Drop me", false), ("Stay", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    let id = gateway.id_of("Drop me");

    let prompt = Mutex::new(String::new());
    let confirm = |text: &str| {
        *prompt.lock() = text.to_string();
        true
    };
    let outcome = dash.delete(id, &confirm).await.expect("delete");

    assert!(matches!(
        outcome,
        DeleteOutcome::Deleted(FetchOutcome::Applied { count: 1, .. })
    ));
    assert!(prompt.lock().contains("Drop me"));
    assert_eq!(titles(&dash), vec!["Stay"]);
}

#[tokio::test]
async fn completed_filter_with_no_matches_is_an_empty_list() {
    let gateway = RecordingGateway::seeded(&[("Open item", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");

    let outcome = dash
        .set_status_filter(StatusFilter::Completed)
        .await
        .expect("filter");

    assert!(matches!(outcome, Some(FetchOutcome::Applied { count: 0, .. })));
    assert!(dash.tasks().is_empty());
    assert!(dash.store().last_error().is_none());
}

#[tokio::test]
async fn created_task_closes_form_and_refetches_current_query() {
    let gateway = RecordingGateway::seeded(&[]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    dash.set_sort_key(SortKey::Title).await.expect("sort");

    dash.open_create();
    dash.form_mut().set_title("Buy milk");
    let saved = dash.submit_form().await.expect("create");

    assert_eq!(saved.value.title, "Buy milk");
    assert!(!dash.form().is_open());
    assert!(dash.form().buffer().is_none());
    assert_eq!(titles(&dash), vec!["Buy milk"]);

    let created = gateway.create_calls.lock().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].description, None);

    let last = gateway.list_calls().pop().expect("refresh");
    assert_eq!(last.sort_by, Some(SortKey::Title));
    assert_eq!(last.filter, Some(StatusFilter::All));
}

#[tokio::test]
async fn failed_update_keeps_buffer_and_collection() {
    let gateway = RecordingGateway::seeded(&[("Original", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    let id = gateway.id_of("Original");

    dash.open_edit(id).expect("open edit");
    dash.form_mut().set_title("Renamed");
    dash.form_mut().set_description("new notes");
    gateway.fail_next(TaskError::NetworkFailure("connection reset".to_string()));

    let err = dash.submit_form().await.expect_err("update fails");
    assert!(matches!(err, TaskError::NetworkFailure(_)));

    let buffer = dash.form().buffer().expect("still open");
    assert_eq!(buffer.title, "Renamed");
    assert_eq!(buffer.description, "new notes");
    assert_eq!(dash.form().error(), Some(&err));
    assert_eq!(titles(&dash), vec!["Original"]);
}

#[tokio::test]
async fn stale_responses_are_discarded() {
    let gateway = RecordingGateway::seeded(&[("b", true), ("a", false)]);
    let mut store = ViewStore::new();

    let first = store
        .set_status_filter(StatusFilter::Completed)
        .expect("changed");
    let second = store.set_sort_key(SortKey::Title).expect("changed");

    let newer = store.fetch(gateway.as_ref(), second).await;
    assert!(matches!(newer, FetchOutcome::Applied { count: 1, .. }));

    let older = store.fetch(gateway.as_ref(), first).await;
    assert!(matches!(older, FetchOutcome::Stale { .. }));
    assert_eq!(store.tasks()[0].title, "b");
    assert_eq!(store.query().sort_key, SortKey::Title);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_tasks() {
    let gateway = RecordingGateway::seeded(&[("Survivor", false)]);
    let gateway_dyn: Arc<dyn TaskGateway> = gateway.clone();
    let coordinator = MutationCoordinator::new(gateway_dyn);
    let mut store = ViewStore::with_query(ViewQuery::default());
    let ticket = store.mount();
    store.fetch(gateway.as_ref(), ticket).await;

    gateway.fail_next(TaskError::NetworkFailure("timeout".to_string()));
    let ticket = store
        .set_search_text("surv")
        .expect("changed");
    let outcome = store.fetch(gateway.as_ref(), ticket).await;

    assert!(outcome.error().is_some());
    assert_eq!(store.tasks().len(), 1);
    assert!(!store.is_loading());

    let id = gateway.id_of("Survivor");
    let toggled = coordinator
        .toggle_complete(&mut store, id)
        .await
        .expect("toggle");
    assert!(matches!(toggled.refresh, FetchOutcome::Applied { .. }));
    assert!(store.last_error().is_none());
}

#[tokio::test]
async fn unauthorized_tears_the_session_down() {
    let gateway = RecordingGateway::seeded(&[("Secret", false)]);
    let session = signed_in();
    let gateway_dyn: Arc<dyn TaskGateway> = gateway.clone();
    let mut dash = Dashboard::new(session.clone(), gateway_dyn, Duration::from_millis(300));
    dash.mount().await.expect("mount");

    gateway.fail_next(TaskError::Unauthorized);
    let err = dash
        .set_sort_key(SortKey::Title)
        .await
        .expect_err("unauthorized");

    assert_eq!(err, TaskError::Unauthorized);
    assert!(!session.is_authorized());
    assert!(dash.store().last_error().is_none());
    assert_eq!(titles(&dash), vec!["Secret"]);
}

#[tokio::test]
async fn mount_without_session_is_unauthorized() {
    let gateway = RecordingGateway::seeded(&[]);
    let gateway_dyn: Arc<dyn TaskGateway> = gateway.clone();
    let mut dash = Dashboard::new(Session::in_memory(None), gateway_dyn, Duration::from_millis(300));

    assert_eq!(dash.mount().await, Err(TaskError::Unauthorized));
    assert!(gateway.list_calls().is_empty());
}

fn persisted_session() -> (TempDir, Arc<Session>, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let session = Session::open(dir.path()).expect("open session");
    session
        .establish(SessionRecord {
            access_token: "token-abc".to_string(),
            user: None,
        })
        .expect("establish");
    let file = dir.path().join("session.json");
    assert!(file.exists());
    (dir, session, file)
}

async fn mounted_with(
    gateway: &Arc<RecordingGateway>,
    session: Arc<Session>,
) -> Dashboard {
    let gateway_dyn: Arc<dyn TaskGateway> = gateway.clone();
    let mut dash = Dashboard::new(session, gateway_dyn, Duration::from_millis(300));
    dash.mount().await.expect("mount");
    dash
}

#[tokio::test]
async fn unauthorized_submit_removes_the_session_file() {
    let gateway = RecordingGateway::seeded(&[]);
    let (_dir, session, file) = persisted_session();
    let mut dash = mounted_with(&gateway, session.clone()).await;

    dash.open_create();
    dash.form_mut().set_title("Buy milk");
    gateway.fail_next(TaskError::Unauthorized);

    assert_eq!(dash.submit_form().await, Err(TaskError::Unauthorized));
    assert!(!session.is_authorized());
    assert!(!file.exists());
}

#[tokio::test]
async fn unauthorized_toggle_removes_the_session_file() {
    let gateway = RecordingGateway::seeded(&[("Pay rent", false)]);
    let (_dir, session, file) = persisted_session();
    let mut dash = mounted_with(&gateway, session.clone()).await;
    let id = gateway.id_of("Pay rent");

    gateway.fail_next(TaskError::Unauthorized);
    assert_eq!(dash.toggle_complete(id).await, Err(TaskError::Unauthorized));
    assert!(!session.is_authorized());
    assert!(!file.exists());
    assert!(dash.store().last_error().is_none());
}

#[tokio::test]
async fn unauthorized_delete_removes_the_session_file() {
    let gateway = RecordingGateway::seeded(&[("Drop me", false)]);
    let (_dir, session, file) = persisted_session();
    let mut dash = mounted_with(&gateway, session.clone()).await;
    let id = gateway.id_of("Drop me");

    gateway.fail_next(TaskError::Unauthorized);
    assert_eq!(
        dash.delete(id, &|_: &str| true).await,
        Err(TaskError::Unauthorized)
    );
    assert!(!session.is_authorized());
    assert!(!file.exists());
}

#[tokio::test]
async fn failed_toggle_is_kept_as_last_error_until_next_fetch() {
    let gateway = RecordingGateway::seeded(&[("Pay rent", false)]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");
    let id = gateway.id_of("Pay rent");

    let missing = TaskError::NotFound("Task not found".to_string());
    gateway.fail_next(missing.clone());
    assert_eq!(dash.toggle_complete(id).await, Err(missing.clone()));
    assert_eq!(dash.store().last_error(), Some(&missing));
    assert!(!dash.tasks()[0].completed);

    dash.toggle_complete(id).await.expect("toggle");
    assert!(dash.store().last_error().is_none());
}

#[tokio::test]
async fn kept_buffer_can_be_resubmitted() {
    let gateway = RecordingGateway::seeded(&[]);
    let mut dash = dashboard(&gateway);
    dash.mount().await.expect("mount");

    dash.open_create();
    dash.form_mut().set_title("Buy milk");
    dash.form_mut().set_description("two cartons");
    gateway.fail_next(TaskError::NetworkFailure("connection reset".to_string()));
    dash.submit_form().await.expect_err("first attempt fails");
    assert!(dash.form().is_open());

    let saved = dash.submit_form().await.expect("retry");
    assert_eq!(saved.value.description.as_deref(), Some("two cartons"));
    assert!(!dash.form().is_open());
    assert_eq!(gateway.create_calls.lock().len(), 2);
    assert_eq!(titles(&dash), vec!["Buy milk"]);
}
