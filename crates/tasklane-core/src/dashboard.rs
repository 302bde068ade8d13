use std::sync::Arc;
use std::time::{
  Duration,
  Instant
};

use tasklane_shared::{
  SortKey,
  StatusFilter,
  TaskDto
};
use tracing::{
  debug,
  instrument,
  warn
};
use uuid::Uuid;

use crate::debounce::Debouncer;
use crate::error::TaskError;
use crate::form::TaskForm;
use crate::gateway::TaskGateway;
use crate::mutation::{
  Confirm,
  DeleteOutcome,
  Mutated,
  MutationCoordinator
};
use crate::session::Session;
use crate::stats::TaskStats;
use crate::view::{
  FetchOutcome,
  FetchTicket,
  ViewQuery,
  ViewStore
};

/// Wires the session, gateway and engine
/// components into one task view.
///
/// This is where `Unauthorized` stops
/// being an ordinary error: any operation
/// that observes it tears the session down
/// and returns [`TaskError::Unauthorized`]
/// so the caller can send the user back to
/// login.
pub struct Dashboard {
  session:     Arc<Session>,
  gateway:     Arc<dyn TaskGateway>,
  coordinator: MutationCoordinator,
  store:       ViewStore,
  form:        TaskForm,
  debouncer:   Debouncer,
  raw_search:  String
}

impl Dashboard {
  pub fn new(
    session: Arc<Session>,
    gateway: Arc<dyn TaskGateway>,
    quiet_period: Duration
  ) -> Self {
    Self::with_query(
      session,
      gateway,
      quiet_period,
      ViewQuery::default()
    )
  }

  pub fn with_query(
    session: Arc<Session>,
    gateway: Arc<dyn TaskGateway>,
    quiet_period: Duration,
    query: ViewQuery
  ) -> Self {
    let raw_search =
      query.search_text.clone();
    Self {
      session,
      coordinator:
        MutationCoordinator::new(
          gateway.clone()
        ),
      gateway,
      store: ViewStore::with_query(query),
      form: TaskForm::new(),
      debouncer: Debouncer::new(
        quiet_period
      ),
      raw_search
    }
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn store(&self) -> &ViewStore {
    &self.store
  }

  pub fn tasks(&self) -> &[TaskDto] {
    self.store.tasks()
  }

  pub fn query(&self) -> &ViewQuery {
    self.store.query()
  }

  pub fn form(&self) -> &TaskForm {
    &self.form
  }

  pub fn form_mut(
    &mut self
  ) -> &mut TaskForm {
    &mut self.form
  }

  /// The search text as typed, which may
  /// run ahead of the settled query.
  pub fn raw_search(&self) -> &str {
    &self.raw_search
  }

  pub fn stats(&self) -> TaskStats {
    TaskStats::from_tasks(
      self.store.tasks()
    )
  }

  #[instrument(skip(self))]
  pub async fn mount(
    &mut self
  ) -> Result<FetchOutcome, TaskError> {
    if !self.session.is_authorized() {
      warn!(
        "mount attempted without a \
         session"
      );
      return Err(TaskError::Unauthorized);
    }
    let ticket = self.store.mount();
    self.run(ticket).await
  }

  pub async fn set_status_filter(
    &mut self,
    status_filter: StatusFilter
  ) -> Result<Option<FetchOutcome>, TaskError>
  {
    match self
      .store
      .set_status_filter(status_filter)
    {
      | Some(ticket) => {
        self.run(ticket).await.map(Some)
      }
      | None => Ok(None)
    }
  }

  pub async fn set_sort_key(
    &mut self,
    sort_key: SortKey
  ) -> Result<Option<FetchOutcome>, TaskError>
  {
    match self.store.set_sort_key(sort_key)
    {
      | Some(ticket) => {
        self.run(ticket).await.map(Some)
      }
      | None => Ok(None)
    }
  }

  /// Feeds one raw edit of the search
  /// field into the debouncer.
  pub fn type_search(
    &mut self,
    text: impl Into<String>,
    now: Instant
  ) {
    let text = text.into();
    self.raw_search = text.clone();
    self.debouncer.push(text, now);
  }

  pub fn search_deadline(
    &self
  ) -> Option<Instant> {
    self.debouncer.deadline()
  }

  /// Propagates a settled search value, if
  /// the quiet period has elapsed, and
  /// fetches for it.
  pub async fn tick(
    &mut self,
    now: Instant
  ) -> Result<Option<FetchOutcome>, TaskError>
  {
    let Some(settled) =
      self.debouncer.poll(now)
    else {
      return Ok(None);
    };

    match self.store.set_search_text(settled)
    {
      | Some(ticket) => {
        self.run(ticket).await.map(Some)
      }
      | None => Ok(None)
    }
  }

  pub fn open_create(&mut self) {
    self.form.open(None);
  }

  /// Opens the form seeded from a task in
  /// the displayed collection.
  pub fn open_edit(
    &mut self,
    id: Uuid
  ) -> Result<(), TaskError> {
    let task =
      self.store.find(id).cloned().ok_or_else(
        || {
          TaskError::NotFound(format!(
            "task {id} is not in the \
             current view"
          ))
        }
      )?;
    self.form.open(Some(&task));
    Ok(())
  }

  pub async fn get_task(
    &self,
    id: Uuid
  ) -> Result<TaskDto, TaskError> {
    let fetched = self.gateway.get(id).await;
    self.escalate(fetched)
  }

  /// Opens the form seeded from a task
  /// fetched directly from the gateway.
  pub async fn open_edit_remote(
    &mut self,
    id: Uuid
  ) -> Result<(), TaskError> {
    let task = match self.store.find(id) {
      | Some(task) => task.clone(),
      | None => self.get_task(id).await?
    };
    self.form.open(Some(&task));
    Ok(())
  }

  pub fn cancel_form(&mut self) {
    self.form.cancel();
  }

  pub async fn submit_form(
    &mut self
  ) -> Result<Mutated<TaskDto>, TaskError>
  {
    let result = self
      .form
      .submit(
        &self.coordinator,
        &mut self.store
      )
      .await;
    let saved = self.escalate(result)?;
    self.check_refresh(&saved.refresh)?;
    Ok(saved)
  }

  pub async fn toggle_complete(
    &mut self,
    id: Uuid
  ) -> Result<Mutated<TaskDto>, TaskError>
  {
    let result = self
      .coordinator
      .toggle_complete(&mut self.store, id)
      .await;
    let toggled = self.escalate(result)?;
    self.check_refresh(&toggled.refresh)?;
    Ok(toggled)
  }

  pub async fn delete(
    &mut self,
    id: Uuid,
    confirm: &dyn Confirm
  ) -> Result<DeleteOutcome, TaskError> {
    let result = self
      .coordinator
      .delete(&mut self.store, id, confirm)
      .await;
    let outcome = self.escalate(result)?;
    if let DeleteOutcome::Deleted(refresh) =
      &outcome
    {
      self.check_refresh(refresh)?;
    }
    Ok(outcome)
  }

  /// Cancels pending search input; nothing
  /// is emitted afterwards.
  pub fn unmount(&mut self) {
    debug!("unmounting task view");
    self.debouncer.teardown();
    self.form.cancel();
  }

  async fn run(
    &mut self,
    ticket: FetchTicket
  ) -> Result<FetchOutcome, TaskError> {
    let outcome = self
      .store
      .fetch(self.gateway.as_ref(), ticket)
      .await;
    self.check_refresh(&outcome)?;
    Ok(outcome)
  }

  fn check_refresh(
    &self,
    outcome: &FetchOutcome
  ) -> Result<(), TaskError> {
    match outcome.error() {
      | Some(TaskError::Unauthorized) => {
        self.session.teardown();
        Err(TaskError::Unauthorized)
      }
      | _ => Ok(())
    }
  }

  fn escalate<T>(
    &self,
    result: Result<T, TaskError>
  ) -> Result<T, TaskError> {
    if let Err(TaskError::Unauthorized) =
      &result
    {
      self.session.teardown();
    }
    result
  }
}
