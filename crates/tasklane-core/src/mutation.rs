use std::sync::Arc;

use tasklane_shared::{
  TaskCreate,
  TaskDto,
  TaskPatch
};
use tracing::{
  error,
  info,
  instrument,
  warn
};
use uuid::Uuid;

use crate::error::TaskError;
use crate::gateway::TaskGateway;
use crate::view::{
  FetchOutcome,
  ViewStore
};

/// Interactive yes/no gate in front of
/// destructive operations.
pub trait Confirm {
  fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
  F: Fn(&str) -> bool
{
  fn confirm(&self, prompt: &str) -> bool {
    self(prompt)
  }
}

/// A mutation the gateway accepted,
/// together with the outcome of the
/// re-fetch that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutated<T> {
  pub value:   T,
  pub refresh: FetchOutcome
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
  Declined,
  Deleted(FetchOutcome)
}

/// Runs create/update/toggle/delete
/// against the gateway. Never touches the
/// displayed collection itself: every
/// success path ends with a re-fetch
/// through the [`ViewStore`].
#[derive(Clone)]
pub struct MutationCoordinator {
  gateway: Arc<dyn TaskGateway>
}

impl MutationCoordinator {
  pub fn new(
    gateway: Arc<dyn TaskGateway>
  ) -> Self {
    Self { gateway }
  }

  #[instrument(skip(self, store, description), fields(title_len = title.len()))]
  pub async fn create(
    &self,
    store: &mut ViewStore,
    title: &str,
    description: Option<&str>
  ) -> Result<Mutated<TaskDto>, TaskError>
  {
    let title = require_title(title)?;
    let payload = TaskCreate {
      title,
      description: description
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
    };

    let created = report(
      store,
      "create",
      self.gateway.create(&payload).await
    )?;
    info!(task_id = %created.id, "task created");
    Ok(self.refetch(store, created).await)
  }

  #[instrument(skip(self, store, description), fields(task_id = %id))]
  pub async fn update(
    &self,
    store: &mut ViewStore,
    id: Uuid,
    title: &str,
    description: &str
  ) -> Result<Mutated<TaskDto>, TaskError>
  {
    let title = require_title(title)?;
    let patch = TaskPatch {
      title:       Some(title),
      description: Some(
        description.trim().to_string()
      ),
      completed:   None
    };

    let updated = report(
      store,
      "update",
      self.gateway.update(id, &patch).await
    )?;
    info!("task updated");
    Ok(self.refetch(store, updated).await)
  }

  #[instrument(skip(self, store), fields(task_id = %id))]
  pub async fn toggle_complete(
    &self,
    store: &mut ViewStore,
    id: Uuid
  ) -> Result<Mutated<TaskDto>, TaskError>
  {
    let toggled = report(
      store,
      "toggle_complete",
      self.gateway.toggle_complete(id).await
    )?;
    info!(
      completed = toggled.completed,
      "task completion toggled"
    );
    Ok(self.refetch(store, toggled).await)
  }

  #[instrument(skip(self, store, confirm), fields(task_id = %id))]
  pub async fn delete(
    &self,
    store: &mut ViewStore,
    id: Uuid,
    confirm: &dyn Confirm
  ) -> Result<DeleteOutcome, TaskError> {
    let prompt = match store.find(id) {
      | Some(task) => format!(
        "Delete task '{}'?",
        task.title
      ),
      | None => {
        "Delete this task?".to_string()
      }
    };

    if !confirm.confirm(&prompt) {
      info!("task deletion declined");
      return Ok(DeleteOutcome::Declined);
    }

    report(
      store,
      "delete",
      self.gateway.delete(id).await
    )?;
    info!("task deleted");
    let refreshed =
      self.refetch(store, ()).await;
    Ok(DeleteOutcome::Deleted(
      refreshed.refresh
    ))
  }

  async fn refetch<T>(
    &self,
    store: &mut ViewStore,
    value: T
  ) -> Mutated<T> {
    let ticket = store.request_refresh();
    let refresh = store
      .fetch(self.gateway.as_ref(), ticket)
      .await;
    Mutated { value, refresh }
  }
}

fn require_title(
  title: &str
) -> Result<String, TaskError> {
  let title = title.trim();
  if title.is_empty() {
    warn!(
      "rejecting mutation with empty \
       title"
    );
    return Err(
      TaskError::ValidationFailure(
        "title is required".to_string()
      )
    );
  }
  Ok(title.to_string())
}

/// Logs a failed mutation and keeps it as
/// the store's last error until the next
/// applied fetch.
fn report<T>(
  store: &mut ViewStore,
  operation: &'static str,
  result: Result<T, TaskError>
) -> Result<T, TaskError> {
  if let Err(err) = result.as_ref()
    && !err.is_unauthorized()
  {
    store.record_failure(err);
    error!(
      operation,
      kind = err.kind(),
      error = %err,
      "task mutation failed"
    );
  }
  result
}
