use tasklane_shared::TaskDto;
use tracing::{
  debug,
  info,
  warn
};
use uuid::Uuid;

use crate::error::TaskError;
use crate::mutation::{
  MutationCoordinator,
  Mutated
};
use crate::view::ViewStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
  Create,
  Edit(Uuid)
}

/// Unsaved title/description for one task
/// being created or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
  pub mode:        FormMode,
  pub title:       String,
  pub description: String
}

impl EditBuffer {
  pub fn is_valid(&self) -> bool {
    !self.title.trim().is_empty()
  }
}

/// Owns the create/edit panel. The buffer
/// exists only while the panel is open and
/// survives failed submits untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskForm {
  buffer: Option<EditBuffer>,
  error:  Option<TaskError>
}

impl TaskForm {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_open(&self) -> bool {
    self.buffer.is_some()
  }

  pub fn buffer(
    &self
  ) -> Option<&EditBuffer> {
    self.buffer.as_ref()
  }

  pub fn error(
    &self
  ) -> Option<&TaskError> {
    self.error.as_ref()
  }

  /// Opens empty for `None`, seeded from
  /// the task otherwise.
  pub fn open(
    &mut self,
    for_task: Option<&TaskDto>
  ) {
    let buffer = match for_task {
      | Some(task) => EditBuffer {
        mode:        FormMode::Edit(
          task.id
        ),
        title:       task.title.clone(),
        description: task
          .description
          .clone()
          .unwrap_or_default()
      },
      | None => EditBuffer {
        mode:        FormMode::Create,
        title:       String::new(),
        description: String::new()
      }
    };
    debug!(mode = ?buffer.mode, "task form opened");
    self.buffer = Some(buffer);
    self.error = None;
  }

  pub fn set_title(
    &mut self,
    title: impl Into<String>
  ) -> bool {
    match self.buffer.as_mut() {
      | Some(buffer) => {
        buffer.title = title.into();
        true
      }
      | None => false
    }
  }

  pub fn set_description(
    &mut self,
    description: impl Into<String>
  ) -> bool {
    match self.buffer.as_mut() {
      | Some(buffer) => {
        buffer.description =
          description.into();
        true
      }
      | None => false
    }
  }

  pub fn can_submit(&self) -> bool {
    self
      .buffer
      .as_ref()
      .is_some_and(EditBuffer::is_valid)
  }

  /// Creates or updates depending on how
  /// the form was opened. Closes the panel
  /// on success; on failure the buffer is
  /// kept as typed and the error retained.
  pub async fn submit(
    &mut self,
    coordinator: &MutationCoordinator,
    store: &mut ViewStore
  ) -> Result<Mutated<TaskDto>, TaskError>
  {
    let Some(buffer) = self.buffer.clone()
    else {
      return Err(
        TaskError::ValidationFailure(
          "no task form is open"
            .to_string()
        )
      );
    };

    if !buffer.is_valid() {
      warn!(
        "task form submitted without a \
         title"
      );
      let err =
        TaskError::ValidationFailure(
          "title is required".to_string()
        );
      self.error = Some(err.clone());
      return Err(err);
    }

    let result = match buffer.mode {
      | FormMode::Create => {
        coordinator
          .create(
            store,
            &buffer.title,
            Some(
              buffer.description.as_str()
            )
          )
          .await
      }
      | FormMode::Edit(id) => {
        coordinator
          .update(
            store,
            id,
            &buffer.title,
            &buffer.description
          )
          .await
      }
    };

    match result {
      | Ok(saved) => {
        info!(task_id = %saved.value.id, "task form saved");
        self.buffer = None;
        self.error = None;
        Ok(saved)
      }
      | Err(err) => {
        self.error = Some(err.clone());
        Err(err)
      }
    }
  }

  pub fn cancel(&mut self) {
    if self.buffer.take().is_some() {
      debug!("task form cancelled");
    }
    self.error = None;
  }
}
