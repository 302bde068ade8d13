use thiserror::Error;

/// Failure taxonomy shared by the gateway
/// and every engine component.
#[derive(
  Debug, Clone, Error, PartialEq, Eq,
)]
pub enum TaskError {
  #[error("network failure: {0}")]
  NetworkFailure(String),

  #[error(
    "session is not authorized; log \
     in again"
  )]
  Unauthorized,

  #[error("rejected: {0}")]
  ValidationFailure(String),

  #[error("not found: {0}")]
  NotFound(String)
}

impl TaskError {
  pub fn is_unauthorized(
    &self
  ) -> bool {
    matches!(
      self,
      TaskError::Unauthorized
    )
  }

  pub fn kind(&self) -> &'static str {
    match self {
      | TaskError::NetworkFailure(_) => {
        "network_failure"
      }
      | TaskError::Unauthorized => {
        "unauthorized"
      }
      | TaskError::ValidationFailure(
        _
      ) => "validation_failure",
      | TaskError::NotFound(_) => {
        "not_found"
      }
    }
  }

  /// Maps a non-success HTTP status and
  /// the server's `detail` text onto the
  /// taxonomy.
  pub fn from_status(
    status: u16,
    detail: String
  ) -> Self {
    match status {
      | 401 => TaskError::Unauthorized,
      | 404 => TaskError::NotFound(
        detail
      ),
      | 400 | 403 | 409 | 422 => {
        TaskError::ValidationFailure(
          detail
        )
      }
      | _ => {
        TaskError::NetworkFailure(
          format!(
            "server responded \
             {status}: {detail}"
          )
        )
      }
    }
  }
}
