use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Pending,
  Completed
}

impl StatusFilter {
  pub fn as_str(
    self
  ) -> &'static str {
    match self {
      | StatusFilter::All => "all",
      | StatusFilter::Pending => {
        "pending"
      }
      | StatusFilter::Completed => {
        "completed"
      }
    }
  }

  pub fn admits(
    self,
    completed: bool
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Pending => {
        !completed
      }
      | StatusFilter::Completed => {
        completed
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StatusFilter {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(StatusFilter::All),
      | "pending" | "open" => {
        Ok(StatusFilter::Pending)
      }
      | "completed" | "done" => {
        Ok(StatusFilter::Completed)
      }
      | other => Err(format!(
        "unknown status filter \
         '{other}' (expected all, \
         pending or completed)"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
  #[default]
  CreatedAt,
  UpdatedAt,
  Title
}

impl SortKey {
  pub fn as_str(
    self
  ) -> &'static str {
    match self {
      | SortKey::CreatedAt => {
        "created_at"
      }
      | SortKey::UpdatedAt => {
        "updated_at"
      }
      | SortKey::Title => "title"
    }
  }
}

impl fmt::Display for SortKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SortKey {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .replace('-', "_")
      .as_str()
    {
      | "created_at" | "created" => {
        Ok(SortKey::CreatedAt)
      }
      | "updated_at" | "updated" => {
        Ok(SortKey::UpdatedAt)
      }
      | "title" => Ok(SortKey::Title),
      | other => Err(format!(
        "unknown sort key '{other}' \
         (expected created_at, \
         updated_at or title)"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskDto {
  pub id:          Uuid,
  pub user_id:     Uuid,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub completed:   bool,
  pub created_at:  String,
  pub updated_at:  String
}

/// Query parameters of `GET
/// /api/tasks`. Absent fields mean
/// "no constraint".
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct TasksListArgs {
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub filter:  Option<StatusFilter>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub sort_by: Option<SortKey>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub search:  Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskCreate {
  pub title:       String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:       Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub completed:   Option<bool>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct UserDto {
  pub id:         Uuid,
  pub email:      String,
  pub name:       String,
  #[serde(default)]
  pub created_at: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct SignupArgs {
  pub email:    String,
  pub password: String,
  pub name:     String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct LoginArgs {
  pub email:    String,
  pub password: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TokenResponse {
  pub access_token: String,
  #[serde(default = "bearer")]
  pub token_type:   String,
  pub user:         UserDto
}

fn bearer() -> String {
  "bearer".to_string()
}
