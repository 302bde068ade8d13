use tasklane_shared::{
  SortKey,
  StatusFilter,
  TaskDto,
  TasksListArgs
};
use tracing::{
  debug,
  error,
  info,
  instrument,
  warn
};

use crate::error::TaskError;
use crate::gateway::TaskGateway;

/// The `{status filter, sort key, search
/// text}` triple governing which tasks are
/// fetched and in what order.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
pub struct ViewQuery {
  pub status_filter: StatusFilter,
  pub sort_key:      SortKey,
  pub search_text:   String
}

impl ViewQuery {
  /// Empty search text is sent as "no
  /// constraint" rather than as an empty
  /// parameter.
  pub fn to_list_args(
    &self
  ) -> TasksListArgs {
    TasksListArgs {
      filter:  Some(self.status_filter),
      sort_by: Some(self.sort_key),
      search:  if self
        .search_text
        .is_empty()
      {
        None
      } else {
        Some(self.search_text.clone())
      }
    }
  }
}

/// One issued fetch: the query it was
/// issued for and its position in issue
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
  pub seq:   u64,
  pub query: ViewQuery
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  Applied { seq: u64, count: usize },
  Stale { seq: u64, latest: u64 },
  Failed { seq: u64, error: TaskError }
}

impl FetchOutcome {
  pub fn error(
    &self
  ) -> Option<&TaskError> {
    match self {
      | FetchOutcome::Failed {
        error,
        ..
      } => Some(error),
      | _ => None
    }
  }
}

/// Holds the active [`ViewQuery`] and the
/// collection fetched for it.
///
/// Every parameter change and every
/// refresh request issues a
/// [`FetchTicket`] with a strictly
/// increasing sequence number; only the
/// response to the most recently issued
/// ticket is ever displayed.
#[derive(Debug, Clone)]
pub struct ViewStore {
  query:        ViewQuery,
  tasks:        Vec<TaskDto>,
  loading:      bool,
  issued_seq:   u64,
  settled_seq:  u64,
  refresh_tick: u64,
  last_error:   Option<TaskError>
}

impl Default for ViewStore {
  fn default() -> Self {
    Self::new()
  }
}

impl ViewStore {
  pub fn new() -> Self {
    Self::with_query(
      ViewQuery::default()
    )
  }

  pub fn with_query(
    query: ViewQuery
  ) -> Self {
    Self {
      query,
      tasks: Vec::new(),
      loading: true,
      issued_seq: 0,
      settled_seq: 0,
      refresh_tick: 0,
      last_error: None
    }
  }

  pub fn query(&self) -> &ViewQuery {
    &self.query
  }

  pub fn tasks(&self) -> &[TaskDto] {
    &self.tasks
  }

  /// True from construction until the
  /// first fetch that is not stale
  /// completes, whatever its outcome.
  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn has_fetch_in_flight(
    &self
  ) -> bool {
    self.issued_seq > self.settled_seq
  }

  pub fn latest_seq(&self) -> u64 {
    self.issued_seq
  }

  /// Bumped once per post-mutation
  /// refresh.
  pub fn refresh_tick(&self) -> u64 {
    self.refresh_tick
  }

  pub fn last_error(
    &self
  ) -> Option<&TaskError> {
    self.last_error.as_ref()
  }

  /// Retains a failed mutation as the
  /// last error. `Unauthorized` is left to
  /// the session owner.
  pub fn record_failure(
    &mut self,
    error: &TaskError
  ) {
    if !error.is_unauthorized() {
      self.last_error = Some(error.clone());
    }
  }

  pub fn find(
    &self,
    id: uuid::Uuid
  ) -> Option<&TaskDto> {
    self
      .tasks
      .iter()
      .find(|task| task.id == id)
  }

  /// Issues the initial fetch for the
  /// current query.
  pub fn mount(&mut self) -> FetchTicket {
    info!(
      status_filter = %self.query.status_filter,
      sort_key = %self.query.sort_key,
      "mounting task view"
    );
    self.issue()
  }

  pub fn set_status_filter(
    &mut self,
    status_filter: StatusFilter
  ) -> Option<FetchTicket> {
    if self.query.status_filter
      == status_filter
    {
      return None;
    }
    debug!(%status_filter, "status filter changed");
    self.query.status_filter =
      status_filter;
    Some(self.issue())
  }

  pub fn set_sort_key(
    &mut self,
    sort_key: SortKey
  ) -> Option<FetchTicket> {
    if self.query.sort_key == sort_key {
      return None;
    }
    debug!(%sort_key, "sort key changed");
    self.query.sort_key = sort_key;
    Some(self.issue())
  }

  /// Takes an already-settled search
  /// value.
  pub fn set_search_text(
    &mut self,
    search_text: impl Into<String>
  ) -> Option<FetchTicket> {
    let search_text = search_text.into();
    if self.query.search_text
      == search_text
    {
      return None;
    }
    debug!(search_text = %search_text, "search text changed");
    self.query.search_text = search_text;
    Some(self.issue())
  }

  /// Re-fetches with the unchanged query.
  /// Every successful mutation ends here.
  pub fn request_refresh(
    &mut self
  ) -> FetchTicket {
    self.refresh_tick =
      self.refresh_tick.saturating_add(1);
    debug!(
      tick = self.refresh_tick,
      "refresh requested"
    );
    self.issue()
  }

  fn issue(&mut self) -> FetchTicket {
    self.issued_seq += 1;
    FetchTicket {
      seq:   self.issued_seq,
      query: self.query.clone()
    }
  }

  /// Applies a completed fetch. Responses
  /// to superseded tickets are discarded;
  /// failures leave the displayed
  /// collection untouched.
  #[instrument(skip(self, ticket, result), fields(seq = ticket.seq, latest = self.issued_seq))]
  pub fn apply(
    &mut self,
    ticket: &FetchTicket,
    result: Result<
      Vec<TaskDto>,
      TaskError
    >
  ) -> FetchOutcome {
    if ticket.seq != self.issued_seq {
      debug!(
        ok = result.is_ok(),
        "discarding stale fetch \
         response"
      );
      return FetchOutcome::Stale {
        seq:    ticket.seq,
        latest: self.issued_seq
      };
    }

    self.settled_seq = ticket.seq;
    self.loading = false;

    match result {
      | Ok(tasks) => {
        let count = tasks.len();
        info!(count, "task view refreshed");
        self.tasks = tasks;
        self.last_error = None;
        FetchOutcome::Applied {
          seq: ticket.seq,
          count
        }
      }
      | Err(error) => {
        if error.is_unauthorized() {
          warn!(
            "task fetch rejected as \
             unauthorized"
          );
        } else {
          error!(
            kind = error.kind(),
            error = %error,
            "task fetch failed; keeping \
             previous collection"
          );
          self.last_error =
            Some(error.clone());
        }
        FetchOutcome::Failed {
          seq: ticket.seq,
          error
        }
      }
    }
  }

  /// Runs `ticket` against the gateway
  /// and applies the response.
  pub async fn fetch(
    &mut self,
    gateway: &dyn TaskGateway,
    ticket: FetchTicket
  ) -> FetchOutcome {
    let args = ticket.query.to_list_args();
    let result = gateway.list(&args).await;
    self.apply(&ticket, result)
  }
}
