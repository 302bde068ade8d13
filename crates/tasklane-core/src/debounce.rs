use std::time::{
  Duration,
  Instant
};

use tracing::{
  debug,
  trace
};

pub const DEFAULT_QUIET_PERIOD:
  Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
  Idle,
  Pending {
    value:    String,
    deadline: Instant
  }
}

/// Settles raw search edits into a query
/// value once no new edit has arrived for
/// the quiet period.
///
/// Holds no timer of its own: callers
/// report the current instant through
/// [`Debouncer::push`] and
/// [`Debouncer::poll`] and may sleep until
/// [`Debouncer::deadline`].
#[derive(Debug, Clone)]
pub struct Debouncer {
  quiet:  Duration,
  state:  DebounceState,
  closed: bool
}

impl Default for Debouncer {
  fn default() -> Self {
    Self::new(DEFAULT_QUIET_PERIOD)
  }
}

impl Debouncer {
  pub fn new(quiet: Duration) -> Self {
    Self {
      quiet,
      state: DebounceState::Idle,
      closed: false
    }
  }

  pub fn quiet_period(&self) -> Duration {
    self.quiet
  }

  pub fn state(&self) -> &DebounceState {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(
      self.state,
      DebounceState::Pending { .. }
    )
  }

  pub fn deadline(
    &self
  ) -> Option<Instant> {
    match &self.state {
      | DebounceState::Pending {
        deadline,
        ..
      } => Some(*deadline),
      | DebounceState::Idle => None
    }
  }

  /// Records a raw edit, replacing any
  /// pending value and restarting the
  /// quiet period from `now`.
  pub fn push(
    &mut self,
    value: impl Into<String>,
    now: Instant
  ) {
    if self.closed {
      debug!(
        "debouncer torn down; \
         ignoring input"
      );
      return;
    }

    let value = value.into();
    let deadline = now + self.quiet;
    if self.is_pending() {
      trace!(
        value = %value,
        "superseding pending search \
         value"
      );
    }
    self.state = DebounceState::Pending {
      value,
      deadline
    };
  }

  /// Emits the pending value once its
  /// deadline has passed.
  pub fn poll(
    &mut self,
    now: Instant
  ) -> Option<String> {
    match &self.state {
      | DebounceState::Pending {
        deadline,
        ..
      } if now >= *deadline => {}
      | _ => return None
    }

    match std::mem::replace(
      &mut self.state,
      DebounceState::Idle
    ) {
      | DebounceState::Pending {
        value,
        ..
      } => {
        debug!(
          value = %value,
          "search value settled"
        );
        Some(value)
      }
      | DebounceState::Idle => None
    }
  }

  /// Drops the pending value, if any,
  /// without emitting it.
  pub fn cancel(
    &mut self
  ) -> Option<String> {
    match std::mem::replace(
      &mut self.state,
      DebounceState::Idle
    ) {
      | DebounceState::Pending {
        value,
        ..
      } => {
        debug!(
          value = %value,
          "cancelled pending search \
           value"
        );
        Some(value)
      }
      | DebounceState::Idle => None
    }
  }

  /// Cancels any pending value and stops
  /// accepting input for good.
  pub fn teardown(&mut self) {
    self.cancel();
    self.closed = true;
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }
}
