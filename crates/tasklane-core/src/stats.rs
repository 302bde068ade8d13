use tasklane_shared::TaskDto;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct TaskStats {
  pub total:              usize,
  pub completed:          usize,
  pub pending:            usize,
  /// Rounded share of completed tasks, 0
  /// when there are none.
  pub completion_percent: u8
}

impl TaskStats {
  pub fn from_tasks(
    tasks: &[TaskDto]
  ) -> Self {
    let total = tasks.len();
    let completed = tasks
      .iter()
      .filter(|task| task.completed)
      .count();
    let completion_percent = if total == 0
    {
      0
    } else {
      ((completed as f64 / total as f64)
        * 100.0)
        .round() as u8
    };

    Self {
      total,
      completed,
      pending: total - completed,
      completion_percent
    }
  }
}
