use crate::tuple::TaskId;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Cycles through a random permutation of the target tasks.
///
/// Any run of `targets.len()` consecutive picks visits every task exactly
/// once.
#[derive(Clone, Debug)]
pub struct ShuffleGrouper {
  permutation: Vec<TaskId>,
  cursor: usize,
}

impl ShuffleGrouper {
  pub(crate) fn new(targets: &[TaskId], rng: &mut StdRng) -> Self {
    let mut permutation = targets.to_vec();
    permutation.shuffle(rng);
    let cursor = if permutation.is_empty() {
      0
    } else {
      rng.gen_range(0..permutation.len())
    };
    Self {
      permutation,
      cursor,
    }
  }

  /// The permutation being cycled.
  pub fn permutation(&self) -> &[TaskId] {
    &self.permutation
  }

  pub(crate) fn next_task(&mut self) -> TaskId {
    let task = self.permutation[self.cursor];
    self.cursor = (self.cursor + 1) % self.permutation.len();
    task
  }
}

/// Prefers targets running in the same worker as the source task.
#[derive(Clone, Debug)]
pub struct LocalOrShuffleGrouper {
  local: Vec<TaskId>,
  fallback: ShuffleGrouper,
}

impl LocalOrShuffleGrouper {
  pub(crate) fn new(targets: &[TaskId], local_tasks: &[TaskId], rng: &mut StdRng) -> Self {
    let local = targets
      .iter()
      .copied()
      .filter(|task| local_tasks.contains(task))
      .collect();
    Self {
      local,
      fallback: ShuffleGrouper::new(targets, rng),
    }
  }

  /// Targets co-located with the source.
  pub fn local_tasks(&self) -> &[TaskId] {
    &self.local
  }

  pub(crate) fn next_task(&mut self, rng: &mut StdRng) -> TaskId {
    if self.local.is_empty() {
      self.fallback.next_task()
    } else {
      self.local[rng.gen_range(0..self.local.len())]
    }
  }
}
