//! Batch runner: drains the ready set and fans task bodies out via rayon.
//!
//! The executor publishes ready tasks but performs no locking and owns no
//! task code. This runner owns the bodies and packages the alternation loop:
//! enqueue -> snapshot the ready batch -> run every body -> complete each
//! task. Bodies in one batch run in parallel; the declared edges are the
//! caller's guarantee that their data access is disjoint.

use orbit_ids::Id;
use rayon::prelude::*;
use web_time::Instant;

use crate::execute::{complete_task, enqueue_dirty, ExecContext, TaskActions};
use crate::graph::{TaskGraph, TaskId, Tasks};

type TaskBody<W> = Box<dyn Fn(&W) -> TaskActions + Send + Sync>;

/// Statistics from one [`BatchRunner::run_to_idle`] call.
#[derive(Clone, Copy, Default, Debug)]
pub struct RunStats {
  /// Number of enqueue/complete rounds until the graph went idle.
  pub rounds: usize,
  pub tasks_run: usize,
  pub total_us: u64,
}

/// Owns task bodies keyed by [`TaskId`] and drives the executor to idle.
///
/// `W` is whatever shared world the bodies read; interior mutability and
/// disjointness are between the caller and its edge declarations.
pub struct BatchRunner<W> {
  bodies: Vec<Option<TaskBody<W>>>,
}

impl<W: Sync> Default for BatchRunner<W> {
  fn default() -> Self {
    Self::new()
  }
}

impl<W: Sync> BatchRunner<W> {
  pub fn new() -> Self {
    Self { bodies: Vec::new() }
  }

  /// Register the body executed for `task`.
  pub fn set_body<F>(&mut self, task: TaskId, body: F)
  where
    F: Fn(&W) -> TaskActions + Send + Sync + 'static,
  {
    if self.bodies.len() <= task.index() {
      self.bodies.resize_with(task.index() + 1, || None);
    }
    self.bodies[task.index()] = Some(Box::new(body));
  }

  fn body(&self, task: TaskId) -> &TaskBody<W> {
    self
      .bodies
      .get(task.index())
      .and_then(Option::as_ref)
      .expect("ready task has no registered body")
  }

  /// Alternate `enqueue_dirty` and batch execution until the ready set
  /// stays empty. Requested pipelines all finish (or park on a loop that
  /// was never cancelled - callers of looping graphs cancel from a body).
  pub fn run_to_idle(
    &self,
    tasks: &Tasks,
    graph: &TaskGraph,
    exec: &mut ExecContext,
    world: &W,
  ) -> RunStats {
    let start = Instant::now();
    let mut stats = RunStats::default();

    loop {
      enqueue_dirty(tasks, graph, exec);

      let batch: Vec<TaskId> = exec.ready_tasks().collect();
      if batch.is_empty() {
        break;
      }
      stats.rounds += 1;

      let results: Vec<(TaskId, TaskActions)> = batch
        .par_iter()
        .map(|&task| (task, (self.body(task))(world)))
        .collect();

      for (task, actions) in results {
        complete_task(tasks, graph, exec, task, actions);
        stats.tasks_run += 1;
      }
    }

    stats.total_us = start.elapsed().as_micros() as u64;
    tracing::debug!(
      rounds = stats.rounds,
      tasks_run = stats.tasks_run,
      total_us = stats.total_us,
      "run_to_idle finished"
    );
    stats
  }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod runner_test;
