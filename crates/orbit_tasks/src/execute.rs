//! Executor: per-run pipeline state and the dirty-flag advance loop.
//!
//! Progress is driven by two entry points called in strict alternation from
//! one thread:
//!
//! 1. [`enqueue_dirty`] advances every pipeline as far as its counters allow
//!    and fills the ready set.
//! 2. The caller runs ready tasks (in any order, on any thread) and reports
//!    each one through [`complete_task`], which decrements edge counters and
//!    marks pipelines for the next `enqueue_dirty`.
//!
//! All error conditions here are caller/graph bugs, surfaced as asserts;
//! the executor does not recover. Graceful states (no ready tasks) are just
//! an empty ready set.

use std::collections::HashMap;

use orbit_ids::{BitVec, Id, KeyedVec};
use smallvec::SmallVec;

use crate::graph::{PipelineId, StageId, TaskGraph, TaskId, Tasks};
use crate::log::ExecLog;

/// Bit set of actions a task reports on completion.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct TaskActions(pub u8);

impl TaskActions {
  pub const NONE: Self = Self(0);
  /// Skip the remaining optional stages of the completing task's pipeline.
  pub const CANCEL_OPTIONAL_STAGES: Self = Self(1);

  #[inline]
  pub fn contains(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }
}

impl std::ops::BitOr for TaskActions {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

/// Per-pipeline run state, counter-based.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct ExecPipeline {
  /// Current stage; `None` when idle (not yet started or finished).
  pub stage: Option<StageId>,
  pub running: bool,
  pub do_loop: bool,
  pub cancel_optionals: bool,
  /// The current stage's tasks have been enqueued this visit.
  pub tasks_queued: bool,

  /// How many of this pipeline's tasks sit in the global ready set.
  pub tasks_queued_run: u32,
  /// How many of this pipeline's tasks sit in the global blocked set.
  pub tasks_queued_blocked: u32,

  /// Outstanding tasks (from any pipeline) whose Task-requires-Stage edge
  /// points at this pipeline's current stage. Must reach 0 to advance.
  pub tasks_req_own_stage_left: u32,
  /// Required tasks (Stage-requires-Task) the current stage still waits on.
  /// Must reach 0 to advance.
  pub own_stage_req_tasks_left: u32,
}

/// A task held in the blocked set with its unsatisfied requirement count.
#[derive(Clone, Copy, Debug)]
pub struct BlockedTask {
  pub req_stages_left: u32,
  /// Pipeline the task runs on, for counter upkeep when it unblocks.
  pub pipeline: PipelineId,
}

/// Mutable per-run executor state. Sized once by [`exec_resize`].
#[derive(Default)]
pub struct ExecContext {
  pub pl_data: KeyedVec<PipelineId, ExecPipeline>,

  tasks_queued_run: BitVec,
  tasks_queued_blocked: HashMap<TaskId, BlockedTask>,

  pl_advance: BitVec,
  pl_advance_next: BitVec,
  pl_request_run: BitVec,
  has_pl_advance: bool,
  has_request_run: bool,

  pub log: Vec<ExecLog>,
  pub do_logging: bool,
}

impl ExecContext {
  /// Tasks ready to be handed to a worker.
  pub fn ready_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
    self.tasks_queued_run.ones().map(TaskId::from_index)
  }

  #[inline]
  pub fn is_ready(&self, task: TaskId) -> bool {
    self.tasks_queued_run.test(task.index())
  }

  #[inline]
  pub fn is_blocked(&self, task: TaskId) -> bool {
    self.tasks_queued_blocked.contains_key(&task)
  }

  pub fn ready_count(&self) -> usize {
    self.tasks_queued_run.count()
  }

  pub fn blocked_count(&self) -> usize {
    self.tasks_queued_blocked.len()
  }

  fn record(&mut self, msg: ExecLog) {
    if self.do_logging {
      self.log.push(msg);
    }
  }
}

/// Size all context vectors to the graph's id capacities. Idempotent.
pub fn exec_resize(tasks: &Tasks, _graph: &TaskGraph, exec: &mut ExecContext) {
  let max_tasks = tasks.task_ids.capacity();
  let max_pipelines = tasks.pipeline_ids.capacity();

  exec.pl_data.resize_default(max_pipelines);
  exec.tasks_queued_run.resize(max_tasks);
  exec.tasks_queued_blocked.reserve(max_tasks);
  exec.pl_advance.resize(max_pipelines);
  exec.pl_advance_next.resize(max_pipelines);
  exec.pl_request_run.resize(max_pipelines);
}

/// Request that a pipeline (and its descendants) start running at the next
/// [`enqueue_dirty`]. Starting pipelines while any pipeline is already
/// running is a precondition violation, checked there.
pub fn pipeline_run(exec: &mut ExecContext, pipeline: PipelineId) {
  exec.record(ExecLog::ExternalTrigger { pipeline });
  exec.pl_request_run.set(pipeline.index());
  exec.has_request_run = true;
}

/// Stop a looping pipeline: the next time it passes its final stage it goes
/// idle instead of wrapping to stage 0.
pub fn pipeline_cancel_loop(exec: &mut ExecContext, pipeline: PipelineId) {
  exec.pl_data[pipeline].do_loop = false;
}

#[inline]
fn pipeline_can_advance(pl: &ExecPipeline) -> bool {
  pl.own_stage_req_tasks_left == 0    // tasks required by the stage are done
    && pl.tasks_req_own_stage_left == 0 // no task still requires the stage
    && pl.tasks_queued_run + pl.tasks_queued_blocked == 0
}

#[inline]
fn pipeline_try_advance(exec: &mut ExecContext, pipeline: PipelineId) {
  if pipeline_can_advance(&exec.pl_data[pipeline]) {
    exec.pl_advance.set(pipeline.index());
    exec.has_pl_advance = true;
  }
}

#[inline]
fn stage_is_cancelled(tasks: &Tasks, exec: &ExecContext, pipeline: PipelineId, stage: StageId) -> bool {
  exec.pl_data[pipeline].cancel_optionals
    && tasks.pipeline_info[pipeline].optional_stages.test(stage)
}

fn pipeline_advance_stage(graph: &TaskGraph, exec: &mut ExecContext, pipeline: PipelineId) {
  let stage_count = graph.stage_count(pipeline);
  assert!(
    pipeline_can_advance(&exec.pl_data[pipeline]),
    "advancing a pipeline whose counters are not settled"
  );
  assert!(stage_count != 0, "pipelines with 0 stages must not run");

  let pl = &mut exec.pl_data[pipeline];
  let stage_old = pl.stage;
  let next = match pl.stage {
    None => 0,
    Some(stage) => stage.0 + 1,
  };

  if (next as usize) != stage_count {
    pl.stage = Some(StageId(next));
    pl.tasks_queued = false;
  } else if pl.do_loop {
    // Wrap: a fresh iteration, optionals armed again
    pl.stage = Some(StageId(0));
    pl.tasks_queued = false;
    pl.cancel_optionals = false;
  } else {
    // One past the last stage: finished running
    pl.stage = None;
    pl.running = false;
  }

  let stage_new = exec.pl_data[pipeline].stage;
  exec.record(ExecLog::StageChange {
    pipeline,
    stage_old,
    stage_new,
  });
}

fn pipeline_advance_reqs(tasks: &Tasks, graph: &TaskGraph, exec: &mut ExecContext, pipeline: PipelineId) {
  if !exec.pl_data[pipeline].running {
    return;
  }
  let stage = exec.pl_data[pipeline]
    .stage
    .expect("running pipeline must be on a stage after the advance sweep");
  let anystg = graph.anystg_from(pipeline, stage);

  // Task-requires-Stage edges pointing at the new stage: tasks from other
  // pipelines that may only run while we sit here. Unblock the ones already
  // queued; ones at cancelled stages will never run and don't count.
  let rev_taskreqstg = graph.anystg_to_rev_taskreqstg.view(anystg);
  let mut tasks_req_left = rev_taskreqstg.len() as u32;

  for &task in rev_taskreqstg {
    if let Some(blocked) = exec.tasks_queued_blocked.get_mut(&task) {
      blocked.req_stages_left -= 1;
      if blocked.req_stages_left == 0 {
        let task_pipeline = blocked.pipeline;
        exec.tasks_queued_blocked.remove(&task);
        exec.record(ExecLog::UnblockTask { task });
        exec.pl_data[task_pipeline].tasks_queued_blocked -= 1;
        exec.pl_data[task_pipeline].tasks_queued_run += 1;
        exec.tasks_queued_run.set(task.index());
      }
    } else {
      let run_on = tasks.task_run_on[task];
      if stage_is_cancelled(tasks, exec, run_on.pipeline, run_on.stage) {
        tasks_req_left -= 1;
      }
    }
  }
  exec.pl_data[pipeline].tasks_req_own_stage_left = tasks_req_left;

  // Stage-requires-Task edges: tasks that must complete before this stage
  // can be advanced past. Some may already be satisfied.
  let stgreqtask = graph.anystg_to_stgreqtask.view(anystg);
  let mut own_stage_left = stgreqtask.len() as u32;

  for req in stgreqtask {
    let req_pl = &exec.pl_data[req.req_pipeline];

    let req_task_done = if !req_pl.running {
      true // whole pipeline finished already
    } else if stage_is_cancelled(tasks, exec, req.req_pipeline, req.req_stage) {
      true // stage cancelled, the required task will never run
    } else {
      match req_pl.stage {
        None => false, // pipeline about to start, task didn't run yet
        Some(stage) if stage < req.req_stage => false, // not reached yet
        Some(stage) if stage > req.req_stage => true,  // passed, task finished
        Some(_) => {
          if !req_pl.tasks_queued {
            false // on the stage but its tasks aren't queued yet
          } else if exec.tasks_queued_blocked.contains_key(&req.req_task)
            || exec.tasks_queued_run.test(req.req_task.index())
          {
            false // queued and not yet finished
          } else {
            true // queued earlier this visit and already completed
          }
        }
      }
    };

    if req_task_done {
      own_stage_left -= 1;
    }
  }
  exec.pl_data[pipeline].own_stage_req_tasks_left = own_stage_left;
}

fn pipeline_advance_run(tasks: &Tasks, graph: &TaskGraph, exec: &mut ExecContext, pipeline: PipelineId) {
  if !exec.pl_data[pipeline].running {
    return;
  }
  let stage = exec.pl_data[pipeline]
    .stage
    .expect("running pipeline must be on a stage after the advance sweep");

  let stage_cancelled = stage_is_cancelled(tasks, exec, pipeline, stage);
  let mut no_tasks_run = true;

  if !stage_cancelled {
    let anystg = graph.anystg_from(pipeline, stage);
    let run_tasks = graph.anystg_to_runtask.view(anystg);
    no_tasks_run = run_tasks.is_empty();

    for &task in run_tasks {
      assert!(
        !exec.tasks_queued_blocked.contains_key(&task) && !exec.tasks_queued_run.test(task.index()),
        "queueing a task that is already queued"
      );

      // Some Task-requires-Stage edges may be satisfied right now
      let reqs = graph.task_to_taskreqstg.view(task);
      let mut req_stages_left = reqs.len() as u32;
      for req in reqs {
        if exec.pl_data[req.req_pipeline].stage == Some(req.req_stage) {
          req_stages_left -= 1;
        }
      }

      let blocked = req_stages_left != 0;
      exec.record(ExecLog::EnqueueTask {
        pipeline,
        stage,
        task,
        blocked,
      });

      if !blocked {
        exec.tasks_queued_run.set(task.index());
        exec.pl_data[pipeline].tasks_queued_run += 1;
      } else {
        exec.tasks_queued_blocked.insert(
          task,
          BlockedTask {
            req_stages_left,
            pipeline,
          },
        );
        exec.pl_data[pipeline].tasks_queued_blocked += 1;

        if exec.do_logging {
          for req in reqs {
            if exec.pl_data[req.req_pipeline].stage != Some(req.req_stage) {
              exec.log.push(ExecLog::EnqueueTaskReq {
                pipeline: req.req_pipeline,
                stage: req.req_stage,
              });
            }
          }
        }
      }
    }
  }

  exec.pl_data[pipeline].tasks_queued = true;

  if no_tasks_run && pipeline_can_advance(&exec.pl_data[pipeline]) {
    // Nothing will complete on this stage to re-dirty the pipeline, so it
    // would get stuck here. Re-dirty it for the next sub-cycle.
    exec.pl_advance_next.set(pipeline.index());
    exec.has_pl_advance = true;
  }
}

fn run_pipeline_recurse(tasks: &Tasks, graph: &TaskGraph, exec: &mut ExecContext, pipeline: PipelineId) {
  if graph.stage_count(pipeline) != 0 {
    let pl = &mut exec.pl_data[pipeline];
    pl.running = true;
    pl.do_loop = tasks.pipeline_info[pipeline].loops;
    pl.cancel_optionals = false;

    if pl.own_stage_req_tasks_left == 0 {
      exec.pl_advance.set(pipeline.index());
      exec.has_pl_advance = true;
    }
  }

  for &child in graph.pipeline_to_children.view(pipeline) {
    run_pipeline_recurse(tasks, graph, exec, child);
  }
}

/// Skip the remaining optional stages of `pipeline`, from its current stage
/// forward. Tasks on those stages are treated as already done: edge counters
/// on both sides are settled here, and the advance sweeps enqueue nothing
/// for cancelled stages. Idempotent.
pub fn pipeline_cancel_optionals(
  tasks: &Tasks,
  graph: &TaskGraph,
  exec: &mut ExecContext,
  pipeline: PipelineId,
) {
  if exec.pl_data[pipeline].cancel_optionals {
    return;
  }
  let current = exec.pl_data[pipeline]
    .stage
    .expect("cancelling optionals of a pipeline that is not on a stage");

  let optional_stages = tasks.pipeline_info[pipeline].optional_stages;
  let stage_count = graph.stage_count(pipeline) as u32;

  for stage in current.0..stage_count {
    let stage = StageId(stage);
    if !optional_stages.test(stage) {
      continue;
    }
    let anystg = graph.anystg_from(pipeline, stage);

    for &task in graph.anystg_to_runtask.view(anystg) {
      // Stages elsewhere waiting on this task (reverse Stage-requires-Task)
      for &req_anystg in graph.task_to_rev_stgreqtask.view(task) {
        let req_pipeline = graph.anystg_to_pipeline[req_anystg];
        let req_stage = graph.stage_from(req_pipeline, req_anystg);

        if exec.pl_data[req_pipeline].stage == Some(req_stage) {
          assert!(exec.pl_data[req_pipeline].own_stage_req_tasks_left != 0);
          exec.pl_data[req_pipeline].own_stage_req_tasks_left -= 1;
          pipeline_try_advance(exec, req_pipeline);
        }
      }

      // Stages this task was waiting on (Task-requires-Stage)
      for req in graph.task_to_taskreqstg.view(task) {
        if exec.pl_data[req.req_pipeline].stage == Some(req.req_stage) {
          assert!(exec.pl_data[req.req_pipeline].tasks_req_own_stage_left != 0);
          exec.pl_data[req.req_pipeline].tasks_req_own_stage_left -= 1;
          pipeline_try_advance(exec, req.req_pipeline);
        }
      }
    }
  }

  exec.pl_data[pipeline].cancel_optionals = true;
}

/// Drive the graph until no pipeline can advance without an external task
/// completion. Fills the ready set.
pub fn enqueue_dirty(tasks: &Tasks, graph: &TaskGraph, exec: &mut ExecContext) {
  exec.record(ExecLog::EnqueueStart);

  if exec.has_request_run {
    for pl in exec.pl_data.iter() {
      assert!(
        !pl.running,
        "starting new pipelines while pipelines are running is not supported"
      );
    }

    let requested: SmallVec<[PipelineId; 16]> =
      exec.pl_request_run.ones().map(PipelineId::from_index).collect();
    for pipeline in requested {
      run_pipeline_recurse(tasks, graph, exec, pipeline);
    }
    exec.pl_request_run.clear();
    exec.has_request_run = false;
  }

  while exec.has_pl_advance {
    exec.record(ExecLog::EnqueueCycle);
    exec.has_pl_advance = false;

    let dirty: SmallVec<[PipelineId; 16]> =
      exec.pl_advance.ones().map(PipelineId::from_index).collect();

    // Three sweeps in fixed order: stages move, then counters are
    // re-evaluated against the new stages, then tasks are enqueued.
    for &pipeline in &dirty {
      pipeline_advance_stage(graph, exec, pipeline);
    }
    for &pipeline in &dirty {
      pipeline_advance_reqs(tasks, graph, exec, pipeline);
    }
    for &pipeline in &dirty {
      pipeline_advance_run(tasks, graph, exec, pipeline);
    }

    let ExecContext {
      pl_advance,
      pl_advance_next,
      ..
    } = exec;
    pl_advance.copy_from(pl_advance_next);
    pl_advance_next.clear();
  }

  tracing::trace!(ready = exec.ready_count(), blocked = exec.blocked_count(), "graph quiesced");
  exec.record(ExecLog::EnqueueEnd);
}

/// Record a completed task, settle its edges, and schedule any pipelines
/// that can now advance. The caller invokes [`enqueue_dirty`] afterwards.
pub fn complete_task(
  tasks: &Tasks,
  graph: &TaskGraph,
  exec: &mut ExecContext,
  task: TaskId,
  actions: TaskActions,
) {
  assert!(
    exec.tasks_queued_run.test(task.index()),
    "completing a task that is not in the ready set"
  );
  exec.tasks_queued_run.reset(task.index());
  exec.record(ExecLog::CompleteTask { task });

  let run_on = tasks.task_run_on[task];
  exec.pl_data[run_on.pipeline].tasks_queued_run -= 1;
  pipeline_try_advance(exec, run_on.pipeline);

  // Stages waiting on this task
  for &req_anystg in graph.task_to_rev_stgreqtask.view(task) {
    let req_pipeline = graph.anystg_to_pipeline[req_anystg];
    let req_stage = graph.stage_from(req_pipeline, req_anystg);

    if exec.pl_data[req_pipeline].stage == Some(req_stage) {
      exec.pl_data[req_pipeline].own_stage_req_tasks_left -= 1;
      pipeline_try_advance(exec, req_pipeline);
    } else {
      // The edge holds that pipeline at or before the required stage for
      // as long as this task exists; anything else means the graph broke
      let stage = exec.pl_data[req_pipeline].stage;
      assert!(
        matches!(stage, Some(stage) if stage < req_stage),
        "stage-requires-task violated: requiring pipeline moved past the required stage"
      );
    }
  }

  // Stages this task required
  for req in graph.task_to_taskreqstg.view(task) {
    assert!(
      exec.pl_data[req.req_pipeline].stage == Some(req.req_stage),
      "task-requires-stage violated: required stage not selected while the task ran"
    );
    exec.pl_data[req.req_pipeline].tasks_req_own_stage_left -= 1;
    pipeline_try_advance(exec, req.req_pipeline);
  }

  if actions.contains(TaskActions::CANCEL_OPTIONAL_STAGES) {
    exec.record(ExecLog::CompleteTaskTrigger {
      pipeline: run_on.pipeline,
    });
    pipeline_cancel_optionals(tasks, graph, exec, run_on.pipeline);
  }
}

#[cfg(test)]
#[path = "execute_test.rs"]
mod execute_test;
