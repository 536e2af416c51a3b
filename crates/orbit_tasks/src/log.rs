//! Tagged executor event log.
//!
//! Appended to [`ExecContext::log`](crate::ExecContext) when logging is
//! enabled; consumers pattern-match. This is the executor's primary record of
//! what happened during a run - tracing events are only a human-readable
//! side channel.

use crate::graph::{PipelineId, StageId, TaskId};

/// One executor event.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExecLog {
  /// `enqueue_dirty` entered.
  EnqueueStart,
  /// One advance sub-cycle began.
  EnqueueCycle,
  /// `enqueue_dirty` returned; the graph quiesced.
  EnqueueEnd,
  /// `pipeline_run` requested a pipeline from outside.
  ExternalTrigger { pipeline: PipelineId },
  /// A pipeline moved between stages. `None` is the idle state.
  StageChange {
    pipeline: PipelineId,
    stage_old: Option<StageId>,
    stage_new: Option<StageId>,
  },
  /// A task entered the ready or blocked set.
  EnqueueTask {
    pipeline: PipelineId,
    stage: StageId,
    task: TaskId,
    blocked: bool,
  },
  /// A blocked task is waiting on this `(pipeline, stage)`.
  EnqueueTaskReq { pipeline: PipelineId, stage: StageId },
  /// A blocked task's last required stage arrived; moved to the ready set.
  UnblockTask { task: TaskId },
  /// A task was reported complete.
  CompleteTask { task: TaskId },
  /// A completion's actions cancelled the pipeline's optional stages.
  CompleteTaskTrigger { pipeline: PipelineId },
}
