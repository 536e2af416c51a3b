//! Static task graph: handles, declaration data, and CSR fan-out tables.
//!
//! Everything here is immutable after [`TasksBuilder::finish`] runs. The
//! executor only ever iterates fan-out slices; no allocation or mutation
//! happens at runtime.

use std::marker::PhantomData;

use orbit_ids::{define_id, Id, IdRegistry, KeyedVec};

define_id!(
  /// A unit of work, running on exactly one `(pipeline, stage)`.
  pub struct TaskId
);
define_id!(
  /// An ordered state machine of stages.
  pub struct PipelineId
);
define_id!(
  /// A stage index within one pipeline.
  pub struct StageId
);
define_id!(
  /// Flattened `(pipeline, stage)` index, used to key fan-out tables.
  pub struct AnyStageId
);

impl PipelineId {
  /// Convenience for declaring edges: `pipeline.stage(2)`.
  pub fn stage(self, stage: u32) -> PipelineStage {
    PipelineStage {
      pipeline: self,
      stage: StageId(stage),
    }
  }
}

/// A `(pipeline, stage)` pair.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct PipelineStage {
  pub pipeline: PipelineId,
  pub stage: StageId,
}

/// Bit mask over one pipeline's stages. Pipelines have at most 32 stages.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct StageBits(pub u32);

impl StageBits {
  pub const NONE: Self = Self(0);

  /// Build a mask from stage indices.
  pub fn of(stages: &[u32]) -> Self {
    let mut bits = 0;
    for &stage in stages {
      debug_assert!(stage < 32, "pipelines have at most 32 stages");
      bits |= 1 << stage;
    }
    Self(bits)
  }

  #[inline]
  pub fn test(self, stage: StageId) -> bool {
    self.0 & (1 << stage.0) != 0
  }
}

/// Per-pipeline declaration data.
#[derive(Clone, Copy, Default, Debug)]
pub struct PipelineInfo {
  pub stage_count: u32,
  /// Wrap back to stage 0 after the final stage, until cancelled.
  pub loops: bool,
  /// Stages skipped once the pipeline's optionals are cancelled.
  pub optional_stages: StageBits,
  pub parent: Option<PipelineId>,
}

/// Declared tasks and pipelines. Owned by the caller alongside [`TaskGraph`].
#[derive(Default)]
pub struct Tasks {
  pub task_ids: IdRegistry<TaskId>,
  pub pipeline_ids: IdRegistry<PipelineId>,
  /// The one `(pipeline, stage)` each task executes on.
  pub task_run_on: KeyedVec<TaskId, PipelineStage>,
  pub pipeline_info: KeyedVec<PipelineId, PipelineInfo>,
}

/// A Stage-requires-Task edge, denormalized with the required task's
/// run-on location so the executor can classify it without a lookup.
#[derive(Clone, Copy, Debug)]
pub struct StageRequiresTask {
  pub req_task: TaskId,
  /// Pipeline the required task runs on.
  pub req_pipeline: PipelineId,
  /// Stage the required task runs on.
  pub req_stage: StageId,
}

/// A Task-requires-Stage edge: the owning task may only execute while
/// `req_pipeline` sits at `req_stage`.
#[derive(Clone, Copy, Debug)]
pub struct TaskRequiresStage {
  pub req_pipeline: PipelineId,
  pub req_stage: StageId,
}

/// CSR-style fan-out: `(offsets, payload)` giving each id a payload slice.
pub struct Fanout<I: Id, T> {
  offsets: Vec<u32>,
  payload: Vec<T>,
  _marker: PhantomData<I>,
}

impl<I: Id, T> Fanout<I, T> {
  /// Flatten per-id buckets into offsets + payload.
  pub fn from_buckets(buckets: Vec<Vec<T>>) -> Self {
    let mut offsets = Vec::with_capacity(buckets.len() + 1);
    let mut payload = Vec::new();
    offsets.push(0);
    for bucket in buckets {
      payload.extend(bucket);
      offsets.push(payload.len() as u32);
    }
    Self {
      offsets,
      payload,
      _marker: PhantomData,
    }
  }

  #[inline]
  pub fn view(&self, id: I) -> &[T] {
    let first = self.offsets[id.index()] as usize;
    let last = self.offsets[id.index() + 1] as usize;
    &self.payload[first..last]
  }

  #[inline]
  pub fn size(&self, id: I) -> usize {
    self.view(id).len()
  }
}

/// Immutable fan-out tables computed from [`Tasks`] declarations.
///
/// Reverse tables are not optional: the executor decrements counters on both
/// sides of every edge as the graph progresses.
pub struct TaskGraph {
  /// First any-stage of each pipeline; stages are contiguous per pipeline.
  /// Length is pipeline capacity + 1, so it doubles as a stage-count table.
  pub pipeline_to_first_anystg: Vec<u32>,
  pub anystg_to_pipeline: KeyedVec<AnyStageId, PipelineId>,

  /// Tasks that execute on an any-stage.
  pub anystg_to_runtask: Fanout<AnyStageId, TaskId>,

  /// Stage-requires-Task edges, and the reverse: the any-stages held back
  /// by a task.
  pub anystg_to_stgreqtask: Fanout<AnyStageId, StageRequiresTask>,
  pub task_to_rev_stgreqtask: Fanout<TaskId, AnyStageId>,

  /// Task-requires-Stage edges, and the reverse: the tasks gated on an
  /// any-stage.
  pub task_to_taskreqstg: Fanout<TaskId, TaskRequiresStage>,
  pub anystg_to_rev_taskreqstg: Fanout<AnyStageId, TaskId>,

  pub pipeline_to_children: Fanout<PipelineId, PipelineId>,
}

impl TaskGraph {
  #[inline]
  pub fn anystg_from(&self, pipeline: PipelineId, stage: StageId) -> AnyStageId {
    debug_assert!((stage.0 as usize) < self.stage_count(pipeline));
    AnyStageId(self.pipeline_to_first_anystg[pipeline.index()] + stage.0)
  }

  #[inline]
  pub fn stage_from(&self, pipeline: PipelineId, anystg: AnyStageId) -> StageId {
    StageId(anystg.0 - self.pipeline_to_first_anystg[pipeline.index()])
  }

  /// Number of stages declared for a pipeline.
  #[inline]
  pub fn stage_count(&self, pipeline: PipelineId) -> usize {
    let first = self.pipeline_to_first_anystg[pipeline.index()];
    let last = self.pipeline_to_first_anystg[pipeline.index() + 1];
    (last - first) as usize
  }

  /// Total any-stage count across all pipelines.
  #[inline]
  pub fn anystg_capacity(&self) -> usize {
    *self.pipeline_to_first_anystg.last().unwrap_or(&0) as usize
  }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod graph_test;
