//! Declaration API: register pipelines and tasks, freeze into a [`TaskGraph`].

use orbit_ids::{Id, KeyedVec};

use crate::graph::{
  AnyStageId, Fanout, PipelineId, PipelineInfo, PipelineStage, StageBits, StageRequiresTask,
  TaskGraph, TaskId, TaskRequiresStage, Tasks,
};

/// Declaration of one pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PipelineSpec {
  pub stage_count: u32,
  pub loops: bool,
  pub optional_stages: StageBits,
  pub parent: Option<PipelineId>,
}

impl PipelineSpec {
  pub fn new(stage_count: u32) -> Self {
    Self {
      stage_count,
      loops: false,
      optional_stages: StageBits::NONE,
      parent: None,
    }
  }

  pub fn loops(mut self) -> Self {
    self.loops = true;
    self
  }

  pub fn optional_stages(mut self, stages: StageBits) -> Self {
    self.optional_stages = stages;
    self
  }

  pub fn parent(mut self, parent: PipelineId) -> Self {
    self.parent = Some(parent);
    self
  }
}

/// Declaration of one task: where it runs and which edges it participates in.
#[derive(Clone, Debug)]
pub struct TaskSpec {
  pub run_on: PipelineStage,
  /// Task-requires-Stage: this task may execute only while each listed
  /// pipeline sits at the listed stage.
  pub requires_stages: Vec<PipelineStage>,
  /// Stage-requires-Task: each listed stage may not be advanced past until
  /// this task completes.
  pub required_by_stages: Vec<PipelineStage>,
}

impl TaskSpec {
  pub fn new(run_on: PipelineStage) -> Self {
    Self {
      run_on,
      requires_stages: Vec::new(),
      required_by_stages: Vec::new(),
    }
  }

  pub fn requires(mut self, tpl: PipelineStage) -> Self {
    self.requires_stages.push(tpl);
    self
  }

  pub fn required_by(mut self, tpl: PipelineStage) -> Self {
    self.required_by_stages.push(tpl);
    self
  }
}

/// Accumulates declarations, then computes offsets and reverse tables.
#[derive(Default)]
pub struct TasksBuilder {
  tasks: Tasks,
  specs: Vec<TaskSpec>,
}

impl TasksBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn pipeline(&mut self, spec: PipelineSpec) -> PipelineId {
    assert!(spec.stage_count <= 32, "pipelines have at most 32 stages");
    let id = self.tasks.pipeline_ids.create();
    self
      .tasks
      .pipeline_info
      .resize_default(self.tasks.pipeline_ids.capacity());
    self.tasks.pipeline_info[id] = PipelineInfo {
      stage_count: spec.stage_count,
      loops: spec.loops,
      optional_stages: spec.optional_stages,
      parent: spec.parent,
    };
    id
  }

  pub fn task(&mut self, spec: TaskSpec) -> TaskId {
    let id = self.tasks.task_ids.create();
    self
      .tasks
      .task_run_on
      .resize_default(self.tasks.task_ids.capacity());
    self.tasks.task_run_on[id] = spec.run_on;
    debug_assert_eq!(id.index(), self.specs.len(), "task ids are dense");
    self.specs.push(spec);
    id
  }

  /// Validate the declarations and compute the full fan-out graph.
  pub fn finish(self) -> (Tasks, TaskGraph) {
    let tasks = self.tasks;
    let pl_capacity = tasks.pipeline_ids.capacity();
    let task_capacity = tasks.task_ids.capacity();

    // Contiguous any-stage ranges per pipeline
    let mut pipeline_to_first_anystg = Vec::with_capacity(pl_capacity + 1);
    let mut total: u32 = 0;
    pipeline_to_first_anystg.push(0);
    for pl in 0..pl_capacity {
      let pl = PipelineId(pl as u32);
      if tasks.pipeline_ids.exists(pl) {
        total += tasks.pipeline_info[pl].stage_count;
      }
      pipeline_to_first_anystg.push(total);
    }
    let anystg_capacity = total as usize;

    let mut anystg_to_pipeline: KeyedVec<AnyStageId, PipelineId> = KeyedVec::new();
    anystg_to_pipeline.resize_default(anystg_capacity);
    for pl in tasks.pipeline_ids.iter() {
      let first = pipeline_to_first_anystg[pl.index()];
      let last = pipeline_to_first_anystg[pl.index() + 1];
      for anystg in first..last {
        anystg_to_pipeline[AnyStageId(anystg)] = pl;
      }
    }

    let anystg_of = |tpl: PipelineStage| -> AnyStageId {
      assert!(
        tasks.pipeline_ids.exists(tpl.pipeline),
        "edge references a pipeline that does not exist"
      );
      assert!(
        tpl.stage.0 < tasks.pipeline_info[tpl.pipeline].stage_count,
        "edge references a stage past the pipeline's stage count"
      );
      AnyStageId(pipeline_to_first_anystg[tpl.pipeline.index()] + tpl.stage.0)
    };

    let mut runtask_buckets: Vec<Vec<TaskId>> = vec![Vec::new(); anystg_capacity];
    let mut stgreqtask_buckets: Vec<Vec<StageRequiresTask>> = vec![Vec::new(); anystg_capacity];
    let mut rev_stgreqtask_buckets: Vec<Vec<AnyStageId>> = vec![Vec::new(); task_capacity];
    let mut taskreqstg_buckets: Vec<Vec<TaskRequiresStage>> = vec![Vec::new(); task_capacity];
    let mut rev_taskreqstg_buckets: Vec<Vec<TaskId>> = vec![Vec::new(); anystg_capacity];

    for (index, spec) in self.specs.iter().enumerate() {
      let task = TaskId(index as u32);
      let run_on = anystg_of(spec.run_on);
      runtask_buckets[run_on.index()].push(task);

      for &tpl in &spec.requires_stages {
        let anystg = anystg_of(tpl);
        taskreqstg_buckets[task.index()].push(TaskRequiresStage {
          req_pipeline: tpl.pipeline,
          req_stage: tpl.stage,
        });
        rev_taskreqstg_buckets[anystg.index()].push(task);
      }

      for &tpl in &spec.required_by_stages {
        let anystg = anystg_of(tpl);
        stgreqtask_buckets[anystg.index()].push(StageRequiresTask {
          req_task: task,
          req_pipeline: spec.run_on.pipeline,
          req_stage: spec.run_on.stage,
        });
        rev_stgreqtask_buckets[task.index()].push(anystg);
      }
    }

    let mut children_buckets: Vec<Vec<PipelineId>> = vec![Vec::new(); pl_capacity];
    for pl in tasks.pipeline_ids.iter() {
      if let Some(parent) = tasks.pipeline_info[pl].parent {
        assert!(
          tasks.pipeline_ids.exists(parent),
          "parent pipeline does not exist"
        );
        children_buckets[parent.index()].push(pl);
      }
    }

    let graph = TaskGraph {
      pipeline_to_first_anystg,
      anystg_to_pipeline,
      anystg_to_runtask: Fanout::from_buckets(runtask_buckets),
      anystg_to_stgreqtask: Fanout::from_buckets(stgreqtask_buckets),
      task_to_rev_stgreqtask: Fanout::from_buckets(rev_stgreqtask_buckets),
      task_to_taskreqstg: Fanout::from_buckets(taskreqstg_buckets),
      anystg_to_rev_taskreqstg: Fanout::from_buckets(rev_taskreqstg_buckets),
      pipeline_to_children: Fanout::from_buckets(children_buckets),
    };

    (tasks, graph)
  }
}
