//! Executor throughput benchmarks.
//!
//! Measures the enqueue/complete alternation over a chain of pipelines with
//! cross-pipeline stage requirements - the shape a frame graph takes, scaled
//! up. No task bodies: completion cost only.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use orbit_tasks::{
  complete_task, enqueue_dirty, exec_resize, pipeline_run, ExecContext, PipelineSpec, TaskActions,
  TaskGraph, TaskSpec, Tasks, TasksBuilder,
};

/// A chain of `n` pipelines, 4 stages each, one task per stage; each
/// pipeline's stage-1 task requires the previous pipeline's stage 2.
fn build_chain(n: usize) -> (Tasks, TaskGraph) {
  let mut b = TasksBuilder::new();
  let pipelines: Vec<_> = (0..n).map(|_| b.pipeline(PipelineSpec::new(4))).collect();

  for (i, &pl) in pipelines.iter().enumerate() {
    for stage in 0..4 {
      let mut spec = TaskSpec::new(pl.stage(stage));
      if stage == 1 && i > 0 {
        spec = spec.requires(pipelines[i - 1].stage(2));
      }
      b.task(spec);
    }
  }
  b.finish()
}

fn run_all(tasks: &Tasks, graph: &TaskGraph, exec: &mut ExecContext) -> usize {
  for pipeline in tasks.pipeline_ids.iter() {
    pipeline_run(exec, pipeline);
  }

  let mut completed = 0;
  loop {
    enqueue_dirty(tasks, graph, exec);
    let batch: Vec<_> = exec.ready_tasks().collect();
    if batch.is_empty() {
      break;
    }
    for task in batch {
      complete_task(tasks, graph, exec, task, TaskActions::NONE);
      completed += 1;
    }
  }
  completed
}

fn bench_chain(c: &mut Criterion) {
  let mut group = c.benchmark_group("executor_chain");

  for n in [4usize, 16, 64] {
    let (tasks, graph) = build_chain(n);
    group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, _| {
      let mut exec = ExecContext::default();
      exec_resize(&tasks, &graph, &mut exec);
      bench.iter(|| {
        let completed = run_all(&tasks, &graph, &mut exec);
        black_box(completed)
      });
    });
  }

  group.finish();
}

criterion_group!(benches, bench_chain);
criterion_main!(benches);
