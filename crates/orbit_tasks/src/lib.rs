//! orbit_tasks - dataflow scheduler coordinating tasks across pipelines.
//!
//! A *pipeline* is a small state machine of ordered *stages*. *Tasks* run on
//! exactly one `(pipeline, stage)` pair, and two kinds of ordering edges
//! connect them across pipelines:
//!
//! ```text
//!   Task-requires-Stage:  task T may execute only while pipeline P is at
//!                         stage s
//!   Stage-requires-Task:  pipeline P may not advance past stage s until
//!                         task T has completed
//! ```
//!
//! The graph is declared once through [`TasksBuilder`] and frozen into an
//! immutable [`TaskGraph`] of CSR fan-out tables. Per-run state lives in
//! [`ExecContext`]; external runners alternate [`enqueue_dirty`] (drive the
//! graph until it quiesces) with [`complete_task`] (report a finished task),
//! draining the ready set in between. [`BatchRunner`] packages that loop,
//! fanning task bodies out through rayon.
//!
//! The executor is single-threaded cooperative: `enqueue_dirty` and
//! `complete_task` mutate the same context and must be called in strict
//! alternation from one thread. Only task *bodies* may run elsewhere.

pub mod builder;
pub mod execute;
pub mod graph;
pub mod log;
pub mod runner;

pub use builder::{PipelineSpec, TaskSpec, TasksBuilder};
pub use execute::{
  complete_task, enqueue_dirty, exec_resize, pipeline_cancel_loop, pipeline_cancel_optionals,
  pipeline_run, BlockedTask, ExecContext, ExecPipeline, TaskActions,
};
pub use graph::{
  AnyStageId, PipelineId, PipelineInfo, PipelineStage, StageBits, StageId,
  StageRequiresTask, TaskGraph, TaskId, TaskRequiresStage, Tasks,
};
pub use log::ExecLog;
pub use runner::{BatchRunner, RunStats};
