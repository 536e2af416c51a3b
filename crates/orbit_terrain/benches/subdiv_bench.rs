//! Skeleton churn benchmarks.
//!
//! Two shapes: a cold expand from 20 roots with the observer on the surface,
//! and a full expand/contract cycle as the observer leaves and returns -
//! the steady-state cost of a moving camera.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::I64Vec3;
use orbit_terrain::{init_ico_terrain, update_terrain, SurfaceFrame};

fn bench_expand_from_roots(c: &mut Criterion) {
  c.bench_function("expand_from_roots", |bench| {
    bench.iter(|| {
      let (mut terrain, ico) = init_ico_terrain(50.0, 2.0, 10);
      let frame = SurfaceFrame {
        position: I64Vec3::new(0, 0, 50 * 1024),
        active: true,
      };
      let update = update_terrain(&mut terrain, &ico, &frame);
      black_box(update.stats.subdivides)
    });
  });
}

fn bench_expand_contract_cycle(c: &mut Criterion) {
  let near = SurfaceFrame {
    position: I64Vec3::new(0, 0, 50 * 1024),
    active: true,
  };
  let far = SurfaceFrame {
    position: I64Vec3::new(0, 0, 4_000_000_000),
    active: true,
  };

  c.bench_function("expand_contract_cycle", |bench| {
    let (mut terrain, ico) = init_ico_terrain(50.0, 2.0, 10);
    bench.iter(|| {
      let expanded = update_terrain(&mut terrain, &ico, &near);
      let contracted = update_terrain(&mut terrain, &ico, &far);
      black_box((expanded.stats.subdivides, contracted.stats.unsubdivides))
    });
  });
}

criterion_group!(benches, bench_expand_from_roots, bench_expand_contract_cycle);
criterion_main!(benches);
