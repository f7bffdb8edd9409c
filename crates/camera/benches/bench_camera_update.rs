use std::hint::black_box;
use std::time::Instant;

use glam::Vec3;
use hotshade_camera::{Direction, OrientationCamera};

fn bench_update(iterations: usize) {
    let mut cam = OrientationCamera::new(Vec3::ZERO, Vec3::Y, -90.0, 0.0, 2.5, 0.1);
    let directions = [
        Direction::Forward,
        Direction::Right,
        Direction::Backward,
        Direction::Left,
        Direction::Nowhere,
    ];

    let start = Instant::now();
    for i in 0..iterations {
        let direction = directions[i % directions.len()];
        cam.update(black_box(direction), black_box(0.016), black_box(0.5), black_box(-0.25));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    black_box(cam.position());
    println!("  update ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_view_matrix(iterations: usize) {
    let cam = OrientationCamera::new(Vec3::new(3.0, 1.0, -4.0), Vec3::Y, 30.0, -15.0, 2.5, 0.1);

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(black_box(&cam).view_matrix());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  view_matrix ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn main() {
    println!("=== Camera Benchmarks ===");
    println!();

    println!("OrientationCamera::update:");
    bench_update(100_000);
    bench_update(1_000_000);
    println!();

    println!("OrientationCamera::view_matrix:");
    bench_view_matrix(100_000);
    bench_view_matrix(1_000_000);
}
