use std::hint::black_box;
use std::time::Instant;

use perfscene_scene::{BatchConfig, DrawStrategy, Scene, populate};

fn bench_populate(strategy: DrawStrategy, count: usize, iterations: usize) {
    let config = BatchConfig {
        count,
        seed: Some(42),
        ..BatchConfig::default()
    };

    let start = Instant::now();
    for _ in 0..iterations {
        let mut scene = Scene::new();
        let _ = black_box(populate(&mut scene, strategy, &config));
        black_box(&scene);
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  {:<9} ({count} boxes, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}",
        strategy.as_str()
    );
}

fn main() {
    println!("=== Scene Population Benchmarks ===\n");

    for count in [50, 1000] {
        println!("{count} boxes:");
        for strategy in DrawStrategy::ALL {
            bench_populate(strategy, count, 100);
        }
        println!();
    }

    println!("=== Done ===");
}
