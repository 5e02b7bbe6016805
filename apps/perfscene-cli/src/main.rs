use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use glam::{EulerRot, Vec3};
use perfscene_assets::ResourceRegistry;
use perfscene_frame::{CountingScheduler, FrameDriver, ManualClock, RenderContext, Spin};
use perfscene_instancing::{BatchBuilder, InstanceTransform, ScatterPolicy};
use perfscene_render::{FramePlan, HeadlessRenderer, RenderInfo, RenderView, StaticControls};
use perfscene_scene::{BatchConfig, DemoConfig, DrawStrategy, Scene, build_demo_scene, populate};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "perfscene-cli", about = "CLI tool for perfscene operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info and the default configuration
    Info,
    /// Generate and print instance transforms
    Scatter {
        /// Number of instances
        #[arg(short, long, default_value = "50")]
        count: usize,
        /// Side of the cube the positions fall in
        #[arg(short, long, default_value = "10.0")]
        extent: f32,
        /// RNG seed; random when omitted
        #[arg(short, long)]
        seed: Option<u64>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run the frame driver headless on a manual clock
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "10")]
        frames: u64,
        /// Simulated frame rate
        #[arg(long, default_value = "60.0")]
        fps: f64,
        /// YAML demo configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compare draw cost of the four ways to put N boxes in a scene
    Compare {
        /// Number of boxes
        #[arg(short, long, default_value = "50")]
        count: usize,
        /// RNG seed shared by every strategy
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
    /// Write the demo scene's geometry and material registry as JSON
    Export {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// YAML demo configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DemoConfig> {
    match path {
        Some(path) => DemoConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(DemoConfig::default()),
    }
}

fn scatter(count: usize, extent: f32, seed: Option<u64>) -> anyhow::Result<Vec<InstanceTransform>> {
    let transforms = BatchBuilder::new(count)
        .policy(ScatterPolicy::cube(extent))
        .maybe_seed(seed)
        .generate()?;
    Ok(transforms)
}

/// What a headless run produced.
struct Simulation {
    frames: Vec<RenderInfo>,
    requests: u64,
    uploads: u32,
}

fn simulate(config: &DemoConfig, frames: u64, fps: f64) -> anyhow::Result<Simulation> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("fps must be a positive number, got {fps}");
    }
    let Ok(step) = Duration::try_from_secs_f64(1.0 / fps) else {
        bail!("fps {fps} gives a frame step too long to represent");
    };
    let mut demo = build_demo_scene(config)?;
    let mut renderer = HeadlessRenderer::new();
    let mut controls = StaticControls(RenderView {
        eye: config.camera.position,
        target: config.camera.target,
        fov_degrees: config.camera.fov_degrees,
        near: config.camera.near,
        far: config.camera.far,
        ..RenderView::default()
    });
    let mut scheduler = CountingScheduler::default();
    let mut driver = FrameDriver::new(ManualClock::new());

    if let Some(knot) = demo.spinner {
        driver.add_spin(Spin::object(knot, Vec3::Y, 0.1));
    }
    if let Some(batch) = demo.population.batch {
        if config.batch.spin_rate != 0.0 {
            driver.add_spin(Spin::batch(batch, Vec3::Y, config.batch.spin_rate));
        }
    }

    let mut infos = Vec::with_capacity(frames as usize);
    let mut uploads = 0;
    for _ in 0..frames {
        driver.clock_mut().advance(step);
        let tick = driver.tick(
            RenderContext::new(&mut demo.scene, &mut renderer, &mut controls),
            &mut scheduler,
        );
        uploads += tick.uploads;
        infos.push(tick.output);
    }
    driver.halt();
    tracing::info!(
        frames,
        requests = scheduler.requests,
        uploads,
        fps = driver.stats().fps(),
        "simulation finished"
    );

    Ok(Simulation {
        frames: infos,
        requests: scheduler.requests,
        uploads,
    })
}

/// Draw statistics of one frame per strategy, all scattered from the same seed.
fn compare(count: usize, seed: u64) -> anyhow::Result<Vec<(DrawStrategy, RenderInfo)>> {
    let config = BatchConfig {
        count,
        seed: Some(seed),
        ..BatchConfig::default()
    };
    DrawStrategy::ALL
        .into_iter()
        .map(|strategy| {
            let mut scene = Scene::new();
            populate(&mut scene, strategy, &config)?;
            let info = FramePlan::build(&scene).info(0, &scene, 0);
            tracing::debug!(%strategy, %info, "strategy planned");
            Ok((strategy, info))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("perfscene-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("assets: {}", perfscene_assets::crate_info());
            println!("instancing: {}", perfscene_instancing::crate_info());
            println!("scene: {}", perfscene_scene::crate_info());
            println!("render: {}", perfscene_render::crate_info());
            println!("frame: {}", perfscene_frame::crate_info());
            println!();
            println!("default config:");
            print!("{}", DemoConfig::default().to_yaml()?);
        }
        Commands::Scatter {
            count,
            extent,
            seed,
            json,
        } => {
            let transforms = scatter(count, extent, seed)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&transforms)?);
            } else {
                println!("{:>5}  {:>8} {:>8} {:>8}  {:>7} {:>7} {:>7}", "i", "x", "y", "z", "rx", "ry", "rz");
                for (i, t) in transforms.iter().enumerate() {
                    let (rx, ry, rz) = t.rotation.to_euler(EulerRot::XYZ);
                    println!(
                        "{i:>5}  {:>8.3} {:>8.3} {:>8.3}  {:>7.3} {:>7.3} {:>7.3}",
                        t.position.x, t.position.y, t.position.z, rx, ry, rz
                    );
                }
            }
        }
        Commands::Simulate {
            frames,
            fps,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            println!(
                "Simulating {frames} frames at {fps} fps: strategy={}, boxes={}",
                config.strategy, config.batch.count
            );
            let run = simulate(&config, frames, fps)?;
            for info in &run.frames {
                println!("{info}");
            }
            println!(
                "Frames: {}, next-frame requests: {}, buffer uploads: {}",
                run.frames.len(),
                run.requests,
                run.uploads
            );
        }
        Commands::Compare { count, seed } => {
            println!("{count} boxes, seed {seed}");
            println!(
                "{:<10} {:>10} {:>10} {:>10} {:>10}",
                "strategy", "calls", "geometries", "materials", "triangles"
            );
            for (strategy, info) in compare(count, seed)? {
                println!(
                    "{:<10} {:>10} {:>10} {:>10} {:>10}",
                    strategy.as_str(),
                    info.draw_calls,
                    info.geometries,
                    info.materials,
                    info.triangles
                );
            }
        }
        Commands::Export { out, config } => {
            let config = load_config(config.as_deref())?;
            let demo = build_demo_scene(&config)?;
            demo.scene.resources().save(&out)?;
            tracing::info!(path = %out.display(), "registry written");
            let reloaded = ResourceRegistry::load(&out)?;
            println!(
                "Wrote {} geometries and {} materials to {}",
                reloaded.geometry_count(),
                reloaded.material_count(),
                out.display()
            );
        }
    }

    Ok(())
}
