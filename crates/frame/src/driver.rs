use perfscene_render::{Controls, Renderer};
use perfscene_scene::Scene;

use crate::clock::{Clock, WallClock};
use crate::spin::Spin;
use crate::stats::FrameStats;

/// Requests the next tick. The desktop app asks the window for a redraw;
/// headless runs count the requests.
pub trait FrameScheduler {
    fn request_next_frame(&mut self);
}

/// Scheduler that only counts requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingScheduler {
    pub requests: u64,
}

impl FrameScheduler for CountingScheduler {
    fn request_next_frame(&mut self) {
        self.requests += 1;
    }
}

/// Everything one tick reads or writes.
pub struct RenderContext<'a, R, C> {
    pub scene: &'a mut Scene,
    pub renderer: &'a mut R,
    pub controls: &'a mut C,
}

impl<'a, R, C> RenderContext<'a, R, C> {
    pub fn new(scene: &'a mut Scene, renderer: &'a mut R, controls: &'a mut C) -> Self {
        Self {
            scene,
            renderer,
            controls,
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct Tick<O> {
    pub frame: u64,
    /// Seconds since the driver's clock started.
    pub elapsed: f32,
    /// Seconds since the previous tick.
    pub dt: f32,
    pub uploads: u32,
    pub rescheduled: bool,
    pub output: O,
}

/// Per-frame update loop: animate, update controls, upload, render, reschedule.
///
/// One tick is in flight at a time and each completed tick requests exactly
/// one successor, so the loop runs until [`FrameDriver::halt`] is called.
pub struct FrameDriver<K: Clock = WallClock> {
    clock: K,
    last_elapsed: f32,
    frame: u64,
    spins: Vec<Spin>,
    stats: FrameStats,
    halted: bool,
}

impl Default for FrameDriver<WallClock> {
    fn default() -> Self {
        Self::new(WallClock::new())
    }
}

impl<K: Clock> FrameDriver<K> {
    pub fn new(clock: K) -> Self {
        Self {
            last_elapsed: clock.elapsed().as_secs_f32(),
            clock,
            frame: 0,
            spins: Vec::new(),
            stats: FrameStats::default(),
            halted: false,
        }
    }

    pub fn add_spin(&mut self, spin: Spin) {
        self.spins.push(spin);
    }

    pub fn spins(&self) -> &[Spin] {
        &self.spins
    }

    /// Stop requesting frames. The tick in progress, if any, still completes.
    pub fn halt(&mut self) {
        if !self.halted {
            tracing::info!(frames = self.frame, "frame driver halted");
        }
        self.halted = true;
    }

    /// Allow rescheduling again. The caller must request the next frame itself.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Ticks completed so far.
    pub fn frames(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Run one frame.
    pub fn tick<R, C, S>(&mut self, ctx: RenderContext<'_, R, C>, scheduler: &mut S) -> Tick<R::Output>
    where
        R: Renderer,
        C: Controls,
        S: FrameScheduler,
    {
        let RenderContext {
            scene,
            renderer,
            controls,
        } = ctx;

        self.stats.begin(self.clock.elapsed());

        let elapsed = self.clock.elapsed().as_secs_f32();
        let dt = (elapsed - self.last_elapsed).max(0.0);
        self.last_elapsed = elapsed;

        self.spins.retain(|spin| {
            let alive = spin.apply(scene, elapsed, dt);
            if !alive {
                tracing::warn!(spin = ?spin.target, "spin target left the scene, dropping");
            }
            alive
        });

        controls.update(dt);

        let mut uploads = 0;
        for (id, batch) in scene.batches_mut() {
            if batch.buffer().is_dirty() {
                tracing::debug!(batch = id.0, instances = batch.len(), "uploading instance buffer");
                renderer.upload_batch(id, batch);
                batch.buffer_mut().mark_clean();
                uploads += 1;
            }
        }

        let output = renderer.render(scene, &controls.view());

        scene.acknowledge_shadow_update();

        let rescheduled = !self.halted;
        if rescheduled {
            scheduler.request_next_frame();
        }

        let frame = self.frame;
        self.frame += 1;
        self.stats.end(self.clock.elapsed());

        Tick {
            frame,
            elapsed,
            dt,
            uploads,
            rescheduled,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::{Quat, Vec3};
    use perfscene_instancing::InstanceTransform;
    use perfscene_render::{HeadlessRenderer, RenderView, StaticControls};
    use perfscene_scene::{BatchConfig, DemoConfig, DrawStrategy, build_demo_scene, populate};

    use super::*;
    use crate::clock::ManualClock;

    struct Harness {
        scene: Scene,
        renderer: HeadlessRenderer,
        controls: StaticControls,
        scheduler: CountingScheduler,
        driver: FrameDriver<ManualClock>,
    }

    impl Harness {
        fn new(scene: Scene) -> Self {
            Self {
                scene,
                renderer: HeadlessRenderer::new(),
                controls: StaticControls::default(),
                scheduler: CountingScheduler::default(),
                driver: FrameDriver::new(ManualClock::new()),
            }
        }

        fn step(&mut self, secs: f32) -> Tick<perfscene_render::RenderInfo> {
            self.driver
                .clock_mut()
                .advance(Duration::from_secs_f32(secs));
            let ctx = RenderContext::new(&mut self.scene, &mut self.renderer, &mut self.controls);
            self.driver.tick(ctx, &mut self.scheduler)
        }
    }

    fn instanced_scene(count: usize) -> (Scene, perfscene_common::BatchId) {
        let mut scene = Scene::new();
        let config = BatchConfig {
            count,
            seed: Some(3),
            ..BatchConfig::default()
        };
        let pop = populate(&mut scene, DrawStrategy::Instanced, &config).unwrap();
        (scene, pop.batch.unwrap())
    }

    #[test]
    fn each_tick_requests_exactly_one_frame() {
        let (scene, _) = instanced_scene(50);
        let mut h = Harness::new(scene);
        for n in 1..=10 {
            let tick = h.step(1.0 / 60.0);
            assert!(tick.rescheduled);
            assert_eq!(h.scheduler.requests, n);
        }
        assert_eq!(h.driver.frames(), 10);
    }

    #[test]
    fn halted_driver_stops_rescheduling() {
        let (scene, _) = instanced_scene(50);
        let mut h = Harness::new(scene);
        h.step(0.016);
        h.driver.halt();
        let tick = h.step(0.016);
        assert!(!tick.rescheduled);
        assert_eq!(h.scheduler.requests, 1);
        assert_eq!(h.renderer.frames(), 2);
        assert!(h.driver.is_halted());

        h.driver.resume();
        assert!(h.step(0.016).rescheduled);
        assert_eq!(h.scheduler.requests, 2);
    }

    #[test]
    fn fifty_boxes_render_in_one_call() {
        let (scene, id) = instanced_scene(50);
        let mut h = Harness::new(scene);
        let tick = h.step(0.016);
        assert_eq!(tick.output.draw_calls, 1);
        assert_eq!(tick.output.instances, 50);
        assert_eq!(h.renderer.uploaded(id).unwrap().len(), 50);
    }

    #[test]
    fn empty_batch_renders_nothing() {
        let (scene, _) = instanced_scene(0);
        let mut h = Harness::new(scene);
        let tick = h.step(0.016);
        assert_eq!(tick.output.draw_calls, 0);
        assert_eq!(tick.output.instances, 0);
        assert!(tick.rescheduled);
    }

    #[test]
    fn dirty_batch_is_uploaded_once_per_mutation() {
        let (scene, id) = instanced_scene(50);
        let mut h = Harness::new(scene);

        assert_eq!(h.step(0.016).uploads, 1);
        assert_eq!(h.step(0.016).uploads, 0);
        assert_eq!(h.step(0.016).uploads, 0);
        assert_eq!(h.renderer.upload_count(id), 1);

        let moved = InstanceTransform::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY);
        h.scene
            .batch_mut(id)
            .unwrap()
            .buffer_mut()
            .set(0, moved)
            .unwrap();
        assert_eq!(h.step(0.016).uploads, 1);
        assert_eq!(h.renderer.upload_count(id), 2);
        let first = h.renderer.uploaded(id).unwrap()[0];
        assert_eq!(first[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn spinning_batch_uploads_every_frame() {
        let (scene, id) = instanced_scene(10);
        let mut h = Harness::new(scene);
        h.driver.add_spin(Spin::batch(id, Vec3::Y, 1.0));
        for _ in 0..3 {
            assert_eq!(h.step(0.016).uploads, 1);
        }
        assert_eq!(h.renderer.upload_count(id), 3);
    }

    #[test]
    fn elapsed_and_dt_follow_the_clock() {
        let (scene, _) = instanced_scene(1);
        let mut h = Harness::new(scene);
        let a = h.step(0.5);
        let b = h.step(0.25);
        assert!((a.elapsed - 0.5).abs() < 1e-6);
        assert!((a.dt - 0.5).abs() < 1e-6);
        assert!((b.elapsed - 0.75).abs() < 1e-6);
        assert!((b.dt - 0.25).abs() < 1e-6);
        assert!(h.driver.stats().fps() > 0.0);
    }

    #[test]
    fn object_spin_uses_elapsed_time() {
        let demo = build_demo_scene(&DemoConfig {
            show_reference_meshes: true,
            ..DemoConfig::default()
        })
        .unwrap();
        let id = demo.spinner.unwrap();
        let mut h = Harness::new(demo.scene);
        h.driver.add_spin(Spin::object(id, Vec3::Y, 0.1));
        h.step(1.0);
        h.step(1.0);
        let rotation = h.scene.get(id).unwrap().transform.rotation;
        assert!(rotation.abs_diff_eq(Quat::from_rotation_y(0.2), 1e-5));
    }

    #[test]
    fn removed_spin_target_is_dropped() {
        let (scene, id) = instanced_scene(5);
        let mut h = Harness::new(scene);
        h.driver.add_spin(Spin::batch(id, Vec3::Y, 1.0));
        h.scene.remove_batch(id);
        h.step(0.016);
        assert!(h.driver.spins().is_empty());
    }

    #[test]
    fn static_shadow_map_is_drawn_once() {
        let mut config = DemoConfig {
            show_reference_meshes: true,
            ..DemoConfig::default()
        };
        config.shadows.settings.auto_update = false;
        let demo = build_demo_scene(&config).unwrap();
        let mut h = Harness::new(demo.scene);

        let first = h.step(0.016);
        assert!(first.output.shadow_draw_calls > 0);
        assert!(!h.scene.lights()[0].shadow.needs_update);
        assert_eq!(h.step(0.016).output.shadow_draw_calls, 0);

        h.scene.request_shadow_update();
        assert!(h.step(0.016).output.shadow_draw_calls > 0);
    }

    #[test]
    fn auto_shadow_map_is_drawn_every_frame() {
        let demo = build_demo_scene(&DemoConfig {
            show_reference_meshes: true,
            ..DemoConfig::default()
        })
        .unwrap();
        let mut h = Harness::new(demo.scene);
        for _ in 0..3 {
            assert!(h.step(0.016).output.shadow_draw_calls > 0);
        }
    }

    #[test]
    fn controls_view_reaches_renderer() {
        struct Counting {
            updates: u32,
            total_dt: f32,
        }
        impl Controls for Counting {
            fn update(&mut self, dt: f32) {
                self.updates += 1;
                self.total_dt += dt;
            }
            fn view(&self) -> RenderView {
                RenderView::default()
            }
        }

        let (mut scene, _) = instanced_scene(1);
        let mut renderer = HeadlessRenderer::new();
        let mut controls = Counting {
            updates: 0,
            total_dt: 0.0,
        };
        let mut scheduler = CountingScheduler::default();
        let mut driver = FrameDriver::new(ManualClock::new());
        for _ in 0..4 {
            driver.clock_mut().advance(Duration::from_millis(250));
            driver.tick(
                RenderContext::new(&mut scene, &mut renderer, &mut controls),
                &mut scheduler,
            );
        }
        assert_eq!(controls.updates, 4);
        assert!((controls.total_dt - 1.0).abs() < 1e-5);
    }
}
