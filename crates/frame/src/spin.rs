use glam::{Quat, Vec3};
use perfscene_common::{BatchId, ObjectId};
use perfscene_scene::Scene;

/// What a [`Spin`] rotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinTarget {
    Object(ObjectId),
    Batch(BatchId),
}

/// Time-based rotation applied by the frame driver every tick.
///
/// Objects are set to an absolute rotation of `elapsed * rate` about the
/// axis. Batches rotate every instance by `dt * rate`, which flags the
/// buffer dirty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spin {
    pub target: SpinTarget,
    pub axis: Vec3,
    /// Radians per second.
    pub rate: f32,
}

impl Spin {
    pub fn new(target: SpinTarget, axis: Vec3, rate: f32) -> Self {
        Self {
            target,
            axis: axis.normalize_or(Vec3::Y),
            rate,
        }
    }

    pub fn object(id: ObjectId, axis: Vec3, rate: f32) -> Self {
        Self::new(SpinTarget::Object(id), axis, rate)
    }

    pub fn batch(id: BatchId, axis: Vec3, rate: f32) -> Self {
        Self::new(SpinTarget::Batch(id), axis, rate)
    }

    /// Rotate the target. Returns false when it is no longer in the scene.
    pub fn apply(&self, scene: &mut Scene, elapsed: f32, dt: f32) -> bool {
        match self.target {
            SpinTarget::Object(id) => match scene.get_mut(id) {
                Some(object) => {
                    object.transform.rotation = Quat::from_axis_angle(self.axis, elapsed * self.rate);
                    true
                }
                None => false,
            },
            SpinTarget::Batch(id) => match scene.batch_mut(id) {
                Some(batch) => {
                    let step = dt * self.rate;
                    if step != 0.0 {
                        let delta = Quat::from_axis_angle(self.axis, step);
                        batch
                            .buffer_mut()
                            .update_all(|_, t| t.rotation = (delta * t.rotation).normalize());
                    }
                    true
                }
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfscene_scene::{BatchConfig, DemoConfig, DrawStrategy, build_demo_scene, populate};

    #[test]
    fn object_rotation_is_absolute() {
        let mut demo = build_demo_scene(&DemoConfig {
            show_reference_meshes: true,
            ..DemoConfig::default()
        })
        .unwrap();
        let id = demo.spinner.unwrap();
        let spin = Spin::object(id, Vec3::Y, 0.5);

        assert!(spin.apply(&mut demo.scene, 1.0, 1.0));
        assert!(spin.apply(&mut demo.scene, 2.0, 1.0));
        let rotation = demo.scene.get(id).unwrap().transform.rotation;
        assert!(rotation.abs_diff_eq(Quat::from_rotation_y(1.0), 1e-5));
    }

    #[test]
    fn batch_rotation_accumulates_and_dirties() {
        let mut scene = Scene::new();
        let pop = populate(&mut scene, DrawStrategy::Instanced, &BatchConfig::default()).unwrap();
        let id = pop.batch.unwrap();
        let before = scene.batch(id).unwrap().buffer().as_slice().to_vec();
        scene.batch_mut(id).unwrap().buffer_mut().mark_clean();

        let spin = Spin::batch(id, Vec3::Y, 1.0);
        spin.apply(&mut scene, 0.25, 0.25);
        spin.apply(&mut scene, 0.5, 0.25);

        let batch = scene.batch(id).unwrap();
        assert!(batch.buffer().is_dirty());
        let delta = Quat::from_rotation_y(0.5);
        for (a, b) in before.iter().zip(batch.buffer().as_slice()) {
            assert_eq!(a.position, b.position);
            assert!(b.rotation.abs_diff_eq(delta * a.rotation, 1e-4));
        }
    }

    #[test]
    fn zero_step_leaves_batch_clean() {
        let mut scene = Scene::new();
        let pop = populate(&mut scene, DrawStrategy::Instanced, &BatchConfig::default()).unwrap();
        let id = pop.batch.unwrap();
        scene.batch_mut(id).unwrap().buffer_mut().mark_clean();

        Spin::batch(id, Vec3::Y, 1.0).apply(&mut scene, 0.0, 0.0);
        assert!(!scene.batch(id).unwrap().buffer().is_dirty());
    }

    #[test]
    fn missing_target_reports_false() {
        let mut scene = Scene::new();
        assert!(!Spin::batch(BatchId(7), Vec3::Y, 1.0).apply(&mut scene, 1.0, 1.0));
        assert!(!Spin::object(ObjectId::new(), Vec3::Y, 1.0).apply(&mut scene, 1.0, 1.0));
    }

    #[test]
    fn zero_axis_falls_back_to_y() {
        let spin = Spin::batch(BatchId(0), Vec3::ZERO, 1.0);
        assert_eq!(spin.axis, Vec3::Y);
    }
}
