use std::f32::consts::TAU;

use glam::{EulerRot, Quat, Vec3};
use perfscene_common::{GeometryHandle, MaterialHandle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::BatchError;
use crate::batch::{InstanceBatch, InstanceTransform};

/// Uniform random placement of instances.
///
/// Each position axis is `center + (u - 0.5) * extent` and each Euler angle
/// (XYZ order) is `(u - 0.5) * rotation_range`, with `u` uniform in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPolicy {
    pub center: Vec3,
    pub extent: Vec3,
    pub rotation_range: Vec3,
}

impl Default for ScatterPolicy {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            extent: Vec3::splat(10.0),
            rotation_range: Vec3::new(TAU, TAU, 0.0),
        }
    }
}

impl ScatterPolicy {
    /// Cube of side `extent` centred on the origin, default rotation range.
    pub fn cube(extent: f32) -> Self {
        Self {
            extent: Vec3::splat(extent),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        let finite = self.center.is_finite()
            && self.extent.is_finite()
            && self.rotation_range.is_finite();
        if !finite || self.extent.min_element() < 0.0 || self.rotation_range.min_element() < 0.0 {
            return Err(BatchError::InvalidRange(*self));
        }
        Ok(())
    }

    /// Inclusive bounds every generated position falls within.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let half = self.extent * 0.5;
        (self.center - half, self.center + half)
    }

    pub fn sample(&self, rng: &mut impl Rng) -> InstanceTransform {
        let mut centered = || rng.r#gen::<f32>() - 0.5;
        let position = self.center
            + Vec3::new(centered(), centered(), centered()) * self.extent;
        let angles = Vec3::new(centered(), centered(), centered()) * self.rotation_range;
        let rotation = Quat::from_euler(EulerRot::XYZ, angles.x, angles.y, angles.z);
        InstanceTransform::new(position, rotation)
    }
}

/// Builds an [`InstanceBatch`] of `count` randomly placed instances.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    count: usize,
    policy: ScatterPolicy,
    seed: Option<u64>,
}

impl BatchBuilder {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            policy: ScatterPolicy::default(),
            seed: None,
        }
    }

    pub fn policy(mut self, policy: ScatterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fix the RNG seed so repeated builds produce identical transforms.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn maybe_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Generate the transforms without attaching them to a batch.
    pub fn generate(&self) -> Result<Vec<InstanceTransform>, BatchError> {
        scatter(self.count, &self.policy, self.seed)
    }

    pub fn build(
        &self,
        geometry: GeometryHandle,
        material: MaterialHandle,
    ) -> Result<InstanceBatch, BatchError> {
        let transforms = self.generate()?;
        tracing::debug!(count = transforms.len(), seed = ?self.seed, "instance batch built");
        Ok(InstanceBatch::new(geometry, material, transforms))
    }
}

impl InstanceBatch {
    /// Regenerate every transform in place. Count and index order are kept.
    pub fn rescatter(
        &mut self,
        policy: &ScatterPolicy,
        seed: Option<u64>,
    ) -> Result<(), BatchError> {
        let transforms = scatter(self.len(), policy, seed)?;
        self.buffer_mut().overwrite(transforms);
        Ok(())
    }
}

fn scatter(
    count: usize,
    policy: &ScatterPolicy,
    seed: Option<u64>,
) -> Result<Vec<InstanceTransform>, BatchError> {
    policy.validate()?;
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    Ok((0..count).map(|_| policy.sample(&mut rng)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within(policy: &ScatterPolicy, p: Vec3) -> bool {
        let (lo, hi) = policy.bounds();
        p.cmpge(lo).all() && p.cmple(hi).all()
    }

    #[test]
    fn fifty_instances_in_ten_unit_cube() {
        let builder = BatchBuilder::new(50).policy(ScatterPolicy::cube(10.0));
        let batch = builder.build(GeometryHandle(0), MaterialHandle(0)).unwrap();

        assert_eq!(batch.len(), 50);
        for t in batch.buffer().as_slice() {
            assert!(t.position.cmpge(Vec3::splat(-5.0)).all());
            assert!(t.position.cmple(Vec3::splat(5.0)).all());
        }
        let draw = batch.draw().unwrap();
        assert_eq!(draw.instance_count, 50);
    }

    #[test]
    fn zero_instances_is_not_an_error() {
        let batch = BatchBuilder::new(0)
            .build(GeometryHandle(0), MaterialHandle(0))
            .unwrap();
        assert!(batch.is_empty());
        assert!(batch.draw().is_none());
    }

    #[test]
    fn count_is_exact_for_many_sizes() {
        for n in [0usize, 1, 2, 7, 50, 1000] {
            let transforms = BatchBuilder::new(n).seed(n as u64).generate().unwrap();
            assert_eq!(transforms.len(), n);
        }
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let a = BatchBuilder::new(32).seed(42).generate().unwrap();
        let b = BatchBuilder::new(32).seed(42).generate().unwrap();
        let c = BatchBuilder::new(32).seed(43).generate().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn off_center_policy_respects_bounds() {
        let policy = ScatterPolicy {
            center: Vec3::new(100.0, -3.0, 0.5),
            extent: Vec3::new(2.0, 0.0, 4.0),
            rotation_range: Vec3::ZERO,
        };
        let transforms = BatchBuilder::new(200).policy(policy).seed(7).generate().unwrap();
        for t in &transforms {
            assert!(within(&policy, t.position), "{:?}", t.position);
            assert_eq!(t.position.y, -3.0);
            assert_eq!(t.rotation, Quat::IDENTITY);
        }
    }

    #[test]
    fn x_only_rotation_range_keeps_x_axis_fixed() {
        let policy = ScatterPolicy {
            rotation_range: Vec3::new(TAU, 0.0, 0.0),
            ..ScatterPolicy::default()
        };
        let transforms = BatchBuilder::new(20).policy(policy).seed(1).generate().unwrap();
        for t in &transforms {
            assert!(t.rotation.is_normalized());
            assert!((t.rotation * Vec3::X - Vec3::X).length() < 1e-5);
        }
    }

    #[test]
    fn non_finite_or_negative_ranges_rejected() {
        let bad = [
            ScatterPolicy::cube(f32::INFINITY),
            ScatterPolicy::cube(-1.0),
            ScatterPolicy {
                center: Vec3::new(f32::NAN, 0.0, 0.0),
                ..ScatterPolicy::default()
            },
            ScatterPolicy {
                rotation_range: Vec3::new(0.0, f32::NEG_INFINITY, 0.0),
                ..ScatterPolicy::default()
            },
        ];
        for policy in bad {
            let err = BatchBuilder::new(5).policy(policy).generate().unwrap_err();
            assert!(matches!(err, BatchError::InvalidRange(_)));
        }
    }

    #[test]
    fn rescatter_keeps_count_and_marks_dirty() {
        let mut batch = BatchBuilder::new(10)
            .seed(1)
            .build(GeometryHandle(0), MaterialHandle(0))
            .unwrap();
        let before = batch.buffer().as_slice().to_vec();
        batch.buffer_mut().mark_clean();

        batch.rescatter(&ScatterPolicy::default(), Some(2)).unwrap();
        assert_eq!(batch.len(), 10);
        assert!(batch.buffer().is_dirty());
        assert_ne!(batch.buffer().as_slice(), &before[..]);
    }

    #[test]
    fn unseeded_builds_still_respect_bounds() {
        let transforms = BatchBuilder::new(100).generate().unwrap();
        assert_eq!(transforms.len(), 100);
        let policy = ScatterPolicy::default();
        assert!(transforms.iter().all(|t| within(&policy, t.position)));
    }
}
