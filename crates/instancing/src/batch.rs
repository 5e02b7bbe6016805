use glam::{Mat4, Quat, Vec3};
use perfscene_common::{GeometryHandle, MaterialHandle};
use serde::{Deserialize, Serialize};

use crate::BatchError;

/// Transform of one instance: position plus orientation, unit scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for InstanceTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl InstanceTransform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Model matrix: rotation first, then translation.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// Fixed-length array of instance transforms, uploaded as a unit.
///
/// # Invariants
/// - Length is fixed at construction; index order is the instance index.
/// - Every mutation raises the dirty flag; only [`TransformBuffer::mark_clean`]
///   lowers it.
#[derive(Debug, Clone)]
pub struct TransformBuffer {
    transforms: Vec<InstanceTransform>,
    dirty: bool,
}

impl TransformBuffer {
    /// A freshly built buffer starts dirty: it has never been uploaded.
    pub fn new(transforms: Vec<InstanceTransform>) -> Self {
        Self {
            transforms,
            dirty: true,
        }
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&InstanceTransform> {
        self.transforms.get(index)
    }

    pub fn as_slice(&self) -> &[InstanceTransform] {
        &self.transforms
    }

    /// Overwrite one instance.
    pub fn set(&mut self, index: usize, transform: InstanceTransform) -> Result<(), BatchError> {
        let len = self.transforms.len();
        let slot = self
            .transforms
            .get_mut(index)
            .ok_or(BatchError::IndexOutOfRange { index, len })?;
        *slot = transform;
        self.dirty = true;
        Ok(())
    }

    /// Apply `f` to every instance in index order.
    pub fn update_all(&mut self, mut f: impl FnMut(usize, &mut InstanceTransform)) {
        if self.transforms.is_empty() {
            return;
        }
        for (i, t) in self.transforms.iter_mut().enumerate() {
            f(i, t);
        }
        self.dirty = true;
    }

    /// Replace every transform at once. The length must not change.
    pub(crate) fn overwrite(&mut self, transforms: Vec<InstanceTransform>) {
        debug_assert_eq!(transforms.len(), self.transforms.len());
        self.transforms = transforms;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Call once the backend holds the current contents.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Column-major model matrices in instance order, ready for upload.
    pub fn to_raw(&self) -> Vec<[[f32; 4]; 4]> {
        self.transforms
            .iter()
            .map(|t| t.to_matrix().to_cols_array_2d())
            .collect()
    }
}

/// The single draw submission describing a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDraw {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub instance_count: u32,
}

/// Many copies of one geometry/material pair, distinguished only by transform.
#[derive(Debug, Clone)]
pub struct InstanceBatch {
    pub name: String,
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    buffer: TransformBuffer,
}

impl InstanceBatch {
    pub fn new(
        geometry: GeometryHandle,
        material: MaterialHandle,
        transforms: Vec<InstanceTransform>,
    ) -> Self {
        Self {
            name: String::from("instances"),
            geometry,
            material,
            cast_shadow: false,
            receive_shadow: false,
            buffer: TransformBuffer::new(transforms),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_shadows(mut self, cast: bool, receive: bool) -> Self {
        self.cast_shadow = cast;
        self.receive_shadow = receive;
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &TransformBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TransformBuffer {
        &mut self.buffer
    }

    /// One submission for all instances, or nothing for an empty batch.
    pub fn draw(&self) -> Option<BatchDraw> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(BatchDraw {
            geometry: self.geometry,
            material: self.material,
            instance_count: self.buffer.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> InstanceBatch {
        let transforms = (0..n)
            .map(|i| InstanceTransform::new(Vec3::splat(i as f32), Quat::IDENTITY))
            .collect();
        InstanceBatch::new(GeometryHandle(0), MaterialHandle(0), transforms)
    }

    #[test]
    fn matrix_places_instance() {
        let t = InstanceTransform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );
        let m = t.to_matrix();
        assert!((m.transform_point3(Vec3::ZERO) - t.position).length() < 1e-6);
        let x = m.transform_vector3(Vec3::X);
        assert!((x - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn new_buffer_is_dirty_until_marked_clean() {
        let mut b = batch(3);
        assert!(b.buffer().is_dirty());
        b.buffer_mut().mark_clean();
        assert!(!b.buffer().is_dirty());
    }

    #[test]
    fn set_marks_dirty_and_keeps_order() {
        let mut b = batch(3);
        b.buffer_mut().mark_clean();
        let t = InstanceTransform::new(Vec3::new(9.0, 9.0, 9.0), Quat::IDENTITY);
        b.buffer_mut().set(1, t).unwrap();
        assert!(b.buffer().is_dirty());
        assert_eq!(b.buffer().get(0).unwrap().position, Vec3::ZERO);
        assert_eq!(b.buffer().get(1).unwrap().position, t.position);
        assert_eq!(b.buffer().get(2).unwrap().position, Vec3::splat(2.0));
    }

    #[test]
    fn set_out_of_range_leaves_buffer_untouched() {
        let mut b = batch(2);
        b.buffer_mut().mark_clean();
        let err = b.buffer_mut().set(2, InstanceTransform::default()).unwrap_err();
        assert!(matches!(err, BatchError::IndexOutOfRange { index: 2, len: 2 }));
        assert!(!b.buffer().is_dirty());
    }

    #[test]
    fn update_all_visits_in_index_order() {
        let mut b = batch(4);
        b.buffer_mut().mark_clean();
        let mut seen = Vec::new();
        b.buffer_mut().update_all(|i, t| {
            seen.push(i);
            t.position.y += 1.0;
        });
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(b.buffer().is_dirty());
        assert_eq!(b.buffer().get(3).unwrap().position.y, 4.0);
    }

    #[test]
    fn draw_covers_all_instances() {
        let b = batch(50);
        let draw = b.draw().unwrap();
        assert_eq!(draw.instance_count, 50);
        assert_eq!(b.buffer().to_raw().len(), 50);
    }

    #[test]
    fn empty_batch_has_no_draw() {
        let mut b = batch(0);
        assert!(b.is_empty());
        assert!(b.draw().is_none());
        b.buffer_mut().mark_clean();
        b.buffer_mut().update_all(|_, _| unreachable!());
        assert!(!b.buffer().is_dirty());
    }
}
