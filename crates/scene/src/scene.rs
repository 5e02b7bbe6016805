use std::collections::BTreeMap;

use perfscene_assets::ResourceRegistry;
use perfscene_common::{BatchId, GeometryHandle, MaterialHandle, ObjectId, Transform};
use perfscene_instancing::InstanceBatch;

use crate::SceneError;
use crate::light::DirectionalLight;

/// A single mesh: one geometry, one material, one transform.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub transform: Transform,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub visible: bool,
}

impl SceneObject {
    pub fn mesh(name: impl Into<String>, geometry: GeometryHandle, material: MaterialHandle) -> Self {
        Self {
            name: name.into(),
            geometry,
            material,
            transform: Transform::default(),
            cast_shadow: false,
            receive_shadow: false,
            visible: true,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_shadows(mut self, cast: bool, receive: bool) -> Self {
        self.cast_shadow = cast;
        self.receive_shadow = receive;
        self
    }
}

/// Scene graph: mesh objects, instance batches, lights and the resources they use.
///
/// Objects and batches are kept in BTreeMaps so planning and rendering
/// iterate in a stable order.
#[derive(Debug, Default)]
pub struct Scene {
    objects: BTreeMap<ObjectId, SceneObject>,
    batches: BTreeMap<BatchId, InstanceBatch>,
    lights: Vec<DirectionalLight>,
    resources: ResourceRegistry,
    next_batch: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// Add a mesh object. Its handles must already be registered.
    pub fn add(&mut self, object: SceneObject) -> Result<ObjectId, SceneError> {
        self.check_handles(object.geometry, object.material)?;
        let id = ObjectId::new();
        tracing::debug!(id = %id.short(), name = %object.name, "object added");
        self.objects.insert(id, object);
        Ok(id)
    }

    /// Detach an object, leaving its geometry and material registered.
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        self.objects.remove(&id)
    }

    /// Detach an object and release its geometry and material if nothing
    /// else in the scene still uses them.
    pub fn dispose(&mut self, id: ObjectId) -> Result<SceneObject, SceneError> {
        let object = self
            .objects
            .remove(&id)
            .ok_or(SceneError::UnknownObject(id))?;
        if !self.geometry_in_use(object.geometry) {
            self.resources.dispose_geometry(object.geometry)?;
        }
        if !self.material_in_use(object.material) {
            self.resources.dispose_material(object.material)?;
        }
        tracing::debug!(id = %id.short(), name = %object.name, "object disposed");
        Ok(object)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    pub fn objects(&self) -> &BTreeMap<ObjectId, SceneObject> {
        &self.objects
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Add an instance batch. Its handles must already be registered.
    pub fn add_batch(&mut self, batch: InstanceBatch) -> Result<BatchId, SceneError> {
        self.check_handles(batch.geometry, batch.material)?;
        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        tracing::debug!(?id, instances = batch.len(), "batch added");
        self.batches.insert(id, batch);
        Ok(id)
    }

    pub fn remove_batch(&mut self, id: BatchId) -> Option<InstanceBatch> {
        self.batches.remove(&id)
    }

    pub fn batch(&self, id: BatchId) -> Option<&InstanceBatch> {
        self.batches.get(&id)
    }

    pub fn batch_mut(&mut self, id: BatchId) -> Option<&mut InstanceBatch> {
        self.batches.get_mut(&id)
    }

    pub fn batches(&self) -> impl Iterator<Item = (BatchId, &InstanceBatch)> {
        self.batches.iter().map(|(id, b)| (*id, b))
    }

    pub fn batches_mut(&mut self) -> impl Iterator<Item = (BatchId, &mut InstanceBatch)> {
        self.batches.iter_mut().map(|(id, b)| (*id, b))
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Total instances across all batches.
    pub fn instance_count(&self) -> usize {
        self.batches.values().map(InstanceBatch::len).sum()
    }

    /// Add a light. Lights share one shadow map; see [`Scene::shadow_light`].
    pub fn add_light(&mut self, light: DirectionalLight) {
        self.lights.push(light);
    }

    pub fn lights(&self) -> &[DirectionalLight] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [DirectionalLight] {
        &mut self.lights
    }

    /// Ask every shadow-casting light to re-render its map on the next frame.
    pub fn request_shadow_update(&mut self) {
        for light in &mut self.lights {
            light.shadow.needs_update = true;
        }
    }

    /// Index of the light whose shadow map is rendered this frame: the first
    /// one whose pass is due. Only one shadow map is drawn per frame.
    pub fn shadow_light(&self) -> Option<usize> {
        self.lights.iter().position(DirectionalLight::shadow_pass_due)
    }

    /// Clear the one-shot update request of the light rendered this frame.
    /// Requests on other lights stay pending for later frames.
    pub fn acknowledge_shadow_update(&mut self) {
        if let Some(index) = self.shadow_light() {
            self.lights[index].shadow.needs_update = false;
        }
    }

    fn check_handles(
        &self,
        geometry: GeometryHandle,
        material: MaterialHandle,
    ) -> Result<(), SceneError> {
        if !self.resources.contains_geometry(geometry) {
            return Err(perfscene_assets::AssetError::UnknownGeometry(geometry).into());
        }
        if !self.resources.contains_material(material) {
            return Err(perfscene_assets::AssetError::UnknownMaterial(material).into());
        }
        Ok(())
    }

    fn geometry_in_use(&self, handle: GeometryHandle) -> bool {
        self.objects.values().any(|o| o.geometry == handle)
            || self.batches.values().any(|b| b.geometry == handle)
    }

    fn material_in_use(&self, handle: MaterialHandle) -> bool {
        self.objects.values().any(|o| o.material == handle)
            || self.batches.values().any(|b| b.material == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use perfscene_assets::{GeometryDesc, MaterialDesc};
    use perfscene_instancing::BatchBuilder;

    fn scene_with_cube() -> (Scene, GeometryHandle, MaterialHandle) {
        let mut scene = Scene::new();
        let g = scene
            .resources_mut()
            .add_geometry(GeometryDesc::cube(1.0))
            .unwrap();
        let m = scene
            .resources_mut()
            .add_material(MaterialDesc::Normal)
            .unwrap();
        (scene, g, m)
    }

    #[test]
    fn scene_starts_empty() {
        let scene = Scene::new();
        assert_eq!(scene.object_count(), 0);
        assert_eq!(scene.batch_count(), 0);
        assert!(scene.lights().is_empty());
    }

    #[test]
    fn add_and_remove_object() {
        let (mut scene, g, m) = scene_with_cube();
        let id = scene
            .add(SceneObject::mesh("cube", g, m).with_transform(Transform::from_position(Vec3::X)))
            .unwrap();
        assert_eq!(scene.object_count(), 1);
        assert_eq!(scene.get(id).unwrap().transform.position, Vec3::X);

        let removed = scene.remove(id).unwrap();
        assert_eq!(removed.name, "cube");
        assert_eq!(scene.object_count(), 0);
        // remove keeps resources alive
        assert!(scene.resources().contains_geometry(g));
    }

    #[test]
    fn add_rejects_unregistered_handles() {
        let (mut scene, g, _) = scene_with_cube();
        let err = scene
            .add(SceneObject::mesh("bad", g, MaterialHandle(99)))
            .unwrap_err();
        assert!(matches!(err, SceneError::Asset(_)));
    }

    #[test]
    fn dispose_frees_only_unshared_resources() {
        let (mut scene, g, m) = scene_with_cube();
        let a = scene.add(SceneObject::mesh("a", g, m)).unwrap();
        let b = scene.add(SceneObject::mesh("b", g, m)).unwrap();

        scene.dispose(a).unwrap();
        assert!(scene.resources().contains_geometry(g), "still used by b");

        scene.dispose(b).unwrap();
        assert!(!scene.resources().contains_geometry(g));
        assert!(!scene.resources().contains_material(m));
        assert!(matches!(scene.dispose(b), Err(SceneError::UnknownObject(_))));
    }

    #[test]
    fn dispose_keeps_resources_used_by_batches() {
        let (mut scene, g, m) = scene_with_cube();
        let obj = scene.add(SceneObject::mesh("a", g, m)).unwrap();
        let batch = BatchBuilder::new(3).seed(1).build(g, m).unwrap();
        scene.add_batch(batch).unwrap();

        scene.dispose(obj).unwrap();
        assert!(scene.resources().contains_geometry(g));
        assert!(scene.resources().contains_material(m));
    }

    #[test]
    fn batches_get_sequential_ids() {
        let (mut scene, g, m) = scene_with_cube();
        let a = scene
            .add_batch(BatchBuilder::new(2).seed(1).build(g, m).unwrap())
            .unwrap();
        let b = scene
            .add_batch(BatchBuilder::new(5).seed(2).build(g, m).unwrap())
            .unwrap();
        assert_eq!(a, BatchId(0));
        assert_eq!(b, BatchId(1));
        assert_eq!(scene.instance_count(), 7);
    }

    #[test]
    fn acknowledge_keeps_requests_of_lights_not_rendered() {
        let mut scene = Scene::new();
        for _ in 0..2 {
            let mut light = DirectionalLight {
                cast_shadow: true,
                ..DirectionalLight::default()
            };
            light.shadow.auto_update = false;
            light.shadow.needs_update = true;
            scene.add_light(light);
        }
        assert_eq!(scene.shadow_light(), Some(0));

        scene.acknowledge_shadow_update();
        assert!(!scene.lights()[0].shadow.needs_update);
        assert!(scene.lights()[1].shadow.needs_update);
        assert_eq!(scene.shadow_light(), Some(1));

        scene.acknowledge_shadow_update();
        assert_eq!(scene.shadow_light(), None);
    }

    #[test]
    fn shadow_update_request_and_acknowledge() {
        let mut scene = Scene::new();
        scene.add_light(DirectionalLight {
            cast_shadow: true,
            ..DirectionalLight::default()
        });
        scene.request_shadow_update();
        assert!(scene.lights()[0].shadow.needs_update);
        scene.acknowledge_shadow_update();
        assert!(!scene.lights()[0].shadow.needs_update);
    }
}
