use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::Mat4;
use crate::renderer::registry::{Handle, Registry};
use crate::renderer::resources::material::Material;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::shader_data::GpuObjectData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    pub mesh: Handle<Mesh>,
    pub material: Handle<Material>,
    pub transform: Mat4,
}

/// The objects drawn every frame, in draw order. Capacity matches the per-frame object buffer.
pub struct Scene {
    objects: Vec<RenderObject>,
    max_objects: usize,
}

impl Scene {
    pub fn new(max_objects: usize) -> Self {
        Self {
            objects: Vec::new(),
            max_objects,
        }
    }

    pub fn push(&mut self, object: RenderObject) -> Result<()> {
        if self.objects.len() >= self.max_objects {
            return Err(eyre!("Scene is full ({} objects)", self.max_objects));
        }
        self.objects.push(object);
        Ok(())
    }

    /// Adds an object by mesh and material name. Both must already be registered.
    pub fn add_object(
        &mut self,
        meshes: &Registry<Mesh>,
        materials: &Registry<Material>,
        mesh_name: &str,
        material_name: &str,
        transform: Mat4,
    ) -> Result<()> {
        let mesh = meshes
            .lookup(mesh_name)
            .ok_or_else(|| eyre!("Mesh '{}' is not loaded", mesh_name))?;
        let material = materials
            .lookup(material_name)
            .ok_or_else(|| eyre!("Material '{}' does not exist", material_name))?;
        self.push(RenderObject {
            mesh,
            material,
            transform,
        })
    }

    pub fn objects(&self) -> &[RenderObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Groups objects sharing a material, then a mesh, so fewer binds are recorded
    pub fn sort_by_binding(&mut self) {
        self.objects.sort_by_key(|object| (object.material, object.mesh));
    }

    /// One entry per object, in draw order
    pub fn object_data(&self) -> Vec<GpuObjectData> {
        self.objects
            .iter()
            .map(|object| GpuObjectData {
                model: object.transform,
            })
            .collect()
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> Result<&RenderObject> {
        self.objects.get(index).ok_or_else(|| eyre!("Render object index out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    fn registries() -> (Registry<Mesh>, Registry<Material>) {
        let mut meshes = Registry::new();
        meshes.insert("triangle", Mesh::new_triangle());
        meshes.insert("quad", Mesh::new_quad());
        let mut materials = Registry::new();
        materials.insert("default_mesh", Material::new(vk::Pipeline::null(), vk::PipelineLayout::null()));
        materials.insert("textured_mesh", Material::new(vk::Pipeline::null(), vk::PipelineLayout::null()));
        (meshes, materials)
    }

    #[test]
    fn names_resolve_to_handles() {
        let (meshes, materials) = registries();
        let mut scene = Scene::new(10);
        scene
            .add_object(&meshes, &materials, "quad", "textured_mesh", Mat4::IDENTITY)
            .unwrap();
        let object = scene.get(0).unwrap();
        assert_eq!(Some(object.mesh), meshes.lookup("quad"));
        assert_eq!(Some(object.material), materials.lookup("textured_mesh"));
    }

    #[test]
    fn missing_names_are_errors() {
        let (meshes, materials) = registries();
        let mut scene = Scene::new(10);
        assert!(scene.add_object(&meshes, &materials, "monkey", "default_mesh", Mat4::IDENTITY).is_err());
        assert!(scene.add_object(&meshes, &materials, "triangle", "glass", Mat4::IDENTITY).is_err());
        assert!(scene.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let (meshes, materials) = registries();
        let mut scene = Scene::new(2);
        for _ in 0..2 {
            scene.add_object(&meshes, &materials, "triangle", "default_mesh", Mat4::IDENTITY).unwrap();
        }
        assert!(scene.add_object(&meshes, &materials, "triangle", "default_mesh", Mat4::IDENTITY).is_err());
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn sorting_groups_materials_and_keeps_order_within_groups() {
        let (meshes, materials) = registries();
        let mut scene = Scene::new(10);
        let at = |x: f32| Mat4::from_translation([x, 0.0, 0.0].into());
        scene.add_object(&meshes, &materials, "quad", "textured_mesh", at(0.0)).unwrap();
        scene.add_object(&meshes, &materials, "triangle", "default_mesh", at(1.0)).unwrap();
        scene.add_object(&meshes, &materials, "quad", "textured_mesh", at(2.0)).unwrap();
        scene.add_object(&meshes, &materials, "triangle", "default_mesh", at(3.0)).unwrap();

        scene.sort_by_binding();

        let order: Vec<f32> = scene.objects().iter().map(|o| o.transform.w_axis.x).collect();
        assert_eq!(order, vec![1.0, 3.0, 0.0, 2.0]);
        assert_eq!(scene.object_data()[0].model, at(1.0));
    }
}
