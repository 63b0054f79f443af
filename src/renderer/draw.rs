use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::Mat4;
use crate::renderer::registry::{Handle, Registry};
use crate::renderer::resources::material::Material;
use crate::renderer::resources::mesh::{Mesh, MeshBuffer};
use crate::renderer::scene::RenderObject;

/// One step of the geometry pass, before it is recorded into a command buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    /// Pipeline, viewport, scissor and descriptor sets
    BindMaterial(Handle<Material>),
    BindMesh {
        mesh: Handle<Mesh>,
        buffer: MeshBuffer,
    },
    PushConstants {
        model: Mat4,
    },
    /// `first_instance` is the object's slot in the per-frame object buffer
    Draw {
        vertex_count: u32,
        first_instance: u32,
    },
}

/// Turns the object list into commands, rebinding state only when it changes between consecutive objects
pub fn plan_draws(
    objects: &[RenderObject],
    meshes: &Registry<Mesh>,
) -> Result<Vec<DrawCommand>> {
    let mut commands = Vec::with_capacity(objects.len() * 2);
    let mut last_material = None;
    let mut last_mesh = None;

    for (index, object) in objects.iter().enumerate() {
        if last_material != Some(object.material) {
            commands.push(DrawCommand::BindMaterial(object.material));
            last_material = Some(object.material);
        }

        let mesh = meshes
            .get(object.mesh)
            .ok_or_else(|| eyre!("Render object {} refers to a missing mesh {:?}", index, object.mesh))?;
        if last_mesh != Some(object.mesh) {
            let buffer = mesh
                .vertex_buffer
                .ok_or_else(|| eyre!("Mesh {:?} was never uploaded", object.mesh))?;
            commands.push(DrawCommand::BindMesh {
                mesh: object.mesh,
                buffer,
            });
            last_mesh = Some(object.mesh);
        }

        commands.push(DrawCommand::PushConstants {
            model: object.transform,
        });
        commands.push(DrawCommand::Draw {
            vertex_count: mesh.vertex_count(),
            first_instance: index as u32,
        });
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use ash::vk::Handle as _;

    struct Fixture {
        meshes: Registry<Mesh>,
        materials: Registry<Material>,
    }

    fn uploaded(mut mesh: Mesh, raw: u64) -> Mesh {
        mesh.vertex_buffer = Some(MeshBuffer {
            buffer: vk::Buffer::from_raw(raw),
            size: 0,
        });
        mesh
    }

    fn fixture() -> Fixture {
        let mut meshes = Registry::new();
        meshes.insert("triangle", uploaded(Mesh::new_triangle(), 1));
        meshes.insert("quad", uploaded(Mesh::new_quad(), 2));
        let mut materials = Registry::new();
        materials.insert("a", Material::new(vk::Pipeline::from_raw(10), vk::PipelineLayout::null()));
        materials.insert("b", Material::new(vk::Pipeline::from_raw(11), vk::PipelineLayout::null()));
        Fixture { meshes, materials }
    }

    fn object(f: &Fixture, mesh: &str, material: &str) -> RenderObject {
        RenderObject {
            mesh: f.meshes.lookup(mesh).unwrap(),
            material: f.materials.lookup(material).unwrap(),
            transform: Mat4::IDENTITY,
        }
    }

    fn count(commands: &[DrawCommand], pred: impl Fn(&DrawCommand) -> bool) -> usize {
        commands.iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn one_material_bind_per_run() {
        let f = fixture();
        let objects: Vec<RenderObject> = ["a", "a", "b", "b", "a"]
            .iter()
            .map(|material| object(&f, "triangle", material))
            .collect();

        let commands = plan_draws(&objects, &f.meshes).unwrap();

        assert_eq!(count(&commands, |c| matches!(c, DrawCommand::BindMaterial(_))), 3);
        assert_eq!(count(&commands, |c| matches!(c, DrawCommand::BindMesh { .. })), 1);
        // Every object still gets its own push and draw
        assert_eq!(count(&commands, |c| matches!(c, DrawCommand::PushConstants { .. })), 5);
        assert_eq!(count(&commands, |c| matches!(c, DrawCommand::Draw { .. })), 5);
    }

    #[test]
    fn mesh_rebinds_only_on_change() {
        let f = fixture();
        let objects = vec![
            object(&f, "triangle", "a"),
            object(&f, "quad", "a"),
            object(&f, "quad", "a"),
            object(&f, "triangle", "a"),
        ];
        let commands = plan_draws(&objects, &f.meshes).unwrap();
        assert_eq!(count(&commands, |c| matches!(c, DrawCommand::BindMesh { .. })), 3);
    }

    #[test]
    fn draws_carry_object_index_and_vertex_count() {
        let f = fixture();
        let objects = vec![object(&f, "triangle", "a"), object(&f, "quad", "b")];
        let draws: Vec<DrawCommand> = plan_draws(&objects, &f.meshes)
            .unwrap()
            .into_iter()
            .filter(|c| matches!(c, DrawCommand::Draw { .. }))
            .collect();
        assert_eq!(
            draws,
            vec![
                DrawCommand::Draw { vertex_count: 3, first_instance: 0 },
                DrawCommand::Draw { vertex_count: 6, first_instance: 1 },
            ],
        );
    }

    #[test]
    fn bind_precedes_push_precedes_draw() {
        let f = fixture();
        let commands = plan_draws(&[object(&f, "triangle", "a")], &f.meshes).unwrap();
        assert!(matches!(commands[0], DrawCommand::BindMaterial(_)));
        assert!(matches!(commands[1], DrawCommand::BindMesh { .. }));
        assert!(matches!(commands[2], DrawCommand::PushConstants { .. }));
        assert!(matches!(commands[3], DrawCommand::Draw { .. }));
    }

    #[test]
    fn mesh_without_buffer_is_an_error() {
        let mut f = fixture();
        f.meshes.insert("raw", Mesh::new_triangle());
        let objects = vec![object(&f, "raw", "a")];
        assert!(plan_draws(&objects, &f.meshes).is_err());
    }
}
