use std::path::Path;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::{Vec2, Vec3};
use crate::renderer::resources::vertex::Vertex;

/// Device-local vertex buffer a mesh was uploaded into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    // Set once by the upload path
    pub vertex_buffer: Option<MeshBuffer>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            vertex_buffer: None,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn new_triangle() -> Self {
        let color: Vec3 = [0.0, 1.0, 0.0].into();
        let normal: Vec3 = [0.0, 0.0, 1.0].into();
        let vertices = vec![
            Vertex {
                position: [1.0, 1.0, 0.0].into(),
                normal,
                color,
                uv: [1.0, 1.0].into(),
            },
            Vertex {
                position: [-1.0, 1.0, 0.0].into(),
                normal,
                color,
                uv: [0.0, 1.0].into(),
            },
            Vertex {
                position: [0.0, -1.0, 0.0].into(),
                normal,
                color,
                uv: [0.5, 0.0].into(),
            },
        ];

        Self::new(vertices)
    }

    /// Two triangles facing +Z, non-indexed
    pub fn new_quad() -> Self {
        let corner = |x: f32, y: f32, u: f32, v: f32| Vertex {
            position: [x, y, 0.0].into(),
            normal: [0.0, 0.0, 1.0].into(),
            color: [1.0, 1.0, 1.0].into(),
            uv: [u, v].into(),
        };
        let top_left = corner(-1.0, 1.0, 0.0, 0.0);
        let bottom_left = corner(-1.0, -1.0, 0.0, 1.0);
        let top_right = corner(1.0, 1.0, 1.0, 0.0);
        let bottom_right = corner(1.0, -1.0, 1.0, 1.0);

        Self::new(vec![
            top_left, bottom_left, top_right,
            top_right, bottom_left, bottom_right,
        ])
    }

    /// Decodes a Wavefront OBJ into a flat, non-indexed vertex list
    pub fn load_obj(path: &Path) -> Result<Self> {
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )?;

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                let position = Vec3::new(
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                );
                let normal = if mesh.normals.len() >= 3 * i + 3 {
                    Vec3::new(
                        mesh.normals[3 * i],
                        mesh.normals[3 * i + 1],
                        mesh.normals[3 * i + 2],
                    )
                } else {
                    Vec3::Z
                };
                let uv = if mesh.texcoords.len() >= 2 * i + 2 {
                    Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
                } else {
                    Vec2::ZERO
                };

                vertices.push(Vertex {
                    position,
                    normal,
                    // Normals double as a debug colour
                    color: normal,
                    uv,
                });
            }
        }

        if vertices.is_empty() {
            return Err(eyre!("{:?} has no faces", path));
        }
        log::debug!("Decoded {} vertices from {:?}", vertices.len(), path);
        Ok(Self::new(vertices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn triangle_has_three_vertices() {
        let mesh = Mesh::new_triangle();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.vertices[2].position, Vec3::new(0.0, -1.0, 0.0));
        assert!(mesh.vertex_buffer.is_none());
    }

    #[test]
    fn obj_faces_are_flattened() {
        let path = std::env::temp_dir().join("lilac_mesh_test_quad.obj");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4").unwrap();
        drop(file);

        let mesh = Mesh::load_obj(&path).unwrap();
        // The quad face is triangulated into two triangles
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.vertices[1].position, Vec3::new(1.0, 0.0, 0.0));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_obj_is_an_error() {
        assert!(Mesh::load_obj(Path::new("does/not/exist.obj")).is_err());
    }
}
