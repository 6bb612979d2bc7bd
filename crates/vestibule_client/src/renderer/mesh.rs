use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshShape {
    Cube,
    /// Unit quad spanning -1..1 in XY, facing +Z.
    Quad,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl SceneVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<SceneVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Unit cube centred on the origin, four vertices per face so normals stay
/// flat.
pub fn build_cube_mesh() -> (Vec<SceneVertex>, Vec<u16>) {
    const FACES: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y),
        (Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::Z),
        (Vec3::Z, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, up) in FACES {
        let right = up.cross(normal);
        let base = vertices.len() as u16;
        for (x, y) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let position = normal * 0.5 + right * x + up * y;
            vertices.push(SceneVertex {
                position: position.to_array(),
                normal: normal.to_array(),
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

pub fn build_quad_mesh() -> (Vec<SceneVertex>, Vec<u16>) {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        SceneVertex {
            position: [-1.0, -1.0, 0.0],
            normal,
        },
        SceneVertex {
            position: [1.0, -1.0, 0.0],
            normal,
        },
        SceneVertex {
            position: [1.0, 1.0, 0.0],
            normal,
        },
        SceneVertex {
            position: [-1.0, 1.0, 0.0],
            normal,
        },
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, label: &str, vertices: &[SceneVertex], indices: &[u16]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
    }
}

pub struct MeshBuffers {
    cube: GpuMesh,
    quad: GpuMesh,
}

impl MeshBuffers {
    pub fn new(device: &wgpu::Device) -> Self {
        let (cube_vertices, cube_indices) = build_cube_mesh();
        let (quad_vertices, quad_indices) = build_quad_mesh();
        Self {
            cube: GpuMesh::upload(device, "Cube", &cube_vertices, &cube_indices),
            quad: GpuMesh::upload(device, "Quad", &quad_vertices, &quad_indices),
        }
    }

    pub fn get(&self, shape: MeshShape) -> &GpuMesh {
        match shape {
            MeshShape::Cube => &self.cube,
            MeshShape::Quad => &self.quad,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::{build_cube_mesh, build_quad_mesh};

    #[test]
    fn cube_faces_wind_counter_clockwise_around_their_normal() {
        let (vertices, indices) = build_cube_mesh();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);

        for tri in indices.chunks(3) {
            let a = Vec3::from_array(vertices[tri[0] as usize].position);
            let b = Vec3::from_array(vertices[tri[1] as usize].position);
            let c = Vec3::from_array(vertices[tri[2] as usize].position);
            let normal = Vec3::from_array(vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(normal) > 0.0);
        }
    }

    #[test]
    fn cube_vertices_lie_on_the_unit_cube() {
        let (vertices, _) = build_cube_mesh();
        for vertex in vertices {
            let p = Vec3::from_array(vertex.position);
            assert!((p.abs().max_element() - 0.5).abs() < 1.0e-6);
        }
    }

    #[test]
    fn quad_faces_positive_z() {
        let (vertices, indices) = build_quad_mesh();
        let a = Vec3::from_array(vertices[indices[0] as usize].position);
        let b = Vec3::from_array(vertices[indices[1] as usize].position);
        let c = Vec3::from_array(vertices[indices[2] as usize].position);
        assert!((b - a).cross(c - a).z > 0.0);
    }
}
