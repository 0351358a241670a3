//! Mesh data structures and generation.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::backend::GpuBuffer;
use crate::error::{RenderError, RenderResult};

/// Vertex with position, normal, and color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, color: Vec3) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }
}

/// CPU-side mesh: vertex and index data awaiting upload.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl MeshData {
    /// Build a mesh from raw arrays, validating that the index data
    /// describes whole triangles inside the vertex range.
    pub fn from_raw(
        name: &str,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
    ) -> RenderResult<Self> {
        if indices.len() % 3 != 0 {
            return Err(RenderError::AssetLoadFailed(format!(
                "mesh '{}': index count {} is not a multiple of 3",
                name,
                indices.len()
            )));
        }
        if let Some(&out_of_range) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(RenderError::AssetLoadFailed(format!(
                "mesh '{}': index {} out of range for {} vertices",
                name,
                out_of_range,
                vertices.len()
            )));
        }
        Ok(Self {
            vertices,
            indices,
            name: name.to_string(),
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex data as bytes, ready for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes, ready for upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Single triangle in the XY plane with red, green, and blue corners.
    pub fn triangle() -> Self {
        let vertices = vec![
            Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, Vec3::new(1.0, 0.0, 0.0)),
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, Vec3::new(0.0, 1.0, 0.0)),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, Vec3::new(0.0, 0.0, 1.0)),
        ];
        Self {
            vertices,
            indices: vec![0, 1, 2],
            name: "triangle".to_string(),
        }
    }

    /// Unit cube centered at the origin, flat normals, one color.
    pub fn cube(color: Vec3) -> Self {
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, right, up)) in faces.iter().enumerate() {
            let center = *normal * 0.5;
            let corners = [
                center - *right * 0.5 - *up * 0.5,
                center + *right * 0.5 - *up * 0.5,
                center + *right * 0.5 + *up * 0.5,
                center - *right * 0.5 + *up * 0.5,
            ];
            for corner in corners {
                vertices.push(Vertex::new(corner, *normal, color));
            }
            let base = (face * 4) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            vertices,
            indices,
            name: "cube".to_string(),
        }
    }
}

/// Device-side mesh: uploaded buffers plus the draw count.
#[derive(Debug, Clone, Copy)]
pub struct GpuMesh {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_accepts_whole_triangles() {
        let mesh = MeshData::from_raw(
            "quad",
            vec![
                Vertex::new(Vec3::ZERO, Vec3::Z, Vec3::ONE),
                Vertex::new(Vec3::X, Vec3::Z, Vec3::ONE),
                Vertex::new(Vec3::Y, Vec3::Z, Vec3::ONE),
                Vertex::new(Vec3::ONE, Vec3::Z, Vec3::ONE),
            ],
            vec![0, 1, 2, 2, 1, 3],
        )
        .unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn from_raw_rejects_partial_triangles() {
        let err = MeshData::from_raw(
            "broken",
            vec![Vertex::new(Vec3::ZERO, Vec3::Z, Vec3::ONE); 3],
            vec![0, 1],
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::AssetLoadFailed(_)));
    }

    #[test]
    fn from_raw_rejects_out_of_range_indices() {
        let err = MeshData::from_raw(
            "broken",
            vec![Vertex::new(Vec3::ZERO, Vec3::Z, Vec3::ONE); 3],
            vec![0, 1, 7],
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::AssetLoadFailed(_)));
    }

    #[test]
    fn generated_meshes_are_consistent() {
        let triangle = MeshData::triangle();
        assert_eq!(triangle.vertex_count(), 3);
        assert_eq!(triangle.index_count(), 3);

        let cube = MeshData::cube(Vec3::new(0.8, 0.2, 0.2));
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.indices.iter().all(|&i| (i as usize) < 24));
    }

    #[test]
    fn byte_views_cover_all_elements() {
        let mesh = MeshData::triangle();
        assert_eq!(
            mesh.vertex_bytes().len(),
            3 * std::mem::size_of::<Vertex>()
        );
        assert_eq!(mesh.index_bytes().len(), 3 * std::mem::size_of::<u32>());
    }
}
