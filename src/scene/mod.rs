//! Scene content: what to draw this frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::resources::{MaterialIndex, MeshIndex};
use static_assertions::const_assert_eq;

/// Per-frame uniform block, written into the active slot's uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniform {
    pub view_proj: Mat4,
}

const_assert_eq!(std::mem::size_of::<SceneUniform>(), 64);

/// Per-object data pushed to the vertex stage. Kept at 64 bytes to fit
/// the guaranteed minimum push constant range on every backend.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectPushConstants {
    pub model: Mat4,
}

const_assert_eq!(std::mem::size_of::<ObjectPushConstants>(), 64);

/// A renderable object: registry indices plus a world transform.
#[derive(Debug, Clone, Copy)]
pub struct RenderObject {
    pub mesh: MeshIndex,
    pub material: MaterialIndex,
    pub transform: Mat4,
}

impl RenderObject {
    pub fn new(mesh: MeshIndex, material: MaterialIndex) -> Self {
        Self {
            mesh,
            material,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform = Mat4::from_translation(position) * self.transform;
        self
    }

    pub fn push_constants(&self) -> ObjectPushConstants {
        ObjectPushConstants {
            model: self.transform,
        }
    }
}

/// The scene containing all renderable content.
pub struct Scene {
    pub view_projection: Mat4,
    pub objects: Vec<RenderObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            view_projection: Mat4::IDENTITY,
            objects: Vec::new(),
        }
    }

    /// Point a perspective camera at `target` from `eye`.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, aspect: f32) {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, aspect, 0.1, 100.0);
        self.view_projection = proj * view;
    }

    /// Add a render object to the scene.
    pub fn add_object(&mut self, object: RenderObject) -> usize {
        let id = self.objects.len();
        self.objects.push(object);
        id
    }

    pub fn uniform(&self) -> SceneUniform {
        SceneUniform {
            view_proj: self.view_projection,
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_carry_the_object_transform() {
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let object = RenderObject::new(MeshIndex(0), MaterialIndex(0)).with_transform(transform);
        assert_eq!(object.push_constants().model, transform);
        assert_eq!(bytemuck::bytes_of(&object.push_constants()).len(), 64);
    }

    #[test]
    fn look_at_produces_a_usable_view_projection() {
        let mut scene = Scene::new();
        scene.look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, 16.0 / 9.0);
        assert_ne!(scene.view_projection, Mat4::IDENTITY);
        // The origin lands in front of the camera, inside clip space.
        let clip = scene.view_projection * Vec3::ZERO.extend(1.0);
        assert!(clip.w > 0.0);
    }
}
