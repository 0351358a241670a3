//! Resource lifetime management.
//!
//! Deferred destruction, staged uploads, and the registries that own
//! loaded meshes and materials.

mod deletion;
mod material;
mod mesh;
mod registry;
mod upload;

pub use deletion::DeferredDeletionQueue;
pub use material::{GpuMaterial, MaterialDescriptor};
pub use mesh::{GpuMesh, MeshData, Vertex};
pub use registry::{MaterialIndex, MeshIndex, Registry, RegistryIndex};
pub use upload::StagedUploadBuffer;
