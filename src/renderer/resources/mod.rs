/// "Resources" refers to middle-level objects created through the contexts.
/// They are relatively intuitive and owned by registries or frames.

pub mod allocator;
pub mod buffer;
pub mod image;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod texture;
pub mod vertex;
