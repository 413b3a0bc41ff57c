//! Asset loading/parsers (meshes, materials, textures).
//! Meshes come from OBJ/MTL file pairs or from numeric matrices.

pub mod matrix;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod texture;

pub use mesh::{Face, FaceItem, Material, MeshObject, Normal3, TexCoord2, Vertex3};
pub use texture::{ImageDecoder, ImageFileDecoder, TextureData};
