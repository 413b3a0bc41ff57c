//! Renderer: mesh flattening, per-object texture cache, renderable objects
//! and the threaded render worker, plus the wgpu graphics context.

pub mod context;
pub mod flatten;
pub mod gpu;
pub mod object;
pub mod texture_cache;
pub mod worker;

#[cfg(test)]
mod testing;

pub use context::{
    BufferHandle, DrawCall, GraphicsContext, Primitive, RenderSettings, TextureHandle, WrapMode,
};
pub use flatten::{FlatMesh, FlatVertex, RenderStyle, Segment};
pub use gpu::WgpuContext;
pub use object::{RenderObject, SharedObject};
pub use texture_cache::TextureCache;
pub use worker::{FrameReport, ObjectRegistry, Render3D, WorkerState};
