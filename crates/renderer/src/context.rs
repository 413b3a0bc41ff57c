//! Graphics-context seam: everything the renderable objects and the render
//! worker need from the GPU, assumed current on the rendering thread.

use asset::TextureData;
use corelib::CoreResult;

use crate::flatten::FlatVertex;

/// Uploaded vertex/index buffer pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Uploaded texture. [`TextureHandle::NONE`] draws untextured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    pub const NONE: Self = Self(0);

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    Lines,
    Points,
}

impl Primitive {
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            Self::Triangles => 3,
            Self::Lines => 2,
            Self::Points => 1,
        }
    }
}

/// One draw of an index range of an uploaded buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub buffer: BufferHandle,
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
    pub texture: TextureHandle,
    /// Point size or line width.
    pub size: f32,
}

/// Context state established once by the render worker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub depth_test: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.05, 0.05, 0.08, 1.0],
            depth_test: true,
            width: 1280,
            height: 720,
        }
    }
}

pub trait GraphicsContext {
    /// Apply clear color, depth test and viewport.
    fn configure(&mut self, settings: &RenderSettings) -> CoreResult<()>;

    fn resize(&mut self, width: u32, height: u32);

    /// Start a frame. `Ok(false)` means no target is available this time
    /// (e.g. minimized window) and the frame should be skipped.
    /// `CoreError::MissingGraphicsContext` is fatal.
    fn begin_frame(&mut self) -> CoreResult<bool>;

    /// Submit and present everything drawn since [`begin_frame`](Self::begin_frame).
    fn end_frame(&mut self) -> CoreResult<()>;

    fn create_buffer(&mut self, vertices: &[FlatVertex], indices: &[u32]) -> CoreResult<BufferHandle>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, image: &TextureData, wrap: WrapMode) -> CoreResult<TextureHandle>;

    fn release_texture(&mut self, texture: TextureHandle);

    fn draw(&mut self, call: &DrawCall);
}
