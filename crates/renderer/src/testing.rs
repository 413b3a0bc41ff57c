//! Test doubles for the graphics-context and image-decoding seams.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use asset::{ImageDecoder, TextureData};
use corelib::{CoreError, CoreResult};

use crate::context::{
    BufferHandle, DrawCall, GraphicsContext, RenderSettings, TextureHandle, WrapMode,
};
use crate::flatten::FlatVertex;

/// Records every call instead of talking to a GPU.
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub(crate) next_id: u32,
    pub buffers: HashMap<BufferHandle, usize>,
    pub texture_wraps: HashMap<TextureHandle, WrapMode>,
    pub draws: Vec<DrawCall>,
    pub frames: usize,
    pub configured: Option<RenderSettings>,
    pub fail_textures: bool,
    pub fail_buffers: bool,
    /// Simulate a lost context: `begin_frame` fails fatally.
    pub lost: bool,
    /// Simulate an unavailable surface: `begin_frame` skips.
    pub skip_frames: bool,
}

impl RecordingContext {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn failing_buffers() -> Self {
        Self {
            fail_buffers: true,
            ..Self::default()
        }
    }

    pub fn failing_textures() -> Self {
        Self {
            fail_textures: true,
            ..Self::default()
        }
    }

    pub fn live_textures(&self) -> usize {
        self.texture_wraps.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl GraphicsContext for RecordingContext {
    fn configure(&mut self, settings: &RenderSettings) -> CoreResult<()> {
        if self.lost {
            return Err(CoreError::MissingGraphicsContext("no device".into()));
        }
        self.configured = Some(*settings);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Some(settings) = self.configured.as_mut() {
            settings.width = width;
            settings.height = height;
        }
    }

    fn begin_frame(&mut self) -> CoreResult<bool> {
        if self.lost {
            return Err(CoreError::MissingGraphicsContext("surface lost".into()));
        }
        Ok(!self.skip_frames)
    }

    fn end_frame(&mut self) -> CoreResult<()> {
        self.frames += 1;
        Ok(())
    }

    fn create_buffer(&mut self, _vertices: &[FlatVertex], indices: &[u32]) -> CoreResult<BufferHandle> {
        if self.fail_buffers {
            return Err(CoreError::Gpu("out of memory".into()));
        }
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, indices.len());
        Ok(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, _image: &TextureData, wrap: WrapMode) -> CoreResult<TextureHandle> {
        if self.fail_textures {
            return Err(CoreError::Gpu("texture upload failed".into()));
        }
        let handle = TextureHandle(self.next());
        self.texture_wraps.insert(handle, wrap);
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.texture_wraps.remove(&texture);
    }

    fn draw(&mut self, call: &DrawCall) {
        self.draws.push(*call);
    }
}

/// Decodes only the paths it was given, each to a 1x1 texture.
#[derive(Debug, Default)]
pub struct MapDecoder {
    known: HashSet<PathBuf>,
    calls: AtomicUsize,
}

impl MapDecoder {
    pub fn with_textures(paths: &[&str]) -> Self {
        Self {
            known: paths.iter().map(PathBuf::from).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn decode_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for MapDecoder {
    fn decode(&self, path: &Path) -> CoreResult<TextureData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.known.contains(path) {
            Ok(TextureData::solid([255, 0, 0, 255]))
        } else {
            Err(CoreError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    }
}
