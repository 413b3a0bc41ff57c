//! Renderable mesh wrapper: owns the loaded mesh objects, the flattened
//! vertex array, its GPU buffer and a private texture cache.
//!
//! Loads and rebuilds are CPU-only and may run on any thread. GPU work
//! (buffer upload, releases, texture loads, draws) is deferred to
//! [`RenderObject::render`] on the rendering thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use asset::matrix::{FaceMatrix, VertexMatrix, mesh_from_matrices};
use asset::{ImageDecoder, MeshObject, obj};
use corelib::CoreResult;
use parking_lot::Mutex;

use crate::context::{BufferHandle, DrawCall, GraphicsContext, TextureHandle};
use crate::flatten::{FlatMesh, RenderStyle, flatten};
use crate::texture_cache::TextureCache;

/// Ownership handle shared between producers and the render worker.
pub type SharedObject = Arc<Mutex<RenderObject>>;

pub const DEFAULT_PARAM: f32 = 1.0;

#[derive(Debug)]
pub struct RenderObject {
    data_path: PathBuf,
    objects: Vec<MeshObject>,
    flat: FlatMesh,
    buffer: Option<BufferHandle>,
    /// `flat` changed since the last upload.
    upload_pending: bool,
    /// Cached textures belong to replaced or cleared objects.
    release_textures: bool,
    textures: TextureCache,
}

impl Default for RenderObject {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderObject {
    pub fn new() -> Self {
        Self {
            data_path: PathBuf::new(),
            objects: Vec::new(),
            flat: FlatMesh::empty(RenderStyle::Normal, DEFAULT_PARAM),
            buffer: None,
            upload_pending: false,
            release_textures: false,
            textures: TextureCache::default(),
        }
    }

    pub fn shared(self) -> SharedObject {
        Arc::new(Mutex::new(self))
    }

    /// Parse `mesh_filename` / `material_filename` under `data_path`,
    /// replacing the current objects. On failure nothing changes.
    pub fn load_obj_file(
        &mut self,
        data_path: impl AsRef<Path>,
        mesh_filename: &str,
        material_filename: &str,
    ) -> bool {
        let data_path = data_path.as_ref();
        match obj::load_obj_from_path(data_path, mesh_filename, material_filename) {
            Ok(objects) => {
                self.replace_objects(objects, data_path.to_path_buf());
                true
            }
            Err(e) => {
                log::error!("Failed to load {}: {}", data_path.join(mesh_filename).display(), e);
                false
            }
        }
    }

    /// Build a single untextured object from matrices. On failure nothing changes.
    pub fn load_eigen_data(&mut self, vertices: &VertexMatrix, faces: &FaceMatrix) -> bool {
        match mesh_from_matrices(vertices, faces) {
            Ok(object) => {
                self.replace_objects(vec![object], PathBuf::new());
                true
            }
            Err(e) => {
                log::error!("Rejected matrix geometry: {}", e);
                false
            }
        }
    }

    /// Replace the current objects with already-built ones.
    pub fn set_objects(&mut self, objects: Vec<MeshObject>, data_path: impl Into<PathBuf>) {
        self.replace_objects(objects, data_path.into());
    }

    fn replace_objects(&mut self, objects: Vec<MeshObject>, data_path: PathBuf) {
        self.objects = objects;
        self.data_path = data_path;
        // Geometry from before the load is never drawn; a rebuild is required.
        self.flat = FlatMesh::empty(self.flat.style, self.flat.param);
        self.upload_pending = true;
        self.release_textures = true;
    }

    /// Reset to empty. GPU buffer and cached textures are released on the
    /// next [`render`](Self::render).
    pub fn clear_obj_file(&mut self) -> bool {
        self.replace_objects(Vec::new(), PathBuf::new());
        true
    }

    /// Rebuild for `style`; a non-finite or non-positive `param` falls back to 1.
    pub fn rebuild(&mut self, style: RenderStyle, param: f32) {
        let param = if param.is_finite() && param > 0.0 {
            param
        } else {
            log::warn!("Invalid {:?} parameter {}, using {}", style, param, DEFAULT_PARAM);
            DEFAULT_PARAM
        };
        self.rebuild_varr(style, param);
        log::debug!(
            "Rebuilt {} object(s) as {:?}: {} primitives in {} segment(s)",
            self.objects.len(),
            style,
            self.flat.primitive_count(),
            self.flat.segments.len()
        );
    }

    /// Flatten the current objects into the vertex array. Any failure leaves
    /// an empty array (zero primitives), never a partial one.
    pub fn rebuild_varr(&mut self, style: RenderStyle, param: f32) {
        self.flat = match flatten(&self.objects, style, param) {
            Ok(flat) => flat,
            Err(e) => {
                log::error!("Rebuild failed, drawing nothing: {}", e);
                FlatMesh::empty(style, param)
            }
        };
        self.upload_pending = true;
    }

    /// Draw every segment of the current vertex array. Returns the number of
    /// draw calls issued. Rendering thread only.
    pub fn render(
        &mut self,
        gfx: &mut dyn GraphicsContext,
        decoder: &dyn ImageDecoder,
    ) -> CoreResult<usize> {
        if self.release_textures {
            self.textures.release_all(gfx);
            self.textures.set_base(self.data_path.clone());
            self.release_textures = false;
        }

        if self.upload_pending {
            if let Some(old) = self.buffer.take() {
                gfx.release_buffer(old);
            }
            if !self.flat.is_empty() {
                // Stays pending on failure so the next frame retries.
                self.buffer = Some(gfx.create_buffer(&self.flat.vertices, &self.flat.indices)?);
            }
            self.upload_pending = false;
        }

        let Some(buffer) = self.buffer else {
            return Ok(0);
        };
        let primitive = self.flat.style.primitive();
        for segment in &self.flat.segments {
            let texture = match segment.texture.as_deref() {
                Some(name) => self.textures.get_texture(name, segment.wrap, gfx, decoder),
                None => TextureHandle::NONE,
            };
            gfx.draw(&DrawCall {
                buffer,
                primitive,
                first: segment.first,
                count: segment.count,
                texture,
                size: self.flat.param,
            });
        }
        Ok(self.flat.segments.len())
    }

    /// Free the GPU buffer and every cached texture. Rendering thread only.
    pub fn release_gpu(&mut self, gfx: &mut dyn GraphicsContext) {
        if let Some(buffer) = self.buffer.take() {
            gfx.release_buffer(buffer);
        }
        self.textures.release_all(gfx);
        self.upload_pending = !self.flat.is_empty();
    }

    pub fn objects(&self) -> &[MeshObject] {
        &self.objects
    }

    pub fn flat(&self) -> &FlatMesh {
        &self.flat
    }

    pub fn style(&self) -> RenderStyle {
        self.flat.style
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Axis-aligned bounds over all objects.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        self.objects
            .iter()
            .filter_map(MeshObject::bounds)
            .reduce(|(lo, hi), (l, h)| {
                (
                    [lo[0].min(l[0]), lo[1].min(l[1]), lo[2].min(l[2])],
                    [hi[0].max(h[0]), hi[1].max(h[1]), hi[2].max(h[2])],
                )
            })
    }

    pub fn summary(&self) -> String {
        let header = format!(
            "{} object(s), style {:?}, {} primitives",
            self.objects.len(),
            self.flat.style,
            self.flat.primitive_count()
        );
        std::iter::once(header)
            .chain(self.objects.iter().map(|object| format!("  {object}")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn print(&self) {
        log::info!("{}", self.summary());
    }
}
