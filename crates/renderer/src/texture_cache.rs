//! Per-object texture cache: (filename, wrap mode) → GPU texture handle.
//!
//! Must only be touched from the rendering thread. Failed loads leave no
//! entry and yield [`TextureHandle::NONE`]; the failure is remembered so a
//! broken file is not decoded again every frame.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use asset::ImageDecoder;

use crate::context::{GraphicsContext, TextureHandle, WrapMode};

type TextureKey = (String, WrapMode);

#[derive(Debug, Default)]
pub struct TextureCache {
    base: PathBuf,
    textures: HashMap<TextureKey, TextureHandle>,
    failed: HashSet<TextureKey>,
}

impl TextureCache {
    /// Filenames are resolved relative to `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn set_base(&mut self, base: impl Into<PathBuf>) {
        self.base = base.into();
    }

    /// Cached handle for `filename` sampled with `wrap`, loading it on first
    /// request. The same file under another wrap mode is a separate entry.
    pub fn get_texture(
        &mut self,
        filename: &str,
        wrap: WrapMode,
        gfx: &mut dyn GraphicsContext,
        decoder: &dyn ImageDecoder,
    ) -> TextureHandle {
        let key = (filename.to_owned(), wrap);
        if let Some(&handle) = self.textures.get(&key) {
            return handle;
        }
        if self.failed.contains(&key) {
            return TextureHandle::NONE;
        }
        if self.load_texture(filename, wrap == WrapMode::Clamp, gfx, decoder) {
            self.textures.get(&key).copied().unwrap_or(TextureHandle::NONE)
        } else {
            TextureHandle::NONE
        }
    }

    /// Decode and upload `filename`, replacing any cached handle for the
    /// same wrap mode.
    pub fn load_texture(
        &mut self,
        filename: &str,
        clamp: bool,
        gfx: &mut dyn GraphicsContext,
        decoder: &dyn ImageDecoder,
    ) -> bool {
        let wrap = if clamp { WrapMode::Clamp } else { WrapMode::Repeat };
        let key = (filename.to_owned(), wrap);
        let path = self.base.join(filename);
        let uploaded = decoder
            .decode(&path)
            .and_then(|image| gfx.create_texture(&image, wrap));

        match uploaded {
            Ok(handle) => {
                self.failed.remove(&key);
                if let Some(old) = self.textures.insert(key, handle) {
                    gfx.release_texture(old);
                }
                log::debug!("Texture '{}' ({:?}) uploaded as {:?}", filename, wrap, handle);
                true
            }
            Err(e) => {
                log::warn!("Texture '{}' unavailable, drawing untextured: {}", filename, e);
                if let Some(old) = self.textures.remove(&key) {
                    gfx.release_texture(old);
                }
                self.failed.insert(key);
                false
            }
        }
    }

    /// Drop every entry for `filename` and free the GPU handles. Returns
    /// `false` if nothing was cached.
    pub fn release_texture(&mut self, filename: &str, gfx: &mut dyn GraphicsContext) -> bool {
        self.failed.retain(|(name, _)| name != filename);
        let mut released = false;
        self.textures.retain(|(name, _), handle| {
            if name == filename {
                gfx.release_texture(*handle);
                released = true;
                false
            } else {
                true
            }
        });
        released
    }

    pub fn release_all(&mut self, gfx: &mut dyn GraphicsContext) {
        for (_, handle) in self.textures.drain() {
            gfx.release_texture(handle);
        }
        self.failed.clear();
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.textures.keys().any(|(name, _)| name == filename)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MapDecoder, RecordingContext};

    #[test]
    fn first_request_loads_then_hits_cache() {
        let mut gfx = RecordingContext::default();
        let decoder = MapDecoder::with_textures(&["/data/skin.png"]);
        let mut cache = TextureCache::new("/data");

        let a = cache.get_texture("skin.png", WrapMode::Clamp, &mut gfx, &decoder);
        let b = cache.get_texture("skin.png", WrapMode::Clamp, &mut gfx, &decoder);
        assert!(!a.is_none());
        assert_eq!(a, b);
        assert_eq!(decoder.decode_calls(), 1);
        assert_eq!(gfx.texture_wraps[&a], WrapMode::Clamp);
        assert!(cache.contains("skin.png"));
    }

    #[test]
    fn wrap_modes_get_their_own_handles() {
        let mut gfx = RecordingContext::default();
        let decoder = MapDecoder::with_textures(&["/data/skin.png"]);
        let mut cache = TextureCache::new("/data");

        let clamped = cache.get_texture("skin.png", WrapMode::Clamp, &mut gfx, &decoder);
        let repeated = cache.get_texture("skin.png", WrapMode::Repeat, &mut gfx, &decoder);
        assert_ne!(clamped, repeated);
        assert_eq!(gfx.texture_wraps[&clamped], WrapMode::Clamp);
        assert_eq!(gfx.texture_wraps[&repeated], WrapMode::Repeat);
        assert_eq!(cache.len(), 2);

        assert!(cache.release_texture("skin.png", &mut gfx));
        assert_eq!(gfx.live_textures(), 0);
        assert!(!cache.contains("skin.png"));
    }

    #[test]
    fn failed_decode_yields_none_and_is_not_retried() {
        let mut gfx = RecordingContext::default();
        let decoder = MapDecoder::default();
        let mut cache = TextureCache::new("/data");

        for _ in 0..3 {
            let handle = cache.get_texture("missing.png", WrapMode::Repeat, &mut gfx, &decoder);
            assert!(handle.is_none());
        }
        assert_eq!(decoder.decode_calls(), 1);
        assert!(cache.is_empty());

        // Releasing forgets the failure so the next request tries again.
        assert!(!cache.release_texture("missing.png", &mut gfx));
        cache.get_texture("missing.png", WrapMode::Repeat, &mut gfx, &decoder);
        assert_eq!(decoder.decode_calls(), 2);
    }

    #[test]
    fn failed_upload_leaves_entry_absent() {
        let mut gfx = RecordingContext::failing_textures();
        let decoder = MapDecoder::with_textures(&["/data/skin.png"]);
        let mut cache = TextureCache::new("/data");
        assert!(!cache.load_texture("skin.png", false, &mut gfx, &decoder));
        assert!(!cache.contains("skin.png"));
    }

    #[test]
    fn release_frees_gpu_handles() {
        let mut gfx = RecordingContext::default();
        let decoder = MapDecoder::with_textures(&["/data/a.png", "/data/b.png"]);
        let mut cache = TextureCache::new("/data");
        cache.get_texture("a.png", WrapMode::Repeat, &mut gfx, &decoder);
        cache.get_texture("b.png", WrapMode::Repeat, &mut gfx, &decoder);
        assert_eq!(gfx.live_textures(), 2);

        assert!(cache.release_texture("a.png", &mut gfx));
        assert_eq!(gfx.live_textures(), 1);
        cache.release_all(&mut gfx);
        assert_eq!(gfx.live_textures(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn reload_replaces_old_handle() {
        let mut gfx = RecordingContext::default();
        let decoder = MapDecoder::with_textures(&["/data/a.png"]);
        let mut cache = TextureCache::new("/data");
        assert!(cache.load_texture("a.png", false, &mut gfx, &decoder));
        assert!(cache.load_texture("a.png", false, &mut gfx, &decoder));
        assert_eq!(gfx.live_textures(), 1);
        assert_eq!(cache.len(), 1);
    }
}
