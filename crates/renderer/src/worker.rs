//! Render worker: owns the thread-affine graphics context and renders every
//! registered object once per frame.
//!
//! Producers register objects through [`ObjectRegistry`] from any thread. The
//! registry mutex is held only while the frame copies the handle list, never
//! during draws, so producers do not wait for a frame to finish. An object
//! whose own lock is held by a producer is skipped for that frame.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use asset::ImageDecoder;
use corelib::{CoreError, CoreResult};
use parking_lot::Mutex;

use crate::context::{GraphicsContext, RenderSettings};
use crate::object::SharedObject;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initialized,
    Running,
    /// Terminal; the graphics context is gone.
    Stopped,
}

/// Cloneable, thread-safe handle to the worker's object list.
#[derive(Clone, Default)]
pub struct ObjectRegistry {
    objects: Arc<Mutex<Vec<SharedObject>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&self, object: SharedObject) {
        let mut objects = self.objects.lock();
        objects.push(object);
        log::debug!("Registered object #{}", objects.len());
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace `dst` with the current handles; reuses `dst`'s allocation.
    fn snapshot_into(&self, dst: &mut Vec<SharedObject>) {
        dst.clear();
        dst.extend(self.objects.lock().iter().cloned());
    }
}

/// What one call to [`Render3D::work_on_thread`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Registered objects visited this frame.
    pub objects: usize,
    pub draw_calls: usize,
    /// Objects whose render failed and drew nothing.
    pub failed: usize,
    /// Objects locked elsewhere (e.g. mid-reload), not drawn this frame.
    pub busy: usize,
    /// No frame target was available; nothing was drawn.
    pub skipped: bool,
}

pub struct Render3D<G: GraphicsContext> {
    gfx: G,
    decoder: Box<dyn ImageDecoder>,
    settings: RenderSettings,
    registry: ObjectRegistry,
    frame: Vec<SharedObject>,
    state: WorkerState,
    render_thread: Option<ThreadId>,
    frames: u64,
}

impl<G: GraphicsContext> Render3D<G> {
    pub fn new(gfx: G, decoder: Box<dyn ImageDecoder>, settings: RenderSettings) -> Self {
        Self {
            gfx,
            decoder,
            settings,
            registry: ObjectRegistry::new(),
            frame: Vec::new(),
            state: WorkerState::Uninitialized,
            render_thread: None,
            frames: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Handle producers use to register objects.
    pub fn registry(&self) -> ObjectRegistry {
        self.registry.clone()
    }

    pub fn add_object(&self, object: SharedObject) {
        self.registry.add_object(object);
    }

    pub fn context(&self) -> &G {
        &self.gfx
    }

    pub fn context_mut(&mut self) -> &mut G {
        &mut self.gfx
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.settings.width = width;
        self.settings.height = height;
        self.gfx.resize(width, height);
    }

    /// Establish context state. Must run once, on the thread that renders.
    pub fn initialization_on_thread(&mut self) -> CoreResult<()> {
        match self.state {
            WorkerState::Uninitialized => {}
            WorkerState::Stopped => {
                return Err(CoreError::MissingGraphicsContext("worker stopped".into()));
            }
            state => {
                log::warn!("Render worker already initialized ({:?})", state);
                return Ok(());
            }
        }

        if let Err(e) = self.gfx.configure(&self.settings) {
            return Err(self.fail(e));
        }
        self.render_thread = Some(thread::current().id());
        self.state = WorkerState::Initialized;
        log::info!(
            "Render worker initialized: {}x{}, depth test {}",
            self.settings.width,
            self.settings.height,
            self.settings.depth_test
        );
        Ok(())
    }

    /// Render one frame: clear, draw every registered object, present.
    pub fn work_on_thread(&mut self) -> CoreResult<FrameReport> {
        match self.state {
            WorkerState::Initialized | WorkerState::Running => {}
            WorkerState::Uninitialized => {
                let e = CoreError::MissingGraphicsContext("worker not initialized".into());
                return Err(self.fail(e));
            }
            WorkerState::Stopped => {
                return Err(CoreError::MissingGraphicsContext("worker stopped".into()));
            }
        }
        if self.render_thread != Some(thread::current().id()) {
            let e = CoreError::MissingGraphicsContext("context is not current on this thread".into());
            return Err(self.fail(e));
        }
        self.state = WorkerState::Running;

        match self.gfx.begin_frame() {
            Ok(true) => {}
            Ok(false) => {
                return Ok(FrameReport {
                    skipped: true,
                    ..FrameReport::default()
                });
            }
            Err(e) if e.is_fatal() => return Err(self.fail(e)),
            Err(e) => return Err(e),
        }

        self.registry.snapshot_into(&mut self.frame);
        let mut report = FrameReport {
            objects: self.frame.len(),
            ..FrameReport::default()
        };
        for object in &self.frame {
            let Some(mut object) = object.try_lock() else {
                report.busy += 1;
                continue;
            };
            match object.render(&mut self.gfx, self.decoder.as_ref()) {
                Ok(draws) => report.draw_calls += draws,
                Err(e) => {
                    report.failed += 1;
                    log::warn!("Object render failed, skipped this frame: {}", e);
                }
            }
        }

        if let Err(e) = self.gfx.end_frame() {
            return Err(if e.is_fatal() { self.fail(e) } else { e });
        }
        self.frames += 1;
        log::trace!("Frame {}: {:?}", self.frames, report);
        Ok(report)
    }

    fn fail(&mut self, e: CoreError) -> CoreError {
        if e.is_fatal() && self.state != WorkerState::Stopped {
            log::error!("Render worker stopped: {}", e);
            self.state = WorkerState::Stopped;
        }
        e
    }
}

impl<G: GraphicsContext> Drop for Render3D<G> {
    fn drop(&mut self) {
        if self.state == WorkerState::Stopped {
            return;
        }
        self.registry.snapshot_into(&mut self.frame);
        for object in self.frame.drain(..) {
            object.lock().release_gpu(&mut self.gfx);
        }
    }
}
