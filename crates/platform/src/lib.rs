//! Platform layer: window, dedicated render thread and producer threads.
//!
//! The render thread owns the worker and its graphics context; it runs
//! `initialization_on_thread` once and then `work_on_thread` until the window
//! closes or the worker stops. Producers load meshes on their own threads and
//! register them through the worker's registry.

mod producer;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use asset::ImageFileDecoder;
use parking_lot::Mutex;
use renderer::{Render3D, RenderSettings, RenderStyle, WgpuContext};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

pub use producer::{MeshSpec, SceneBounds};

/// Everything the viewer needs to start.
#[derive(Clone, Debug)]
pub struct ViewerOptions {
    pub backends: wgpu::Backends,
    pub width: u32,
    pub height: u32,
    pub style: RenderStyle,
    pub param: f32,
    pub data_path: PathBuf,
    pub meshes: Vec<MeshSpec>,
    pub demo_matrix: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            width: 1280,
            height: 720,
            style: RenderStyle::Normal,
            param: 1.0,
            data_path: PathBuf::from("."),
            meshes: Vec::new(),
            demo_matrix: false,
        }
    }
}

/// Open the window and render until it is closed.
pub fn run_viewer(options: ViewerOptions) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = ViewerApp::new(options);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop error: {e:?}"))?;

    app.shutdown()
}

struct RenderThread {
    handle: JoinHandle<Result<()>>,
    stop: Arc<AtomicBool>,
    pending_size: Arc<Mutex<Option<(u32, u32)>>>,
}

struct ViewerApp {
    options: ViewerOptions,
    window: Option<Arc<Window>>,
    render: Option<RenderThread>,
    producers: Vec<JoinHandle<()>>,
    error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(options: ViewerOptions) -> Self {
        Self {
            options,
            window: None,
            render: None,
            producers: Vec::new(),
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("meshview")
                        .with_inner_size(PhysicalSize::new(self.options.width, self.options.height)),
                )
                .context("Failed to create window")?,
        );
        let size = window.inner_size();
        log::info!("Window created: {}x{}", size.width, size.height);

        let gfx = WgpuContext::new_blocking(window.clone(), self.options.backends)
            .context("Failed to create graphics context")?;
        let settings = RenderSettings {
            width: size.width.max(1),
            height: size.height.max(1),
            ..RenderSettings::default()
        };
        let mut worker = Render3D::new(gfx, Box::new(ImageFileDecoder), settings);
        let registry = worker.registry();
        let bounds = SceneBounds::default();

        let stop = Arc::new(AtomicBool::new(false));
        let pending_size = Arc::new(Mutex::new(None));
        let handle = {
            let stop = stop.clone();
            let pending_size = pending_size.clone();
            let bounds = bounds.clone();
            thread::Builder::new()
                .name("render".into())
                .spawn(move || -> Result<()> {
                    worker.initialization_on_thread()?;
                    while !stop.load(Ordering::Relaxed) {
                        if let Some((w, h)) = pending_size.lock().take() {
                            worker.resize(w, h);
                        }
                        if let Some((lo, hi)) = bounds.take_changed() {
                            worker.context_mut().look_at_bounds(lo, hi);
                        }
                        worker.work_on_thread()?;
                    }
                    log::info!("Render thread finished after {} frames", worker.frames());
                    Ok(())
                })
                .context("Failed to spawn render thread")?
        };

        self.render = Some(RenderThread {
            handle,
            stop,
            pending_size,
        });
        self.window = Some(window);
        self.producers = producer::spawn_producers(&self.options, &registry, &bounds)?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        for producer in self.producers.drain(..) {
            if producer.join().is_err() {
                log::error!("A producer thread panicked");
            }
        }
        if let Some(render) = self.render.take() {
            render.stop.store(true, Ordering::Relaxed);
            render
                .handle
                .join()
                .map_err(|_| anyhow!("Render thread panicked"))??;
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("Startup failed: {e:#}");
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                log::info!("Resized: {}x{}", new_size.width, new_size.height);
                if let Some(render) = &self.render {
                    *render.pending_size.lock() = Some((new_size.width, new_size.height));
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                log::info!("Scale factor changed: {:.3}", scale_factor);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // The render thread ends on its own only when the worker stopped.
        if self.render.as_ref().is_some_and(|r| r.handle.is_finished()) {
            log::error!("Render thread exited; closing window");
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::wait_duration(Duration::from_millis(100)));
    }
}
