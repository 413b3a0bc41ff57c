//! Entry point for meshview.
//! Logging + CLI flags: backend, window size, render style, meshes to load.

use std::path::PathBuf;

use anyhow::{Result, bail};
use platform::{MeshSpec, ViewerOptions};
use renderer::RenderStyle;

fn parse_backend(val: &str) -> wgpu::Backends {
    // Accept: --gpu-backend=auto|vulkan|dx12|metal|gl
    match val.to_ascii_lowercase().as_str() {
        "auto" => wgpu::Backends::all(),
        "vulkan" | "vk" => wgpu::Backends::VULKAN,
        "dx12" | "d3d12" => wgpu::Backends::DX12,
        "metal" | "mtl" => wgpu::Backends::METAL,
        "gl" | "opengl" | "gles" => wgpu::Backends::GL,
        other => {
            log::warn!("Unknown backend '{}', falling back to auto.", other);
            wgpu::Backends::all()
        }
    }
}

fn parse_size(v: &str) -> Option<(u32, u32)> {
    let (sw, sh) = v.split_once('x').or_else(|| v.split_once('X'))?;
    Some((sw.parse().ok()?, sh.parse().ok()?))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<ViewerOptions> {
    let mut options = ViewerOptions::default();

    for arg in args {
        if let Some(val) = arg.strip_prefix("--gpu-backend=") {
            options.backends = parse_backend(val);
        } else if let Some(v) = arg.strip_prefix("--size=") {
            match parse_size(v) {
                Some((w, h)) => {
                    options.width = w.max(1);
                    options.height = h.max(1);
                }
                None => log::warn!("Ignoring malformed --size={}", v),
            }
        } else if let Some(v) = arg.strip_prefix("--style=") {
            options.style = v.parse::<RenderStyle>().map_err(anyhow::Error::msg)?;
        } else if let Some(v) = arg.strip_prefix("--param=") {
            options.param = v.parse()?;
        } else if let Some(v) = arg.strip_prefix("--data=") {
            options.data_path = PathBuf::from(v);
        } else if let Some(v) = arg.strip_prefix("--obj=") {
            options.meshes.push(MeshSpec::parse(v));
        } else if arg == "--demo-matrix" {
            options.demo_matrix = true;
        } else {
            bail!("Unknown argument '{}'", arg);
        }
    }

    if options.meshes.is_empty() && !options.demo_matrix {
        log::info!("Nothing to load; showing the matrix demo mesh.");
        options.demo_matrix = true;
    }
    Ok(options)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_args(std::env::args().skip(1))?;
    log::info!(
        "Starting meshview. Backend: {:?}, style={:?}({}), window_size={}x{}, meshes={}",
        options.backends,
        options.style,
        options.param,
        options.width,
        options.height,
        options.meshes.len()
    );

    platform::run_viewer(options)?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
