//! Producer threads: each loads one mesh, rebuilds it and registers it with
//! the render worker while frames keep running.

use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use asset::matrix::{FaceMatrix, VertexMatrix};
use nalgebra::DMatrix;
use parking_lot::Mutex;
use renderer::{ObjectRegistry, RenderObject};

use crate::ViewerOptions;

/// A mesh file and its (possibly empty) material file, relative to the data path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshSpec {
    pub mesh: String,
    pub material: String,
}

impl MeshSpec {
    /// Parse `mesh.obj` or `mesh.obj:material.mtl`.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((mesh, material)) => Self {
                mesh: mesh.to_owned(),
                material: material.to_owned(),
            },
            None => Self {
                mesh: spec.to_owned(),
                material: String::new(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct BoundsState {
    total: Option<([f32; 3], [f32; 3])>,
    changed: bool,
}

/// Union of the bounds of every registered object, for framing the camera.
#[derive(Clone, Debug, Default)]
pub struct SceneBounds {
    inner: Arc<Mutex<BoundsState>>,
}

impl SceneBounds {
    pub fn merge(&self, bounds: Option<([f32; 3], [f32; 3])>) {
        let Some((lo, hi)) = bounds else { return };
        let mut state = self.inner.lock();
        state.total = Some(match state.total {
            Some((a, b)) => (
                [a[0].min(lo[0]), a[1].min(lo[1]), a[2].min(lo[2])],
                [b[0].max(hi[0]), b[1].max(hi[1]), b[2].max(hi[2])],
            ),
            None => (lo, hi),
        });
        state.changed = true;
    }

    /// The current union, if it grew since the last call.
    pub fn take_changed(&self) -> Option<([f32; 3], [f32; 3])> {
        let mut state = self.inner.lock();
        if !state.changed {
            return None;
        }
        state.changed = false;
        state.total
    }
}

pub(crate) fn spawn_producers(
    options: &ViewerOptions,
    registry: &ObjectRegistry,
    bounds: &SceneBounds,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(options.meshes.len() + 1);

    for spec in &options.meshes {
        let spec = spec.clone();
        let data_path: PathBuf = options.data_path.clone();
        let (style, param) = (options.style, options.param);
        let registry = registry.clone();
        let bounds = bounds.clone();
        let handle = thread::Builder::new()
            .name(format!("load-{}", spec.mesh))
            .spawn(move || {
                let mut object = RenderObject::new();
                if !object.load_obj_file(&data_path, &spec.mesh, &spec.material) {
                    return;
                }
                object.rebuild(style, param);
                object.print();
                bounds.merge(object.bounds());
                registry.add_object(object.shared());
            })
            .context("Failed to spawn loader thread")?;
        handles.push(handle);
    }

    if options.demo_matrix {
        let (style, param) = (options.style, options.param);
        let registry = registry.clone();
        let bounds = bounds.clone();
        let handle = thread::Builder::new()
            .name("load-matrix".into())
            .spawn(move || {
                let (vertices, faces) = uv_sphere(16, 24);
                let mut object = RenderObject::new();
                if !object.load_eigen_data(&vertices, &faces) {
                    return;
                }
                object.rebuild(style, param);
                object.print();
                bounds.merge(object.bounds());
                registry.add_object(object.shared());
            })
            .context("Failed to spawn matrix thread")?;
        handles.push(handle);
    }

    Ok(handles)
}

/// Unit sphere as matrices: `rings` latitude bands, `segments` longitude slices.
pub(crate) fn uv_sphere(rings: usize, segments: usize) -> (VertexMatrix, FaceMatrix) {
    let mut positions: Vec<f32> = Vec::with_capacity((rings + 1) * segments * 3);
    for r in 0..=rings {
        let theta = PI * r as f32 / rings as f32;
        for s in 0..segments {
            let phi = 2.0 * PI * s as f32 / segments as f32;
            positions.extend([theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()]);
        }
    }

    let mut indices: Vec<u32> = Vec::with_capacity(rings * segments * 6);
    for r in 0..rings {
        for s in 0..segments {
            let a = (r * segments + s) as u32;
            let b = (r * segments + (s + 1) % segments) as u32;
            let c = a + segments as u32;
            let d = b + segments as u32;
            indices.extend([a, c, b, b, c, d]);
        }
    }

    (
        DMatrix::from_row_slice(positions.len() / 3, 3, &positions),
        DMatrix::from_row_slice(indices.len() / 3, 3, &indices),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_spec_parsing() {
        assert_eq!(
            MeshSpec::parse("body.obj:body.mtl"),
            MeshSpec {
                mesh: "body.obj".into(),
                material: "body.mtl".into()
            }
        );
        assert_eq!(MeshSpec::parse("hand.obj").material, "");
    }

    #[test]
    fn sphere_matrices_load() {
        let (v, f) = uv_sphere(4, 6);
        assert_eq!(v.nrows(), 5 * 6);
        assert_eq!(f.nrows(), 4 * 6 * 2);
        let mut object = RenderObject::new();
        assert!(object.load_eigen_data(&v, &f));
    }

    #[test]
    fn bounds_union_reports_changes_once() {
        let bounds = SceneBounds::default();
        assert!(bounds.take_changed().is_none());
        bounds.merge(Some(([0.0; 3], [1.0; 3])));
        bounds.merge(Some(([-1.0, 0.5, 0.0], [0.5, 2.0, 1.0])));
        bounds.merge(None);
        assert_eq!(
            bounds.take_changed(),
            Some(([-1.0, 0.0, 0.0], [1.0, 2.0, 1.0]))
        );
        assert!(bounds.take_changed().is_none());
    }
}
