//! Build a [`MeshObject`] straight from numeric matrices (runtime geometry
//! such as a reconstructed pose mesh), bypassing text parsing.

use nalgebra::{DMatrix, Vector3};

use corelib::{CoreError, CoreResult};

use crate::mesh::{Face, FaceItem, MeshObject};

pub const MATRIX_OBJECT_NAME: &str = "matrix";

/// N×3 vertex positions.
pub type VertexMatrix = DMatrix<f32>;
/// M×3 or M×4 0-based vertex indices.
pub type FaceMatrix = DMatrix<u32>;

/// `vertices`: N×3 positions. `faces`: M×3 or M×4 0-based vertex indices.
///
/// Normals are smoothed per vertex: the area-weighted sum of the adjacent
/// face normals, normalized. Vertices no face touches get +Z.
pub fn mesh_from_matrices(vertices: &VertexMatrix, faces: &FaceMatrix) -> CoreResult<MeshObject> {
    if vertices.ncols() != 3 {
        return Err(CoreError::InvalidGeometry(format!(
            "vertex matrix must have 3 columns, got {}",
            vertices.ncols()
        )));
    }
    if faces.nrows() > 0 && !matches!(faces.ncols(), 3 | 4) {
        return Err(CoreError::InvalidGeometry(format!(
            "face matrix must have 3 or 4 columns, got {}",
            faces.ncols()
        )));
    }

    let n = vertices.nrows();
    if let Some(bad) = faces.iter().find(|&&i| i as usize >= n) {
        return Err(CoreError::InvalidGeometry(format!(
            "face index {bad} out of range for {n} vertices"
        )));
    }

    let mut object = MeshObject::new(MATRIX_OBJECT_NAME);
    object.vertices = vertices
        .row_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect();

    object.faces = faces
        .row_iter()
        .map(|row| Face {
            items: row
                .iter()
                .map(|&i| FaceItem::new(i as usize, None, Some(i as usize)))
                .collect(),
            material: None,
        })
        .collect();

    object.normals = smooth_normals(&object);
    Ok(object)
}

fn smooth_normals(object: &MeshObject) -> Vec<[f32; 3]> {
    let mut acc = vec![Vector3::<f32>::zeros(); object.vertices.len()];
    let point = |i: usize| Vector3::from(object.vertices[i]);

    for face in &object.faces {
        let pivot = face.items[0].vertex;
        // Fan from the first corner; the cross product length is twice the area.
        for pair in face.items[1..].windows(2) {
            let (b, c) = (pair[0].vertex, pair[1].vertex);
            let weighted = (point(b) - point(pivot)).cross(&(point(c) - point(pivot)));
            for i in [pivot, b, c] {
                acc[i] += weighted;
            }
        }
    }

    acc.into_iter()
        .map(|n| match n.try_normalize(1e-12) {
            Some(unit) => [unit.x, unit.y, unit.z],
            None => [0.0, 0.0, 1.0],
        })
        .collect()
}
