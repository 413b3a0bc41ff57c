//! CPU-side mesh object model shared by the OBJ and matrix loaders.

use std::collections::HashMap;
use std::fmt;

pub type Vertex3 = [f32; 3];
pub type Normal3 = [f32; 3];
pub type TexCoord2 = [f32; 2];

/// One corner of a face. Indices are 0-based into the owning [`MeshObject`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceItem {
    pub vertex: usize,
    pub texcoord: Option<usize>,
    pub normal: Option<usize>,
}

impl FaceItem {
    pub fn new(vertex: usize, texcoord: Option<usize>, normal: Option<usize>) -> Self {
        Self {
            vertex,
            texcoord,
            normal,
        }
    }
}

/// Polygon (not necessarily a triangle) plus the material active when it was declared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Face {
    pub items: Vec<FaceItem>,
    pub material: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse_texture: Option<String>,
    /// Upload the diffuse texture with clamp-to-edge instead of repeat.
    pub clamp_texture: bool,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    pub dissolve: f32,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_texture: None,
            clamp_texture: false,
            ambient: [0.2, 0.2, 0.2],
            diffuse: [0.8, 0.8, 0.8],
            specular: [0.0, 0.0, 0.0],
            shininess: 0.0,
            dissolve: 1.0,
        }
    }
}

/// Named sub-mesh. Owns its attribute pools and the materials its faces refer to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshObject {
    pub name: String,
    pub vertices: Vec<Vertex3>,
    pub normals: Vec<Normal3>,
    pub texcoords: Vec<TexCoord2>,
    pub faces: Vec<Face>,
    pub materials: HashMap<String, Material>,
    /// File-level index of each entry in `vertices`, so objects split from
    /// one file can recognise a shared vertex. Empty when the pool is not
    /// shared with any other object.
    pub source_vertices: Vec<usize>,
}

impl MeshObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resolve a face's material; `None` means the default untextured look.
    pub fn material_of(&self, face: &Face) -> Option<&Material> {
        face.material
            .as_deref()
            .and_then(|name| self.materials.get(name))
    }

    /// Check that every face index resolves to an existing entry.
    pub fn validate(&self) -> Result<(), String> {
        if !self.source_vertices.is_empty() && self.source_vertices.len() != self.vertices.len() {
            return Err(format!(
                "{} source indices for {} vertices",
                self.source_vertices.len(),
                self.vertices.len()
            ));
        }
        for (f, face) in self.faces.iter().enumerate() {
            for item in &face.items {
                if item.vertex >= self.vertices.len() {
                    return Err(format!(
                        "face {f}: vertex index {} out of range (len={})",
                        item.vertex,
                        self.vertices.len()
                    ));
                }
                if let Some(t) = item.texcoord.filter(|&t| t >= self.texcoords.len()) {
                    return Err(format!(
                        "face {f}: texcoord index {t} out of range (len={})",
                        self.texcoords.len()
                    ));
                }
                if let Some(n) = item.normal.filter(|&n| n >= self.normals.len()) {
                    return Err(format!(
                        "face {f}: normal index {n} out of range (len={})",
                        self.normals.len()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Axis-aligned bounds of the vertex pool, `None` when empty.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(mut lo, mut hi), v| {
            for k in 0..3 {
                lo[k] = lo[k].min(v[k]);
                hi[k] = hi[k].max(v[k]);
            }
            (lo, hi)
        }))
    }
}

impl fmt::Display for MeshObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}': {} vertices, {} normals, {} texcoords, {} faces, {} materials",
            self.name,
            self.vertices.len(),
            self.normals.len(),
            self.texcoords.len(),
            self.faces.len(),
            self.materials.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshObject {
        let mut obj = MeshObject::new("tri");
        obj.vertices = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, -1.0]];
        obj.faces.push(Face {
            items: (0..3).map(|i| FaceItem::new(i, None, None)).collect(),
            material: Some("skin".into()),
        });
        obj
    }

    #[test]
    fn validate_rejects_out_of_range_vertex() {
        let mut obj = triangle();
        assert!(obj.validate().is_ok());
        obj.faces[0].items[2].vertex = 3;
        assert!(obj.validate().is_err());
    }

    #[test]
    fn validate_rejects_mismatched_source_indices() {
        let mut obj = triangle();
        obj.source_vertices = vec![4, 7, 9];
        assert!(obj.validate().is_ok());
        obj.source_vertices.pop();
        assert!(obj.validate().is_err());
    }

    #[test]
    fn unresolved_material_falls_back_to_none() {
        let mut obj = triangle();
        assert!(obj.material_of(&obj.faces[0]).is_none());
        obj.materials.insert("skin".into(), Material::new("skin"));
        assert_eq!(obj.material_of(&obj.faces[0]).map(|m| m.name.as_str()), Some("skin"));
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let (lo, hi) = triangle().bounds().unwrap();
        assert_eq!(lo, [0.0, 0.0, -1.0]);
        assert_eq!(hi, [1.0, 2.0, 0.0]);
        assert!(MeshObject::new("empty").bounds().is_none());
    }
}
