//! Vertex buffer builder: flattens indexed [`MeshObject`]s into linear
//! [`FlatVertex`] runs for one of the render styles.
//!
//! Polygons are fan-triangulated from their first corner. Output is grouped
//! into segments of consecutive faces sharing a diffuse texture.

use std::collections::HashSet;
use std::str::FromStr;

use asset::{Face, FaceItem, MeshObject};
use bytemuck::{Pod, Zeroable};
use corelib::{CoreError, CoreResult};

use crate::context::{Primitive, WrapMode};

/// Color used for faces without a resolvable material.
pub const DEFAULT_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderStyle {
    /// Shaded triangles.
    #[default]
    Normal,
    /// One dot per referenced vertex; the parameter is the point size.
    Points,
    /// Face edges; the parameter is the line width.
    Wireframe,
}

impl RenderStyle {
    pub fn primitive(self) -> Primitive {
        match self {
            Self::Normal => Primitive::Triangles,
            Self::Points => Primitive::Points,
            Self::Wireframe => Primitive::Lines,
        }
    }
}

impl FromStr for RenderStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "solid" => Ok(Self::Normal),
            "points" | "point" => Ok(Self::Points),
            "wireframe" | "wire" | "lines" => Ok(Self::Wireframe),
            other => Err(format!("unknown render style '{other}'")),
        }
    }
}

/// GPU-ready vertex: position + normal + uv + material color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlatVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

/// Index range drawn with one texture binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub texture: Option<String>,
    pub wrap: WrapMode,
    pub first: u32,
    pub count: u32,
}

/// Result of one rebuild: vertex/index data plus the style it was built for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatMesh {
    pub style: RenderStyle,
    pub param: f32,
    pub vertices: Vec<FlatVertex>,
    pub indices: Vec<u32>,
    pub segments: Vec<Segment>,
}

impl FlatMesh {
    pub fn empty(style: RenderStyle, param: f32) -> Self {
        Self {
            style,
            param,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Triangles, line segments or points, depending on the style.
    pub fn primitive_count(&self) -> usize {
        self.indices.len() / self.style.primitive().vertices_per_primitive()
    }

    fn push_segment(&mut self, texture: Option<&str>, wrap: WrapMode, first: usize) {
        let count = (self.vertices.len() - first) as u32;
        let first = first as u32;
        if count == 0 {
            return;
        }
        if let Some(last) = self.segments.last_mut() {
            if last.texture.as_deref() == texture && last.wrap == wrap && last.first + last.count == first {
                last.count += count;
                return;
            }
        }
        self.segments.push(Segment {
            texture: texture.map(str::to_owned),
            wrap,
            first,
            count,
        });
    }
}

/// Flatten every face of every object. Fails without output if any object
/// has an index that does not resolve.
pub fn flatten(objects: &[MeshObject], style: RenderStyle, param: f32) -> CoreResult<FlatMesh> {
    for object in objects {
        object
            .validate()
            .map_err(|e| CoreError::InvalidGeometry(format!("object '{}': {e}", object.name)))?;
    }

    let mut out = FlatMesh::empty(style, param);
    // Points already emitted, by file-level vertex index across objects.
    let mut seen_sources: HashSet<usize> = HashSet::new();
    for object in objects {
        let mut seen = vec![false; object.vertices.len()];

        for face in &object.faces {
            let material = object.material_of(face);
            let color = material.map_or(DEFAULT_COLOR, |m| {
                [m.diffuse[0], m.diffuse[1], m.diffuse[2], m.dissolve]
            });
            let normal = face_normal(object, face);
            let corner = |item: &FaceItem| FlatVertex {
                position: object.vertices[item.vertex],
                normal: item.normal.map_or(normal, |n| object.normals[n]),
                uv: item.texcoord.map_or([0.0, 0.0], |t| object.texcoords[t]),
                color,
            };

            let start = out.vertices.len();
            let items = &face.items;
            match style {
                RenderStyle::Normal => {
                    for i in 1..items.len().saturating_sub(1) {
                        out.vertices
                            .extend([&items[0], &items[i], &items[i + 1]].map(corner));
                    }
                }
                RenderStyle::Points => {
                    for item in items {
                        let first = match object.source_vertices.get(item.vertex) {
                            Some(&source) => seen_sources.insert(source),
                            None => !std::mem::replace(&mut seen[item.vertex], true),
                        };
                        if first {
                            out.vertices.push(corner(item));
                        }
                    }
                }
                RenderStyle::Wireframe => {
                    for (a, b) in face_edges(items) {
                        out.vertices.extend([corner(a), corner(b)]);
                    }
                }
            }

            let (texture, wrap) = match material {
                Some(m) => (
                    m.diffuse_texture.as_deref(),
                    if m.clamp_texture { WrapMode::Clamp } else { WrapMode::Repeat },
                ),
                None => (None, WrapMode::Repeat),
            };
            out.push_segment(texture, wrap, start);
        }
    }

    out.indices = (0..out.vertices.len() as u32).collect();
    Ok(out)
}

/// Closed-loop edges of one face; an edge repeated within the face (in
/// either direction) and zero-length edges are emitted once / skipped.
fn face_edges(items: &[FaceItem]) -> Vec<(&FaceItem, &FaceItem)> {
    let k = items.len();
    let mut seen: Vec<(usize, usize)> = Vec::with_capacity(k);
    let mut edges = Vec::with_capacity(k);
    if k < 2 {
        return edges;
    }
    for i in 0..k {
        let (a, b) = (&items[i], &items[(i + 1) % k]);
        if a.vertex == b.vertex {
            continue;
        }
        let key = (a.vertex.min(b.vertex), a.vertex.max(b.vertex));
        if !seen.contains(&key) {
            seen.push(key);
            edges.push((a, b));
        }
    }
    edges
}

/// Newell normal of the polygon; +Z for degenerate faces.
fn face_normal(object: &MeshObject, face: &Face) -> [f32; 3] {
    let mut n = [0.0f32; 3];
    let k = face.items.len();
    for i in 0..k {
        let p = object.vertices[face.items[i].vertex];
        let q = object.vertices[face.items[(i + 1) % k].vertex];
        n[0] += (p[1] - q[1]) * (p[2] + q[2]);
        n[1] += (p[2] - q[2]) * (p[0] + q[0]);
        n[2] += (p[0] - q[0]) * (p[1] + q[1]);
    }
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 1e-12 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use asset::obj::load_obj_from_str;

    const QUAD: &str = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";

    // Quad + triangle + pentagon sharing vertices, two materials.
    const MIXED: &str = r#"
        v 0 0 0
        v 1 0 0
        v 1 1 0
        v 0 1 0
        v 2 0 0
        v 2 1 0
        v 3 0.5 0
        vt 0 0
        vt 1 1
        usemtl skin
        f 1/1 2/2 3 4
        f 2 5 3
        usemtl cloth
        f 2 5 7 6 3
    "#;

    const MIXED_MTL: &str = "newmtl skin\nKd 1 0 0\nmap_Kd skin.png\nnewmtl cloth\nKd 0 0 1\nd 0.5\n";

    fn mixed() -> Vec<MeshObject> {
        load_obj_from_str(MIXED, Some(MIXED_MTL)).unwrap()
    }

    #[test]
    fn quad_normal_yields_two_triangles_six_vertices() {
        let objects = load_obj_from_str(QUAD, None).unwrap();
        let flat = flatten(&objects, RenderStyle::Normal, 1.0).unwrap();
        assert_eq!(flat.primitive_count(), 2);
        assert_eq!(flat.vertices.len(), 6);
        // Fan from the first corner: (1,2,3) and (1,3,4).
        let xs: Vec<[f32; 3]> = flat.vertices.iter().map(|v| v.position).collect();
        assert_eq!(xs[0], xs[3]);
        assert_eq!(xs[2], xs[4]);
        for v in &flat.vertices {
            assert_relative_eq!(v.normal[2], 1.0);
            assert_eq!(v.color, DEFAULT_COLOR);
        }
    }

    #[test]
    fn normal_triangle_count_is_sum_of_k_minus_two() {
        let flat = flatten(&mixed(), RenderStyle::Normal, 1.0).unwrap();
        assert_eq!(flat.primitive_count(), 2 + 1 + 3);
        assert_eq!(flat.indices.len(), flat.vertices.len());
    }

    #[test]
    fn points_count_distinct_referenced_vertices() {
        let mut objects = mixed();
        // An unreferenced vertex must not produce a point.
        objects[0].vertices.push([9.0, 9.0, 9.0]);
        objects[0].source_vertices.push(99);
        let flat = flatten(&objects, RenderStyle::Points, 4.0).unwrap();
        assert_eq!(flat.primitive_count(), 7);
        assert_relative_eq!(flat.param, 4.0);
    }

    #[test]
    fn points_shared_between_groups_are_emitted_once() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\ng a\nf 1 2 3\ng b\nf 1 3 4\n";
        let objects = load_obj_from_str(src, None).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].vertices.len() + objects[1].vertices.len(), 6);

        let flat = flatten(&objects, RenderStyle::Points, 1.0).unwrap();
        assert_eq!(flat.primitive_count(), 4);
        assert_eq!(flat.vertices[3].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn wireframe_counts_face_edges_without_cross_face_dedup() {
        let flat = flatten(&mixed(), RenderStyle::Wireframe, 1.0).unwrap();
        // 4 + 3 + 5 edges; shared edges between faces are kept.
        assert_eq!(flat.primitive_count(), 12);
        assert_eq!(flat.vertices.len(), 24);
    }

    #[test]
    fn wireframe_dedups_repeated_edges_within_a_face() {
        let objects = load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 1 3\nf 1 2\n", None).unwrap();
        let flat = flatten(&objects, RenderStyle::Wireframe, 1.0).unwrap();
        // Face 1: 1-2, 2-1 (dup), 1-3, 3-1 (dup). Face 2: 1-2 once.
        assert_eq!(flat.primitive_count(), 3);
    }

    #[test]
    fn segments_follow_material_textures() {
        let flat = flatten(&mixed(), RenderStyle::Normal, 1.0).unwrap();
        assert_eq!(flat.segments.len(), 2);
        assert_eq!(flat.segments[0].texture.as_deref(), Some("skin.png"));
        assert_eq!(flat.segments[0].count, 9);
        assert_eq!(flat.segments[1].texture, None);
        assert_eq!(flat.segments[1].first, 9);
        assert_eq!(flat.segments[1].count, 9);
        assert_eq!(flat.vertices[9].color, [0.0, 0.0, 1.0, 0.5]);
        assert_eq!(flat.vertices[1].uv, [1.0, 1.0]);
    }

    #[test]
    fn flattening_is_deterministic() {
        let objects = mixed();
        for style in [RenderStyle::Normal, RenderStyle::Points, RenderStyle::Wireframe] {
            let a = flatten(&objects, style, 2.0).unwrap();
            let b = flatten(&objects, style, 2.0).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn invalid_object_produces_no_output() {
        let mut objects = mixed();
        objects[0].faces[0].items[0].vertex = 100;
        assert!(matches!(
            flatten(&objects, RenderStyle::Normal, 1.0),
            Err(CoreError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn no_objects_is_empty() {
        let flat = flatten(&[], RenderStyle::Points, 1.0).unwrap();
        assert!(flat.is_empty());
        assert_eq!(flat.primitive_count(), 0);
    }

    #[test]
    fn style_from_str() {
        assert_eq!("Wireframe".parse::<RenderStyle>(), Ok(RenderStyle::Wireframe));
        assert!("hologram".parse::<RenderStyle>().is_err());
    }
}
