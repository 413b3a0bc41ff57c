//! OBJ parser supporting positions, normals, texture coordinates, polygon
//! faces, groups and material switches.
//!
//! Parsing is fail-atomic: callers get either every object of the file or an
//! error, never a partially filled result.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use corelib::{CoreError, CoreResult};

use crate::mesh::{Face, FaceItem, MeshObject, Normal3, TexCoord2, Vertex3};
use crate::mtl::{self, MaterialLibrary};

/// Load `mesh_filename` (and `material_filename`, if any) from `data_path`.
///
/// An empty `material_filename` falls back to the first `mtllib` of the mesh
/// file. A material file that does not exist is tolerated with a warning.
pub fn load_obj_from_path(
    data_path: impl AsRef<Path>,
    mesh_filename: &str,
    material_filename: &str,
) -> CoreResult<Vec<MeshObject>> {
    let data_path = data_path.as_ref();
    let mesh_path = data_path.join(mesh_filename);
    let file = File::open(&mesh_path).map_err(|e| mtl::open_error(&mesh_path, e))?;

    let default_name = mesh_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_owned());
    let parsed = parse_obj(
        BufReader::new(file),
        &mesh_path.display().to_string(),
        &default_name,
    )?;

    let material_filename = if material_filename.is_empty() {
        parsed.mtllibs.first().map(String::as_str).unwrap_or("")
    } else {
        material_filename
    };

    let materials = if material_filename.is_empty() {
        MaterialLibrary::new()
    } else {
        match mtl::load_mtl_from_path(data_path.join(material_filename)) {
            Ok(library) => library,
            Err(CoreError::FileNotFound { path }) => {
                log::warn!("Material file {} not found; continuing without materials", path.display());
                MaterialLibrary::new()
            }
            Err(e) => return Err(e),
        }
    };

    let objects = parsed.into_objects(&materials);
    log::info!(
        "Loaded {} ({} objects, {} materials)",
        mesh_path.display(),
        objects.len(),
        materials.len()
    );
    Ok(objects)
}

/// Convenience helper to parse an OBJ string literal with an optional MTL string.
pub fn load_obj_from_str(mesh: &str, materials: Option<&str>) -> CoreResult<Vec<MeshObject>> {
    let parsed = parse_obj(io::Cursor::new(mesh), "<obj>", "default")?;
    let library = match materials {
        Some(src) => mtl::load_mtl_from_str(src)?,
        None => MaterialLibrary::new(),
    };
    Ok(parsed.into_objects(&library))
}

/// File-global attribute pools and faces grouped by `g`/`o` name.
#[derive(Debug, Default)]
struct ParsedObj {
    positions: Vec<Vertex3>,
    normals: Vec<Normal3>,
    texcoords: Vec<TexCoord2>,
    groups: Vec<(String, Vec<Face>)>,
    mtllibs: Vec<String>,
}

fn parse_obj<R: BufRead>(reader: R, file: &str, default_name: &str) -> CoreResult<ParsedObj> {
    let mut out = ParsedObj::default();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut current_group: Option<usize> = None;
    let mut current_material: Option<String> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.map_err(|e| CoreError::Io {
            path: file.into(),
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else { continue };

        match tag {
            "v" => {
                let x = parse_f32(parts.next(), file, line_no, "x coordinate")?;
                let y = parse_f32(parts.next(), file, line_no, "y coordinate")?;
                let z = parse_f32(parts.next(), file, line_no, "z coordinate")?;
                out.positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), file, line_no, "u coordinate")?;
                // `vt u` is legal; v defaults to 0.
                let v = match parts.next() {
                    Some(token) => parse_f32(Some(token), file, line_no, "v coordinate")?,
                    None => 0.0,
                };
                out.texcoords.push([u, v]);
            }
            "vn" => {
                let nx = parse_f32(parts.next(), file, line_no, "nx coordinate")?;
                let ny = parse_f32(parts.next(), file, line_no, "ny coordinate")?;
                let nz = parse_f32(parts.next(), file, line_no, "nz coordinate")?;
                out.normals.push([nx, ny, nz]);
            }
            "f" => {
                let items = parts
                    .map(|token| {
                        parse_face_item(
                            token,
                            (out.positions.len(), out.texcoords.len(), out.normals.len()),
                            file,
                            line_no,
                        )
                    })
                    .collect::<CoreResult<Vec<_>>>()?;
                if items.is_empty() {
                    return Err(CoreError::parse(file, line_no, "face without vertices"));
                }

                let group = match current_group {
                    Some(g) => g,
                    None => {
                        let g = open_group(&mut out, &mut group_index, default_name);
                        current_group = Some(g);
                        g
                    }
                };
                out.groups[group].1.push(Face {
                    items,
                    material: current_material.clone(),
                });
            }
            "g" | "o" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let name = if name.is_empty() { default_name } else { name.as_str() };
                current_group = Some(open_group(&mut out, &mut group_index, name));
            }
            "usemtl" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                current_material = (!name.is_empty()).then_some(name);
            }
            "mtllib" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                if !name.is_empty() {
                    out.mtllibs.push(name);
                }
            }
            _ => {
                // Ignore other directives (s/l/vp/etc.)
            }
        }
    }

    Ok(out)
}

fn open_group(out: &mut ParsedObj, index: &mut HashMap<String, usize>, name: &str) -> usize {
    *index.entry(name.to_owned()).or_insert_with(|| {
        out.groups.push((name.to_owned(), Vec::new()));
        out.groups.len() - 1
    })
}

impl ParsedObj {
    /// Split into one [`MeshObject`] per non-empty group, compacting each
    /// attribute pool to the entries the group references. Each object keeps
    /// the file-level index of its vertices in `source_vertices`.
    fn into_objects(self, materials: &MaterialLibrary) -> Vec<MeshObject> {
        let mut objects = Vec::with_capacity(self.groups.len());

        for (name, faces) in self.groups {
            if faces.is_empty() {
                continue;
            }
            let mut object = MeshObject::new(name);
            let mut vmap: HashMap<usize, usize> = HashMap::new();
            let mut tmap: HashMap<usize, usize> = HashMap::new();
            let mut nmap: HashMap<usize, usize> = HashMap::new();

            for face in faces {
                let items = face
                    .items
                    .iter()
                    .map(|item| FaceItem {
                        vertex: remap(item.vertex, &mut vmap, &self.positions, &mut object.vertices),
                        texcoord: item
                            .texcoord
                            .map(|t| remap(t, &mut tmap, &self.texcoords, &mut object.texcoords)),
                        normal: item
                            .normal
                            .map(|n| remap(n, &mut nmap, &self.normals, &mut object.normals)),
                    })
                    .collect();

                if let Some(material) = face.material.as_deref() {
                    if !object.materials.contains_key(material) {
                        match materials.get(material) {
                            Some(m) => {
                                object.materials.insert(material.to_owned(), m.clone());
                            }
                            None => log::debug!(
                                "Object '{}' uses unknown material '{}'",
                                object.name,
                                material
                            ),
                        }
                    }
                }

                object.faces.push(Face {
                    items,
                    material: face.material,
                });
            }
            object.source_vertices = vec![0; object.vertices.len()];
            for (global, local) in vmap {
                object.source_vertices[local] = global;
            }
            objects.push(object);
        }

        objects
    }
}

fn remap<T: Copy>(global: usize, map: &mut HashMap<usize, usize>, pool: &[T], dst: &mut Vec<T>) -> usize {
    *map.entry(global).or_insert_with(|| {
        dst.push(pool[global]);
        dst.len() - 1
    })
}

fn parse_f32(value: Option<&str>, file: &str, line_no: usize, what: &str) -> CoreResult<f32> {
    let token =
        value.ok_or_else(|| CoreError::parse(file, line_no, format!("missing {what}")))?;
    token
        .parse::<f32>()
        .map_err(|e| CoreError::parse(file, line_no, format!("failed to parse {what} '{token}': {e}")))
}

fn parse_face_item(
    token: &str,
    (pos_count, tex_count, norm_count): (usize, usize, usize),
    file: &str,
    line_no: usize,
) -> CoreResult<FaceItem> {
    let mut split = token.split('/');
    let pos = split.next().unwrap_or_default();
    let vertex = resolve_index(pos, pos_count, file, line_no)?;

    let texcoord = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, tex_count, file, line_no)?),
        _ => None,
    };

    let normal = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, norm_count, file, line_no)?),
        _ => None,
    };

    Ok(FaceItem::new(vertex, texcoord, normal))
}

fn resolve_index(token: &str, len: usize, file: &str, line_no: usize) -> CoreResult<usize> {
    let raw = token
        .parse::<i64>()
        .map_err(|_| CoreError::parse(file, line_no, format!("invalid index '{token}'")))?;
    if raw == 0 {
        return Err(CoreError::parse(file, line_no, "OBJ indices are 1-based; found 0"));
    }

    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };

    if idx < 0 || idx as usize >= len {
        return Err(CoreError::parse(
            file,
            line_no,
            format!("index {raw} resolved out of bounds (len={len})"),
        ));
    }

    Ok(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    const QUAD: &str = r#"
        v 0.0 0.0 0.0
        v 1.0 0.0 0.0
        v 1.0 1.0 0.0
        v 0.0 1.0 0.0
        f 1 2 3 4
    "#;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("asset-obj-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parse_quad_as_single_polygon() {
        let objects = load_obj_from_str(QUAD, None).expect("parse quad");
        assert_eq!(objects.len(), 1);
        let obj = &objects[0];
        assert_eq!(obj.name, "default");
        assert_eq!(obj.vertices.len(), 4);
        assert_eq!(obj.faces.len(), 1);
        let indices: Vec<usize> = obj.faces[0].items.iter().map(|i| i.vertex).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn parse_all_face_item_forms() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            vt 0 0
            vt 1
            vn 0 0 1
            f 1/1/1 2/2/1 3//1
            f -3 -2/-1 -1
        "#;
        let obj = &load_obj_from_str(src, None).unwrap()[0];
        assert_eq!(obj.faces[0].items[0], FaceItem::new(0, Some(0), Some(0)));
        assert_eq!(obj.faces[0].items[2], FaceItem::new(2, None, Some(0)));
        assert_eq!(obj.faces[1].items[1], FaceItem::new(1, Some(1), None));
        assert_eq!(obj.texcoords[1], [1.0, 0.0]);
        assert!(obj.validate().is_ok());
    }

    #[test]
    fn groups_become_compacted_objects() {
        let src = r#"
            mtllib body.mtl
            v 0 0 0
            v 1 0 0
            v 0 1 0
            v 1 1 0
            g left
            usemtl skin
            f 1 2 3
            g right
            usemtl cloth
            f 4 3 2
            g left
            f 3 2 1
        "#;
        let mtl = "newmtl skin\nKd 1 0 0\n";
        let objects = load_obj_from_str(src, Some(mtl)).unwrap();
        assert_eq!(objects.len(), 2);

        let left = &objects[0];
        assert_eq!(left.name, "left");
        assert_eq!(left.faces.len(), 2);
        assert_eq!(left.vertices.len(), 3);
        assert!(left.materials.contains_key("skin"));

        assert_eq!(left.source_vertices, vec![0, 1, 2]);

        let right = &objects[1];
        assert_eq!(right.vertices, vec![[1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(right.source_vertices, vec![3, 2, 1]);
        let indices: Vec<usize> = right.faces[0].items.iter().map(|i| i.vertex).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(right.faces[0].material.as_deref(), Some("cloth"));
        // Unknown material stays referenced by name but is not attached.
        assert!(right.materials.is_empty());
    }

    #[test]
    fn out_of_range_index_fails() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n";
        let err = load_obj_from_str(src, None).unwrap_err();
        assert!(matches!(err, CoreError::Parse { line: 4, .. }));
    }

    #[test]
    fn zero_index_fails() {
        assert!(load_obj_from_str("v 0 0 0\nf 0 1 1\n", None).is_err());
    }

    #[test]
    fn missing_mesh_file_is_not_found() {
        let err = load_obj_from_path("/definitely/not/here", "mesh.obj", "").unwrap_err();
        assert!(matches!(err, CoreError::FileNotFound { .. }));
    }

    #[test]
    fn load_from_disk_with_mtllib_fallback_and_missing_material() {
        let dir = scratch_dir("mtllib");
        fs::write(dir.join("hand.obj"), format!("mtllib hand.mtl\nusemtl skin\n{QUAD}")).unwrap();
        fs::write(dir.join("hand.mtl"), "newmtl skin\nmap_Kd skin.png\n").unwrap();

        let objects = load_obj_from_path(&dir, "hand.obj", "").unwrap();
        assert_eq!(objects[0].name, "hand");
        assert_eq!(
            objects[0].materials["skin"].diffuse_texture.as_deref(),
            Some("skin.png")
        );

        let objects = load_obj_from_path(&dir, "hand.obj", "absent.mtl").unwrap();
        assert!(objects[0].materials.is_empty());

        fs::remove_dir_all(&dir).ok();
    }
}
