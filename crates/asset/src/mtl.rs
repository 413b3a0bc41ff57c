//! MTL material parser: `newmtl`, `Ka`/`Kd`/`Ks`, `Ns`, `d`/`Tr` and `map_Kd`.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use corelib::{CoreError, CoreResult};

use crate::mesh::Material;

pub type MaterialLibrary = HashMap<String, Material>;

/// Load a material library from disk.
pub fn load_mtl_from_path(path: impl AsRef<Path>) -> CoreResult<MaterialLibrary> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| open_error(path, e))?;
    parse_mtl(BufReader::new(file), &path.display().to_string())
}

/// Convenience helper to parse an MTL string literal.
pub fn load_mtl_from_str(contents: &str) -> CoreResult<MaterialLibrary> {
    parse_mtl(io::Cursor::new(contents), "<mtl>")
}

pub(crate) fn open_error(path: &Path, err: io::Error) -> CoreError {
    if err.kind() == io::ErrorKind::NotFound {
        CoreError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        CoreError::Io {
            path: path.to_path_buf(),
            source: err,
        }
    }
}

pub fn parse_mtl<R: BufRead>(reader: R, file: &str) -> CoreResult<MaterialLibrary> {
    let mut library = MaterialLibrary::new();
    let mut current: Option<Material> = None;

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

        if tag == "newmtl" {
            let name = parts.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(CoreError::parse(file, line_no, "newmtl without a name"));
            }
            if let Some(done) = current.replace(Material::new(name)) {
                library.insert(done.name.clone(), done);
            }
            continue;
        }

        let Some(material) = current.as_mut() else {
            log::debug!("{file}:{line_no}: '{tag}' outside of a material, ignored");
            continue;
        };

        match tag {
            "Ka" => material.ambient = parse_rgb(parts, file, line_no)?,
            "Kd" => material.diffuse = parse_rgb(parts, file, line_no)?,
            "Ks" => material.specular = parse_rgb(parts, file, line_no)?,
            "Ns" => material.shininess = parse_f32(parts.next(), file, line_no, "Ns")?,
            "d" => material.dissolve = parse_f32(parts.next(), file, line_no, "d")?,
            "Tr" => material.dissolve = 1.0 - parse_f32(parts.next(), file, line_no, "Tr")?,
            "map_Kd" => {
                let (name, clamp) = parse_texture_statement(parts);
                if name.is_empty() {
                    return Err(CoreError::parse(file, line_no, "map_Kd without a filename"));
                }
                material.diffuse_texture = Some(name);
                material.clamp_texture = clamp;
            }
            _ => {
                // Ignore other statements (illum/Ke/Ni/map_Bump/etc.)
            }
        }
    }

    if let Some(done) = current {
        library.insert(done.name.clone(), done);
    }
    Ok(library)
}

fn parse_f32(value: Option<&str>, file: &str, line_no: usize, what: &str) -> CoreResult<f32> {
    let token = value.ok_or_else(|| CoreError::parse(file, line_no, format!("missing {what} value")))?;
    token
        .parse::<f32>()
        .map_err(|e| CoreError::parse(file, line_no, format!("invalid {what} value '{token}': {e}")))
}

fn parse_rgb<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    file: &str,
    line_no: usize,
) -> CoreResult<[f32; 3]> {
    let r = parse_f32(parts.next(), file, line_no, "red")?;
    // A single value means grey.
    match parts.next() {
        None => Ok([r, r, r]),
        g => {
            let g = parse_f32(g, file, line_no, "green")?;
            let b = parse_f32(parts.next(), file, line_no, "blue")?;
            Ok([r, g, b])
        }
    }
}

/// Split a `map_*` statement into its filename and the `-clamp` flag.
fn parse_texture_statement<'a>(parts: impl Iterator<Item = &'a str>) -> (String, bool) {
    let mut clamp = false;
    let mut name: Vec<&str> = Vec::new();
    let mut parts = parts.peekable();

    while let Some(token) = parts.next() {
        if !name.is_empty() || !token.starts_with('-') {
            name.push(token);
            continue;
        }
        if token == "-clamp" {
            clamp = parts.next() == Some("on");
            continue;
        }
        // Skip the option's arguments (numbers or on/off).
        while let Some(arg) = parts.peek() {
            if arg.parse::<f32>().is_ok() || *arg == "on" || *arg == "off" {
                parts.next();
            } else {
                break;
            }
        }
    }

    (name.join(" "), clamp)
}
