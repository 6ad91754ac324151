//! Binary STL export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::error::Error;
use crate::core::types::Result;
use super::marching::{triangle_normal, Mesh};

const HEADER_LEN: usize = 80;
const TRIANGLE_LEN: usize = 50;

/// Write `mesh` as binary STL: 80-byte header, little-endian triangle
/// count, then normal, three vertices and a zero attribute per triangle
pub fn write_stl_to<W: Write>(writer: &mut W, mesh: &Mesh) -> Result<()> {
    let count = u32::try_from(mesh.triangle_count())
        .map_err(|_| Error::Mesh(format!("{} triangles exceed the STL limit", mesh.triangle_count())))?;

    let mut header = [0u8; HEADER_LEN];
    let title = b"rkfusion binary STL";
    header[..title.len()].copy_from_slice(title);
    writer.write_all(&header)?;
    writer.write_all(&count.to_le_bytes())?;

    let mut record = [0u8; TRIANGLE_LEN];
    for tri in &mesh.triangles {
        let n = triangle_normal(tri);
        let floats = [n, tri[0], tri[1], tri[2]].into_iter().flat_map(|v| v.to_array());
        for (i, f) in floats.enumerate() {
            record[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
        }
        // attribute byte count stays zero
        writer.write_all(&record)?;
    }
    Ok(())
}

/// Encode `mesh` as binary STL in memory
pub fn stl_bytes(mesh: &Mesh) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + 4 + TRIANGLE_LEN * mesh.triangle_count());
    write_stl_to(&mut out, mesh)?;
    Ok(out)
}

/// Write `mesh` to a binary STL file, creating parent directories
pub fn write_stl(path: &Path, mesh: &Mesh) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_stl_to(&mut writer, mesh)?;
    writer.flush()?;
    log::info!("Wrote {} triangles to {}", mesh.triangle_count(), path.display());
    Ok(())
}
