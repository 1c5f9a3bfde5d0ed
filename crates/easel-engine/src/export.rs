use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use easel_contracts::download::{download_file_name, DownloadKind};
use easel_contracts::history::GenerationResult;
use image::{ImageFormat, ImageReader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `false` when the input already was a PNG and is passed through as-is.
    pub reencoded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub reencoded: bool,
}

pub fn ensure_png(bytes: &[u8]) -> Result<PngImage> {
    let format = image::guess_format(bytes).context("unrecognized image format")?;
    if format == ImageFormat::Png {
        let (width, height) = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png)
            .into_dimensions()
            .context("failed reading PNG dimensions")?;
        return Ok(PngImage {
            bytes: bytes.to_vec(),
            width,
            height,
            reencoded: false,
        });
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .with_context(|| format!("failed decoding {format:?} image"))?;
    let mut out = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .context("failed encoding PNG")?;
    Ok(PngImage {
        bytes: out,
        width: decoded.width(),
        height: decoded.height(),
        reencoded: true,
    })
}

/// Writes `result` as `<dir>/<download name>.png`, replacing an existing file
/// of the same name.
pub fn save_png(result: &GenerationResult, kind: DownloadKind, dir: &Path) -> Result<SavedImage> {
    let png = ensure_png(&result.image_bytes)?;
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    let path = dir.join(download_file_name(kind, &result.created_at));
    fs::write(&path, &png.bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(SavedImage {
        path,
        width: png.width,
        height: png.height,
        reencoded: png.reencoded,
    })
}
