use std::path::{Path, PathBuf};

use crate::error::IoError;

/// File extensions recognized as frames, compared case insensitively.
pub const FRAME_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// List the image files of a directory of decoded frames, sorted by file name.
///
/// Frames are expected to be numbered with a fixed width, e.g. `frame0001.png`,
/// so that the lexicographic order is the playback order. Files with other
/// extensions and sub directories are ignored.
///
/// # Arguments
///
/// * `dir` - The directory holding the frames.
pub fn list_frame_paths(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, IoError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(IoError::FileDoesNotExist(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(IoError::NotADirectory(dir.to_path_buf()));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_frame(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    log::debug!("found {} frames in {}", paths.len(), dir.display());

    Ok(paths)
}

/// Path of the `index`-th output frame in `dir`, `frame%04d.png` counted from zero.
pub fn output_frame_path(dir: impl AsRef<Path>, index: usize) -> PathBuf {
    dir.as_ref().join(format!("frame{:04}.png", index))
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
