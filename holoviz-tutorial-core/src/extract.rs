//! Expansion of downloaded containers into sibling directories.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::contract::ExtractError;

/// Extensions treated as containers, compared case-insensitively.
pub const CONTAINER_EXTENSIONS: &[&str] = &["zip"];

pub fn is_container(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| CONTAINER_EXTENSIONS.contains(&ext.as_str()))
}

/// `data/raster.zip` -> `data/raster`.
pub fn extracted_dir(path: &Path) -> PathBuf {
    path.with_extension("")
}

/// Extract every entry of `archive` below `dest`, returning the number of files written.
///
/// Entries whose names would escape `dest` are skipped.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, ExtractError> {
    debug!(archive = %archive.display(), dest = %dest.display(), "Extracting zip archive");

    let io_err = |source: io::Error| ExtractError::Io {
        archive: archive.to_path_buf(),
        source,
    };
    let zip_err = |source: zip::result::ZipError| ExtractError::Zip {
        archive: archive.to_path_buf(),
        source,
    };

    let file = File::open(archive).map_err(io_err)?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_err)?;
    fs::create_dir_all(dest).map_err(io_err)?;

    let mut extracted = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_err)?;
        let out_path = match entry.enclosed_name() {
            Some(name) => dest.join(name),
            None => {
                warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_err)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out_file = File::create(&out_path).map_err(io_err)?;
        io::copy(&mut entry, &mut out_file).map_err(io_err)?;
        extracted += 1;
    }

    info!(
        archive = %archive.display(),
        dest = %dest.display(),
        files = extracted,
        "Extracted zip archive"
    );
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    #[test]
    fn recognises_zip_regardless_of_case() {
        assert!(is_container(Path::new("data/raster.zip")));
        assert!(is_container(Path::new("data/RASTER.ZIP")));
        assert!(!is_container(Path::new("data/earthquakes-projected.parq")));
        assert!(!is_container(Path::new("data/zip")));
    }

    #[test]
    fn extracted_dir_strips_only_the_last_extension() {
        assert_eq!(extracted_dir(Path::new("data/raster.zip")), PathBuf::from("data/raster"));
        assert_eq!(extracted_dir(Path::new("data/a.tar.zip")), PathBuf::from("data/a.tar"));
    }

    #[test]
    fn extracts_nested_entries() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("x.zip");
        {
            let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = SimpleFileOptions::default();
            writer.start_file("a.txt", options).unwrap();
            writer.write_all(b"alpha").unwrap();
            writer.add_directory("b/", options).unwrap();
            writer.start_file("b/c.txt", options).unwrap();
            writer.write_all(b"gamma").unwrap();
            writer.finish().unwrap();
        }

        let dest = tmp.path().join("x");
        let count = extract_zip(&archive, &dest).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(dest.join("b/c.txt")).unwrap(), "gamma");
    }

    #[test]
    fn corrupt_archive_is_reported() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_zip(&archive, &tmp.path().join("broken")).unwrap_err();
        assert!(matches!(err, ExtractError::Zip { .. }), "got {err:?}");
    }
}
