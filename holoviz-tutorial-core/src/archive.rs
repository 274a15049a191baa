//! Packaging of the tutorial tree into a single deflate-compressed zip.
//!
//! The archive mirrors the project layout: top-level manifest files under
//! their bare names, then everything below the included subtree with its path
//! relative to the base directory. Exclusions are applied per path component,
//! so an excluded directory name hides everything beneath it at any depth.
//!
//! The zip is assembled in a temporary file next to the destination and only
//! moved into place once complete. A failed build therefore never creates
//! or clobbers the output file.

use std::fs::{self, File, Permissions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ArchiveConfig;
use crate::contract::ArchiveError;

/// What ended up in a freshly written archive.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub output_path: PathBuf,
    /// Member names in write order; directories carry a trailing `/`.
    pub members: Vec<String>,
    pub files: usize,
    pub directories: usize,
}

/// Whether `relative` (a path below `base_dir`) is filtered out by `config`.
pub fn is_excluded(config: &ArchiveConfig, relative: &Path) -> bool {
    let excluded_name = relative
        .file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| config.excluded_file_names.iter().any(|f| *f == name));
    if excluded_name {
        return true;
    }
    relative.components().any(|component| match component {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            config.excluded_dir_names.iter().any(|d| *d == part)
        }
        _ => false,
    })
}

/// POSIX-style member name for a path relative to the base directory.
pub fn member_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the archive described by `config`, replacing any file at `output_path`.
pub fn build_archive(config: &ArchiveConfig) -> Result<ArchiveSummary, ArchiveError> {
    config.trace_loaded();

    for name in &config.top_level_files {
        let path = config.base_dir.join(name);
        if !path.is_file() {
            warn!(path = %path.display(), "Required top-level file missing, aborting archive");
            return Err(ArchiveError::MissingFile { path });
        }
    }

    let output_dir = match config.output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let staging = tempfile::Builder::new()
        .prefix(".holoviz-archive-")
        .suffix(".zip.part")
        .tempfile_in(&output_dir)
        .map_err(|source| ArchiveError::Io {
            path: output_dir.clone(),
            source,
        })?;
    let staging_path = staging.path().to_path_buf();
    debug!(staging = %staging_path.display(), "Staging archive");

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(staging);
    let mut summary = ArchiveSummary {
        output_path: config.output_path.clone(),
        members: Vec::new(),
        files: 0,
        directories: 0,
    };

    for name in &config.top_level_files {
        let member = member_name(Path::new(name));
        write_file(&mut writer, &config.base_dir.join(name), &member, options)?;
        summary.members.push(member);
        summary.files += 1;
    }

    let subtree = config.base_dir.join(&config.included_subtree);
    if !subtree.is_dir() {
        warn!(path = %subtree.display(), "Included subtree does not exist, archiving top-level files only");
    } else {
        let walker = WalkDir::new(&subtree)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                // Prune excluded directories without descending into them.
                !(entry.file_type().is_dir()
                    && config
                        .excluded_dir_names
                        .iter()
                        .any(|d| *d == entry.file_name().to_string_lossy()))
            });

        for entry in walker {
            let entry = entry.map_err(|source| ArchiveError::Walk {
                root: subtree.clone(),
                source,
            })?;
            let path = entry.path();
            if path == staging_path || path == config.output_path {
                continue;
            }
            let relative = path.strip_prefix(&config.base_dir).unwrap_or(path);
            if is_excluded(config, relative) {
                debug!(path = %relative.display(), "Excluded from archive");
                continue;
            }

            let member = member_name(relative);
            if entry.file_type().is_dir() {
                if !config.include_directories {
                    continue;
                }
                let member = format!("{member}/");
                writer
                    .add_directory(member.as_str(), options)
                    .map_err(|source| ArchiveError::Zip {
                        member: member.clone(),
                        source,
                    })?;
                summary.members.push(member);
                summary.directories += 1;
            } else {
                write_file(&mut writer, path, &member, options)?;
                summary.members.push(member);
                summary.files += 1;
            }
        }
    }

    let staging = writer.finish().map_err(|source| ArchiveError::Zip {
        member: "<central directory>".to_string(),
        source,
    })?;
    published_permissions(&config.output_path)
        .and_then(|permissions| match permissions {
            Some(permissions) => staging.as_file().set_permissions(permissions),
            None => Ok(()),
        })
        .map_err(|source| ArchiveError::Io {
            path: staging_path.clone(),
            source,
        })?;
    staging
        .persist(&config.output_path)
        .map_err(|e| ArchiveError::Persist {
            path: config.output_path.clone(),
            source: e.error,
        })?;

    info!(
        output_path = %config.output_path.display(),
        files = summary.files,
        directories = summary.directories,
        "Created tutorial archive"
    );
    Ok(summary)
}

/// Mode the finished archive is published with. A replaced archive keeps its
/// mode; a new one gets the usual 0644 instead of the temp file's owner-only 0600.
fn published_permissions(output_path: &Path) -> io::Result<Option<Permissions>> {
    match fs::metadata(output_path) {
        Ok(metadata) => Ok(Some(metadata.permissions())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(fresh_permissions()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn fresh_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn fresh_permissions() -> Option<Permissions> {
    None
}

fn write_file<W: io::Write + io::Seek>(
    writer: &mut ZipWriter<W>,
    path: &Path,
    member: &str,
    options: SimpleFileOptions,
) -> Result<(), ArchiveError> {
    let mut source = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ArchiveError::MissingFile {
            path: path.to_path_buf(),
        },
        _ => ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    writer
        .start_file(member, options)
        .map_err(|source| ArchiveError::Zip {
            member: member.to_string(),
            source,
        })?;
    io::copy(&mut source, writer).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(member, "Added file to archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_by_file_name_at_any_depth() {
        let config = ArchiveConfig::holoviz("/base");
        assert!(is_excluded(&config, Path::new("tutorial/conf.py")));
        assert!(is_excluded(&config, Path::new("tutorial/deep/er/conf.py")));
        assert!(!is_excluded(&config, Path::new("tutorial/conf.py.bak")));
    }

    #[test]
    fn excludes_by_any_path_component() {
        let config = ArchiveConfig::holoviz("/base");
        assert!(is_excluded(&config, Path::new("tutorial/data")));
        assert!(is_excluded(&config, Path::new("tutorial/data/raster/x.tif")));
        assert!(is_excluded(&config, Path::new("tutorial/a/__pycache__/m.pyc")));
        assert!(is_excluded(&config, Path::new("tutorial/.ipynb_checkpoints/n.ipynb")));
        assert!(!is_excluded(&config, Path::new("tutorial/database/notes.md")));
    }

    #[test]
    fn member_names_use_forward_slashes() {
        let relative: PathBuf = ["tutorial", "assets", "logo.png"].iter().collect();
        assert_eq!(member_name(&relative), "tutorial/assets/logo.png");
    }
}
