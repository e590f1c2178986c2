use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};

/// Unpack a `.tar.gz` into `dest`, dropping `strip` leading path components.
///
/// Entries that would land outside `dest`, symlinks pointing out of it and
/// hard links are skipped. Returns the number of entries written.
pub fn extract_tar_gz(archive_path: &Path, dest: &Path, strip: usize) -> io::Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;
    let mut written = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let Some(relative) = strip_components(&path, strip) else {
            warn!(entry = %path.display(), "Skipping archive entry outside destination");
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let kind = entry.header().entry_type();
        if kind.is_hard_link() {
            warn!(entry = %path.display(), "Skipping hard link entry");
            continue;
        }
        if kind.is_symlink() {
            let link = entry.link_name()?.map(|l| l.into_owned());
            if !link.as_deref().is_some_and(link_stays_inside) {
                warn!(entry = %path.display(), "Skipping link pointing outside destination");
                continue;
            }
        }

        let target = root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
            if !parent.canonicalize()?.starts_with(&root) {
                warn!(entry = %path.display(), "Skipping archive entry resolving outside destination");
                continue;
            }
        }
        if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
            fs::remove_file(&target)?;
        }
        entry.unpack(&target)?;
        written += 1;
    }

    debug!(
        archive = %archive_path.display(),
        dest = %dest.display(),
        entries = written,
        "Extracted archive"
    );
    Ok(written)
}

/// `None` when the path is absolute or climbs out with `..`.
fn strip_components(path: &Path, strip: usize) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.into_iter().skip(strip).collect())
}

/// Link targets must be relative and never climb with `..`.
fn link_stays_inside(link: &Path) -> bool {
    link.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
