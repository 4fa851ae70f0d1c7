use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const IMAGE_EXTENSION: &str = ".jpg";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub name: String,
    pub modified: SystemTime,
}

fn is_image(name: &str) -> bool {
    name.to_lowercase().ends_with(IMAGE_EXTENSION)
}

/// Lists the images directly inside `dir`. An unreadable `dir` is fatal,
/// unreadable entries only produce warnings.
pub fn list_images(dir: &Path, warnings: &mut Vec<String>) -> Result<Vec<StoredImage>> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(Error::Cleanup {
                    path: dir.to_path_buf(),
                    source: err,
                })
            }
            Err(err) => {
                warnings.push(format!("cleanup images: {err}"));
                continue;
            }
        };
        if entry.depth() == 0 || !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_image(&name) {
            continue;
        }
        match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
            Ok(modified) => images.push(StoredImage { name, modified }),
            Err(err) => warnings.push(format!("cleanup images: {name}: {err}")),
        }
    }
    Ok(images)
}

/// Picks the images to delete: everything but the `keep` most recent.
pub fn oldest_beyond(mut images: Vec<StoredImage>, keep: usize) -> Vec<StoredImage> {
    // Stable, so equal timestamps keep listing order.
    images.sort_by_key(|image| image.modified);
    let excess = images.len().saturating_sub(keep);
    images.truncate(excess);
    images
}

/// Deletes `names` from `dir` one at a time; a failure does not stop the rest.
pub fn remove_all<'a>(dir: &Path, names: impl IntoIterator<Item = &'a str>) -> PruneReport {
    let mut report = PruneReport::default();
    for name in names {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => {
                info!("cleanup images: deleted {name}");
                report.deleted.push(name.to_string());
            }
            Err(err) => {
                warn!("cleanup images: {name}: {err}");
                report.warnings.push(format!("cleanup images: {name}: {err}"));
            }
        }
    }
    report
}

/// Keeps the `keep` newest `.jpg` files in `dir` and deletes the others.
pub fn prune(dir: &Path, keep: usize) -> Result<PruneReport> {
    let mut warnings = Vec::new();
    let images = list_images(dir, &mut warnings)?;
    for warning in &warnings {
        warn!("{warning}");
    }

    let doomed = oldest_beyond(images, keep);
    let mut report = remove_all(dir, doomed.iter().map(|image| image.name.as_str()));
    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    Ok(report)
}
