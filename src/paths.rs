//! Destination paths for uploaded snapshots.
//!
//! Images land in `base/site/camera/YYYY/MM/DD/HH/YYYYMMDD-HHMMSS-ffffff.jpg`,
//! where site and camera are the second and third URL path segments.

use chrono::NaiveDateTime;
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};

use crate::config::{DEFAULT_CAMERA, DEFAULT_SITE};
use crate::storage::StorageError;

/// Directory and file name derived for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDestination {
    site: String,
    camera: String,
    directory: PathBuf,
    file_stem: String,
}

impl UploadDestination {
    /// Derives the destination for `url_path` captured at `timestamp`.
    ///
    /// Fails with [`StorageError::InvalidPath`] when the site or camera
    /// segment could address anything other than a single child directory.
    pub fn new(
        base: &Path,
        url_path: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Self, StorageError> {
        let (site, camera) = upload_site_and_camera(url_path)?;
        let mut directory = base.join(&site).join(&camera);
        for component in time_bucket(timestamp) {
            directory.push(component);
        }
        Ok(Self {
            site,
            camera,
            directory,
            file_stem: timestamp.format("%Y%m%d-%H%M%S-%6f").to_string(),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File name for the given attempt; attempts after the first get a `-N` suffix.
    pub fn file_name(&self, attempt: u32) -> String {
        if attempt == 0 {
            format!("{}.jpg", self.file_stem)
        } else {
            format!("{}-{attempt}.jpg", self.file_stem)
        }
    }
}

/// `[YYYY, MM, DD, HH]` directory names for the hour bucket of `timestamp`.
pub fn time_bucket(timestamp: NaiveDateTime) -> [String; 4] {
    [
        timestamp.format("%Y").to_string(),
        timestamp.format("%m").to_string(),
        timestamp.format("%d").to_string(),
        timestamp.format("%H").to_string(),
    ]
}

/// Site and camera identifiers taken from the URL path, with defaults.
pub fn upload_site_and_camera(url_path: &str) -> Result<(String, String), StorageError> {
    let segments: Vec<&str> = url_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let site = match segments.get(1) {
        Some(raw) => checked_segment(raw)?,
        None => DEFAULT_SITE.to_string(),
    };
    let camera = match segments.get(2) {
        Some(raw) => checked_segment(raw)?,
        None => DEFAULT_CAMERA.to_string(),
    };
    Ok((site, camera))
}

fn checked_segment(raw: &str) -> Result<String, StorageError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| StorageError::InvalidPath)?
        .into_owned();
    if decoded.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidPath);
    }
    let mut components = Path::new(&decoded).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == decoded.as_str() => Ok(decoded),
        _ => Err(StorageError::InvalidPath),
    }
}
