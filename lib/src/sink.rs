//! Output sink: writes a decrypted xRIT file to disk under a directory
//! layout derived from its Annotation filename.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::spdu::FileType;

/// Downlink rate class, selecting the top-level output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Lrit,
    Hrit,
}

impl Mode {
    fn dirname(self) -> &'static str {
        match self {
            Mode::Lrit => "LRIT",
            Mode::Hrit => "HRIT",
        }
    }
}

const IMAGE_BUCKETS: &[&str] = &["FD", "ENH", "LSH", "APNH"];
const ADD_BUCKETS: &[&str] = &["ANT", "GOCI", "NWP", "TYP"];

pub struct OutputSink {
    root: PathBuf,
    mode: Mode,
}

impl OutputSink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: Mode) -> Self {
        OutputSink {
            root: root.into(),
            mode,
        }
    }

    /// Write `bytes` to a path derived from `filename` (the Annotation
    /// header's declared name) and `file_type`. Returns the path written.
    pub fn write(&self, filename: &str, file_type: FileType, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.resolve_path(filename, file_type);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }

    fn resolve_path(&self, filename: &str, file_type: FileType) -> PathBuf {
        let parts: Vec<&str> = filename.splitn(7, '_').collect();

        let (top, bucket) = if file_type.is_image() {
            let ob_mode = parts.get(1).copied().unwrap_or("");
            if IMAGE_BUCKETS.contains(&ob_mode) {
                ("IMG", ob_mode)
            } else {
                warn!(filename, "unrecognized image observation mode, using UNKNOWN bucket");
                ("UNKNOWN", "")
            }
        } else {
            let ftype = parts.first().copied().unwrap_or("");
            if ADD_BUCKETS.contains(&ftype) {
                ("ADD", ftype)
            } else {
                warn!(filename, "unrecognized additional-data type, using UNKNOWN bucket");
                ("UNKNOWN", "")
            }
        };

        let mut path: PathBuf = [self.root.as_path(), Path::new(self.mode.dirname()), Path::new(top)]
            .iter()
            .collect();
        if !bucket.is_empty() {
            path.push(bucket);
        }
        path.push(filename);
        path
    }
}
