use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{AnalysisStats, ConsolidateOptions};
use crate::util::fnv1a64;

#[derive(Debug)]
pub(crate) enum ReadSkip {
    NotFound,
    PermissionDenied,
    TooLarge,
    Binary,
    Io(io::Error),
}

impl ReadSkip {
    fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }

    pub(crate) fn count(&self, stats: &mut AnalysisStats) {
        let slot = match self {
            Self::NotFound => &mut stats.skipped_not_found,
            Self::PermissionDenied => &mut stats.skipped_permission_denied,
            Self::TooLarge => &mut stats.skipped_too_large,
            Self::Binary => &mut stats.skipped_binary,
            Self::Io(_) => &mut stats.skipped_read_errors,
        };
        *slot = slot.saturating_add(1);
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::NotFound => "file not found".to_string(),
            Self::PermissionDenied => "permission denied".to_string(),
            Self::TooLarge => "file exceeds max_file_size".to_string(),
            Self::Binary => "file looks binary".to_string(),
            Self::Io(err) => err.to_string(),
        }
    }
}

pub fn content_hash(text: &str) -> u64 {
    fnv1a64(text.as_bytes())
}

/// File access for scripts and generated artifacts: relative paths resolve
/// against the configured root, and overwrites can snapshot the previous
/// content into the backup directory first.
#[derive(Debug, Clone)]
pub struct ScriptFiles {
    root: PathBuf,
    backup_dir: PathBuf,
    max_file_size: Option<u64>,
}

impl ScriptFiles {
    pub fn new(options: &ConsolidateOptions) -> Self {
        Self {
            root: options.root.clone(),
            backup_dir: options.resolve(&options.backup_dir),
            max_file_size: options.max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Reads a script as text, or `None` (with a warning) when it is missing,
    /// unreadable, too large or binary.
    pub fn read(&self, path: &str) -> Option<String> {
        match self.read_text(path) {
            Ok(text) => Some(text),
            Err(skip) => {
                warn!(path, reason = %skip.describe(), "cannot read script");
                None
            }
        }
    }

    pub(crate) fn read_text(&self, path: &str) -> std::result::Result<String, ReadSkip> {
        let abs = self.resolve(path);
        let mut file = fs::File::open(&abs).map_err(ReadSkip::from_io)?;
        let metadata = file.metadata().map_err(ReadSkip::from_io)?;
        if let Some(max) = self.max_file_size
            && metadata.len() > max
        {
            return Err(ReadSkip::TooLarge);
        }

        let mut bytes = Vec::with_capacity(metadata.len().min(1024 * 1024) as usize);
        file.read_to_end(&mut bytes).map_err(ReadSkip::from_io)?;
        if bytes.contains(&0) {
            return Err(ReadSkip::Binary);
        }
        String::from_utf8(bytes)
            .map_err(|e| ReadSkip::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Writes `text`, creating parent directories. With `snapshot`, existing
    /// content is copied into the backup directory before it is replaced.
    pub fn write(&self, path: impl AsRef<Path>, text: &str, snapshot: bool) -> Result<()> {
        let abs = self.resolve(path);
        if let Some(parent) = abs.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
        }
        if snapshot && abs.is_file() {
            self.backup(&abs)?;
        }
        fs::write(&abs, text).map_err(|e| Error::write(&abs, e))?;
        debug!(path = %abs.display(), bytes = text.len(), "wrote file");
        Ok(())
    }

    /// Copies the file to `<backup_dir>/<name>.<timestamp>.bak`, adding a
    /// counter when a snapshot with the same timestamp already exists.
    pub fn backup(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let abs = self.resolve(path);
        fs::create_dir_all(&self.backup_dir).map_err(|e| Error::Backup {
            path: self.backup_dir.clone(),
            source: e,
        })?;

        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut target = self.backup_dir.join(format!("{name}.{stamp}.bak"));
        let mut counter = 1u32;
        while target.exists() {
            target = self.backup_dir.join(format!("{name}.{stamp}.{counter}.bak"));
            counter += 1;
        }

        fs::copy(&abs, &target).map_err(|e| Error::Backup {
            path: abs.clone(),
            source: e,
        })?;
        debug!(from = %abs.display(), to = %target.display(), "snapshot created");
        Ok(target)
    }

    pub fn make_executable(&self, path: impl AsRef<Path>) -> Result<()> {
        let abs = self.resolve(path);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(&abs)
                .map_err(|e| Error::write(&abs, e))?
                .permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&abs, perms).map_err(|e| Error::write(&abs, e))?;
        }
        #[cfg(not(unix))]
        let _ = abs;
        Ok(())
    }
}
