//! Module locator
//!
//! Tracks where the builder writes the module (canonical path) and where the
//! copy that actually gets loaded lives (staging path). The running domain only
//! ever reads the staged copy, so the builder can overwrite the canonical file
//! at any time.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::config::{FingerprintMode, LocatorConfig};
use crate::error::LocatorError;

/// Platform file name of a shared library called `name`.
pub fn library_file_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.dll", name)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", name)
    } else {
        format!("lib{}.so", name)
    }
}

/// Cheap comparable summary of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Last modification time, when the platform reports one
    pub modified: Option<SystemTime>,
    /// File length in bytes
    pub len: u64,
    /// SHA-256 of the contents (content mode only)
    pub digest: Option<[u8; 32]>,
}

impl Fingerprint {
    /// Fingerprint `path` using `mode`.
    pub fn of(path: &Path, mode: FingerprintMode) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let digest = match mode {
            FingerprintMode::Metadata => None,
            FingerprintMode::Content => Some(Self::hash(path)?),
        };
        Ok(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            digest,
        })
    }

    fn hash(path: &Path) -> io::Result<[u8; 32]> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }
}

/// Module locator
#[derive(Debug)]
pub struct ModuleLocator {
    config: LocatorConfig,
    outside_search: bool,
    file_name: String,
    canonical: PathBuf,
    staging: PathBuf,
    last_seen: Option<Fingerprint>,
    generation: u64,
}

impl ModuleLocator {
    /// Create a locator; paths follow `config` until [`init_paths`](Self::init_paths) runs.
    pub fn new(config: LocatorConfig) -> Self {
        let file_name = library_file_name(&config.module_name);
        let canonical = config.root.join(&file_name);
        let staging = config.staging_dir().join(&file_name);
        Self {
            config,
            outside_search: false,
            file_name,
            canonical,
            staging,
            last_seen: None,
            generation: 0,
        }
    }

    /// Allow the canonical file to be found beyond the configured root
    pub fn with_outside_search(mut self, enabled: bool) -> Self {
        self.outside_search = enabled;
        self
    }

    /// Enable/disable outside search
    pub fn set_outside_search(&mut self, enabled: bool) {
        self.outside_search = enabled;
    }

    /// Whether outside search is enabled
    pub fn outside_search(&self) -> bool {
        self.outside_search
    }

    /// Get the configuration
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Path the builder writes to
    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    /// Path of the most recent staged copy
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Fingerprint recorded by the last positive check or successful stage
    pub fn last_seen(&self) -> Option<&Fingerprint> {
        self.last_seen.as_ref()
    }

    /// Compute canonical and staging paths. Calling it again yields the same paths
    /// for the same file system contents.
    pub fn init_paths(&mut self) {
        self.canonical = self.resolve_canonical();
        if !self.config.versioned_staging || self.generation == 0 {
            self.staging = self.config.staging_dir().join(&self.file_name);
        }
        debug!(
            "Module paths: canonical={:?} staging={:?}",
            self.canonical, self.staging
        );
    }

    /// Check whether the canonical file differs from the last seen build.
    ///
    /// A positive result records the new fingerprint, so asking again without a
    /// new change returns `false`. A missing canonical file is not an error.
    pub fn has_changed(&mut self) -> bool {
        if self.outside_search && !self.canonical.is_file() {
            self.canonical = self.resolve_canonical();
        }

        let current = match Fingerprint::of(&self.canonical, self.config.fingerprint) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                trace!("No module at {:?}: {}", self.canonical, e);
                return false;
            }
        };

        if self.last_seen.as_ref() == Some(&current) {
            return false;
        }

        debug!("Module changed: {:?}", self.canonical);
        self.last_seen = Some(current);
        true
    }

    /// Copy the canonical file over the staging path.
    ///
    /// The copy goes to a temporary file in the staging directory and is renamed
    /// into place, so a reader never sees a half-written staged file. On failure
    /// the recorded fingerprint is dropped so the next check retries.
    pub fn stage_copy(&mut self) -> Result<PathBuf, LocatorError> {
        if self.outside_search && !self.canonical.is_file() {
            self.canonical = self.resolve_canonical();
        }

        if !self.canonical.is_file() {
            self.last_seen = None;
            return Err(LocatorError::MissingModuleFile {
                path: self.canonical.clone(),
            });
        }

        let target = self.next_staging_path();
        match self.copy_atomically(&target) {
            Ok(fingerprint) => {
                info!("Staged {:?} -> {:?}", self.canonical, target);
                self.last_seen = Some(fingerprint);
                if self.config.versioned_staging {
                    self.generation += 1;
                    self.prune_staged(&target);
                }
                self.staging = target.clone();
                Ok(target)
            }
            Err(source) => {
                self.last_seen = None;
                Err(LocatorError::StageCopyFailed {
                    from: self.canonical.clone(),
                    to: target,
                    source,
                })
            }
        }
    }

    fn copy_atomically(&self, target: &Path) -> io::Result<Fingerprint> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        // Fingerprint first: a build landing mid-copy is then seen as a new change.
        let fingerprint = Fingerprint::of(&self.canonical, self.config.fingerprint)?;

        let mut source = File::open(&self.canonical)?;
        let mut staged = NamedTempFile::new_in(dir)?;
        io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(target).map_err(|e| e.error)?;

        Ok(fingerprint)
    }

    fn resolve_canonical(&self) -> PathBuf {
        let default = self.config.root.join(&self.file_name);
        if !self.outside_search || default.is_file() {
            return default;
        }

        self.outside_candidates()
            .into_iter()
            .map(|dir| dir.join(&self.file_name))
            .find(|candidate| candidate.is_file())
            .inspect(|found| debug!("Found module outside root: {:?}", found))
            .unwrap_or(default)
    }

    fn outside_candidates(&self) -> Vec<PathBuf> {
        if !self.config.outside_dirs.is_empty() {
            return self.config.outside_dirs.clone();
        }

        let mut dirs = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(exe_dir);
        }
        dirs
    }

    fn versioned_name(&self, generation: u64) -> String {
        let path = Path::new(&self.file_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name);
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{generation}.{ext}"),
            None => format!("{stem}.{generation}"),
        }
    }

    fn next_staging_path(&self) -> PathBuf {
        let dir = self.config.staging_dir();
        if self.config.versioned_staging {
            dir.join(self.versioned_name(self.generation + 1))
        } else {
            dir.join(&self.file_name)
        }
    }

    fn is_staged_generation(&self, name: &str) -> bool {
        let path = Path::new(&self.file_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name);
        let suffix = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        name.strip_prefix(stem)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            .is_some_and(|generation| {
                !generation.is_empty() && generation.bytes().all(|b| b.is_ascii_digit())
            })
    }

    fn prune_staged(&self, keep: &Path) {
        let Ok(entries) = std::fs::read_dir(self.config.staging_dir()) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path == keep {
                continue;
            }
            let is_old = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| self.is_staged_generation(name));
            if is_old {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Failed to remove stale staged module {:?}: {}", path, e);
                }
            }
        }
    }
}
