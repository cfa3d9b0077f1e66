//! Caching packages which have been fetched before.
//!
//! The cache is a plain directory tree keyed by package identity:
//! `{cache_root}/{address}/{version}/` holds the package's source exactly as
//! fetched, minus its `.git` history. Because the layout embeds untrusted
//! strings in paths, construction rejects any `..` segment outright.
//!
//! Writes are two-phase: the source is first copied to a `.staging` sibling
//! of the final directory, then renamed over it. The rename is the commit
//! point; a crashed or cancelled store leaves only a staging directory that
//! the next store of the same package sweeps away, and `is_cached` never
//! reports a staging directory as present.

use copy_dir::copy_dir;
use directories::BaseDirs;
use semver::Version;
use slog::Logger;
use std::path::{Path, PathBuf};
use std::fs;
use walkdir::WalkDir;

use package::PackageAddress;
use util::errors::*;

/// A cache of fetched packages, shared by every resolver in the process.
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
    pub logger: Logger,
}

impl Cache {
    /// The default per-user cache root: `~/.mthds/packages`.
    pub fn default_root() -> PathBuf {
        BaseDirs::new().unwrap().home_dir().join(".mthds").join("packages")
    }

    pub fn from_disk(plog: &Logger, root: PathBuf) -> Cache {
        let _ = fs::create_dir_all(&root);
        let logger = plog.new(o!("root" => root.to_string_lossy().into_owned()));
        Cache { root, logger }
    }

    /// Computes the directory a package version lives at, rejecting path
    /// traversal attempts in the address or version.
    pub fn path_for(&self, address: &PackageAddress, version: &Version) -> Res<PathBuf> {
        let version = version.to_string();
        let traversal = address.as_str().split('/').any(|seg| seg == "..")
            || version == ".."
            || version.contains('/');
        if traversal {
            return Err(ErrorKind::PackageCache(format!(
                "refusing path traversal in cache path for '{}@{}'",
                address, version
            )))?;
        }

        let mut path = self.root.clone();
        for segment in address.as_str().split('/') {
            path.push(segment);
        }
        path.push(version);
        Ok(path)
    }

    /// A package version counts as cached when its directory exists and is
    /// non-empty.
    pub fn is_cached(&self, address: &PackageAddress, version: &Version) -> bool {
        let path = match self.path_for(address, version) {
            Ok(path) => path,
            Err(_) => return false,
        };
        match fs::read_dir(&path) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    /// Copies `source_dir` into the cache under `(address, version)`, going
    /// through the staging directory. Returns the final cache path.
    pub fn store(
        &self,
        source_dir: &Path,
        address: &PackageAddress,
        version: &Version,
    ) -> Res<PathBuf> {
        let final_path = self.path_for(address, version)?;
        let staging_path = staging_sibling(&final_path);

        match store_staged(source_dir, &staging_path, &final_path) {
            Ok(()) => {
                debug!(
                    self.logger,
                    "stored package in cache";
                    "address" => address.as_str(),
                    "version" => version.to_string()
                );
                Ok(final_path)
            }
            Err(err) => {
                if staging_path.exists() {
                    let _ = fs::remove_dir_all(&staging_path);
                }
                Err(err
                    .context(ErrorKind::PackageCache(format!(
                        "failed to store package '{}@{}' in cache",
                        address, version
                    )))
                    .into())
            }
        }
    }

    /// Removes a cached package version. Returns whether anything was there.
    pub fn remove(&self, address: &PackageAddress, version: &Version) -> Res<bool> {
        let path = self.path_for(address, version)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&path).map_err(|e| {
            ErrorKind::PackageCache(format!(
                "failed to remove cached package '{}@{}': {}",
                address, version, e
            ))
        })?;
        Ok(true)
    }
}

/// The staging directory for a final path: a `<name>.staging` sibling. The
/// distinct name keeps half-written stores invisible to `is_cached`.
fn staging_sibling(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pkg".to_string());
    final_path.with_file_name(format!("{}.staging", name))
}

fn store_staged(source_dir: &Path, staging_path: &Path, final_path: &Path) -> Res<()> {
    if staging_path.exists() {
        fs::remove_dir_all(staging_path)?;
    }
    if let Some(parent) = staging_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let copy_errors = copy_dir(source_dir, staging_path)?;
    if !copy_errors.is_empty() {
        bail!(
            "{} file(s) could not be copied into staging: {}",
            copy_errors.len(),
            copy_errors[0]
        );
    }

    strip_git(staging_path)?;

    if final_path.exists() {
        fs::remove_dir_all(final_path)?;
    }
    fs::rename(staging_path, final_path)?;
    Ok(())
}

/// Deletes every `.git` entry (directory or gitlink file) under `dir`.
fn strip_git(dir: &Path) -> Res<()> {
    let mut git_paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_name() == ".git" {
            git_paths.push((entry.path().to_path_buf(), entry.file_type().is_dir()));
        }
    }
    // Deepest first, so nested entries go before their parents.
    git_paths.sort_by(|a, b| b.0.cmp(&a.0));
    for (path, is_dir) in git_paths {
        if path.exists() {
            if is_dir {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}
