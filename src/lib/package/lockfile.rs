//! Lock files (`methods.lock`): models, directory hashing, generation, and
//! verification.
//!
//! The lock file records the exact resolved version, a content hash, and the
//! source URL of every *remote* dependency in the resolved graph. Entries are
//! written sorted by address so two runs over the same graph produce
//! byte-identical output; the hash is computed over POSIX-normalized relative
//! paths so the same bytes come out on every platform.

use semver::Version;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::fs;
use toml::{self, Value};
use walkdir::WalkDir;

use package::manifest::Manifest;
use package::PackageAddress;
use resolve::ResolvedDependency;
use retrieve::cache::Cache;
use util::errors::*;
use util::{hexify_hash, toml_string};

pub const LOCK_FILENAME: &'static str = "methods.lock";
pub const HASH_PREFIX: &'static str = "sha256:";

/// A single locked dependency entry. Frozen once constructed: the validating
/// constructor is the only way in, and all access goes through getters.
#[derive(Clone, Debug, PartialEq)]
pub struct LockedPackage {
    version: Version,
    hash: String,
    source: String,
}

impl LockedPackage {
    pub fn new(version: Version, hash: String, source: String) -> Res<LockedPackage> {
        if !valid_hash(&hash) {
            return Err(ErrorKind::LockFile(format!(
                "invalid hash '{}': must be '{}' followed by exactly 64 hex characters",
                hash, HASH_PREFIX
            )))?;
        }
        if !source.starts_with("https://") {
            return Err(ErrorKind::LockFile(format!(
                "invalid source '{}': must start with 'https://'",
                source
            )))?;
        }
        Ok(LockedPackage {
            version,
            hash,
            source,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn valid_hash(hash: &str) -> bool {
    hash.starts_with(HASH_PREFIX)
        && hash.len() == HASH_PREFIX.len() + 64
        && hash[HASH_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a' <= c && c <= 'f'))
}

/// The `methods.lock` model: locked packages keyed by address.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LockFile {
    packages: BTreeMap<PackageAddress, LockedPackage>,
}

impl LockFile {
    pub fn new() -> LockFile {
        LockFile::default()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn get(&self, address: &PackageAddress) -> Option<&LockedPackage> {
        self.packages.get(address)
    }

    pub fn insert(&mut self, address: PackageAddress, locked: LockedPackage) {
        self.packages.insert(address, locked);
    }

    /// Entries in address order.
    pub fn packages(&self) -> impl Iterator<Item = (&PackageAddress, &LockedPackage)> {
        self.packages.iter()
    }

    /// Parses lock file contents. Empty content is an empty lock file.
    pub fn parse(content: &str) -> Res<LockFile> {
        if content.trim().is_empty() {
            return Ok(LockFile::new());
        }

        let doc: Value = toml::from_str(content)
            .map_err(|e| ErrorKind::LockFile(format!("invalid TOML in lock file: {}", e)))?;
        let root = doc
            .as_table()
            .ok_or_else(|| ErrorKind::LockFile("lock file is not a TOML table".to_string()))?;

        let mut lock = LockFile::new();
        for (address, entry) in root {
            let entry = entry.as_table().ok_or_else(|| {
                ErrorKind::LockFile(format!("lock file entry for '{}' must be a table", address))
            })?;

            let address = PackageAddress::from_str(address).map_err(|_| {
                ErrorKind::LockFile(format!("invalid address '{}' in lock file", address))
            })?;

            let version = entry_str(entry, "version", &address)?;
            let version = Version::parse(version).map_err(|_| {
                ErrorKind::LockFile(format!(
                    "invalid version '{}' for '{}' in lock file",
                    version, address
                ))
            })?;
            let hash = entry_str(entry, "hash", &address)?.to_string();
            let source = entry_str(entry, "source", &address)?.to_string();

            let locked = LockedPackage::new(version, hash, source)?;
            lock.insert(address, locked);
        }
        Ok(lock)
    }

    /// Serializes to TOML, one table per address, sorted by address.
    pub fn to_toml_string(&self) -> String {
        let mut out = String::new();
        for (address, locked) in &self.packages {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", toml_string(address.as_str())));
            out.push_str(&format!(
                "version = {}\n",
                toml_string(&locked.version.to_string())
            ));
            out.push_str(&format!("hash = {}\n", toml_string(&locked.hash)));
            out.push_str(&format!("source = {}\n", toml_string(&locked.source)));
        }
        out
    }
}

fn entry_str<'a>(
    entry: &'a toml::value::Table,
    key: &str,
    address: &PackageAddress,
) -> Res<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ErrorKind::LockFile(format!(
                "lock file entry for '{}' is missing '{}'",
                address, key
            ))
            .into()
        })
}

/// Computes a deterministic SHA-256 hash of a directory's contents.
///
/// Every regular file is collected (skipping any path with a `.git`
/// component), sorted by POSIX-normalized relative path, and fed into one
/// hasher as the path's UTF-8 bytes followed by the file's raw bytes.
pub fn compute_directory_hash(directory: &Path) -> Res<String> {
    if !directory.is_dir() {
        return Err(ErrorKind::LockFile(format!(
            "directory '{}' does not exist or is not a directory",
            directory.display()
        )))?;
    }

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(directory) {
        let entry = entry.map_err(|e| {
            ErrorKind::LockFile(format!(
                "could not walk directory '{}': {}",
                directory.display(),
                e
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(directory)
            .expect("walkdir yields paths under its root");
        if relative
            .components()
            .any(|c| c == Component::Normal(::std::ffi::OsStr::new(".git")))
        {
            continue;
        }
        files.push((posix_normalize(relative), entry.path().to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::default();
    for (relative, path) in files {
        hasher.input(relative.as_bytes());
        let bytes = fs::read(&path).map_err(|e| {
            ErrorKind::LockFile(format!("could not read '{}': {}", path.display(), e))
        })?;
        hasher.input(&bytes);
    }

    Ok(format!("{}{}", HASH_PREFIX, hexify_hash(hasher.result().as_slice())))
}

fn posix_normalize(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

/// Generates a lock file from a resolved graph: one entry per remote
/// dependency, local path overrides excluded.
pub fn generate_lock_file(manifest: &Manifest, resolved: &[ResolvedDependency]) -> Res<LockFile> {
    let local_addresses: Vec<&PackageAddress> = manifest
        .dependencies
        .values()
        .filter(|dep| dep.path.is_some())
        .map(|dep| &dep.address)
        .collect();

    let mut lock = LockFile::new();
    for dep in resolved {
        if local_addresses.contains(&&dep.address) {
            continue;
        }

        let dep_manifest = dep.manifest.as_ref().ok_or_else(|| {
            ErrorKind::LockFile(format!(
                "remote dependency '{}' ({}) has no manifest; cannot generate lock entry",
                dep.alias, dep.address
            ))
        })?;

        let hash = compute_directory_hash(&dep.package_root)?;
        let source = format!("https://{}", dep.address);
        let locked = LockedPackage::new(dep_manifest.version.clone(), hash, source)?;
        lock.insert(dep.address.clone(), locked);
    }
    Ok(lock)
}

/// Verifies one locked entry against its cached copy.
pub fn verify_locked_package(
    address: &PackageAddress,
    locked: &LockedPackage,
    cache: &Cache,
) -> Res<()> {
    let cached_path = cache.path_for(address, &locked.version)?;
    if !cached_path.is_dir() {
        return Err(ErrorKind::Integrity(format!(
            "cached package '{}@{}' not found at '{}'",
            address,
            locked.version,
            cached_path.display()
        )))?;
    }

    let actual = compute_directory_hash(&cached_path)?;
    if actual != locked.hash {
        return Err(ErrorKind::Integrity(format!(
            "integrity check failed for '{}@{}': expected {}, got {}",
            address, locked.version, locked.hash, actual
        )))?;
    }
    Ok(())
}

/// Verifies every entry of a lock file against the cache.
pub fn verify_lock_file(lock: &LockFile, cache: &Cache) -> Res<()> {
    for (address, locked) in lock.packages() {
        verify_locked_package(address, locked, cache)?;
    }
    Ok(())
}
