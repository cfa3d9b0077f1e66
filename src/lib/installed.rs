//! Discovery of installed methods on the local machine.
//!
//! Installed methods live under two roots: a per-user global directory
//! (`~/.mthds/methods`) and a per-project one (`./.mthds/methods`). Every
//! immediate subdirectory holding a `METHODS.toml` is an installed method,
//! indexed by name and by exported pipe code.

use directories::BaseDirs;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use package::bundle::collect_bundle_files;
use package::manifest::Manifest;
use package::MANIFEST_FILENAME;
use util::errors::*;

/// An installed method discovered from the filesystem.
#[derive(Clone, Debug)]
pub struct InstalledMethod {
    /// The method name: the last segment of the manifest's address.
    pub name: String,
    pub path: PathBuf,
    pub manifest: Manifest,
    pub bundle_files: Vec<PathBuf>,
}

/// The default global methods directory: `~/.mthds/methods`.
pub fn default_global_root() -> PathBuf {
    BaseDirs::new().unwrap().home_dir().join(".mthds").join("methods")
}

/// The default project-local methods directory: `./.mthds/methods`.
pub fn default_project_root() -> PathBuf {
    PathBuf::from(".mthds").join("methods")
}

/// Scans the given roots for installed methods. Roots that do not exist are
/// skipped; subdirectories without a manifest are skipped; a manifest that
/// fails to parse is an error.
pub fn discover_in(roots: &[PathBuf]) -> Res<Vec<InstalledMethod>> {
    let mut methods = Vec::new();

    for root in roots {
        if !root.is_dir() {
            continue;
        }
        for subdir in sorted_subdirs(root)? {
            let manifest_path = subdir.join(MANIFEST_FILENAME);
            if !manifest_path.is_file() {
                continue;
            }

            let manifest = Manifest::from_file(&manifest_path)?;
            let name = manifest.address.name().to_string();
            let bundle_files = collect_bundle_files(&subdir)?;

            methods.push(InstalledMethod {
                name,
                path: subdir,
                manifest,
                bundle_files,
            });
        }
    }

    Ok(methods)
}

/// Discovers methods in the default global and project roots.
pub fn discover() -> Res<Vec<InstalledMethod>> {
    discover_in(&[default_project_root(), default_global_root()])
}

fn sorted_subdirs(root: &Path) -> Res<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| {
        format_err!("could not read methods directory {}: {}", root.display(), e)
    })?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| format_err!("could not read directory entry: {}", e))?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.sort();
    Ok(subdirs)
}

/// Finds the unique installed method with the given name.
pub fn find_method_by_name<'a>(
    method_name: &str,
    methods: &'a [InstalledMethod],
) -> Res<&'a InstalledMethod> {
    let matches: Vec<&InstalledMethod> = methods
        .iter()
        .filter(|method| method.name == method_name)
        .collect();

    match matches.len() {
        0 => Err(ErrorKind::MethodNotFound(method_name.to_string()))?,
        1 => Ok(matches[0]),
        _ => {
            let locations = matches
                .iter()
                .map(|method| method.path.display().to_string())
                .join(", ");
            Err(ErrorKind::DuplicateMethodName(method_name.to_string(), locations))?
        }
    }
}

/// All pipe codes a method exports, across every domain.
pub fn exported_pipe_codes(method: &InstalledMethod) -> BTreeSet<String> {
    method
        .manifest
        .exports
        .iter()
        .flat_map(|export| export.pipes.iter().cloned())
        .collect()
}

/// Finds the unique installed method exporting the given pipe code.
pub fn find_method_by_exported_pipe<'a>(
    pipe_code: &str,
    methods: &'a [InstalledMethod],
) -> Res<&'a InstalledMethod> {
    let matches: Vec<&InstalledMethod> = methods
        .iter()
        .filter(|method| exported_pipe_codes(method).contains(pipe_code))
        .collect();

    match matches.len() {
        0 => Err(ErrorKind::PipeCodeNotFound(pipe_code.to_string()))?,
        1 => Ok(matches[0]),
        _ => {
            let names = matches.iter().map(|method| method.name.as_str()).join(", ");
            Err(ErrorKind::AmbiguousPipeCode(pipe_code.to_string(), names))?
        }
    }
}
