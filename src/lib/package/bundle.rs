//! Shallow metadata extraction from `.mthds` bundle files.
//!
//! Bundles are TOML documents describing pipelines. The manager only reads a
//! thin slice of them: the declared `domain`, an optional `main_pipe`, the
//! `[pipe.<code>]` section names, and the outbound pipe references inside the
//! known controller fields (`steps`, `branch_pipe_code`, `branches`,
//! `sub_pipes`). Everything else in a bundle is opaque here.

use failure::ResultExt;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{self, Value};
use walkdir::WalkDir;

use package::manifest::DomainExports;
use util::errors::*;

pub const BUNDLE_EXTENSION: &'static str = "mthds";

/// Minimal metadata about one bundle, as needed for visibility checking and
/// export generation.
#[derive(Clone, Debug, PartialEq)]
pub struct BundleMetadata {
    /// The domain path this bundle belongs to (e.g. "legal.contracts").
    pub domain: String,
    /// The main_pipe code if declared (auto-exported), or None.
    pub main_pipe: Option<String>,
    /// The pipe codes declared as `[pipe.<code>]` sections.
    pub pipe_codes: Vec<String>,
    /// All outbound pipe references found in controller fields.
    pub pipe_references: Vec<PipeReference>,
}

/// One outbound pipe reference together with the place it was found,
/// e.g. `pipe.router.branches[2].pipe`.
#[derive(Clone, Debug, PartialEq)]
pub struct PipeReference {
    pub target: String,
    pub context: String,
}

/// Recursively collects all `.mthds` files under a directory, sorted by path.
pub fn collect_bundle_files(directory: &Path) -> Res<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(directory) {
        let entry = entry.context(format_err!(
            "could not scan directory {}",
            directory.display()
        ))?;
        if entry.file_type().is_file()
            && entry.path().extension().map_or(false, |ext| ext == BUNDLE_EXTENSION)
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Reads and shallow-parses a single bundle file.
pub fn extract_bundle_metadata(path: &Path) -> Res<BundleMetadata> {
    let contents = fs::read_to_string(path)
        .context(format_err!("could not read bundle file {}", path.display()))?;
    extract_bundle_metadata_from_str(&contents)
        .map_err(|e| e.context(format!("in bundle file {}", path.display())).into())
}

/// Shallow-parses bundle contents already in memory.
pub fn extract_bundle_metadata_from_str(contents: &str) -> Res<BundleMetadata> {
    let doc: Value = toml::from_str(contents)
        .map_err(|e| ErrorKind::ManifestParse(format!("invalid TOML in bundle: {}", e)))?;

    let table = doc
        .as_table()
        .ok_or_else(|| ErrorKind::ManifestValidation("bundle is not a TOML table".to_string()))?;

    let header = table.get("header").and_then(Value::as_table);

    // `domain` may live at the top level or under [header], whichever has it.
    let domain = lookup_str(table, header, "domain")
        .ok_or_else(|| {
            ErrorKind::ManifestValidation("missing or invalid 'domain' field".to_string())
        })?
        .to_string();

    let main_pipe = lookup_str(table, header, "main_pipe").map(|s| s.to_string());

    let mut pipe_codes = Vec::new();
    let mut pipe_references = Vec::new();
    if let Some(pipes) = table.get("pipe").and_then(Value::as_table) {
        for (code, pipe) in pipes {
            pipe_codes.push(code.clone());
            if let Some(pipe) = pipe.as_table() {
                collect_controller_refs(code, pipe, &mut pipe_references);
            }
        }
    }

    Ok(BundleMetadata {
        domain,
        main_pipe,
        pipe_codes,
        pipe_references,
    })
}

fn lookup_str<'a>(
    table: &'a toml::value::Table,
    header: Option<&'a toml::value::Table>,
    key: &str,
) -> Option<&'a str> {
    table
        .get(key)
        .and_then(Value::as_str)
        .or_else(|| header.and_then(|h| h.get(key).and_then(Value::as_str)))
        .filter(|s| !s.is_empty())
}

fn table_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.as_table().and_then(|t| t.get(key)).and_then(Value::as_str)
}

/// Pulls outbound pipe references out of the four known controller shapes.
fn collect_controller_refs(
    code: &str,
    pipe: &toml::value::Table,
    refs: &mut Vec<PipeReference>,
) {
    if let Some(steps) = pipe.get("steps").and_then(Value::as_array) {
        for (i, step) in steps.iter().enumerate() {
            if let Some(target) = table_str(step, "pipe") {
                refs.push(PipeReference {
                    target: target.to_string(),
                    context: format!("pipe.{}.steps[{}].pipe", code, i),
                });
            }
        }
    }

    if let Some(target) = pipe.get("branch_pipe_code").and_then(Value::as_str) {
        refs.push(PipeReference {
            target: target.to_string(),
            context: format!("pipe.{}.branch_pipe_code", code),
        });
    }

    if let Some(branches) = pipe.get("branches").and_then(Value::as_array) {
        for (i, branch) in branches.iter().enumerate() {
            if let Some(target) = table_str(branch, "pipe") {
                refs.push(PipeReference {
                    target: target.to_string(),
                    context: format!("pipe.{}.branches[{}].pipe", code, i),
                });
            }
        }
    }

    if let Some(sub_pipes) = pipe.get("sub_pipes").and_then(Value::as_array) {
        for (i, sub) in sub_pipes.iter().enumerate() {
            if let Some(target) = table_str(sub, "pipe") {
                refs.push(PipeReference {
                    target: target.to_string(),
                    context: format!("pipe.{}.sub_pipes[{}].pipe", code, i),
                });
            }
        }
    }
}

/// Aggregated results of scanning many bundles.
#[derive(Clone, Debug, Default)]
pub struct BundleScan {
    /// Domain -> pipe codes declared by bundles of that domain.
    pub domain_pipes: BTreeMap<String, Vec<String>>,
    /// Domain -> declared main_pipe (first declaration wins).
    pub domain_main_pipes: BTreeMap<String, String>,
    /// Human-readable errors for files that could not be parsed.
    pub errors: Vec<String>,
}

/// Scans bundle files and aggregates per-domain pipe information. Files that
/// fail to parse are reported in `errors` rather than aborting the scan;
/// conflicting `main_pipe` declarations for one domain are reported too and
/// the first declaration kept.
pub fn scan_bundles(bundle_files: &[PathBuf]) -> BundleScan {
    let mut scan = BundleScan::default();

    for file in bundle_files {
        let metadata = match extract_bundle_metadata(file) {
            Ok(metadata) => metadata,
            Err(err) => {
                scan.errors.push(format!("{}: {}", file.display(), err));
                continue;
            }
        };

        let pipes = scan
            .domain_pipes
            .entry(metadata.domain.clone())
            .or_insert_with(Vec::new);
        pipes.extend(metadata.pipe_codes);

        if let Some(main_pipe) = metadata.main_pipe {
            let existing = scan.domain_main_pipes.get(&metadata.domain).cloned();
            match existing {
                Some(ref existing) if *existing != main_pipe => {
                    scan.errors.push(format!(
                        "conflicting main_pipe for domain '{}': '{}' vs '{}' (from {})",
                        metadata.domain,
                        existing,
                        main_pipe,
                        file.display()
                    ));
                }
                Some(_) => {}
                None => {
                    scan.domain_main_pipes.insert(metadata.domain, main_pipe);
                }
            }
        }
    }

    scan
}

/// Builds deterministic `DomainExports` entries from a scan: one entry per
/// domain (sorted), main_pipe listed first, remaining pipes sorted, domains
/// with no pipes skipped.
pub fn exports_from_scan(scan: &BundleScan) -> Vec<DomainExports> {
    let mut exports = Vec::new();
    for (domain, pipe_codes) in &scan.domain_pipes {
        let mut exported: Vec<String> = Vec::new();
        if let Some(main_pipe) = scan.domain_main_pipes.get(domain) {
            exported.push(main_pipe.clone());
        }
        let mut sorted = pipe_codes.clone();
        sorted.sort();
        for code in sorted {
            if !exported.contains(&code) {
                exported.push(code);
            }
        }
        if !exported.is_empty() {
            exports.push(DomainExports {
                domain_path: domain.clone(),
                pipes: exported,
            });
        }
    }
    exports
}
