//! Package manifest files (`METHODS.toml`).
//!
//! A manifest has three sections: a `[package]` header, a `[dependencies]`
//! table keyed by snake_case alias, and a nested `[exports]` tree mapping
//! dotted domain paths to exported pipe codes. Parsing goes through a single
//! `from_document` constructor over the raw TOML value, so both file input
//! and programmatic construction flow through the same validation.

use failure::Error;
use indexmap::IndexMap;
use itertools::Itertools;
use semver::Version;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{fmt, fs};
use toml::{self, Value};

use package::version::Constraint;
use package::{is_reserved_domain_path, PackageAddress, MANIFEST_FILENAME, RESERVED_DOMAINS};
use util::errors::*;
use util::{is_snake_case, toml_string};

#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    pub address: PackageAddress,
    pub version: Version,
    pub description: String,
    pub display_name: Option<String>,
    pub authors: Vec<String>,
    pub license: Option<String>,
    /// Minimum compatible manager version.
    pub mthds_version: Option<Constraint>,
    /// Keyed by alias; the map enforces alias uniqueness.
    pub dependencies: IndexMap<String, Dependency>,
    pub exports: Vec<DomainExports>,
}

/// A dependency on another package, as one entry of `[dependencies]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Dependency {
    pub address: PackageAddress,
    pub version: Constraint,
    /// Local directory override; when set, the resolver never touches VCS.
    pub path: Option<PathBuf>,
}

/// Exports for a single domain within a package.
#[derive(Clone, Debug, PartialEq)]
pub struct DomainExports {
    pub domain_path: String,
    pub pipes: Vec<String>,
}

fn invalid(msg: String) -> Error {
    ErrorKind::ManifestValidation(msg).into()
}

const KNOWN_TOP_LEVEL_KEYS: &'static [&'static str] = &["package", "dependencies", "exports"];
const KNOWN_PACKAGE_KEYS: &'static [&'static str] = &[
    "address",
    "display_name",
    "version",
    "description",
    "authors",
    "license",
    "mthds_version",
];

impl Manifest {
    /// Builds a manifest from a parsed TOML document, applying every schema
    /// rule along the way.
    pub fn from_document(doc: &Value) -> Res<Manifest> {
        let root = doc
            .as_table()
            .ok_or_else(|| invalid("manifest is not a TOML table".to_string()))?;

        let unknown: Vec<&str> = root
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !KNOWN_TOP_LEVEL_KEYS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(invalid(format!(
                "unknown sections in METHODS.toml: {}",
                unknown.iter().join(", ")
            )));
        }

        let package = root
            .get("package")
            .and_then(Value::as_table)
            .ok_or_else(|| invalid("METHODS.toml must contain a [package] section".to_string()))?;

        let unknown: Vec<&str> = package
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !KNOWN_PACKAGE_KEYS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(invalid(format!(
                "unknown keys in [package] section: {}",
                unknown.iter().join(", ")
            )));
        }

        let address = required_str(package, "address")?;
        let address = PackageAddress::from_str(address)
            .map_err(|_| invalid(format!("invalid package address '{}'", address)))?;

        let version = required_str(package, "version")?;
        let version = Version::parse(version)
            .map_err(|_| invalid(format!("invalid package version '{}'", version)))?;

        let description = required_str(package, "description")?.trim().to_string();
        if description.is_empty() {
            return Err(invalid("package description must not be empty".to_string()));
        }

        let display_name = match optional_str(package, "display_name")? {
            Some(raw) => Some(validate_display_name(raw)?),
            None => None,
        };

        let authors = match package.get("authors") {
            None => Vec::new(),
            Some(value) => {
                let list = value
                    .as_array()
                    .ok_or_else(|| invalid("'authors' must be an array of strings".to_string()))?;
                let mut authors = Vec::with_capacity(list.len());
                for (i, author) in list.iter().enumerate() {
                    let author = author.as_str().ok_or_else(|| {
                        invalid(format!("author at index {} must be a string", i))
                    })?;
                    if author.trim().is_empty() {
                        return Err(invalid(format!("author at index {} must not be empty", i)));
                    }
                    authors.push(author.to_string());
                }
                authors
            }
        };

        let license = match optional_str(package, "license")? {
            Some(license) if license.trim().is_empty() => {
                return Err(invalid("license must not be empty when provided".to_string()));
            }
            Some(license) => Some(license.to_string()),
            None => None,
        };

        let mthds_version = match optional_str(package, "mthds_version")? {
            Some(raw) => Some(Constraint::from_str(raw).map_err(|_| {
                invalid(format!("invalid mthds_version constraint '{}'", raw))
            })?),
            None => None,
        };

        let dependencies = match root.get("dependencies") {
            None => IndexMap::new(),
            Some(deps) => parse_dependencies(deps)?,
        };

        let exports = match root.get("exports") {
            None => Vec::new(),
            Some(exports) => {
                let table = exports
                    .as_table()
                    .ok_or_else(|| invalid("[exports] must be a table".to_string()))?;
                let mut out = Vec::new();
                walk_exports(table, "", &mut out)?;
                out
            }
        };

        Ok(Manifest {
            address,
            version,
            description,
            display_name,
            authors,
            license,
            mthds_version,
            dependencies,
            exports,
        })
    }

    /// Reads and parses the manifest at `path`.
    pub fn from_file(path: &Path) -> Res<Manifest> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ErrorKind::ManifestParse(format!("could not read {}: {}", path.display(), e))
        })?;
        Manifest::from_str(&contents)
    }

    /// The union of all explicitly exported pipe codes, across domains.
    pub fn exported_pipe_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .exports
            .iter()
            .flat_map(|e| e.pipes.iter().cloned())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    /// Serializes back to TOML: `[package]` first, then `[dependencies]` as
    /// inline tables keyed by alias, then the `[exports]` tree.
    pub fn to_toml_string(&self) -> String {
        let mut out = String::new();

        out.push_str("[package]\n");
        out.push_str(&format!("address = {}\n", toml_string(self.address.as_str())));
        if let Some(ref display_name) = self.display_name {
            out.push_str(&format!("display_name = {}\n", toml_string(display_name)));
        }
        out.push_str(&format!("version = {}\n", toml_string(&self.version.to_string())));
        out.push_str(&format!("description = {}\n", toml_string(&self.description)));
        if !self.authors.is_empty() {
            let authors = self.authors.iter().map(|a| toml_string(a)).join(", ");
            out.push_str(&format!("authors = [{}]\n", authors));
        }
        if let Some(ref license) = self.license {
            out.push_str(&format!("license = {}\n", toml_string(license)));
        }
        if let Some(ref mthds_version) = self.mthds_version {
            out.push_str(&format!(
                "mthds_version = {}\n",
                toml_string(&mthds_version.to_string())
            ));
        }

        if !self.dependencies.is_empty() {
            out.push_str("\n[dependencies]\n");
            for (alias, dep) in &self.dependencies {
                let mut fields = format!(
                    "address = {}, version = {}",
                    toml_string(dep.address.as_str()),
                    toml_string(&dep.version.to_string())
                );
                if let Some(ref path) = dep.path {
                    fields.push_str(&format!(
                        ", path = {}",
                        toml_string(&path.to_string_lossy())
                    ));
                }
                out.push_str(&format!("{} = {{ {} }}\n", alias, fields));
            }
        }

        for export in &self.exports {
            out.push_str(&format!("\n[exports.{}]\n", export.domain_path));
            let pipes = export.pipes.iter().map(|p| toml_string(p)).join(", ");
            out.push_str(&format!("pipes = [{}]\n", pipes));
        }

        out
    }
}

impl FromStr for Manifest {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let doc: Value = toml::from_str(raw).map_err(|e| {
            ErrorKind::ManifestParse(format!("invalid TOML in METHODS.toml: {}", e))
        })?;
        Manifest::from_document(&doc)
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_toml_string())
    }
}

fn required_str<'a>(table: &'a toml::value::Table, key: &str) -> Res<&'a str> {
    match table.get(key) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| invalid(format!("'{}' in [package] must be a string", key))),
        None => Err(invalid(format!("missing required [package] key '{}'", key))),
    }
}

fn optional_str<'a>(table: &'a toml::value::Table, key: &str) -> Res<Option<&'a str>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| invalid(format!("'{}' in [package] must be a string", key))),
    }
}

fn validate_display_name(raw: &str) -> Res<String> {
    let stripped = raw.trim();
    if stripped.is_empty() {
        return Err(invalid(
            "display name must not be empty when provided".to_string(),
        ));
    }
    if stripped.chars().count() > 128 {
        return Err(invalid(format!(
            "display name must not exceed 128 characters (got {})",
            stripped.chars().count()
        )));
    }
    if stripped.chars().any(|c| c.is_control()) {
        return Err(invalid(
            "display name must not contain control characters".to_string(),
        ));
    }
    Ok(stripped.to_string())
}

fn parse_dependencies(deps: &Value) -> Res<IndexMap<String, Dependency>> {
    let table = deps
        .as_table()
        .ok_or_else(|| invalid("[dependencies] must be a table".to_string()))?;

    let mut out = IndexMap::with_capacity(table.len());
    for (alias, entry) in table {
        let entry = entry.as_table().ok_or_else(|| {
            invalid(format!(
                "invalid dependency '{}': expected a table with 'address' and 'version' keys",
                alias
            ))
        })?;

        if !is_snake_case(alias) {
            return Err(invalid(format!(
                "invalid dependency alias '{}': must be snake_case",
                alias
            )));
        }

        for key in entry.keys() {
            if key != "address" && key != "version" && key != "path" {
                return Err(invalid(format!(
                    "unknown key '{}' in dependency '{}'",
                    key, alias
                )));
            }
        }

        let address = entry
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("dependency '{}' is missing 'address'", alias)))?;
        let address = PackageAddress::from_str(address).map_err(|_| {
            invalid(format!(
                "invalid address '{}' for dependency '{}'",
                address, alias
            ))
        })?;

        let version = entry
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("dependency '{}' is missing 'version'", alias)))?;
        let version = Constraint::from_str(version).map_err(|_| {
            invalid(format!(
                "invalid version constraint '{}' for dependency '{}'",
                version, alias
            ))
        })?;

        let path = match entry.get("path") {
            None => None,
            Some(path) => Some(PathBuf::from(path.as_str().ok_or_else(|| {
                invalid(format!("'path' of dependency '{}' must be a string", alias))
            })?)),
        };

        let duplicate = out
            .insert(
                alias.clone(),
                Dependency {
                    address,
                    version,
                    path,
                },
            )
            .is_some();
        if duplicate {
            return Err(invalid(format!(
                "duplicate dependency alias '{}': each dependency must have a unique alias",
                alias
            )));
        }
    }
    Ok(out)
}

/// Walks nested `[exports]` sub-tables, reconstructing dotted domain paths.
/// A sub-table containing a `pipes` array is a domain; it may additionally
/// hold sub-domains of its own, so siblings of `pipes` are walked too.
fn walk_exports(
    table: &toml::value::Table,
    prefix: &str,
    out: &mut Vec<DomainExports>,
) -> Res<()> {
    for (key, value) in table {
        let current_path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        let sub = match value.as_table() {
            Some(sub) => sub,
            None => continue,
        };

        if let Some(pipes) = sub.get("pipes") {
            let pipes = pipes.as_array().ok_or_else(|| {
                invalid(format!("'pipes' in domain '{}' must be a list", current_path))
            })?;
            let mut codes = Vec::with_capacity(pipes.len());
            for pipe in pipes {
                let code = pipe.as_str().ok_or_else(|| {
                    invalid(format!(
                        "'pipes' in domain '{}' must contain only strings",
                        current_path
                    ))
                })?;
                if !is_snake_case(code) {
                    return Err(invalid(format!(
                        "invalid pipe name '{}' in [exports]: pipe names must be snake_case",
                        code
                    )));
                }
                codes.push(code.to_string());
            }

            validate_domain_path(&current_path)?;
            out.push(DomainExports {
                domain_path: current_path.clone(),
                pipes: codes,
            });

            for (sub_key, sub_value) in sub {
                if sub_key != "pipes" && sub_value.as_table().is_some() {
                    let mut nested = toml::value::Table::new();
                    nested.insert(sub_key.clone(), sub_value.clone());
                    walk_exports(&nested, &current_path, out)?;
                }
            }
        } else {
            walk_exports(sub, &current_path, out)?;
        }
    }
    Ok(())
}

fn validate_domain_path(domain_path: &str) -> Res<()> {
    for segment in domain_path.split('.') {
        if !is_snake_case(segment) {
            return Err(invalid(format!(
                "invalid domain path '{}' in [exports]: segments must be snake_case",
                domain_path
            )));
        }
    }
    if is_reserved_domain_path(domain_path) {
        let first = domain_path.split('.').next().unwrap_or("");
        return Err(invalid(format!(
            "domain path '{}' uses reserved domain '{}'; reserved domains ({}) cannot be used in package exports",
            domain_path,
            first,
            RESERVED_DOMAINS.iter().join(", ")
        )));
    }
    Ok(())
}

/// Walks up from `start_dir` looking for the nearest `METHODS.toml`, stopping
/// at a `.git` boundary or the filesystem root.
pub fn find_package_manifest(start_dir: &Path) -> Res<Option<Manifest>> {
    let mut current = start_dir.to_path_buf();
    loop {
        let manifest_path = current.join(MANIFEST_FILENAME);
        if manifest_path.is_file() {
            return Manifest::from_file(&manifest_path).map(Some);
        }
        if current.join(".git").exists() {
            return Ok(None);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &'static str = r#"
[package]
address = "github.com/acme/scoring_methods"
display_name = "Acme Scoring"
version = "1.2.0"
description = "Scoring pipelines for Acme"
authors = ["Acme Data Team <data@acme.io>"]
license = "MIT"
mthds_version = "^1.0.0"

[dependencies]
legal_pack = { address = "github.com/acme/legal-pack", version = "^2.0.0" }
local_tools = { address = "example.com/acme/tools", version = "*", path = "../tools" }

[exports.scoring]
pipes = ["compute_score", "run_scoring"]

[exports.legal.contracts]
pipes = ["extract_clause"]
"#;

    #[test]
    fn parses_full_manifest() {
        let manifest = Manifest::from_str(FULL).unwrap();
        assert_eq!(manifest.address.as_str(), "github.com/acme/scoring_methods");
        assert_eq!(manifest.version, Version::parse("1.2.0").unwrap());
        assert_eq!(manifest.display_name.as_ref().unwrap(), "Acme Scoring");
        assert_eq!(manifest.dependencies.len(), 2);

        let legal = &manifest.dependencies["legal_pack"];
        assert_eq!(legal.address.as_str(), "github.com/acme/legal-pack");
        assert!(legal.path.is_none());

        let local = &manifest.dependencies["local_tools"];
        assert_eq!(local.path.as_ref().unwrap(), &PathBuf::from("../tools"));

        assert_eq!(manifest.exports.len(), 2);
        assert_eq!(manifest.exports[0].domain_path, "legal.contracts");
        assert_eq!(manifest.exports[1].domain_path, "scoring");
    }

    #[test]
    fn round_trip() {
        let manifest = Manifest::from_str(FULL).unwrap();
        let reparsed = Manifest::from_str(&manifest.to_toml_string()).unwrap();
        assert_eq!(manifest, reparsed);
    }

    #[test]
    fn minimal_manifest() {
        let manifest = Manifest::from_str(
            r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "bare minimum"
"#,
        )
        .unwrap();
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.exports.is_empty());
        assert!(manifest.display_name.is_none());

        let reparsed = Manifest::from_str(&manifest.to_toml_string()).unwrap();
        assert_eq!(manifest, reparsed);
    }

    #[test]
    fn rejects_bad_toml_as_parse_error() {
        let err = Manifest::from_str("not toml =").unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::ManifestParse(_)) => {}
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_package_section() {
        let err = Manifest::from_str("[dependencies]\n").unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::ManifestValidation(_)) => {}
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_sections_and_keys() {
        let unknown_section = r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "d"

[mystery]
x = 1
"#;
        assert!(Manifest::from_str(unknown_section).is_err());

        let unknown_key = r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "d"
name = "nope"
"#;
        assert!(Manifest::from_str(unknown_key).is_err());
    }

    #[test]
    fn rejects_invalid_fields() {
        let bad_address = r#"
[package]
address = "no-dots/pkg"
version = "0.1.0"
description = "d"
"#;
        assert!(Manifest::from_str(bad_address).is_err());

        let bad_version = r#"
[package]
address = "example.com/org/pkg"
version = "1.0"
description = "d"
"#;
        assert!(Manifest::from_str(bad_version).is_err());

        let empty_description = r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "   "
"#;
        assert!(Manifest::from_str(empty_description).is_err());
    }

    #[test]
    fn rejects_bad_aliases() {
        let bad_alias = r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "d"

[dependencies]
BadAlias = { address = "github.com/org/dep", version = "^1.0.0" }
"#;
        assert!(Manifest::from_str(bad_alias).is_err());
    }

    #[test]
    fn rejects_reserved_export_domains() {
        let reserved = r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "d"

[exports.native.tools]
pipes = ["hack"]
"#;
        assert!(Manifest::from_str(reserved).is_err());
    }

    #[test]
    fn exports_domain_with_pipes_and_subdomains() {
        let nested = r#"
[package]
address = "example.com/org/pkg"
version = "0.1.0"
description = "d"

[exports.legal]
pipes = ["review"]

[exports.legal.contracts]
pipes = ["extract_clause"]
"#;
        let manifest = Manifest::from_str(nested).unwrap();
        let paths: Vec<&str> = manifest
            .exports
            .iter()
            .map(|e| e.domain_path.as_str())
            .collect();
        assert_eq!(paths, vec!["legal", "legal.contracts"]);
    }

    #[test]
    fn exported_pipe_codes_union() {
        let manifest = Manifest::from_str(FULL).unwrap();
        assert_eq!(
            manifest.exported_pipe_codes(),
            vec!["compute_score", "extract_clause", "run_scoring"]
        );
    }

    #[test]
    fn finds_manifest_walking_up() {
        use std::fs;
        let dir = ::tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILENAME),
            "[package]\naddress = \"example.com/org/pkg\"\nversion = \"0.1.0\"\ndescription = \"d\"\n",
        )
        .unwrap();

        let found = find_package_manifest(&nested).unwrap().unwrap();
        assert_eq!(found.address.as_str(), "example.com/org/pkg");
    }

    #[test]
    fn manifest_search_stops_at_git_boundary() {
        use std::fs;
        let dir = ::tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let nested = repo.join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILENAME),
            "[package]\naddress = \"example.com/org/pkg\"\nversion = \"0.1.0\"\ndescription = \"d\"\n",
        )
        .unwrap();

        assert!(find_package_manifest(&nested).unwrap().is_none());
    }
}
