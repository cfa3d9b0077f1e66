use inflector::Inflector;
use std::path::PathBuf;
use std::str::FromStr;

use package::manifest::{Dependency, Manifest};
use package::version::Constraint;
use package::{PackageAddress, MANIFEST_FILENAME};
use util::errors::*;
use util::{is_snake_case, write};

pub struct AddCtx {
    pub path: PathBuf,
    pub address: String,
    pub alias: Option<String>,
    pub version: String,
    pub dep_path: Option<PathBuf>,
}

/// Derives a snake_case alias from a package address: the last path segment,
/// lowercased, with separators folded to underscores.
pub fn derive_alias_from_address(address: &str) -> String {
    let last_segment = address
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(address);

    let mut alias: String = last_segment
        .replace('-', "_")
        .replace('.', "_")
        .to_snake_case();
    alias.retain(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    let alias = alias.trim_matches('_').to_string();

    if alias.is_empty() {
        "dep".to_string()
    } else {
        alias
    }
}

/// Inserts a dependency into the manifest and rewrites it.
pub fn add(ctx: AddCtx) -> Res<()> {
    let manifest_path = ctx.path.join(MANIFEST_FILENAME);
    if !manifest_path.exists() {
        bail!(
            "{} not found in `{}`\n\n\
             run `mthds init` first to create a manifest",
            MANIFEST_FILENAME,
            ctx.path.display()
        )
    }

    let mut manifest = Manifest::from_file(&manifest_path)?;

    let alias = match ctx.alias {
        Some(alias) => alias,
        None => {
            let derived = derive_alias_from_address(&ctx.address);
            println!("Auto-derived alias: {}", derived);
            derived
        }
    };

    if !is_snake_case(&alias) {
        return Err(ErrorKind::ManifestValidation(format!(
            "invalid dependency alias '{}': must be snake_case",
            alias
        )))?;
    }
    if manifest.dependencies.contains_key(&alias) {
        return Err(ErrorKind::ManifestValidation(format!(
            "dependency alias '{}' already exists in {}",
            alias, MANIFEST_FILENAME
        )))?;
    }

    let address = PackageAddress::from_str(&ctx.address)?;
    let version = Constraint::from_str(&ctx.version)?;

    manifest.dependencies.insert(
        alias.clone(),
        Dependency {
            address: address.clone(),
            version,
            path: ctx.dep_path.clone(),
        },
    );
    write(&manifest_path, manifest.to_toml_string().as_bytes())?;

    let path_info = match ctx.dep_path {
        Some(ref path) => format!(" (path: {})", path.display()),
        None => String::new(),
    };
    println!(
        "Added dependency '{}' -> {} @ {}{}",
        alias, address, ctx.version, path_info
    );
    Ok(())
}
