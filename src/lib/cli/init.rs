use semver::Version;
use std::path::PathBuf;

use indexmap::IndexMap;
use package::bundle::{collect_bundle_files, exports_from_scan, scan_bundles};
use package::manifest::Manifest;
use package::{PackageAddress, MANIFEST_FILENAME};
use std::str::FromStr;
use util::errors::Res;
use util::write;

pub struct InitCtx {
    pub path: PathBuf,
    pub force: bool,
}

/// Writes a fresh `METHODS.toml` skeleton into the target directory. If the
/// directory already holds bundle files, their domains seed the `[exports]`
/// section.
pub fn init(ctx: InitCtx) -> Res<()> {
    let manifest_path = ctx.path.join(MANIFEST_FILENAME);
    if manifest_path.exists() && !ctx.force {
        bail!(
            "{} already exists at `{}`\n\n\
             use --force to overwrite it",
            MANIFEST_FILENAME,
            manifest_path.display()
        )
    }

    let dir_name = ctx
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string())
        .to_lowercase()
        .replace('-', "_")
        .replace(' ', "_");

    let address = PackageAddress::from_str(&format!("example.com/yourorg/{}", dir_name))?;

    // Pre-existing bundles give the skeleton a useful exports section.
    let bundle_files = collect_bundle_files(&ctx.path)?;
    let exports = if bundle_files.is_empty() {
        Vec::new()
    } else {
        exports_from_scan(&scan_bundles(&bundle_files))
    };

    let manifest = Manifest {
        address,
        version: Version::new(0, 1, 0),
        description: format!("MTHDS package for {}", dir_name),
        display_name: None,
        authors: Vec::new(),
        license: None,
        mthds_version: None,
        dependencies: IndexMap::new(),
        exports,
    };

    write(&manifest_path, manifest.to_toml_string().as_bytes())?;

    println!("Created {}", MANIFEST_FILENAME);
    println!(
        "Edit {} to set the correct address, exports, and dependencies.",
        MANIFEST_FILENAME
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::str::FromStr;

    #[test]
    fn writes_a_skeleton_manifest() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("My-Methods");
        fs::create_dir_all(&target).unwrap();

        init(InitCtx {
            path: target.clone(),
            force: false,
        })
        .unwrap();

        let manifest = Manifest::from_file(&target.join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(manifest.address.as_str(), "example.com/yourorg/my_methods");
        assert_eq!(manifest.version, Version::new(0, 1, 0));
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.exports.is_empty());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("pkg");
        fs::create_dir_all(&target).unwrap();

        init(InitCtx {
            path: target.clone(),
            force: false,
        })
        .unwrap();
        assert!(init(InitCtx {
            path: target.clone(),
            force: false,
        })
        .is_err());
        assert!(init(InitCtx {
            path: target,
            force: true,
        })
        .is_ok());
    }

    #[test]
    fn seeds_exports_from_existing_bundles() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("pkg");
        fs::create_dir_all(&target).unwrap();
        fs::write(
            target.join("scoring.mthds"),
            "domain = \"scoring\"\nmain_pipe = \"run\"\n\n[pipe.run]\ntype = \"PipeLLM\"\n\n[pipe.helper]\ntype = \"PipeLLM\"\n",
        )
        .unwrap();

        init(InitCtx {
            path: target.clone(),
            force: false,
        })
        .unwrap();

        let manifest = Manifest::from_file(&target.join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(manifest.exports.len(), 1);
        assert_eq!(manifest.exports[0].domain_path, "scoring");
        assert_eq!(manifest.exports[0].pipes, vec!["run", "helper"]);
    }

    #[test]
    fn skeleton_address_is_valid() {
        assert!(PackageAddress::from_str("example.com/yourorg/pkg").is_ok());
    }
}
