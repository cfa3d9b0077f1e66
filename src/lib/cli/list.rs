use itertools::Itertools;
use std::path::PathBuf;

use package::manifest::find_package_manifest;
use package::MANIFEST_FILENAME;
use util::errors::Res;

pub struct ListCtx {
    pub path: PathBuf,
}

/// Prints the nearest manifest's package header, dependencies, and exports.
pub fn list(ctx: ListCtx) -> Res<()> {
    let manifest = match find_package_manifest(&ctx.path)? {
        Some(manifest) => manifest,
        None => bail!(
            "no {} found in `{}` or any parent directory\n\n\
             run `mthds init` to create one",
            MANIFEST_FILENAME,
            ctx.path.display()
        ),
    };

    println!("package:");
    println!("  address       {}", manifest.address);
    if let Some(ref display_name) = manifest.display_name {
        println!("  display name  {}", display_name);
    }
    println!("  version       {}", manifest.version);
    println!("  description   {}", manifest.description);
    if !manifest.authors.is_empty() {
        println!("  authors       {}", manifest.authors.iter().join(", "));
    }
    if let Some(ref license) = manifest.license {
        println!("  license       {}", license);
    }
    if let Some(ref mthds_version) = manifest.mthds_version {
        println!("  mthds version {}", mthds_version);
    }

    if !manifest.dependencies.is_empty() {
        println!("\ndependencies:");
        for (alias, dep) in &manifest.dependencies {
            let path_info = match dep.path {
                Some(ref path) => format!(" (path: {})", path.display()),
                None => String::new(),
            };
            println!("  {:<20} {} @ {}{}", alias, dep.address, dep.version, path_info);
        }
    }

    if !manifest.exports.is_empty() {
        println!("\nexports:");
        for export in &manifest.exports {
            println!(
                "  {:<20} {}",
                export.domain_path,
                export.pipes.iter().join(", ")
            );
        }
    }

    Ok(())
}
