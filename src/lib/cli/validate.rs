use slog::Logger;
use std::path::PathBuf;

use package::bundle::{collect_bundle_files, extract_bundle_metadata, BundleMetadata};
use package::manifest::Manifest;
use package::visibility::check_visibility;
use package::MANIFEST_FILENAME;
use util::errors::Res;

pub struct ValidateCtx {
    pub path: PathBuf,
    pub logger: Logger,
}

/// Structurally validates the manifest, then runs the visibility checks over
/// every bundle in the package.
pub fn validate(ctx: ValidateCtx) -> Res<()> {
    let manifest_path = ctx.path.join(MANIFEST_FILENAME);
    if !manifest_path.is_file() {
        bail!(
            "{} not found in `{}`\n\n\
             run `mthds init` to create one",
            MANIFEST_FILENAME,
            ctx.path.display()
        )
    }

    let manifest = Manifest::from_file(&manifest_path)?;
    println!("{} is valid.", MANIFEST_FILENAME);

    let bundle_files = collect_bundle_files(&ctx.path)?;
    let mut bundles: Vec<BundleMetadata> = Vec::with_capacity(bundle_files.len());
    let mut scan_errors = 0;
    for file in &bundle_files {
        match extract_bundle_metadata(file) {
            Ok(metadata) => bundles.push(metadata),
            Err(err) => {
                scan_errors += 1;
                eprintln!("warning: could not read bundle {}: {}", file.display(), err);
            }
        }
    }

    let violations = check_visibility(Some(&manifest), &bundles, &ctx.logger);
    for violation in &violations {
        println!("violation: {}", violation.message);
    }

    if !violations.is_empty() {
        bail!("{} visibility violation(s) found", violations.len())
    }
    if scan_errors > 0 {
        bail!("{} bundle file(s) could not be read", scan_errors)
    }

    println!(
        "Checked {} bundle(s): no visibility violations.",
        bundles.len()
    );
    Ok(())
}
