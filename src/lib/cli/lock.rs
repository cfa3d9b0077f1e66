use slog::Logger;
use std::path::{Path, PathBuf};

use package::lockfile::{generate_lock_file, LockFile, LOCK_FILENAME};
use package::manifest::Manifest;
use package::MANIFEST_FILENAME;
use resolve::Resolver;
use retrieve::cache::Cache;
use retrieve::vcs::Vcs;
use util::errors::Res;
use util::write;

pub struct LockCtx<'env> {
    pub path: PathBuf,
    pub cache: &'env Cache,
    pub vcs: &'env dyn Vcs,
    pub logger: Logger,
}

/// Resolves all dependencies and writes `methods.lock`.
pub fn lock(ctx: LockCtx) -> Res<()> {
    let manifest = read_root_manifest(&ctx.path)?;
    let (lock_file, content) = resolve_and_generate(&manifest, &ctx.path, ctx.cache, ctx.vcs, &ctx.logger)?;
    write_lock_file(&ctx.path, &content)?;
    println!("Wrote {} with {} package(s).", LOCK_FILENAME, lock_file.len());
    Ok(())
}

pub(crate) fn read_root_manifest(path: &Path) -> Res<Manifest> {
    let manifest_path = path.join(MANIFEST_FILENAME);
    if !manifest_path.exists() {
        bail!(
            "{} not found in `{}`\n\n\
             run `mthds init` first to create a manifest",
            MANIFEST_FILENAME,
            path.display()
        )
    }
    Manifest::from_file(&manifest_path)
}

pub(crate) fn resolve_and_generate(
    manifest: &Manifest,
    package_root: &Path,
    cache: &Cache,
    vcs: &dyn Vcs,
    logger: &Logger,
) -> Res<(LockFile, String)> {
    let mut resolver = Resolver::new(cache, vcs, logger);
    let resolved = resolver.resolve(manifest, package_root)?;
    let lock_file = generate_lock_file(manifest, &resolved)?;
    let content = lock_file.to_toml_string();
    Ok((lock_file, content))
}

pub(crate) fn write_lock_file(package_root: &Path, content: &str) -> Res<()> {
    write(&package_root.join(LOCK_FILENAME), content.as_bytes())
}
