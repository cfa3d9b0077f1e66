use slog::Logger;
use std::fs;
use std::path::PathBuf;

use cli::lock::{read_root_manifest, resolve_and_generate, write_lock_file};
use package::lockfile::{LockFile, LOCK_FILENAME};
use retrieve::cache::Cache;
use retrieve::vcs::Vcs;
use util::errors::Res;

pub struct UpdateCtx<'env> {
    pub path: PathBuf,
    pub cache: &'env Cache,
    pub vcs: &'env dyn Vcs,
    pub logger: Logger,
}

/// Re-resolves everything from scratch, rewrites `methods.lock`, and prints
/// what changed against the previous lock.
pub fn update(ctx: UpdateCtx) -> Res<()> {
    let manifest = read_root_manifest(&ctx.path)?;

    // The previous lock only matters for the diff; an unreadable one is
    // treated as absent.
    let old_lock = fs::read_to_string(ctx.path.join(LOCK_FILENAME))
        .ok()
        .and_then(|content| LockFile::parse(&content).ok());

    let (new_lock, content) =
        resolve_and_generate(&manifest, &ctx.path, ctx.cache, ctx.vcs, &ctx.logger)?;
    write_lock_file(&ctx.path, &content)?;
    println!("Wrote {} with {} package(s).", LOCK_FILENAME, new_lock.len());

    match old_lock {
        Some(old_lock) => print_lock_diff(&old_lock, &new_lock),
        None => println!("No previous lock file; created fresh."),
    }
    Ok(())
}

fn print_lock_diff(old_lock: &LockFile, new_lock: &LockFile) {
    let mut changes = 0;

    for (address, locked) in new_lock.packages() {
        match old_lock.get(address) {
            None => {
                println!("  + {}@{}", address, locked.version());
                changes += 1;
            }
            Some(previous) if previous.version() != locked.version() => {
                println!(
                    "  {}: {} -> {}",
                    address,
                    previous.version(),
                    locked.version()
                );
                changes += 1;
            }
            Some(_) => {}
        }
    }

    for (address, locked) in old_lock.packages() {
        if new_lock.get(address).is_none() {
            println!("  - {}@{}", address, locked.version());
            changes += 1;
        }
    }

    if changes == 0 {
        println!("No changes; lock file is up to date.");
    }
}
