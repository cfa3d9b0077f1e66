use slog::Logger;
use std::fs;
use std::path::PathBuf;
use tempfile::Builder;

use cli::add::derive_alias_from_address;
use failure::Error;
use package::lockfile::{verify_lock_file, LockFile, LOCK_FILENAME};
use package::version::Constraint;
use package::PackageAddress;
use retrieve::cache::Cache;
use retrieve::vcs::{address_to_clone_url, resolve_version_from_tags, Vcs};
use util::errors::*;

pub struct InstallCtx<'env> {
    pub path: PathBuf,
    pub cache: &'env Cache,
    pub vcs: &'env dyn Vcs,
    pub logger: Logger,
}

/// Ensures every locked package is present in the cache, then verifies all
/// hashes. Any fetch failure aborts before verification runs.
pub fn install(ctx: InstallCtx) -> Res<()> {
    let lock_path = ctx.path.join(LOCK_FILENAME);
    if !lock_path.exists() {
        bail!(
            "{} not found in `{}`\n\n\
             run `mthds lock` first to generate a lock file",
            LOCK_FILENAME,
            ctx.path.display()
        )
    }

    let content = fs::read_to_string(&lock_path)
        .map_err(|e| ErrorKind::LockFile(format!("could not read {}: {}", LOCK_FILENAME, e)))?;
    let lock_file = LockFile::parse(&content)?;

    if lock_file.is_empty() {
        println!("Nothing to install; lock file is empty.");
        return Ok(());
    }

    let mut fetched = 0;
    let mut cached = 0;
    for (address, locked) in lock_file.packages() {
        if ctx.cache.is_cached(address, locked.version()) {
            cached += 1;
            continue;
        }
        fetch_locked(ctx.cache, ctx.vcs, address, locked.version())?;
        debug!(
            ctx.logger,
            "fetched locked package";
            "address" => address.as_str(),
            "version" => locked.version().to_string()
        );
        fetched += 1;
    }

    verify_lock_file(&lock_file, ctx.cache)?;

    println!("Installed {} package(s), {} already cached.", fetched, cached);
    Ok(())
}

/// Fetches one locked package at its exact version and commits it to the
/// cache.
fn fetch_locked(
    cache: &Cache,
    vcs: &dyn Vcs,
    address: &PackageAddress,
    version: &::semver::Version,
) -> Res<()> {
    let alias = derive_alias_from_address(address.as_str());
    let wrap = |err: Error| -> Error {
        err.context(ErrorKind::DependencyResolve {
            alias: alias.clone(),
            address: address.to_string(),
        })
        .into()
    };

    let url = address_to_clone_url(address);
    let tags = vcs.list_version_tags(&url).map_err(&wrap)?;
    let exact = Constraint::exact(version);
    let (_, tag) = resolve_version_from_tags(&tags, &exact).map_err(&wrap)?;

    let scratch = Builder::new()
        .prefix("mthds-clone-")
        .tempdir()
        .map_err(|e| ErrorKind::VcsFetch(format!("could not create scratch directory: {}", e)))?;
    let clone_dest = scratch.path().join("pkg");
    vcs.clone_at_tag(&url, &tag, &clone_dest).map_err(&wrap)?;
    cache.store(&clone_dest, address, version).map_err(&wrap)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use package::lockfile::{compute_directory_hash, LockedPackage};
    use semver::Version;
    use slog::Discard;
    use std::path::Path;
    use std::str::FromStr;

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    /// Install must not touch VCS when every locked package is cached.
    struct PanicVcs;

    impl Vcs for PanicVcs {
        fn list_version_tags(&self, _clone_url: &str) -> Res<Vec<(Version, String)>> {
            panic!("unexpected VCS call");
        }

        fn clone_at_tag(&self, _clone_url: &str, _tag: &str, _dest: &Path) -> Res<()> {
            panic!("unexpected VCS call");
        }
    }

    fn cached_package(dir: &Path) -> (Cache, PackageAddress, Version) {
        let cache = Cache::from_disk(&test_logger(), dir.join("cache"));
        let src = dir.join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("METHODS.toml"), b"x = 1\n").unwrap();

        let address = PackageAddress::from_str("github.com/org/dep").unwrap();
        let version = Version::parse("1.0.0").unwrap();
        cache.store(&src, &address, &version).unwrap();
        (cache, address, version)
    }

    fn write_lock(root: &Path, address: &PackageAddress, version: &Version, hash: String) {
        let mut lock = LockFile::new();
        lock.insert(
            address.clone(),
            LockedPackage::new(version.clone(), hash, format!("https://{}", address)).unwrap(),
        );
        fs::create_dir_all(root).unwrap();
        fs::write(root.join(LOCK_FILENAME), lock.to_toml_string()).unwrap();
    }

    #[test]
    fn install_verifies_cached_packages() {
        let dir = ::tempfile::tempdir().unwrap();
        let (cache, address, version) = cached_package(dir.path());
        let cached_dir = cache.path_for(&address, &version).unwrap();
        let hash = compute_directory_hash(&cached_dir).unwrap();

        let root = dir.path().join("pkg");
        write_lock(&root, &address, &version, hash);

        install(InstallCtx {
            path: root,
            cache: &cache,
            vcs: &PanicVcs,
            logger: test_logger(),
        })
        .unwrap();
    }

    #[test]
    fn install_fails_on_tampered_cache() {
        let dir = ::tempfile::tempdir().unwrap();
        let (cache, address, version) = cached_package(dir.path());
        let cached_dir = cache.path_for(&address, &version).unwrap();
        let hash = compute_directory_hash(&cached_dir).unwrap();

        let root = dir.path().join("pkg");
        write_lock(&root, &address, &version, hash);

        // Tamper with the cached copy after locking.
        fs::write(cached_dir.join("METHODS.toml"), b"x = 2\n").unwrap();

        let err = install(InstallCtx {
            path: root,
            cache: &cache,
            vcs: &PanicVcs,
            logger: test_logger(),
        })
        .unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::Integrity(ref msg)) => {
                assert!(msg.contains("github.com/org/dep"));
                assert!(msg.contains("1.0.0"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn install_requires_a_lock_file() {
        let dir = ::tempfile::tempdir().unwrap();
        let cache = Cache::from_disk(&test_logger(), dir.path().join("cache"));
        assert!(install(InstallCtx {
            path: dir.path().to_path_buf(),
            cache: &cache,
            vcs: &PanicVcs,
            logger: test_logger(),
        })
        .is_err());
    }
}
