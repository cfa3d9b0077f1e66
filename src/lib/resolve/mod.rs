//! Dependency resolution: local path overrides plus the transitive closure
//! of remote dependencies chosen by Minimum Version Selection.
//!
//! The resolver walks the dependency tree depth-first. Each remote address
//! accumulates the constraints contributed by its dependents; the first visit
//! resolves against the single declared constraint, and a later visit that
//! the resolved version no longer satisfies triggers a diamond re-resolution
//! against the whole accumulated set. Before re-resolving, constraints
//! contributed by the replaced version's own sub-dependencies are pruned
//! recursively so they cannot produce phantom conflicts. Cycles are caught by
//! keeping the DFS path in an explicit stack; the resolved graph itself is a
//! DAG held in insertion order.
//!
//! Local path overrides never touch VCS and are not recursed into.

use failure::Error;
use indexmap::IndexMap;
use itertools::Itertools;
use semver::Version;
use slog::Logger;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::Builder;

use package::bundle::{collect_bundle_files, scan_bundles};
use package::manifest::{Dependency, Manifest};
use package::version::{select_min_all, Constraint};
use package::{PackageAddress, MANIFEST_FILENAME};
use retrieve::cache::Cache;
use retrieve::vcs::{address_to_clone_url, resolve_version_from_tags, Vcs};
use util::errors::*;

/// One dependency of the resolved graph, local or remote, ready for use.
#[derive(Clone, Debug)]
pub struct ResolvedDependency {
    pub alias: String,
    pub address: PackageAddress,
    pub manifest: Option<Manifest>,
    /// The package's root on disk: a cache directory or the local override.
    pub package_root: PathBuf,
    pub bundle_files: Vec<PathBuf>,
    /// `None` means every pipe is public (no manifest, or no exports
    /// section); otherwise the explicit exports plus auto-included main
    /// pipes.
    pub exported_pipes: Option<BTreeSet<String>>,
}

#[derive(Clone, Debug)]
struct RemoteDep {
    alias: String,
    address: PackageAddress,
    constraint: Constraint,
}

#[derive(Default)]
struct Walk {
    resolved: IndexMap<PackageAddress, ResolvedDependency>,
    constraints: HashMap<PackageAddress, Vec<Constraint>>,
    stack: Vec<PackageAddress>,
}

/// Resolves the dependencies of one root manifest against the process-wide
/// VCS and cache substrate. Remote tag listings are memoized for the
/// lifetime of the resolver.
pub struct Resolver<'env> {
    cache: &'env Cache,
    vcs: &'env dyn Vcs,
    logger: Logger,
    tags: HashMap<PackageAddress, Vec<(Version, String)>>,
}

impl<'env> Resolver<'env> {
    pub fn new(cache: &'env Cache, vcs: &'env dyn Vcs, plog: &Logger) -> Resolver<'env> {
        Resolver {
            cache,
            vcs,
            logger: plog.new(o!("stage" => "resolve")),
            tags: HashMap::new(),
        }
    }

    /// Resolves every dependency of `manifest`. The output is ordered:
    /// local path overrides in declaration order, then the transitive
    /// remote closure in resolution order.
    pub fn resolve(
        &mut self,
        manifest: &Manifest,
        package_root: &Path,
    ) -> Res<Vec<ResolvedDependency>> {
        let mut locals = Vec::new();
        let mut remotes = Vec::new();

        for (alias, dep) in &manifest.dependencies {
            if dep.path.is_some() {
                locals.push(self.resolve_local(alias, dep, package_root)?);
            } else {
                remotes.push(RemoteDep {
                    alias: alias.clone(),
                    address: dep.address.clone(),
                    constraint: dep.version.clone(),
                });
            }
        }

        let mut state = Walk::default();
        if !remotes.is_empty() {
            self.walk(remotes, &mut state)?;
        }

        for dep in state.resolved.values() {
            debug!(
                self.logger,
                "resolved remote dependency";
                "alias" => dep.alias.as_str(),
                "address" => dep.address.as_str(),
                "bundles" => dep.bundle_files.len()
            );
        }

        locals.extend(state.resolved.into_iter().map(|(_, dep)| dep));
        Ok(locals)
    }

    /// Resolves a dependency with a `path` override. The directory is used
    /// in place; its own dependencies are not followed.
    fn resolve_local(
        &self,
        alias: &str,
        dep: &Dependency,
        package_root: &Path,
    ) -> Res<ResolvedDependency> {
        let declared = dep.path.as_ref().expect("local dependency has a path");
        let dep_dir = package_root.join(declared);

        if !dep_dir.exists() {
            return Err(wrap_dep(
                format_err!(
                    "local path '{}' resolves to '{}' which does not exist",
                    declared.display(),
                    dep_dir.display()
                ),
                alias,
                &dep.address,
            ));
        }
        if !dep_dir.is_dir() {
            return Err(wrap_dep(
                format_err!(
                    "local path '{}' resolves to '{}' which is not a directory",
                    declared.display(),
                    dep_dir.display()
                ),
                alias,
                &dep.address,
            ));
        }

        let dep_dir = fs::canonicalize(&dep_dir)
            .map_err(|e| wrap_dep(Error::from(e), alias, &dep.address))?;

        debug!(
            self.logger,
            "resolved local dependency";
            "alias" => alias,
            "path" => dep_dir.to_string_lossy().into_owned()
        );
        self.build_resolved(alias, &dep.address, &dep_dir)
    }

    fn walk(&mut self, deps: Vec<RemoteDep>, state: &mut Walk) -> Res<()> {
        for dep in deps {
            if state.stack.contains(&dep.address) {
                return Err(ErrorKind::TransitiveDependency(format!(
                    "dependency cycle detected: '{}' is already on the resolution stack",
                    dep.address
                )))?;
            }

            state
                .constraints
                .entry(dep.address.clone())
                .or_insert_with(Vec::new)
                .push(dep.constraint.clone());

            if state.resolved.contains_key(&dep.address) {
                let satisfied = match state.resolved[&dep.address].manifest {
                    Some(ref manifest) => dep.constraint.satisfies(&manifest.version),
                    None => false,
                };
                if satisfied {
                    debug!(
                        self.logger,
                        "transitive dependency already resolved";
                        "address" => dep.address.as_str(),
                        "constraint" => dep.constraint.to_string()
                    );
                    continue;
                }

                // Diamond: the resolved version no longer satisfies every
                // dependent. Prune the constraints its sub-dependencies
                // contributed, then re-resolve against the full set.
                let old_manifest = state.resolved[&dep.address].manifest.clone();
                prune_stale_constraints(&old_manifest, state);

                let all_constraints = state.constraints[&dep.address].clone();
                let re_resolved =
                    self.resolve_multi(&dep.alias, &dep.address, &all_constraints)?;
                let sub_deps = re_resolved
                    .manifest
                    .as_ref()
                    .map(remote_deps)
                    .unwrap_or_else(Vec::new);
                state.resolved.insert(dep.address.clone(), re_resolved);

                // The re-resolved version may declare different
                // sub-dependencies than the one it replaced.
                if !sub_deps.is_empty() {
                    state.stack.push(dep.address.clone());
                    let walked = self.walk(sub_deps, state);
                    state.stack.pop();
                    walked?;
                }
                continue;
            }

            state.stack.push(dep.address.clone());
            let walked = self.resolve_new(&dep, state);
            state.stack.pop();
            walked?;
        }
        Ok(())
    }

    fn resolve_new(&mut self, dep: &RemoteDep, state: &mut Walk) -> Res<()> {
        let resolved = if state.constraints[&dep.address].len() > 1 {
            let all_constraints = state.constraints[&dep.address].clone();
            self.resolve_multi(&dep.alias, &dep.address, &all_constraints)?
        } else {
            self.resolve_remote(&dep.alias, &dep.address, &dep.constraint)?
        };

        let sub_deps = resolved
            .manifest
            .as_ref()
            .map(remote_deps)
            .unwrap_or_else(Vec::new);
        state.resolved.insert(dep.address.clone(), resolved);

        if !sub_deps.is_empty() {
            self.walk(sub_deps, state)?;
        }
        Ok(())
    }

    /// Single-constraint remote resolution: list tags, select by MVS, fetch
    /// on cache miss.
    fn resolve_remote(
        &mut self,
        alias: &str,
        address: &PackageAddress,
        constraint: &Constraint,
    ) -> Res<ResolvedDependency> {
        let url = address_to_clone_url(address);
        let tags = self
            .tags_for(address, &url)
            .map_err(|e| wrap_dep(e, alias, address))?;
        let (version, tag) = resolve_version_from_tags(&tags, constraint)
            .map_err(|e| wrap_dep(e, alias, address))?;

        if self.cache.is_cached(address, &version) {
            debug!(
                self.logger,
                "dependency found in cache";
                "address" => address.as_str(),
                "version" => version.to_string()
            );
            let cached = self
                .cache
                .path_for(address, &version)
                .map_err(|e| wrap_dep(e, alias, address))?;
            return self.build_resolved(alias, address, &cached);
        }

        let cached = self
            .fetch_and_cache(address, &version, &tag, &url)
            .map_err(|e| wrap_dep(e, alias, address))?;
        self.build_resolved(alias, address, &cached)
    }

    /// Diamond resolution: the chosen version must satisfy every constraint
    /// accumulated for this address.
    fn resolve_multi(
        &mut self,
        alias: &str,
        address: &PackageAddress,
        constraints: &[Constraint],
    ) -> Res<ResolvedDependency> {
        let url = address_to_clone_url(address);
        let tags = self
            .tags_for(address, &url)
            .map_err(|e| wrap_dep(e, alias, address))?;

        let versions: Vec<Version> = tags.iter().map(|entry| entry.0.clone()).collect();
        let selected = select_min_all(&versions, constraints).ok_or_else(|| {
            Error::from(ErrorKind::TransitiveDependency(format!(
                "no version of '{}' satisfies all constraints: {}",
                address,
                constraints.iter().join(", ")
            )))
        })?;

        if self.cache.is_cached(address, &selected) {
            debug!(
                self.logger,
                "diamond dependency found in cache";
                "address" => address.as_str(),
                "version" => selected.to_string()
            );
            let cached = self
                .cache
                .path_for(address, &selected)
                .map_err(|e| wrap_dep(e, alias, address))?;
            return self.build_resolved(alias, address, &cached);
        }

        let tag = tags
            .iter()
            .find(|entry| entry.0 == selected)
            .map(|entry| entry.1.clone())
            .expect("selected version came from the tag list");

        let cached = self
            .fetch_and_cache(address, &selected, &tag, &url)
            .map_err(|e| wrap_dep(e, alias, address))?;
        self.build_resolved(alias, address, &cached)
    }

    /// Clones into a scratch directory and commits the result through the
    /// cache's staging path.
    fn fetch_and_cache(
        &mut self,
        address: &PackageAddress,
        version: &Version,
        tag: &str,
        url: &str,
    ) -> Res<PathBuf> {
        let scratch = Builder::new()
            .prefix("mthds-clone-")
            .tempdir()
            .map_err(|e| {
                ErrorKind::VcsFetch(format!("could not create scratch directory: {}", e))
            })?;
        let clone_dest = scratch.path().join("pkg");
        self.vcs.clone_at_tag(url, tag, &clone_dest)?;
        self.cache.store(&clone_dest, address, version)
    }

    fn tags_for(&mut self, address: &PackageAddress, url: &str) -> Res<Vec<(Version, String)>> {
        if let Some(tags) = self.tags.get(address) {
            return Ok(tags.clone());
        }
        let tags = self.vcs.list_version_tags(url)?;
        self.tags.insert(address.clone(), tags.clone());
        Ok(tags)
    }

    fn build_resolved(
        &self,
        alias: &str,
        address: &PackageAddress,
        dir: &Path,
    ) -> Res<ResolvedDependency> {
        let manifest = self.read_manifest_lenient(dir, alias);
        let bundle_files = collect_bundle_files(dir)?;
        let exported_pipes = exported_pipe_set(&manifest, &bundle_files);

        Ok(ResolvedDependency {
            alias: alias.to_string(),
            address: address.clone(),
            manifest,
            package_root: dir.to_path_buf(),
            bundle_files,
            exported_pipes,
        })
    }

    /// A dependency without a parseable manifest is still usable; the
    /// failure is logged and the package treated as all-public.
    fn read_manifest_lenient(&self, dir: &Path, alias: &str) -> Option<Manifest> {
        let manifest_path = dir.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            return None;
        }
        match Manifest::from_file(&manifest_path) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!(
                    self.logger,
                    "could not parse dependency manifest";
                    "alias" => alias,
                    "error" => err.to_string()
                );
                None
            }
        }
    }
}

fn wrap_dep(err: Error, alias: &str, address: &PackageAddress) -> Error {
    err.context(ErrorKind::DependencyResolve {
        alias: alias.to_string(),
        address: address.to_string(),
    })
    .into()
}

fn remote_deps(manifest: &Manifest) -> Vec<RemoteDep> {
    manifest
        .dependencies
        .iter()
        .filter(|&(_, dep)| dep.path.is_none())
        .map(|(alias, dep)| RemoteDep {
            alias: alias.clone(),
            address: dep.address.clone(),
            constraint: dep.version.clone(),
        })
        .collect()
}

/// Removes constraints contributed by a dependency version that is being
/// replaced. Sub-dependencies left with no constraints at all were only
/// needed by the old version, so they leave the resolved graph too, and
/// their own contributions are pruned recursively.
fn prune_stale_constraints(old_manifest: &Option<Manifest>, state: &mut Walk) {
    let manifest = match *old_manifest {
        Some(ref manifest) => manifest,
        None => return,
    };

    for (_, sub) in &manifest.dependencies {
        if sub.path.is_some() {
            continue;
        }

        let emptied = match state.constraints.get_mut(&sub.address) {
            None => continue,
            Some(list) => {
                match list.iter().position(|c| *c == sub.version) {
                    Some(pos) => {
                        list.remove(pos);
                    }
                    None => continue,
                }
                list.is_empty()
            }
        };

        if emptied {
            state.constraints.remove(&sub.address);
            if let Some(old_resolved) = state.resolved.shift_remove(&sub.address) {
                prune_stale_constraints(&old_resolved.manifest, state);
            }
        }
    }
}

/// Computes the exported pipe set of a resolved dependency. `None` means
/// all pipes are public. With explicit exports, main pipes declared in the
/// dependency's bundles are auto-included.
fn exported_pipe_set(
    manifest: &Option<Manifest>,
    bundle_files: &[PathBuf],
) -> Option<BTreeSet<String>> {
    let manifest = match *manifest {
        Some(ref manifest) => manifest,
        None => return None,
    };
    if manifest.exports.is_empty() {
        return None;
    }

    let mut exported: BTreeSet<String> = manifest
        .exports
        .iter()
        .flat_map(|export| export.pipes.iter().cloned())
        .collect();

    let scan = scan_bundles(bundle_files);
    exported.extend(scan.domain_main_pipes.values().cloned());

    Some(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::Discard;
    use std::cell::RefCell;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    /// An in-memory VCS: repositories keyed by clone URL, file trees keyed
    /// by tag. Every call is recorded so tests can assert what was touched.
    #[derive(Default)]
    struct FakeVcs {
        repos: HashMap<String, FakeRepo>,
        calls: RefCell<Vec<String>>,
    }

    #[derive(Default)]
    struct FakeRepo {
        tags: Vec<(Version, String)>,
        files: HashMap<String, Vec<(String, String)>>,
    }

    impl FakeVcs {
        fn add_repo(&mut self, address: &str, versions: &[(&str, &[(&str, &str)])]) {
            let url = format!("https://{}.git", address);
            let mut repo = FakeRepo::default();
            for &(version, files) in versions {
                let tag = format!("v{}", version);
                repo.tags.push((v(version), tag.clone()));
                repo.files.insert(
                    tag,
                    files
                        .iter()
                        .map(|&(path, contents)| (path.to_string(), contents.to_string()))
                        .collect(),
                );
            }
            self.repos.insert(url, repo);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Vcs for FakeVcs {
        fn list_version_tags(&self, clone_url: &str) -> Res<Vec<(Version, String)>> {
            self.calls.borrow_mut().push(format!("ls-remote {}", clone_url));
            match self.repos.get(clone_url) {
                Some(repo) => Ok(repo.tags.clone()),
                None => Err(ErrorKind::VcsFetch(format!("no such repository '{}'", clone_url)))?,
            }
        }

        fn clone_at_tag(&self, clone_url: &str, tag: &str, dest: &Path) -> Res<()> {
            self.calls
                .borrow_mut()
                .push(format!("clone {} {}", clone_url, tag));
            let repo = self
                .repos
                .get(clone_url)
                .ok_or_else(|| ErrorKind::VcsFetch(format!("no such repository '{}'", clone_url)))?;
            let files = repo
                .files
                .get(tag)
                .ok_or_else(|| ErrorKind::VcsFetch(format!("no such tag '{}'", tag)))?;

            for &(ref path, ref contents) in files {
                let full = dest.join(path);
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&full, contents).unwrap();
            }
            Ok(())
        }
    }

    fn remote_manifest(address: &str, version: &str, deps: &[(&str, &str, &str)]) -> String {
        let mut out = format!(
            "[package]\naddress = \"{}\"\nversion = \"{}\"\ndescription = \"fixture\"\n",
            address, version
        );
        if !deps.is_empty() {
            out.push_str("\n[dependencies]\n");
            for &(alias, dep_address, constraint) in deps {
                out.push_str(&format!(
                    "{} = {{ address = \"{}\", version = \"{}\" }}\n",
                    alias, dep_address, constraint
                ));
            }
        }
        out
    }

    fn root_manifest(deps: &str) -> Manifest {
        Manifest::from_str(&format!(
            "[package]\naddress = \"example.com/test/root\"\nversion = \"0.1.0\"\ndescription = \"root\"\n{}",
            deps
        ))
        .unwrap()
    }

    struct Env {
        _dir: TempDir,
        cache: Cache,
        root: PathBuf,
    }

    fn env() -> Env {
        let dir = TempDir::new().unwrap();
        let cache = Cache::from_disk(&test_logger(), dir.path().join("cache"));
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        Env {
            _dir: dir,
            cache,
            root,
        }
    }

    #[test]
    fn no_dependencies_resolves_to_nothing() {
        let env = env();
        let vcs = FakeVcs::default();
        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());

        let resolved = resolver.resolve(&root_manifest(""), &env.root).unwrap();
        assert!(resolved.is_empty());
        assert!(vcs.calls().is_empty());
    }

    #[test]
    fn local_override_skips_vcs() {
        let env = env();
        let local = env.root.join("vendored");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("tool.mthds"), "domain = \"tools\"\n\n[pipe.run_tool]\ntype = \"PipeLLM\"\n").unwrap();

        let manifest = root_manifest(
            "\n[dependencies]\ntools = { address = \"github.com/acme/tools\", version = \"^9.9.9\", path = \"vendored\" }\n",
        );

        let vcs = FakeVcs::default();
        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let resolved = resolver.resolve(&manifest, &env.root).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].alias, "tools");
        assert_eq!(resolved[0].bundle_files.len(), 1);
        // No manifest in the override directory: everything is public.
        assert!(resolved[0].manifest.is_none());
        assert!(resolved[0].exported_pipes.is_none());
        // The stated version never triggers any VCS traffic.
        assert!(vcs.calls().is_empty());
    }

    #[test]
    fn missing_local_override_fails() {
        let env = env();
        let manifest = root_manifest(
            "\n[dependencies]\ntools = { address = \"github.com/acme/tools\", version = \"*\", path = \"nowhere\" }\n",
        );

        let vcs = FakeVcs::default();
        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let err = resolver.resolve(&manifest, &env.root).unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::DependencyResolve { ref alias, .. }) => assert_eq!(alias, "tools"),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn resolves_single_remote_dependency_to_minimum() {
        let env = env();
        let mut vcs = FakeVcs::default();
        vcs.add_repo(
            "github.com/org/pkg",
            &[
                ("1.0.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/pkg\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n")]),
                ("1.2.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/pkg\"\nversion = \"1.2.0\"\ndescription = \"fixture\"\n")]),
                ("2.0.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/pkg\"\nversion = \"2.0.0\"\ndescription = \"fixture\"\n")]),
            ],
        );

        let manifest = root_manifest(
            "\n[dependencies]\ndep = { address = \"github.com/org/pkg\", version = \"^1.0.0\" }\n",
        );

        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let resolved = resolver.resolve(&manifest, &env.root).unwrap();

        assert_eq!(resolved.len(), 1);
        let dep = &resolved[0];
        assert_eq!(dep.alias, "dep");
        assert_eq!(dep.manifest.as_ref().unwrap().version, v("1.0.0"));
        assert!(env
            .cache
            .is_cached(&PackageAddress::from_str("github.com/org/pkg").unwrap(), &v("1.0.0")));

        // A second resolve comes straight from the cache: tag listing again,
        // but no clone.
        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        resolver.resolve(&manifest, &env.root).unwrap();
        let clones = vcs
            .calls()
            .iter()
            .filter(|call| call.starts_with("clone"))
            .count();
        assert_eq!(clones, 1);
    }

    #[test]
    fn transitive_dependencies_are_resolved() {
        let env = env();
        let mut vcs = FakeVcs::default();
        vcs.add_repo(
            "github.com/org/parent",
            &[(
                "1.0.0",
                &[(
                    "METHODS.toml",
                    "[package]\naddress = \"github.com/org/parent\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n\n[dependencies]\nchild = { address = \"github.com/org/child\", version = \"^1.0.0\" }\n",
                )],
            )],
        );
        vcs.add_repo(
            "github.com/org/child",
            &[("1.1.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/child\"\nversion = \"1.1.0\"\ndescription = \"fixture\"\n")])],
        );

        let manifest = root_manifest(
            "\n[dependencies]\nparent = { address = \"github.com/org/parent\", version = \"^1.0.0\" }\n",
        );

        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let resolved = resolver.resolve(&manifest, &env.root).unwrap();

        let addresses: Vec<&str> = resolved.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(
            addresses,
            vec!["github.com/org/parent", "github.com/org/child"]
        );
    }

    fn diamond_fixture(c_constraint_on_b: &str) -> (Env, FakeVcs, Manifest) {
        let env = env();
        let mut vcs = FakeVcs::default();

        // B has three versions; 1.0.0 pulls in D, 1.2.0 pulls in E instead.
        vcs.add_repo(
            "github.com/org/b",
            &[
                (
                    "1.0.0",
                    &[(
                        "METHODS.toml",
                        "[package]\naddress = \"github.com/org/b\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n\n[dependencies]\nd = { address = \"github.com/org/d\", version = \"^1.0.0\" }\n",
                    )],
                ),
                (
                    "1.2.0",
                    &[(
                        "METHODS.toml",
                        "[package]\naddress = \"github.com/org/b\"\nversion = \"1.2.0\"\ndescription = \"fixture\"\n\n[dependencies]\ne = { address = \"github.com/org/e\", version = \"^1.0.0\" }\n",
                    )],
                ),
                ("1.5.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/b\"\nversion = \"1.5.0\"\ndescription = \"fixture\"\n")]),
            ],
        );
        vcs.add_repo(
            "github.com/org/d",
            &[("1.0.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/d\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n")])],
        );
        vcs.add_repo(
            "github.com/org/e",
            &[("1.0.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/e\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n")])],
        );

        let c_manifest = remote_manifest(
            "github.com/org/c",
            "1.0.0",
            &[("b", "github.com/org/b", c_constraint_on_b)],
        );
        vcs.add_repo("github.com/org/c", &[("1.0.0", &[("METHODS.toml", &c_manifest)])]);

        let manifest = root_manifest(
            "\n[dependencies]\nb = { address = \"github.com/org/b\", version = \"^1.0.0\" }\nc = { address = \"github.com/org/c\", version = \"^1.0.0\" }\n",
        );

        (env, vcs, manifest)
    }

    #[test]
    fn diamond_converges_on_minimum_common_version() {
        let (env, vcs, manifest) = diamond_fixture("^1.2.0");
        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let resolved = resolver.resolve(&manifest, &env.root).unwrap();

        let b = resolved
            .iter()
            .find(|d| d.address.as_str() == "github.com/org/b")
            .unwrap();
        assert_eq!(b.manifest.as_ref().unwrap().version, v("1.2.0"));

        // The replaced B@1.0.0's sub-dependency D is pruned; B@1.2.0's E is in.
        let addresses: Vec<&str> = resolved.iter().map(|d| d.address.as_str()).collect();
        assert!(addresses.contains(&"github.com/org/e"));
        assert!(!addresses.contains(&"github.com/org/d"));
        assert!(addresses.contains(&"github.com/org/c"));
    }

    #[test]
    fn diamond_conflict_is_unsatisfiable() {
        let (env, vcs, manifest) = diamond_fixture("^2.0.0");
        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let err = resolver.resolve(&manifest, &env.root).unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::TransitiveDependency(ref msg)) => {
                assert!(msg.contains("github.com/org/b"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn dependency_cycles_are_detected() {
        let env = env();
        let mut vcs = FakeVcs::default();
        vcs.add_repo(
            "github.com/org/ping",
            &[(
                "1.0.0",
                &[(
                    "METHODS.toml",
                    "[package]\naddress = \"github.com/org/ping\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n\n[dependencies]\npong = { address = \"github.com/org/pong\", version = \"^1.0.0\" }\n",
                )],
            )],
        );
        vcs.add_repo(
            "github.com/org/pong",
            &[(
                "1.0.0",
                &[(
                    "METHODS.toml",
                    "[package]\naddress = \"github.com/org/pong\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n\n[dependencies]\nping = { address = \"github.com/org/ping\", version = \"^1.0.0\" }\n",
                )],
            )],
        );

        let manifest = root_manifest(
            "\n[dependencies]\nping = { address = \"github.com/org/ping\", version = \"^1.0.0\" }\n",
        );

        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let err = resolver.resolve(&manifest, &env.root).unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::TransitiveDependency(ref msg)) => {
                assert!(msg.contains("cycle"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn vcs_failures_carry_the_dependency_identity() {
        let env = env();
        let vcs = FakeVcs::default();

        let manifest = root_manifest(
            "\n[dependencies]\ngone = { address = \"github.com/org/gone\", version = \"^1.0.0\" }\n",
        );

        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let err = resolver.resolve(&manifest, &env.root).unwrap_err();
        match kind_of(&err) {
            Some(&ErrorKind::DependencyResolve {
                ref alias,
                ref address,
            }) => {
                assert_eq!(alias, "gone");
                assert_eq!(address, "github.com/org/gone");
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn exported_pipes_include_main_pipes() {
        let env = env();
        let mut vcs = FakeVcs::default();
        let manifest_toml = "[package]\naddress = \"github.com/org/pkg\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n\n[exports.scoring]\npipes = [\"public_pipe\"]\n";
        let bundle = "domain = \"scoring\"\nmain_pipe = \"run_scoring\"\n\n[pipe.run_scoring]\ntype = \"PipeLLM\"\n\n[pipe.public_pipe]\ntype = \"PipeLLM\"\n\n[pipe.hidden]\ntype = \"PipeLLM\"\n";
        vcs.add_repo(
            "github.com/org/pkg",
            &[("1.0.0", &[("METHODS.toml", manifest_toml), ("scoring.mthds", bundle)])],
        );

        let manifest = root_manifest(
            "\n[dependencies]\ndep = { address = \"github.com/org/pkg\", version = \"^1.0.0\" }\n",
        );

        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let resolved = resolver.resolve(&manifest, &env.root).unwrap();

        let exported = resolved[0].exported_pipes.as_ref().unwrap();
        assert!(exported.contains("public_pipe"));
        assert!(exported.contains("run_scoring"));
        assert!(!exported.contains("hidden"));
    }

    #[test]
    fn no_exports_section_means_all_public() {
        let env = env();
        let mut vcs = FakeVcs::default();
        vcs.add_repo(
            "github.com/org/pkg",
            &[("1.0.0", &[("METHODS.toml", "[package]\naddress = \"github.com/org/pkg\"\nversion = \"1.0.0\"\ndescription = \"fixture\"\n")])],
        );

        let manifest = root_manifest(
            "\n[dependencies]\ndep = { address = \"github.com/org/pkg\", version = \"^1.0.0\" }\n",
        );

        let mut resolver = Resolver::new(&env.cache, &vcs, &test_logger());
        let resolved = resolver.resolve(&manifest, &env.root).unwrap();
        assert!(resolved[0].exported_pipes.is_none());
    }
}
