//! Cross-domain and cross-package visibility checking.
//!
//! Pipes default to private: a bundle in domain `d1` may reference `d2.p`
//! only if `p` is listed in the manifest's `[exports.d2]` or is the declared
//! `main_pipe` of a bundle whose domain is `d2`. Same-domain and bare
//! references always pass. References using the `alias->...` infix must name
//! an alias declared in `[dependencies]`. Packages without a manifest are
//! exempt from enforcement entirely.

use itertools::Itertools;
use slog::Logger;
use std::collections::{BTreeMap, BTreeSet};

use package::bundle::BundleMetadata;
use package::manifest::Manifest;
use package::reference::QualifiedRef;
use package::{is_reserved_domain_path, RESERVED_DOMAINS};

/// One visibility violation found in a bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub pipe_ref: String,
    pub source_domain: String,
    pub target_domain: String,
    pub context: String,
    pub message: String,
}

/// Checks all bundles of a package against its manifest's exports.
pub struct VisibilityChecker<'a> {
    manifest: Option<&'a Manifest>,
    bundles: &'a [BundleMetadata],
    exported_pipes: BTreeMap<&'a str, BTreeSet<&'a str>>,
    main_pipes: BTreeMap<&'a str, &'a str>,
    logger: Logger,
}

impl<'a> VisibilityChecker<'a> {
    pub fn new(
        manifest: Option<&'a Manifest>,
        bundles: &'a [BundleMetadata],
        plog: &Logger,
    ) -> VisibilityChecker<'a> {
        let logger = plog.new(o!("check" => "visibility"));

        let mut exported_pipes: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        if let Some(manifest) = manifest {
            for export in &manifest.exports {
                exported_pipes
                    .entry(export.domain_path.as_str())
                    .or_insert_with(BTreeSet::new)
                    .extend(export.pipes.iter().map(|p| p.as_str()));
            }
        }

        // main_pipe declarations are auto-exported; on conflict the first
        // declaration wins.
        let mut main_pipes: BTreeMap<&str, &str> = BTreeMap::new();
        for metadata in bundles {
            if let Some(ref main_pipe) = metadata.main_pipe {
                let existing = main_pipes.get(metadata.domain.as_str()).cloned();
                match existing {
                    Some(existing) if existing != main_pipe.as_str() => {
                        warn!(
                            logger,
                            "conflicting main_pipe for domain, keeping first value";
                            "domain" => metadata.domain.as_str(),
                            "kept" => existing,
                            "ignored" => main_pipe.as_str()
                        );
                    }
                    Some(_) => {}
                    None => {
                        main_pipes.insert(metadata.domain.as_str(), main_pipe.as_str());
                    }
                }
            }
        }

        VisibilityChecker {
            manifest,
            bundles,
            exported_pipes,
            main_pipes,
            logger,
        }
    }

    /// Runs every check: reserved domains, then cross-domain references, then
    /// cross-package references.
    pub fn check(&self) -> Vec<Violation> {
        let mut violations = self.check_reserved_domains();
        violations.extend(self.check_pipe_references());
        violations.extend(self.check_cross_package_references());
        violations
    }

    /// True if `pipe_ref` may be used from `source_domain`.
    pub fn is_pipe_accessible_from(&self, pipe_ref: &QualifiedRef, source_domain: &str) -> bool {
        if self.manifest.is_none() {
            return true;
        }
        if !pipe_ref.is_qualified() || pipe_ref.is_local_to(source_domain) {
            return true;
        }

        let target_domain = pipe_ref.domain_path().expect("qualified ref has a domain");
        let pipe_code = pipe_ref.local_code();

        if let Some(exported) = self.exported_pipes.get(target_domain) {
            if exported.contains(pipe_code) {
                return true;
            }
        }
        self.main_pipes.get(target_domain) == Some(&pipe_code)
    }

    fn check_reserved_domains(&self) -> Vec<Violation> {
        if self.manifest.is_none() {
            return Vec::new();
        }

        let mut violations = Vec::new();
        for metadata in self.bundles {
            if is_reserved_domain_path(&metadata.domain) {
                let first = metadata.domain.split('.').next().unwrap_or("");
                violations.push(Violation {
                    pipe_ref: String::new(),
                    source_domain: metadata.domain.clone(),
                    target_domain: first.to_string(),
                    context: "bundle domain declaration".to_string(),
                    message: format!(
                        "bundle domain '{}' uses reserved domain '{}'; reserved domains ({}) cannot be used in user packages",
                        metadata.domain,
                        first,
                        RESERVED_DOMAINS.iter().join(", ")
                    ),
                });
            }
        }
        violations
    }

    fn check_pipe_references(&self) -> Vec<Violation> {
        if self.manifest.is_none() {
            return Vec::new();
        }

        let mut violations = Vec::new();
        for metadata in self.bundles {
            for reference in &metadata.pipe_references {
                let parsed = match QualifiedRef::parse_pipe_ref(&reference.target) {
                    Ok(parsed) => parsed,
                    // Anything that is not a plain pipe ref (including
                    // cross-package refs) is out of scope for this check.
                    Err(_) => continue,
                };

                if !self.is_pipe_accessible_from(&parsed, &metadata.domain) {
                    let target_domain = parsed.domain_path().unwrap_or("").to_string();
                    violations.push(Violation {
                        pipe_ref: reference.target.clone(),
                        source_domain: metadata.domain.clone(),
                        target_domain: target_domain.clone(),
                        context: reference.context.clone(),
                        message: format!(
                            "pipe '{}' referenced in {} (domain '{}') is not exported by domain '{}'; add it to [exports.{}] pipes in METHODS.toml",
                            reference.target,
                            reference.context,
                            metadata.domain,
                            target_domain,
                            target_domain
                        ),
                    });
                }
            }
        }
        violations
    }

    fn check_cross_package_references(&self) -> Vec<Violation> {
        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => return Vec::new(),
        };

        let mut violations = Vec::new();
        for metadata in self.bundles {
            for reference in &metadata.pipe_references {
                if !QualifiedRef::has_cross_package_prefix(&reference.target) {
                    continue;
                }

                let (alias, _rest) = match QualifiedRef::split_cross_package_ref(&reference.target)
                {
                    Ok(split) => split,
                    Err(_) => continue,
                };

                if manifest.dependencies.contains_key(alias) {
                    info!(
                        self.logger,
                        "cross-package reference targets a known dependency";
                        "ref" => reference.target.as_str(),
                        "context" => reference.context.as_str(),
                        "alias" => alias
                    );
                } else {
                    violations.push(Violation {
                        pipe_ref: reference.target.clone(),
                        source_domain: metadata.domain.clone(),
                        target_domain: alias.to_string(),
                        context: reference.context.clone(),
                        message: format!(
                            "cross-package reference '{}' in {} (domain '{}'): alias '{}' is not declared in [dependencies] of METHODS.toml",
                            reference.target, reference.context, metadata.domain, alias
                        ),
                    });
                }
            }
        }
        violations
    }
}

/// Convenience entry point: runs all checks over a package's bundles.
pub fn check_visibility(
    manifest: Option<&Manifest>,
    bundles: &[BundleMetadata],
    plog: &Logger,
) -> Vec<Violation> {
    VisibilityChecker::new(manifest, bundles, plog).check()
}
