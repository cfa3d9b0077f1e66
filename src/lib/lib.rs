//! `mthds` is a source-based package manager for MTHDS pipeline bundles.
//!
//! A package is a directory holding a `METHODS.toml` manifest and any number
//! of `.mthds` bundle files. The library resolves inter-package dependencies
//! from version-control hosts using Minimum Version Selection, pins the
//! result in a content-addressed `methods.lock`, keeps fetched packages in a
//! per-user cache, and statically checks that cross-domain and cross-package
//! pipe references only target exported symbols. The `mthds` binary in
//! `src/bin` is a thin front-end over the `cli` module.

extern crate copy_dir;
extern crate directories;
#[macro_use]
extern crate failure;
extern crate indexmap;
extern crate inflector;
extern crate itertools;
#[macro_use]
extern crate lazy_static;
extern crate semver;
extern crate serde;
extern crate serde_json;
extern crate sha2;
#[macro_use]
extern crate slog;
extern crate tempfile;
extern crate toml;
extern crate walkdir;

pub mod cli;
pub mod credentials;
pub mod installed;
pub mod package;
pub mod resolve;
pub mod retrieve;
pub mod util;
