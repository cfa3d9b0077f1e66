//! Module `retrieve` brings remote packages onto the local disk: the VCS
//! adapter that talks to the hosting provider's `git`, and the
//! content-addressed cache that fetched packages are committed into.

pub mod cache;
pub mod vcs;
