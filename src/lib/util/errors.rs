//! Error types shared across the crate.
//!
//! Every fallible operation returns `Res<T>`. `ErrorKind` enumerates the
//! failure refinements; lower layers attach a kind with `.context(...)` and
//! the resolver wraps version/VCS/cache failures with the identity of the
//! offending dependency. Only the binary converts errors into exit codes.

use failure::Context;
pub use failure::Error;

pub type Res<T> = Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq, Fail)]
pub enum ErrorKind {
    #[fail(display = "{}", _0)]
    ManifestParse(String),
    #[fail(display = "{}", _0)]
    ManifestValidation(String),
    #[fail(display = "{}", _0)]
    VcsFetch(String),
    #[fail(display = "{}", _0)]
    VersionResolution(String),
    #[fail(display = "{}", _0)]
    PackageCache(String),
    #[fail(display = "{}", _0)]
    LockFile(String),
    #[fail(display = "{}", _0)]
    Integrity(String),
    #[fail(display = "failed to resolve dependency '{}' ({})", alias, address)]
    DependencyResolve { alias: String, address: String },
    #[fail(display = "{}", _0)]
    TransitiveDependency(String),
    #[fail(display = "invalid semver version '{}'", _0)]
    InvalidVersion(String),
    #[fail(display = "invalid version constraint '{}'", _0)]
    InvalidConstraint(String),
    #[fail(
        display = "invalid package address '{}'; addresses follow a hostname/path pattern (e.g. 'github.com/org/repo')",
        _0
    )]
    InvalidAddress(String),
    #[fail(display = "{}", _0)]
    InvalidRef(String),
    #[fail(display = "no installed method named '{}' found", _0)]
    MethodNotFound(String),
    #[fail(display = "multiple methods named '{}' found: {}", _0, _1)]
    DuplicateMethodName(String, String),
    #[fail(display = "pipe code '{}' not found in any installed method's exports", _0)]
    PipeCodeNotFound(String),
    #[fail(display = "pipe code '{}' is exported by multiple methods: {}", _0, _1)]
    AmbiguousPipeCode(String, String),
}

/// Recovers the `ErrorKind` of an error, whether it was raised directly or
/// attached through `.context(...)`.
pub fn kind_of(err: &Error) -> Option<&ErrorKind> {
    if let Some(kind) = err.downcast_ref::<ErrorKind>() {
        return Some(kind);
    }
    err.downcast_ref::<Context<ErrorKind>>()
        .map(|ctx| ctx.get_context())
}
