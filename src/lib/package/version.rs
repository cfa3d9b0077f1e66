//! Version constraints and Minimum Version Selection.
//!
//! Versions themselves are plain `semver::Version`s; this module adds the
//! constraint grammar used by manifests (`^`, `~`, comparison operators,
//! `==`/`!=`, comma-separated conjunction, and `*`/`M.*`/`M.m.*` wildcards)
//! and the MVS selection functions the resolver is built on. MVS picks the
//! *smallest* satisfying version, which keeps resolution deterministic and
//! lock files minimal.

use failure::Error;
use semver::{Identifier, Version};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use util::errors::*;

/// Parses a version string, stripping a single leading `v` if present
/// (common in git tags like `v1.2.3`).
pub fn parse_version(s: &str) -> Res<Version> {
    let cleaned = if s.starts_with('v') { &s[1..] } else { s };
    Version::parse(cleaned).map_err(|_| ErrorKind::InvalidVersion(s.to_string()).into())
}

/// Parses a git tag into a version, returning `None` for non-semver tags
/// like `release-20240101` or `latest`.
pub fn parse_version_tag(tag: &str) -> Option<Version> {
    parse_version(tag).ok()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Op {
    Compatible,
    Tilde,
    Ge,
    Le,
    Gt,
    Lt,
    Exact,
    Ne,
}

/// A version with possibly-unspecified minor/patch components, as written on
/// the right-hand side of a constraint operator. Wildcard components parse to
/// unspecified.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Partial {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Vec<Identifier>,
}

impl Partial {
    /// The smallest concrete version this partial can denote.
    fn floor(&self) -> Version {
        Version {
            major: self.major,
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
            build: Vec::new(),
        }
    }

    /// Exact match: specified components must be equal, unspecified ones are
    /// free. A fully-specified partial also pins the pre-release.
    fn matches_exact(&self, v: &Version) -> bool {
        if v.major != self.major {
            return false;
        }
        match self.minor {
            Some(minor) if v.minor != minor => return false,
            None => return true,
            _ => {}
        }
        match self.patch {
            Some(patch) if v.patch != patch => return false,
            None => return true,
            _ => {}
        }
        v.pre == self.pre
    }

    /// Exclusive upper bound of a caret constraint: the next breaking version.
    fn caret_ceiling(&self) -> Version {
        let (major, minor, patch) = if self.major > 0 {
            (self.major + 1, 0, 0)
        } else {
            match (self.minor, self.patch) {
                (Some(minor), _) if minor > 0 => (0, minor + 1, 0),
                (Some(_), Some(patch)) => (0, 0, patch + 1),
                (Some(_), None) => (0, 1, 0),
                (None, _) => (1, 0, 0),
            }
        };
        Version {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Exclusive upper bound of a tilde constraint: the next minor version.
    fn tilde_ceiling(&self) -> Version {
        let (major, minor) = match self.minor {
            Some(minor) => (self.major, minor + 1),
            None => (self.major + 1, 0),
        };
        Version {
            major,
            minor,
            patch: 0,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Single {
    Any,
    Range { op: Op, partial: Partial },
}

impl Single {
    fn matches(&self, v: &Version) -> bool {
        match *self {
            Single::Any => true,
            Single::Range { op, ref partial } => match op {
                Op::Exact => partial.matches_exact(v),
                Op::Ne => !partial.matches_exact(v),
                Op::Ge => *v >= partial.floor(),
                Op::Gt => *v > partial.floor(),
                Op::Le => *v <= partial.floor(),
                Op::Lt => *v < partial.floor(),
                Op::Compatible => *v >= partial.floor() && *v < partial.caret_ceiling(),
                Op::Tilde => *v >= partial.floor() && *v < partial.tilde_ceiling(),
            },
        }
    }
}

/// Struct `Constraint` is a comma-separated conjunction of single version
/// constraints, e.g. `^1.0.0` or `>=1.0.0, <2.0.0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    singles: Vec<Single>,
    /// The normalized source text, kept for display and serialization.
    text: String,
}

impl Constraint {
    /// A constraint satisfied by every version.
    pub fn any() -> Constraint {
        Constraint {
            singles: vec![Single::Any],
            text: "*".to_string(),
        }
    }

    /// A constraint satisfied only by exactly `version`.
    pub fn exact(version: &Version) -> Constraint {
        Constraint {
            singles: vec![Single::Range {
                op: Op::Exact,
                partial: Partial {
                    major: version.major,
                    minor: Some(version.minor),
                    patch: Some(version.patch),
                    pre: version.pre.clone(),
                },
            }],
            text: format!("=={}", version),
        }
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.singles.iter().all(|single| single.matches(version))
    }
}

fn parse_numeric(s: &str, whole: &str) -> Res<u64> {
    if s.is_empty()
        || !s.chars().all(|c| c.is_ascii_digit())
        || (s.len() > 1 && s.starts_with('0'))
    {
        return Err(ErrorKind::InvalidConstraint(whole.to_string()))?;
    }
    s.parse()
        .map_err(|_| ErrorKind::InvalidConstraint(whole.to_string()).into())
}

fn parse_pre(s: &str, whole: &str) -> Res<Vec<Identifier>> {
    let mut idents = Vec::new();
    for piece in s.split('.') {
        if piece.is_empty()
            || !piece
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ErrorKind::InvalidConstraint(whole.to_string()))?;
        }
        if piece.chars().all(|c| c.is_ascii_digit()) {
            idents.push(Identifier::Numeric(parse_numeric(piece, whole)?));
        } else {
            idents.push(Identifier::AlphaNumeric(piece.to_string()));
        }
    }
    Ok(idents)
}

fn parse_partial(s: &str, whole: &str) -> Res<Partial> {
    let invalid = || ErrorKind::InvalidConstraint(whole.to_string());

    let (core, pre) = match s.find('-') {
        Some(dash) => (&s[..dash], Some(&s[dash + 1..])),
        None => (s, None),
    };

    let mut components = core.split('.');
    let major = parse_numeric(components.next().ok_or_else(invalid)?, whole)?;

    let mut wildcard = false;
    let mut parse_component = |piece: Option<&str>| -> Res<Option<u64>> {
        match piece {
            None => Ok(None),
            Some(_) if wildcard => Err(invalid())?,
            Some("*") => {
                wildcard = true;
                Ok(None)
            }
            Some(piece) => parse_numeric(piece, whole).map(Some),
        }
    };

    let minor = parse_component(components.next())?;
    let patch = parse_component(components.next())?;
    if components.next().is_some() {
        return Err(invalid())?;
    }

    let pre = match pre {
        // A pre-release only makes sense against a fully specified version.
        Some(_) if patch.is_none() => return Err(invalid())?,
        Some(pre) => parse_pre(pre, whole)?,
        None => Vec::new(),
    };

    Ok(Partial {
        major,
        minor,
        patch,
        pre,
    })
}

fn parse_single(s: &str, whole: &str) -> Res<Single> {
    if s == "*" {
        return Ok(Single::Any);
    }

    let (op, rest) = if s.starts_with(">=") {
        (Op::Ge, &s[2..])
    } else if s.starts_with("<=") {
        (Op::Le, &s[2..])
    } else if s.starts_with("==") {
        (Op::Exact, &s[2..])
    } else if s.starts_with("!=") {
        (Op::Ne, &s[2..])
    } else if s.starts_with('>') {
        (Op::Gt, &s[1..])
    } else if s.starts_with('<') {
        (Op::Lt, &s[1..])
    } else if s.starts_with('^') {
        (Op::Compatible, &s[1..])
    } else if s.starts_with('~') {
        (Op::Tilde, &s[1..])
    } else {
        (Op::Exact, s)
    };

    let partial = parse_partial(rest, whole)?;
    Ok(Single::Range { op, partial })
}

impl FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut singles = Vec::new();
        let mut pieces = Vec::new();
        for piece in s.split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                return Err(ErrorKind::InvalidConstraint(s.to_string()))?;
            }
            singles.push(parse_single(piece, s)?);
            pieces.push(piece);
        }
        Ok(Constraint {
            singles,
            text: pieces.join(", "),
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Serialize for Constraint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

/// Selects the minimum version satisfying `constraint`, or `None`.
pub fn select_min(versions: &[Version], constraint: &Constraint) -> Option<Version> {
    let mut sorted = versions.to_vec();
    sorted.sort();
    sorted.into_iter().find(|v| constraint.satisfies(v))
}

/// Selects the minimum version satisfying *every* constraint simultaneously,
/// or `None`. This is the diamond-reconciliation form; for a single
/// constraint it degenerates to `select_min`.
pub fn select_min_all(versions: &[Version], constraints: &[Constraint]) -> Option<Version> {
    let mut sorted = versions.to_vec();
    sorted.sort();
    sorted
        .into_iter()
        .find(|v| constraints.iter().all(|c| c.satisfies(v)))
}
