//! Module `package` deals with all of the package-level artifacts: addresses,
//! manifests, version constraints, lock files, bundle metadata, and the
//! visibility rules that tie them together.

pub mod bundle;
pub mod lockfile;
pub mod manifest;
pub mod reference;
pub mod version;
pub mod visibility;

use failure::Error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, rc::Rc, str::FromStr};

use util::errors::*;

pub const MANIFEST_FILENAME: &'static str = "METHODS.toml";

/// Domain prefixes that user packages may never claim.
pub const RESERVED_DOMAINS: &'static [&'static str] = &["mthds", "native", "pipelex"];

/// True if the first segment of a dotted domain path is reserved.
pub fn is_reserved_domain_path(domain_path: &str) -> bool {
    let first = domain_path.split('.').next().unwrap_or("");
    RESERVED_DOMAINS.contains(&first)
}

/// Struct `PackageAddress` is the stable identity of a remote package: a
/// hostname-prefixed path like `github.com/org/repo`. The host part must
/// contain at least one dot, and the path must have at least one segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageAddress {
    inner: Rc<AddressInner>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct AddressInner {
    /// The serialized form of an address: "host.tld/segment(/segment)+"
    serialization: String,
    host: String,
    path: String,
}

impl PackageAddress {
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// The last path segment, which doubles as the package's natural name.
    pub fn name(&self) -> &str {
        self.inner
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&self.inner.path)
    }

    pub fn as_str(&self) -> &str {
        &self.inner.serialization
    }
}

fn valid_address_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

impl FromStr for PackageAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ErrorKind::InvalidAddress(s.to_string());

        let slash = s.find('/').ok_or_else(invalid)?;
        let (host, path) = (&s[..slash], &s[slash + 1..]);

        if host.is_empty() || !host.contains('.') || !host.chars().all(valid_address_char) {
            return Err(invalid())?;
        }
        if path.is_empty()
            || !path
                .split('/')
                .all(|seg| !seg.is_empty() && seg.chars().all(valid_address_char))
        {
            return Err(invalid())?;
        }

        Ok(PackageAddress {
            inner: Rc::new(AddressInner {
                serialization: s.to_string(),
                host: host.to_string(),
                path: path.to_string(),
            }),
        })
    }
}

impl fmt::Display for PackageAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for PackageAddress {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Serialize for PackageAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PackageAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}
