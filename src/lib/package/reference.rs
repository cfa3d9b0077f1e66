//! Domain-qualified references to concepts and pipes.
//!
//! A reference is split on its *last* dot into a domain path and a local
//! code: `legal.contracts.NonCompeteClause` has domain path `legal.contracts`
//! and local code `NonCompeteClause`; a bare `compute_score` has no domain
//! path at all. Concept codes are PascalCase, pipe codes are snake_case, and
//! that difference is what the two typed entry points enforce. A reference
//! may also carry a cross-package prefix: `alias->domain.pipe_code`.

use std::fmt;

use util::errors::*;
use util::{is_pascal_case, is_snake_case};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedRef {
    domain_path: Option<String>,
    local_code: String,
    cross_package: bool,
}

impl QualifiedRef {
    /// Splits a raw reference on its last dot. No naming-convention check is
    /// applied to the local code; use `parse_concept_ref` or `parse_pipe_ref`
    /// for that.
    pub fn parse(raw: &str) -> Res<QualifiedRef> {
        if raw.is_empty() {
            return Err(ErrorKind::InvalidRef(
                "qualified reference cannot be empty".to_string(),
            ))?;
        }
        if raw.starts_with('.') || raw.ends_with('.') {
            return Err(ErrorKind::InvalidRef(format!(
                "reference '{}' must not start or end with a dot",
                raw
            )))?;
        }
        if raw.contains("..") {
            return Err(ErrorKind::InvalidRef(format!(
                "reference '{}' must not contain consecutive dots",
                raw
            )))?;
        }

        let cross_package = raw.contains("->");
        let refr = match raw.rfind('.') {
            None => QualifiedRef {
                domain_path: None,
                local_code: raw.to_string(),
                cross_package,
            },
            Some(dot) => QualifiedRef {
                domain_path: Some(raw[..dot].to_string()),
                local_code: raw[dot + 1..].to_string(),
                cross_package,
            },
        };
        Ok(refr)
    }

    /// Parses a concept reference: snake_case domain segments, PascalCase
    /// local code.
    pub fn parse_concept_ref(raw: &str) -> Res<QualifiedRef> {
        let refr = QualifiedRef::parse(raw)?;
        if !is_pascal_case(&refr.local_code) {
            return Err(ErrorKind::InvalidRef(format!(
                "concept code '{}' in reference '{}' must be PascalCase",
                refr.local_code, raw
            )))?;
        }
        refr.validate_domain_path(raw)?;
        Ok(refr)
    }

    /// Parses a pipe reference: snake_case domain segments, snake_case local
    /// code.
    pub fn parse_pipe_ref(raw: &str) -> Res<QualifiedRef> {
        let refr = QualifiedRef::parse(raw)?;
        if !is_snake_case(&refr.local_code) {
            return Err(ErrorKind::InvalidRef(format!(
                "pipe code '{}' in reference '{}' must be snake_case",
                refr.local_code, raw
            )))?;
        }
        refr.validate_domain_path(raw)?;
        Ok(refr)
    }

    fn validate_domain_path(&self, raw: &str) -> Res<()> {
        if let Some(ref domain_path) = self.domain_path {
            for segment in domain_path.split('.') {
                if !is_snake_case(segment) {
                    return Err(ErrorKind::InvalidRef(format!(
                        "domain segment '{}' in reference '{}' must be snake_case",
                        segment, raw
                    )))?;
                }
            }
        }
        Ok(())
    }

    /// Builds a reference from already-known parts.
    pub fn from_parts(domain_path: &str, local_code: &str) -> QualifiedRef {
        QualifiedRef {
            domain_path: Some(domain_path.to_string()),
            local_code: local_code.to_string(),
            cross_package: false,
        }
    }

    pub fn domain_path(&self) -> Option<&str> {
        self.domain_path.as_ref().map(|s| s.as_str())
    }

    pub fn local_code(&self) -> &str {
        &self.local_code
    }

    pub fn is_qualified(&self) -> bool {
        self.domain_path.is_some()
    }

    pub fn is_cross_package(&self) -> bool {
        self.cross_package
    }

    /// True if this reference belongs to the given domain (same domain, or
    /// bare).
    pub fn is_local_to(&self, domain: &str) -> bool {
        match self.domain_path {
            None => true,
            Some(ref domain_path) => domain_path == domain,
        }
    }

    /// True if this reference is qualified and points at a different domain.
    pub fn is_external_to(&self, domain: &str) -> bool {
        match self.domain_path {
            None => false,
            Some(ref domain_path) => domain_path != domain,
        }
    }

    /// True if a raw reference contains the cross-package `->` infix.
    pub fn has_cross_package_prefix(raw: &str) -> bool {
        raw.contains("->")
    }

    /// Splits `alias->rest` on the first `->` into `(alias, rest)`.
    pub fn split_cross_package_ref(raw: &str) -> Res<(&str, &str)> {
        match raw.find("->") {
            Some(arrow) => Ok((&raw[..arrow], &raw[arrow + 2..])),
            None => Err(ErrorKind::InvalidRef(format!(
                "reference '{}' is not a cross-package reference (no '->' found)",
                raw
            )))?,
        }
    }
}

impl fmt::Display for QualifiedRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.domain_path {
            Some(ref domain_path) => write!(f, "{}.{}", domain_path, self.local_code),
            None => write!(f, "{}", self.local_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_last_dot() {
        let refr = QualifiedRef::parse("legal.contracts.NonCompeteClause").unwrap();
        assert_eq!(refr.domain_path(), Some("legal.contracts"));
        assert_eq!(refr.local_code(), "NonCompeteClause");
        assert!(refr.is_qualified());
        assert_eq!(refr.to_string(), "legal.contracts.NonCompeteClause");
    }

    #[test]
    fn bare_ref() {
        let refr = QualifiedRef::parse("compute_score").unwrap();
        assert_eq!(refr.domain_path(), None);
        assert_eq!(refr.local_code(), "compute_score");
        assert!(!refr.is_qualified());
    }

    #[test]
    fn malformed_refs() {
        assert!(QualifiedRef::parse("").is_err());
        assert!(QualifiedRef::parse(".leading").is_err());
        assert!(QualifiedRef::parse("trailing.").is_err());
        assert!(QualifiedRef::parse("a..b").is_err());
    }

    #[test]
    fn concept_refs_are_pascal_case() {
        assert!(QualifiedRef::parse_concept_ref("legal.NonCompeteClause").is_ok());
        assert!(QualifiedRef::parse_concept_ref("legal.non_compete").is_err());
        assert!(QualifiedRef::parse_concept_ref("Legal.NonCompeteClause").is_err());
    }

    #[test]
    fn pipe_refs_are_snake_case() {
        assert!(QualifiedRef::parse_pipe_ref("scoring.compute_score").is_ok());
        assert!(QualifiedRef::parse_pipe_ref("compute_score").is_ok());
        assert!(QualifiedRef::parse_pipe_ref("scoring.ComputeScore").is_err());
        assert!(QualifiedRef::parse_pipe_ref("Scoring.compute_score").is_err());
    }

    #[test]
    fn domain_locality() {
        let refr = QualifiedRef::parse_pipe_ref("scoring.compute_score").unwrap();
        assert!(refr.is_local_to("scoring"));
        assert!(!refr.is_local_to("legal"));
        assert!(refr.is_external_to("legal"));
        assert!(!refr.is_external_to("scoring"));

        let bare = QualifiedRef::parse_pipe_ref("compute_score").unwrap();
        assert!(bare.is_local_to("anything"));
        assert!(!bare.is_external_to("anything"));
    }

    #[test]
    fn cross_package_refs() {
        assert!(QualifiedRef::has_cross_package_prefix("dep->scoring.run"));
        assert!(!QualifiedRef::has_cross_package_prefix("scoring.run"));

        let (alias, rest) = QualifiedRef::split_cross_package_ref("dep->scoring.run").unwrap();
        assert_eq!(alias, "dep");
        assert_eq!(rest, "scoring.run");

        assert!(QualifiedRef::split_cross_package_ref("scoring.run").is_err());

        let refr = QualifiedRef::parse("dep->scoring.run").unwrap();
        assert!(refr.is_cross_package());
        // The typed pipe-ref entry point rejects the arrow in its segments.
        assert!(QualifiedRef::parse_pipe_ref("dep->scoring.run").is_err());
    }
}
