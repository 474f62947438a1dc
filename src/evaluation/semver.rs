//! Version parsing and precedence for the `semver*` operators.
//!
//! Accepts `MAJOR[.MINOR[.PATCH]][-PRERELEASE][+BUILD]`. Missing components
//! read as zero. Numeric components and numeric pre-release identifiers
//! must not carry leading zeros. Build metadata is dropped and plays no part
//! in ordering.

use std::cmp::Ordering;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{0}'")]
pub struct InvalidVersion(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Identifier {
    // Variant order matters: numeric identifiers sort before alphanumeric ones.
    Numeric(u64),
    AlphaNumeric(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pre: Vec<Identifier>,
}

impl Version {
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersion(s.to_string());

        let without_build = match s.split_once('+') {
            Some((head, build)) if valid_identifiers(build) => head,
            Some(_) => return Err(invalid()),
            None => s,
        };

        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) if valid_identifiers(pre) => (core, parse_prerelease(pre).ok_or_else(invalid)?),
            Some(_) => return Err(invalid()),
            None => (without_build, Vec::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = parse_number(part).ok_or_else(invalid)?;
        }

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release outranks any of its pre-releases.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_number(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

fn valid_identifiers(s: &str) -> bool {
    s.split('.').all(|id| {
        !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

fn parse_prerelease(s: &str) -> Option<Vec<Identifier>> {
    s.split('.')
        .map(|id| {
            if id.bytes().all(|b| b.is_ascii_digit()) {
                parse_number(id).map(Identifier::Numeric)
            } else {
                Some(Identifier::AlphaNumeric(id.to_string()))
            }
        })
        .collect()
}
