// depgraph: The dependency graph resolution engine.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Version scheme: lenient semver parsing, version selectors and ordering.

use std::cmp::Ordering;

use semver::{Version, VersionReq};

use crate::ModelError;

/// Parses a version, accepting the short forms `1` and `1.5` as `1.0.0` and
/// `1.5.0`.
pub fn parse_version(s: &str) -> Result<Version, ModelError> {
    let s = s.trim();
    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }
    let split = s.find(['-', '+']).unwrap_or(s.len());
    let (core, rest) = s.split_at(split);
    let mut padded = core.to_string();
    for _ in core.split('.').count()..3 {
        padded.push_str(".0");
    }
    padded.push_str(rest);
    Version::parse(&padded).map_err(|e| ModelError::InvalidVersion(s.to_string(), e.to_string()))
}

/// Orders two version strings. Unparsable versions sort below parsable ones
/// and lexically among themselves.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Matches candidate versions for a requested version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSelector {
    Exact(Version),
    /// A range or wildcard; always dynamic.
    Range(VersionReq),
    /// `+` or `latest`: the highest available version.
    Latest,
    /// Accepts exactly what the inner selector rejects.
    Not(Box<VersionSelector>),
    /// Accepts what any of the inner selectors accepts.
    AnyOf(Vec<VersionSelector>),
}

impl VersionSelector {
    /// Parses a selector.
    ///
    /// Accepted forms are plain versions (`1.2`, `1.2.3-rc.1`), `+`/`latest`,
    /// prefix wildcards (`1.+`, `1.*`), bracket ranges (`[1.0,2.0)`) and
    /// semver requirements (`^1.2`, `>=1, <2`).
    pub fn parse(s: &str) -> Result<VersionSelector, ModelError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelError::InvalidSelector(
                s.to_string(),
                "empty selector".to_string(),
            ));
        }
        if matches!(s, "+" | "*" | "latest" | "latest.release" | "latest.integration") {
            return Ok(VersionSelector::Latest);
        }
        if let Some(prefix) = s.strip_suffix(".+") {
            return Self::parse_req(s, &format!("{}.*", prefix));
        }
        if s.starts_with('[') || s.starts_with('(') || s.starts_with(']') {
            return Self::parse_req(s, &bracket_range_to_req(s)?);
        }
        if s.starts_with(['^', '~', '<', '>', '=']) || s.contains(['*', ',', ' ']) {
            return Self::parse_req(s, s);
        }
        parse_version(s)
            .map(VersionSelector::Exact)
            .map_err(|e| ModelError::InvalidSelector(s.to_string(), e.to_string()))
    }

    fn parse_req(original: &str, req: &str) -> Result<VersionSelector, ModelError> {
        VersionReq::parse(req)
            .map(VersionSelector::Range)
            .map_err(|e| ModelError::InvalidSelector(original.to_string(), e.to_string()))
    }

    pub fn accept(&self, version: &Version) -> bool {
        match self {
            VersionSelector::Exact(v) => v == version,
            VersionSelector::Range(req) => req.matches(version),
            VersionSelector::Latest => true,
            VersionSelector::Not(inner) => !inner.accept(version),
            VersionSelector::AnyOf(all) => all.iter().any(|s| s.accept(version)),
        }
    }

    /// Like [`VersionSelector::accept`], for a raw version string. Strings
    /// that are not versions are only accepted by [`VersionSelector::Latest`]
    /// or a negation.
    pub fn accept_str(&self, version: &str) -> bool {
        match parse_version(version) {
            Ok(v) => self.accept(&v),
            Err(_) => match self {
                VersionSelector::Latest => true,
                VersionSelector::Not(inner) => !inner.accept_str(version),
                VersionSelector::AnyOf(all) => all.iter().any(|s| s.accept_str(version)),
                _ => false,
            },
        }
    }

    /// Whether the selector needs the list of available versions to pick one.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, VersionSelector::Range(_) | VersionSelector::Latest)
    }

    pub fn exact(&self) -> Option<&Version> {
        match self {
            VersionSelector::Exact(v) => Some(v),
            _ => None,
        }
    }

    /// Unions a set of reject selectors; `None` if there is nothing to reject.
    pub fn union(selectors: impl IntoIterator<Item = VersionSelector>) -> Option<VersionSelector> {
        let mut all: Vec<VersionSelector> = vec![];
        for s in selectors {
            match s {
                VersionSelector::AnyOf(inner) => all.extend(inner),
                other => all.push(other),
            }
        }
        all.dedup();
        match all.len() {
            0 => None,
            1 => all.pop(),
            _ => Some(VersionSelector::AnyOf(all)),
        }
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSelector::Exact(v) => write!(f, "{}", v),
            VersionSelector::Range(req) => write!(f, "{}", req),
            VersionSelector::Latest => write!(f, "+"),
            VersionSelector::Not(inner) => write!(f, "!({})", inner),
            VersionSelector::AnyOf(all) => {
                for (i, s) in all.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", s)?;
                }
                Ok(())
            }
        }
    }
}

fn bracket_range_to_req(s: &str) -> Result<String, ModelError> {
    let bad = || ModelError::InvalidSelector(s.to_string(), "malformed range".to_string());
    if s.len() < 2 {
        return Err(bad());
    }
    let open = s.chars().next().ok_or_else(bad)?;
    let close = s.chars().last().ok_or_else(bad)?;
    let inner = &s[1..s.len() - 1];
    let (low, high) = inner.split_once(',').ok_or_else(bad)?;
    let (low, high) = (low.trim(), high.trim());
    let mut parts = vec![];
    if !low.is_empty() {
        let low = parse_version(low)?;
        parts.push(match open {
            '[' => format!(">={}", low),
            '(' | ']' => format!(">{}", low),
            _ => return Err(bad()),
        });
    }
    if !high.is_empty() {
        let high = parse_version(high)?;
        parts.push(match close {
            ']' => format!("<={}", high),
            ')' | '[' => format!("<{}", high),
            _ => return Err(bad()),
        });
    }
    if parts.is_empty() {
        return Ok("*".to_string());
    }
    Ok(parts.join(", "))
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn lenient_versions() {
        expect!["1.0.0"].assert_eq(&v("1").to_string());
        expect!["1.5.0"].assert_eq(&v("1.5").to_string());
        expect!["1.5.0-rc.1"].assert_eq(&v("1.5-rc.1").to_string());
        assert!(parse_version("abc").is_err());
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
    }

    #[test]
    fn selectors() {
        let exact = VersionSelector::parse("1.5").unwrap();
        assert!(!exact.is_dynamic());
        assert!(exact.accept(&v("1.5.0")));
        assert!(!exact.accept(&v("1.6.0")));

        let range = VersionSelector::parse("[1.0,2.0)").unwrap();
        expect![">=1.0.0, <2.0.0"].assert_eq(&range.to_string());
        assert!(range.is_dynamic());
        assert!(range.accept(&v("1.9")));
        assert!(!range.accept(&v("2.0")));

        let prefix = VersionSelector::parse("1.+").unwrap();
        assert!(prefix.accept(&v("1.3")));
        assert!(!prefix.accept(&v("2.0")));

        let latest = VersionSelector::parse("latest").unwrap();
        assert!(latest.accept_str("whatever"));

        let not = VersionSelector::Not(Box::new(exact));
        assert!(not.accept(&v("1.6")));
        assert!(!not.accept(&v("1.5")));
    }
}
