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

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An ordered set of `key = value` attributes attached to variants and
/// requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

/// Both sides of a merge define the same attribute with different values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Conflicting values for attribute '{key}': '{left}' and '{right}'")]
pub struct AttributeMergeError {
    pub key: String,
    pub left: String,
    pub right: String,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes::default()
    }

    pub fn of<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Attributes(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merges `other` into `self`, failing if a key is defined on both sides
    /// with different values. The error's `left` is the value from `self`.
    pub fn concat_safe(&self, other: &Attributes) -> Result<Attributes, AttributeMergeError> {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            match merged.get(k) {
                Some(existing) if existing != v => {
                    return Err(AttributeMergeError {
                        key: k.clone(),
                        left: existing.clone(),
                        right: v.clone(),
                    });
                }
                _ => {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(Attributes(merged))
    }

    /// Merges `other` into `self`; values from `other` win.
    pub fn overlay(&self, other: &Attributes) -> Attributes {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Attributes(merged)
    }
}

impl std::fmt::Display for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Compatibility rules between a requested attribute value and the value a
/// variant provides. Values are compatible when equal, or when a rule lists the
/// provided value as acceptable for the requested one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributesSchema {
    #[serde(default)]
    compatible: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl AttributesSchema {
    pub fn new() -> Self {
        AttributesSchema::default()
    }

    /// Declares that a variant providing `produced` satisfies a request for
    /// `requested` on attribute `key`.
    pub fn add_compatibility(&mut self, key: &str, requested: &str, produced: &str) -> &mut Self {
        self.compatible
            .entry(key.to_string())
            .or_default()
            .entry(requested.to_string())
            .or_default()
            .insert(produced.to_string());
        self
    }

    pub fn is_compatible(&self, key: &str, requested: &str, produced: &str) -> bool {
        requested == produced
            || self
                .compatible
                .get(key)
                .and_then(|rules| rules.get(requested))
                .is_some_and(|accepted| accepted.contains(produced))
    }

    /// Every attribute present on both sides must be compatible.
    pub fn matches(&self, requested: &Attributes, produced: &Attributes) -> bool {
        requested.iter().all(|(k, v)| match produced.get(k) {
            Some(p) => self.is_compatible(k, v, p),
            None => true,
        })
    }

    /// Symmetric check used for two variants of the same component that both
    /// ended up in the graph.
    pub fn mutually_compatible(&self, a: &Attributes, b: &Attributes) -> bool {
        a.iter().all(|(k, va)| match b.get(k) {
            Some(vb) => self.is_compatible(k, va, vb) || self.is_compatible(k, vb, va),
            None => true,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn concat_safe_reports_both_values() {
        let constraint = Attributes::of([("usage", "api")]);
        let dependency = Attributes::of([("usage", "runtime"), ("os", "linux")]);
        let err = constraint.concat_safe(&dependency).unwrap_err();
        expect!["Conflicting values for attribute 'usage': 'api' and 'runtime'"]
            .assert_eq(&err.to_string());

        let merged = Attributes::of([("os", "linux")])
            .concat_safe(&dependency)
            .unwrap();
        expect!["{os=linux, usage=runtime}"].assert_eq(&merged.to_string());
    }

    #[test]
    fn schema_rules() {
        let mut schema = AttributesSchema::new();
        schema.add_compatibility("usage", "api", "runtime");
        let requested = Attributes::of([("usage", "api")]);
        assert!(schema.matches(&requested, &Attributes::of([("usage", "runtime")])));
        assert!(!schema.matches(&requested, &Attributes::of([("usage", "docs")])));
        assert!(schema.matches(&requested, &Attributes::new()));
    }
}
