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

use serde::{Deserialize, Serialize};

use crate::{version::VersionSelector, ModelError};

/// A version constraint as declared on a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer: Option<String>,
    /// A strict version cannot be upgraded by conflict resolution, and every
    /// version it does not accept is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strictly: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<String>,
}

impl VersionConstraint {
    pub fn require(version: impl Into<String>) -> Self {
        VersionConstraint {
            require: Some(version.into()),
            ..Default::default()
        }
    }

    pub fn strictly(version: impl Into<String>) -> Self {
        VersionConstraint {
            strictly: Some(version.into()),
            ..Default::default()
        }
    }

    pub fn prefer(version: impl Into<String>) -> Self {
        VersionConstraint {
            prefer: Some(version.into()),
            ..Default::default()
        }
    }

    pub fn with_reject(mut self, version: impl Into<String>) -> Self {
        self.reject.push(version.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.require.is_none()
            && self.prefer.is_none()
            && self.strictly.is_none()
            && self.reject.is_empty()
    }

    pub fn is_strict(&self) -> bool {
        self.strictly.is_some()
    }

    pub fn resolve(&self) -> Result<ResolvedVersionConstraint, ModelError> {
        let strict = self
            .strictly
            .as_deref()
            .map(VersionSelector::parse)
            .transpose()?;
        let preferred = self
            .prefer
            .as_deref()
            .map(VersionSelector::parse)
            .transpose()?;
        let required = match &strict {
            Some(s) => Some(s.clone()),
            None => match self.require.as_deref() {
                Some(r) => Some(VersionSelector::parse(r)?),
                None => preferred.clone(),
            },
        };
        let mut rejects = self
            .reject
            .iter()
            .map(|r| VersionSelector::parse(r))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(s) = &strict {
            rejects.push(VersionSelector::Not(Box::new(s.clone())));
        }
        Ok(ResolvedVersionConstraint {
            required,
            preferred,
            rejected: VersionSelector::union(rejects),
            strict: strict.is_some(),
        })
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(strict) = &self.strictly {
            if self.reject.is_empty() {
                return write!(f, "{{strictly {}}}", strict);
            }
        }
        if let Some(require) = &self.require {
            if self.prefer.is_none() && self.strictly.is_none() && self.reject.is_empty() {
                return write!(f, "{}", require);
            }
        }
        let mut parts = vec![];
        if let Some(s) = &self.strictly {
            parts.push(format!("strictly {}", s));
        }
        if let Some(r) = &self.require {
            parts.push(format!("require {}", r));
        }
        if let Some(p) = &self.prefer {
            parts.push(format!("prefer {}", p));
        }
        if !self.reject.is_empty() {
            parts.push(format!("reject {}", self.reject.join(" & ")));
        }
        if parts.is_empty() {
            return Ok(());
        }
        write!(f, "{{{}}}", parts.join("; "))
    }
}

/// A version constraint with its selectors parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedVersionConstraint {
    /// `None` when the declaration has no opinion on the version.
    pub required: Option<VersionSelector>,
    pub preferred: Option<VersionSelector>,
    pub rejected: Option<VersionSelector>,
    pub strict: bool,
}

impl ResolvedVersionConstraint {
    /// The constraint of a dependency whose version is dictated by a strict
    /// version of one of its consumers.
    pub fn no_opinion() -> Self {
        ResolvedVersionConstraint {
            required: None,
            preferred: None,
            rejected: None,
            strict: false,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.required.as_ref().is_some_and(|r| r.is_dynamic())
    }

    pub fn has_opinion(&self) -> bool {
        self.required.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn display() {
        expect!["1.0"].assert_eq(&VersionConstraint::require("1.0").to_string());
        expect!["{strictly 1.5}"].assert_eq(&VersionConstraint::strictly("1.5").to_string());
        expect!["{require 1.0; reject 1.1}"]
            .assert_eq(&VersionConstraint::require("1.0").with_reject("1.1").to_string());
    }

    #[test]
    fn strict_rejects_everything_else() {
        let resolved = VersionConstraint::strictly("1.5").resolve().unwrap();
        assert!(resolved.strict);
        let rejected = resolved.rejected.unwrap();
        assert!(rejected.accept_str("1.6"));
        assert!(!rejected.accept_str("1.5"));
    }

    #[test]
    fn prefer_stands_in_for_require() {
        let resolved = VersionConstraint::prefer("2.0").resolve().unwrap();
        assert!(resolved.has_opinion());
        assert!(!resolved.is_dynamic());
    }
}
