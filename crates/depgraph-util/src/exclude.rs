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

//! Module exclusion rules and the set algebra combining them along paths.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::ModuleId;

/// Excludes modules by group, by name, or both. A missing field matches
/// anything.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExcludeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl ExcludeRule {
    pub fn module(group: &str, module: &str) -> Self {
        ExcludeRule {
            group: Some(group.to_string()),
            module: Some(module.to_string()),
        }
    }

    pub fn group(group: &str) -> Self {
        ExcludeRule {
            group: Some(group.to_string()),
            module: None,
        }
    }

    pub fn matches(&self, id: &ModuleId) -> bool {
        self.group.as_ref().is_none_or(|g| *g == id.group)
            && self.module.as_ref().is_none_or(|m| *m == id.name)
    }
}

impl std::fmt::Debug for ExcludeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}",
            self.group.as_deref().unwrap_or("*"),
            self.module.as_deref().unwrap_or("*")
        )
    }
}

/// A normalized exclusion expression. Build values through
/// [`ModuleExclusions`] so that structurally equal filters compare equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExcludeSpec {
    Nothing,
    Rule(ExcludeRule),
    /// Union: excluded if any member excludes.
    AnyOf(BTreeSet<ExcludeSpec>),
    /// Intersection: excluded only if every member excludes.
    AllOf(BTreeSet<ExcludeSpec>),
}

impl ExcludeSpec {
    pub fn excludes(&self, id: &ModuleId) -> bool {
        match self {
            ExcludeSpec::Nothing => false,
            ExcludeSpec::Rule(rule) => rule.matches(id),
            ExcludeSpec::AnyOf(specs) => specs.iter().any(|s| s.excludes(id)),
            ExcludeSpec::AllOf(specs) => specs.iter().all(|s| s.excludes(id)),
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, ExcludeSpec::Nothing)
    }
}

impl std::fmt::Debug for ExcludeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExcludeSpec::Nothing => write!(f, "nothing"),
            ExcludeSpec::Rule(rule) => write!(f, "{:?}", rule),
            ExcludeSpec::AnyOf(specs) => write!(f, "any{:?}", specs),
            ExcludeSpec::AllOf(specs) => write!(f, "all{:?}", specs),
        }
    }
}

/// Factory for [`ExcludeSpec`] values.
pub struct ModuleExclusions;

impl ModuleExclusions {
    pub fn nothing() -> ExcludeSpec {
        ExcludeSpec::Nothing
    }

    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a ExcludeRule>) -> ExcludeSpec {
        Self::exclude_any(rules.into_iter().cloned().map(ExcludeSpec::Rule))
    }

    pub fn exclude_any(specs: impl IntoIterator<Item = ExcludeSpec>) -> ExcludeSpec {
        let mut set = BTreeSet::new();
        for spec in specs {
            match spec {
                ExcludeSpec::Nothing => {}
                ExcludeSpec::AnyOf(inner) => set.extend(inner),
                other => {
                    set.insert(other);
                }
            }
        }
        match set.len() {
            0 => ExcludeSpec::Nothing,
            1 => set.into_iter().next().unwrap_or(ExcludeSpec::Nothing),
            _ => ExcludeSpec::AnyOf(set),
        }
    }

    pub fn exclude_all(specs: impl IntoIterator<Item = ExcludeSpec>) -> ExcludeSpec {
        let mut set = BTreeSet::new();
        for spec in specs {
            match spec {
                ExcludeSpec::Nothing => return ExcludeSpec::Nothing,
                ExcludeSpec::AllOf(inner) => set.extend(inner),
                other => {
                    set.insert(other);
                }
            }
        }
        match set.len() {
            0 => ExcludeSpec::Nothing,
            1 => set.into_iter().next().unwrap_or(ExcludeSpec::Nothing),
            _ => ExcludeSpec::AllOf(set),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    fn id(s: &str) -> ModuleId {
        s.parse().unwrap()
    }

    #[test]
    fn normalization() {
        let a = ExcludeSpec::Rule(ExcludeRule::module("org", "a"));
        let b = ExcludeSpec::Rule(ExcludeRule::group("com"));

        let any = ModuleExclusions::exclude_any([a.clone(), ExcludeSpec::Nothing, a.clone()]);
        assert_eq!(any, a);

        let all = ModuleExclusions::exclude_all([a.clone(), ExcludeSpec::Nothing]);
        assert!(all.is_nothing());

        let both = ModuleExclusions::exclude_any([b.clone(), a.clone()]);
        let again = ModuleExclusions::exclude_any([a, b]);
        assert_eq!(both, again);
        expect!["any{com:*, org:a}"].assert_eq(&format!("{:?}", both));
    }

    #[test]
    fn intersection_needs_every_path() {
        let a = ExcludeSpec::Rule(ExcludeRule::module("org", "a"));
        let wide = ExcludeSpec::Rule(ExcludeRule::group("org"));
        let all = ModuleExclusions::exclude_all([a, wide]);
        assert!(all.excludes(&id("org:a")));
        assert!(!all.excludes(&id("org:b")));
    }
}
