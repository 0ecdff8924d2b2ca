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

//! Dependency substitution and module replacement rules.

use std::collections::HashMap;

use depgraph_util::{ids::ModuleId, metadata::DependencyMetadata, selector::ComponentSelector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionResult {
    Unchanged,
    Substituted {
        target: ComponentSelector,
        reason: String,
    },
    Failed(String),
}

/// Rewrites the target of dependencies before they are resolved.
pub trait DependencySubstitutions {
    fn substitute(&self, dependency: &DependencyMetadata) -> SubstitutionResult;
}

#[derive(Debug, Clone)]
struct SubstitutionRule {
    from: ModuleId,
    /// Only substitute this exact requested version, when set.
    version: Option<String>,
    to: ComponentSelector,
    reason: String,
}

/// Ordered substitution rules; the first matching rule applies.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionRules {
    rules: Vec<SubstitutionRule>,
}

impl SubstitutionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn substitute_module(
        &mut self,
        from: ModuleId,
        version: Option<&str>,
        to: ComponentSelector,
        reason: impl Into<String>,
    ) -> &mut Self {
        self.rules.push(SubstitutionRule {
            from,
            version: version.map(str::to_string),
            to,
            reason: reason.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl DependencySubstitutions for SubstitutionRules {
    fn substitute(&self, dependency: &DependencyMetadata) -> SubstitutionResult {
        let ComponentSelector::Module {
            module, constraint, ..
        } = &dependency.selector
        else {
            return SubstitutionResult::Unchanged;
        };
        for rule in &self.rules {
            if rule.from != *module {
                continue;
            }
            if let Some(v) = &rule.version {
                if constraint.require.as_ref() != Some(v) && constraint.strictly.as_ref() != Some(v)
                {
                    continue;
                }
            }
            if rule.to == dependency.selector {
                return SubstitutionResult::Unchanged;
            }
            return SubstitutionResult::Substituted {
                target: rule.to.clone(),
                reason: rule.reason.clone(),
            };
        }
        SubstitutionResult::Unchanged
    }
}

/// Declares that a module was superseded by another one, e.g. after a
/// rename. Both cannot coexist in the graph; the replacement wins.
#[derive(Debug, Clone, Default)]
pub struct ModuleReplacements {
    replaced_by: HashMap<ModuleId, (ModuleId, Option<String>)>,
}

impl ModuleReplacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, source: ModuleId, target: ModuleId, reason: Option<&str>) -> &mut Self {
        self.replaced_by
            .insert(source, (target, reason.map(str::to_string)));
        self
    }

    pub fn replacement_for(&self, module: &ModuleId) -> Option<&ModuleId> {
        self.replaced_by.get(module).map(|(target, _)| target)
    }

    pub fn reason_for(&self, module: &ModuleId) -> Option<&str> {
        self.replaced_by.get(module).and_then(|(_, r)| r.as_deref())
    }

    /// Modules replaced by `target`.
    pub fn sources_of<'a>(&'a self, target: &'a ModuleId) -> impl Iterator<Item = &'a ModuleId> + 'a {
        self.replaced_by
            .iter()
            .filter(move |(_, (t, _))| t == target)
            .map(|(s, _)| s)
    }

    pub fn is_empty(&self) -> bool {
        self.replaced_by.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use depgraph_util::constraint::VersionConstraint;

    #[test]
    fn version_specific_rules() {
        let mut rules = SubstitutionRules::new();
        let to = ComponentSelector::module("org:new".parse().unwrap(), VersionConstraint::require("2.0"));
        rules.substitute_module("org:old".parse().unwrap(), Some("1.0"), to.clone(), "renamed");

        let dep = |v: &str| {
            DependencyMetadata::new(ComponentSelector::module(
                "org:old".parse().unwrap(),
                VersionConstraint::require(v),
            ))
        };
        assert_eq!(
            rules.substitute(&dep("1.0")),
            SubstitutionResult::Substituted {
                target: to,
                reason: "renamed".to_string()
            }
        );
        assert_eq!(rules.substitute(&dep("1.1")), SubstitutionResult::Unchanged);
    }
}
