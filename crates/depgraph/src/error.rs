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

use depgraph_util::ids::ModuleId;
use thiserror::Error;

/// A failure recorded while building the graph. Failures are cached on the
/// selector, component or edge they belong to and never abort the traversal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveFailure {
    #[error("Could not find {0}.")]
    NotFound(String),
    #[error("{}", no_matching_version(.selector, .unmatched, .rejected))]
    NoMatchingVersion {
        selector: String,
        unmatched: Vec<String>,
        rejected: Vec<String>,
    },
    #[error("Could not resolve {selector}: {reason}")]
    Unresolvable { selector: String, reason: String },
    #[error("Could not fetch metadata of {id}: {reason}")]
    Metadata { id: String, reason: String },
    #[error("Invalid version constraint in {selector}: {reason}")]
    InvalidConstraint { selector: String, reason: String },
    #[error("{0}")]
    Rejected(String),
    #[error("Multiple forces on different versions for virtual platform {0}")]
    PlatformForces(ModuleId),
    #[error("Multiple incompatible variants of {component} were selected:\n{details}")]
    IncompatibleVariants { component: String, details: String },
    #[error("Conflict found for module {module} between versions {}", .versions.join(" and "))]
    VersionConflict {
        module: ModuleId,
        versions: Vec<String>,
    },
}

fn no_matching_version(selector: &str, unmatched: &[String], rejected: &[String]) -> String {
    let mut msg = format!("Could not find any version that matches {}.", selector);
    if !unmatched.is_empty() {
        msg.push_str(&format!("\nVersions that do not match: {}", unmatched.join(", ")));
    }
    if !rejected.is_empty() {
        msg.push_str(&format!(
            "\nVersions rejected by constraints: {}",
            rejected.join(", ")
        ));
    }
    msg
}

impl ResolveFailure {
    pub fn unresolvable(selector: impl ToString, reason: impl Into<String>) -> Self {
        ResolveFailure::Unresolvable {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// All failures of a resolution, one per line.
#[derive(Debug)]
pub struct GraphResolveErrors(pub Vec<ResolveFailure>);

impl std::fmt::Display for GraphResolveErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphResolveErrors {}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn messages() {
        let err = ResolveFailure::NoMatchingVersion {
            selector: "org:a:[2.0,3.0)".to_string(),
            unmatched: vec!["1.0.0".to_string()],
            rejected: vec![],
        };
        expect![[r#"
            Could not find any version that matches org:a:[2.0,3.0).
            Versions that do not match: 1.0.0"#]]
        .assert_eq(&err.to_string());

        let errs = GraphResolveErrors(vec![
            ResolveFailure::NotFound("org:b:1.0".to_string()),
            ResolveFailure::unresolvable(
                "org:c:1.+",
                "Resolution strategy disallows usage of dynamic versions",
            ),
        ]);
        expect![[r#"
            Could not find org:b:1.0.
            Could not resolve org:c:1.+: Resolution strategy disallows usage of dynamic versions
        "#]]
        .assert_eq(&errs.to_string());
    }
}
