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

//! Pluggable conflict resolution policies.

use std::cmp::Ordering;

use depgraph_util::{
    ids::{Capability, ComponentId},
    version::compare_versions,
};

#[derive(Debug, Clone, Copy)]
pub struct ConflictCandidate<'c> {
    pub id: &'c ComponentId,
    pub rejected: bool,
}

/// Picks the winner among competing versions of one module, or among the
/// modules of a replacement conflict.
pub trait ModuleConflictResolver {
    /// Index of the winning candidate; `None` leaves the decision to the next
    /// resolver.
    fn select(&self, candidates: &[ConflictCandidate]) -> Option<usize>;
}

/// Project components win. Returns `None` when there is no project candidate.
pub struct ProjectDependencyResolver;

impl ModuleConflictResolver for ProjectDependencyResolver {
    fn select(&self, candidates: &[ConflictCandidate]) -> Option<usize> {
        candidates.iter().position(|c| c.id.is_project())
    }
}

/// The highest version wins; the first candidate wins among equals.
pub struct LatestModuleConflictResolver;

impl ModuleConflictResolver for LatestModuleConflictResolver {
    fn select(&self, candidates: &[ConflictCandidate]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, c) in candidates.iter().enumerate() {
            match best {
                None => best = Some(i),
                Some(b) => {
                    if compare_versions(c.id.version(), candidates[b].id.version())
                        == Ordering::Greater
                    {
                        best = Some(i)
                    }
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CapabilityCandidate<'c> {
    pub component: &'c ComponentId,
    pub variant: &'c str,
    pub capability: &'c Capability,
}

/// Picks the node that keeps a contested capability.
pub trait CapabilityConflictResolver {
    fn select(&self, capability: &str, candidates: &[CapabilityCandidate]) -> Option<usize>;
}

/// Keeps the candidate providing the highest capability version. Gives up
/// when a candidate does not declare a version.
pub struct HighestCapabilityVersionResolver;

impl CapabilityConflictResolver for HighestCapabilityVersionResolver {
    fn select(&self, _capability: &str, candidates: &[CapabilityCandidate]) -> Option<usize> {
        let mut best: Option<(usize, &str)> = None;
        for (i, c) in candidates.iter().enumerate() {
            let version = c.capability.version.as_deref()?;
            match best {
                Some((_, v)) if compare_versions(version, v) != Ordering::Greater => {}
                _ => best = Some((i, version)),
            }
        }
        best.map(|(i, _)| i)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use depgraph_util::ids::ModuleVersionId;

    #[test]
    fn latest_and_project() {
        let a = ComponentId::Module(ModuleVersionId::new("org", "a", "1.10"));
        let b = ComponentId::Module(ModuleVersionId::new("org", "a", "1.9"));
        let p = ComponentId::Project {
            path: ":a".to_string(),
            module: ModuleVersionId::new("org", "a", "0.1"),
        };
        let candidates = [
            ConflictCandidate { id: &b, rejected: false },
            ConflictCandidate { id: &a, rejected: false },
            ConflictCandidate { id: &p, rejected: false },
        ];
        assert_eq!(LatestModuleConflictResolver.select(&candidates), Some(1));
        assert_eq!(ProjectDependencyResolver.select(&candidates), Some(2));
        assert_eq!(ProjectDependencyResolver.select(&candidates[..2]), None);
    }

    #[test]
    fn capability_versions() {
        let a = ComponentId::Module(ModuleVersionId::new("org", "a", "1.0"));
        let b = ComponentId::Module(ModuleVersionId::new("org", "b", "1.0"));
        let ca: Capability = "org:log:1.2".parse().unwrap();
        let cb: Capability = "org:log:2.0".parse().unwrap();
        let candidates = [
            CapabilityCandidate { component: &a, variant: "default", capability: &ca },
            CapabilityCandidate { component: &b, variant: "default", capability: &cb },
        ];
        assert_eq!(HighestCapabilityVersionResolver.select("org:log", &candidates), Some(1));

        let unversioned: Capability = "org:log".parse().unwrap();
        let candidates = [
            CapabilityCandidate { component: &a, variant: "default", capability: &ca },
            CapabilityCandidate { component: &b, variant: "default", capability: &unversioned },
        ];
        assert_eq!(HighestCapabilityVersionResolver.select("org:log", &candidates), None);
    }
}
