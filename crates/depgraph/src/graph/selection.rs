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

//! Picking one version of a module out of all the selectors targeting it.

use depgraph_util::{ids::ComponentId, version::VersionSelector};

use crate::{
    conflicts::ConflictCandidate, error::ResolveFailure, resolver::IdResolveResult,
    strategy::ConflictResolution,
};

use super::{
    component::{Rejection, SelectionCause},
    state::ResolveState,
    ComponentKey, ModuleKey, SelectorKey,
};

struct Candidate {
    id: ComponentId,
    rejected: bool,
}

impl ResolveState<'_> {
    /// Resolves every selector of `module` and returns the winning component.
    ///
    /// Hard forces beat soft (platform) forces, which beat every other
    /// selector. Selectors without an opinion only count when no selector
    /// has one, and otherwise follow the winner. Fails when no selector
    /// produced a candidate.
    pub(crate) fn select_best(&mut self, module: ModuleKey) -> Result<Option<ComponentKey>, ResolveFailure> {
        let selectors = self.modules[module].selectors.clone();
        if selectors.is_empty() {
            return Ok(None);
        }

        let all_rejects = VersionSelector::union(
            selectors
                .iter()
                .filter(|s| self.selectors[**s].has_opinion())
                .filter_map(|s| self.selectors[*s].rejects().cloned()),
        );
        let participants = self.participating_selectors(&selectors);

        let mut results: Vec<(SelectorKey, IdResolveResult)> = Vec::with_capacity(participants.len());
        for &selector in &participants {
            let result = self.resolve_selector(selector, all_rejects.as_ref());
            results.push((selector, result));
        }

        let candidates = self.collect_candidates(&results);
        if candidates.is_empty() {
            let failure = results
                .into_iter()
                .find_map(|(_, r)| r.failure)
                .unwrap_or_else(|| {
                    ResolveFailure::NotFound(self.modules[module].id.to_string())
                });
            return Err(failure);
        }

        if self.strategy.conflict_resolution == ConflictResolution::Strict && candidates.len() > 1 {
            let failure = ResolveFailure::VersionConflict {
                module: self.modules[module].id.clone(),
                versions: candidates.iter().map(|c| c.id.version().to_string()).collect(),
            };
            for (selector, _) in &results {
                self.selectors[*selector].failure = Some(failure.clone());
            }
            return Err(failure);
        }

        let winner = self.pick_candidate(&candidates);
        let chosen = &candidates[winner];
        let component = self.get_version(module, &chosen.id);
        // Selectors left out of selection settle on the winner.
        for selector in selectors {
            if !participants.contains(&selector) {
                self.override_selection(selector, component);
            }
        }
        let state = &mut self.components[component];
        if chosen.rejected {
            state.reject(Rejection::Constraints);
        } else if state.rejection == Some(Rejection::Constraints) {
            state.rejection = None;
        }
        if candidates.len() > 1 {
            let versions: Vec<&str> = candidates.iter().map(|c| c.id.version()).collect();
            state.add_cause(SelectionCause::ConflictResolution(format!(
                "between versions {}",
                versions.join(" and ")
            )));
        }
        Ok(Some(component))
    }

    fn participating_selectors(&self, selectors: &[SelectorKey]) -> Vec<SelectorKey> {
        let pick = |filter: &dyn Fn(SelectorKey) -> bool| -> Vec<SelectorKey> {
            selectors.iter().copied().filter(|s| filter(*s)).collect()
        };
        let hard = pick(&|s| self.selectors[s].forced && !self.selectors[s].soft_forced);
        if !hard.is_empty() {
            return hard;
        }
        let soft = pick(&|s| self.selectors[s].soft_forced);
        if !soft.is_empty() {
            return soft;
        }
        let opinionated = pick(&|s| self.selectors[s].has_opinion());
        if !opinionated.is_empty() {
            return opinionated;
        }
        selectors.to_vec()
    }

    /// Distinct candidate ids. A dynamic selector accepting a candidate of a
    /// fixed selector does not add its own.
    fn collect_candidates(&self, results: &[(SelectorKey, IdResolveResult)]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = vec![];
        let add = |candidates: &mut Vec<Candidate>, result: &IdResolveResult| {
            let Some(id) = &result.id else {
                return;
            };
            match candidates.iter_mut().find(|c| c.id == *id) {
                Some(existing) => existing.rejected &= result.rejected,
                None => candidates.push(Candidate {
                    id: id.clone(),
                    rejected: result.rejected,
                }),
            }
        };

        for (selector, result) in results {
            if !self.selectors[*selector].is_dynamic() {
                add(&mut candidates, result);
            }
        }
        for (selector, result) in results {
            let state = &self.selectors[*selector];
            if !state.is_dynamic() {
                continue;
            }
            let required = state.version_constraint().and_then(|c| c.required.as_ref());
            let satisfied = candidates.iter().any(|c| {
                !c.rejected && !c.id.is_project() && required.is_some_and(|r| r.accept_str(c.id.version()))
            });
            if !satisfied {
                add(&mut candidates, result);
            }
        }
        candidates
    }

    /// Runs the resolver chain. The last resolver always decides.
    fn pick_candidate(&self, candidates: &[Candidate]) -> usize {
        if candidates.len() == 1 {
            return 0;
        }
        let views: Vec<ConflictCandidate> = candidates
            .iter()
            .map(|c| ConflictCandidate {
                id: &c.id,
                rejected: c.rejected,
            })
            .collect();
        self.module_resolvers
            .iter()
            .find_map(|r| r.select(&views))
            .filter(|i| *i < candidates.len())
            .unwrap_or(0)
    }
}
