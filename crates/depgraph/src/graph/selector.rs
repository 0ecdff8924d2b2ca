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

//! Memoized resolution of one distinct requested selector.

use std::rc::Rc;

use depgraph_util::{
    constraint::ResolvedVersionConstraint, selector::ComponentSelector, version::VersionSelector,
};

use crate::{error::ResolveFailure, resolver::IdResolveResult};

use super::{
    component::SelectionCause, dependency::DependencyState, state::ResolveState, ComponentKey,
    ModuleKey, SelectorKey,
};

#[derive(Debug)]
pub(crate) struct SelectorState {
    pub dependency: Rc<DependencyState>,
    /// The module this selector was registered with. A replaced module keeps
    /// its selectors and points its selection at the replacement.
    pub target_module: ModuleKey,
    pub ignore_version: bool,
    pub virtual_platform_edge: bool,
    constraint: Result<ResolvedVersionConstraint, ResolveFailure>,
    pub result: Option<IdResolveResult>,
    pub failure: Option<ResolveFailure>,
    pub resolved: bool,
    pub reusable: bool,
    pub forced: bool,
    pub soft_forced: bool,
    pub from_lock: bool,
    pub changing: bool,
    pub use_count: usize,
    pub causes: Vec<SelectionCause>,
}

impl SelectorState {
    pub fn new(
        dependency: Rc<DependencyState>,
        target_module: ModuleKey,
        ignore_version: bool,
        virtual_platform_edge: bool,
    ) -> Self {
        let constraint = match dependency.dependency.selector.version_constraint() {
            Some(c) => c.resolve().map_err(|e| ResolveFailure::InvalidConstraint {
                selector: dependency.dependency.selector.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(ResolvedVersionConstraint::no_opinion()),
        };
        let forced = dependency.is_forced();
        let mut selector = SelectorState {
            target_module,
            ignore_version,
            virtual_platform_edge,
            constraint,
            result: None,
            failure: dependency.failure.clone(),
            resolved: false,
            reusable: false,
            forced,
            soft_forced: forced && virtual_platform_edge,
            from_lock: dependency.dependency.from_lock,
            changing: dependency.dependency.changing,
            use_count: 0,
            causes: vec![],
            dependency,
        };
        selector.add_causes();
        selector
    }

    fn add_causes(&mut self) {
        let dependency = &self.dependency;
        let mut cause = if self.ignore_version {
            SelectionCause::ByAncestor
        } else if self.from_lock {
            SelectionCause::Constraint(Some(format!(
                "dependency was locked to version '{}'",
                dependency
                    .dependency
                    .selector
                    .version_constraint()
                    .map(|c| c.to_string())
                    .unwrap_or_default()
            )))
        } else if dependency.is_constraint() {
            SelectionCause::Constraint(dependency.dependency.reason.clone())
        } else {
            SelectionCause::Requested(dependency.dependency.reason.clone())
        };
        if dependency.is_forced() {
            cause = SelectionCause::Forced;
        }
        if !self.causes.contains(&cause) {
            self.causes.push(cause);
        }
        if let Some(reason) = &dependency.substitution_reason {
            let cause = SelectionCause::SelectedByRule(reason.clone());
            if !self.causes.contains(&cause) {
                self.causes.push(cause);
            }
        }
    }

    /// Folds another dependency with the same effective selector into this
    /// one. Strength flags only ever go up; gaining one forces reselection.
    pub fn update(&mut self, dependency: &Rc<DependencyState>) {
        if Rc::ptr_eq(dependency, &self.dependency) {
            return;
        }
        if !self.forced && dependency.is_forced() {
            self.forced = true;
            self.soft_forced = self.virtual_platform_edge;
            self.resolved = false;
        }
        if !self.from_lock && dependency.dependency.from_lock {
            self.from_lock = true;
            self.resolved = false;
        }
        self.changing |= dependency.dependency.changing;
        self.dependency = dependency.clone();
        self.add_causes();
    }

    pub fn selector(&self) -> &ComponentSelector {
        &self.dependency.dependency.selector
    }

    /// The constraint used when this selector takes part in selection.
    /// Selectors whose version is dictated by an ancestor have no opinion.
    pub fn version_constraint(&self) -> Option<&ResolvedVersionConstraint> {
        if self.ignore_version {
            return None;
        }
        self.constraint.as_ref().ok()
    }

    pub fn has_opinion(&self) -> bool {
        if self.ignore_version {
            return false;
        }
        match self.selector() {
            ComponentSelector::Project { .. } => true,
            ComponentSelector::Module { .. } => self
                .constraint
                .as_ref()
                .map_or(true, |c| c.has_opinion()),
        }
    }

    pub fn has_strong_opinion(&self) -> bool {
        self.forced || self.version_constraint().is_some_and(|c| c.strict)
    }

    pub fn is_dynamic(&self) -> bool {
        self.constraint.as_ref().is_ok_and(|c| c.is_dynamic())
    }

    pub fn rejects(&self) -> Option<&VersionSelector> {
        self.version_constraint().and_then(|c| c.rejected.as_ref())
    }

    pub fn can_affect_selection(&self) -> bool {
        self.reusable || !self.resolved
    }

    /// Returns `true` when the previous result is stale for `all_rejects`.
    fn requires_resolve(&mut self, all_rejects: Option<&VersionSelector>) -> bool {
        self.reusable = false;
        match &self.result {
            None => true,
            Some(result) if result.failure.is_some() || result.rejected => true,
            Some(result) => all_rejects
                .is_some_and(|rejects| result.version().is_some_and(|v| rejects.accept_str(v))),
        }
    }

    /// Marks the selector as reusable after its last use went away. Returns
    /// whether it was already marked, which signals an unstable graph.
    pub fn mark_for_reuse(&mut self) -> bool {
        if !self.resolved {
            return true;
        }
        let already = self.reusable;
        self.reusable = true;
        already
    }
}

impl ResolveState<'_> {
    /// Resolves `selector` against the rejects of every selector of its
    /// module, reusing the previous result when it is still valid.
    pub(crate) fn resolve_selector(
        &mut self,
        selector: SelectorKey,
        all_rejects: Option<&VersionSelector>,
    ) -> IdResolveResult {
        let id_resolver = self.services.id_resolver;
        let state = &mut self.selectors[selector];
        if let Some(failure) = &state.dependency.failure {
            state.failure = Some(failure.clone());
            state.resolved = true;
            return IdResolveResult::failed(failure.clone());
        }
        let constraint = match &state.constraint {
            Ok(_) if state.ignore_version => ResolvedVersionConstraint::no_opinion(),
            Ok(c) => c.clone(),
            Err(failure) => {
                state.failure = Some(failure.clone());
                state.resolved = true;
                return IdResolveResult::failed(failure.clone());
            }
        };
        if !state.requires_resolve(all_rejects) {
            state.resolved = true;
            if let Some(result) = &state.result {
                return result.clone();
            }
        }

        let result = id_resolver.resolve(state.selector(), &constraint, all_rejects);
        log::trace!("resolved {} to {:?}", state.selector(), result.id);
        state.failure = result.failure.clone();
        state.result = Some(result.clone());
        state.resolved = true;
        result
    }

    /// Counts one more edge using `selector`. The first use registers the
    /// selector with its module.
    pub(crate) fn use_selector(&mut self, selector: SelectorKey, defer_selection: bool) {
        let state = &mut self.selectors[selector];
        state.use_count += 1;
        if state.use_count == 1 {
            let module = state.target_module;
            self.add_selector(module, selector, defer_selection);
        }
    }

    /// Drops one use of `selector`. The last release detaches it from its
    /// module.
    pub(crate) fn release_selector(&mut self, selector: SelectorKey) {
        let state = &mut self.selectors[selector];
        if state.use_count == 0 {
            return;
        }
        state.use_count -= 1;
        if state.use_count == 0 {
            let module = state.target_module;
            self.remove_selector(module, selector);
        }
    }

    /// Records that the target module settled on `component` through a path
    /// that did not consult this selector.
    pub(crate) fn override_selection(&mut self, selector: SelectorKey, component: ComponentKey) {
        log::trace!(
            "{} overridden by {}",
            self.selectors[selector].selector(),
            self.components[component].id
        );
        let state = &mut self.selectors[selector];
        state.resolved = true;
        state.reusable = false;
    }
}
