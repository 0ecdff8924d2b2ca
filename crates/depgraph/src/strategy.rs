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

use depgraph_util::attributes::{Attributes, AttributesSchema};
use derive_builder::Builder;

/// Number of times a module may change its selection before the engine stops
/// re-resolving it and keeps the highest version.
pub const MAX_SELECTION_CHANGES: usize = 1000;

/// Policy applied when several versions of a module compete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// The highest version wins.
    #[default]
    Latest,
    /// Like `Latest`, but any module that saw more than one candidate version
    /// is reported as a failure.
    Strict,
    /// Project components win over published ones.
    PreferProjectModules,
}

/// Knobs of a single resolution.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct ResolutionStrategy {
    #[builder(default)]
    pub conflict_resolution: ConflictResolution,
    #[builder(default = false)]
    pub fail_on_dynamic_versions: bool,
    #[builder(default = false)]
    pub fail_on_changing_versions: bool,
    #[builder(default = MAX_SELECTION_CHANGES)]
    pub max_selection_changes: usize,
    /// Upper bound on concurrent metadata fetches; `1` fetches serially.
    #[builder(default = 1)]
    pub max_parallelism: usize,
    /// Attributes requested by the root, applied to every edge.
    #[builder(default)]
    pub root_attributes: Attributes,
    #[builder(default)]
    pub attributes_schema: AttributesSchema,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        ResolutionStrategy {
            conflict_resolution: ConflictResolution::default(),
            fail_on_dynamic_versions: false,
            fail_on_changing_versions: false,
            max_selection_changes: MAX_SELECTION_CHANGES,
            max_parallelism: 1,
            root_attributes: Attributes::new(),
            attributes_schema: AttributesSchema::new(),
        }
    }
}

impl ResolutionStrategy {
    pub fn prefer_project_modules(&self) -> bool {
        self.conflict_resolution == ConflictResolution::PreferProjectModules
    }
}
