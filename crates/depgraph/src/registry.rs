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

use std::sync::Arc;

use depgraph_util::{
    ids::{ModuleId, ModuleVersionId},
    metadata::ComponentMetadata,
};

pub mod memory;

pub use memory::MemoryRegistry;

/// A source of published components.
pub trait Registry: Send + Sync {
    /// All published versions of a module, lowest first. `None` if the
    /// module is unknown.
    fn all_versions_of(&self, module: &ModuleId) -> Option<Vec<String>>;

    fn component_metadata(&self, id: &ModuleVersionId) -> anyhow::Result<Arc<ComponentMetadata>>;

    /// A local project component, by path.
    fn project(&self, path: &str) -> Option<Arc<ComponentMetadata>>;

    /// Whether fetching metadata is cheap enough to skip parallel prefetching.
    fn is_local(&self) -> bool {
        true
    }
}
