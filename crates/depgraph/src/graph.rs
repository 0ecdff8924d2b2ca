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

//! The mutable resolution state and the traversal building the graph.
//!
//! All states live in arenas owned by [`state::ResolveState`] and refer to
//! each other by key. Behaviour is implemented on `ResolveState`, split per
//! state kind across the submodules.

pub mod builder;
pub(crate) mod component;
pub(crate) mod conflict;
pub(crate) mod dependency;
pub(crate) mod edge;
pub(crate) mod module;
pub(crate) mod node;
pub(crate) mod pending;
pub(crate) mod platform;
pub(crate) mod selection;
pub(crate) mod selector;
pub mod state;
pub(crate) mod strict;

slotmap::new_key_type! {
    pub struct ModuleKey;
    pub struct ComponentKey;
    pub struct NodeKey;
    pub struct EdgeKey;
    pub struct SelectorKey;
}
