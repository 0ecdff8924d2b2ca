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

//! Shared data model of the dependency graph engine: identifiers, versions,
//! constraints, attributes, exclusions, component metadata and the resolved
//! graph produced at the end of a resolution.

pub mod attributes;
pub mod constraint;
pub mod error;
pub mod exclude;
pub mod ids;
pub mod metadata;
pub mod result;
pub mod selector;
pub mod version;

pub use error::ModelError;
