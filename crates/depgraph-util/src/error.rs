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

use thiserror::Error;

/// Errors raised while parsing identifiers, versions and selectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Malformed module id '{0}', expected 'group:name'")]
    MalformedModuleId(String),
    #[error("Malformed module version id '{0}', expected 'group:name:version'")]
    MalformedModuleVersionId(String),
    #[error("Malformed capability '{0}', expected 'group:name:version'")]
    MalformedCapability(String),
    #[error("Invalid version '{0}': {1}")]
    InvalidVersion(String, String),
    #[error("Invalid version selector '{0}': {1}")]
    InvalidSelector(String, String),
}
