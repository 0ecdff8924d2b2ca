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

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// A module, identified by `group:name`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    pub group: String,
    pub name: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        ModuleId {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn with_version(&self, version: impl Into<String>) -> ModuleVersionId {
        ModuleVersionId {
            module: self.clone(),
            version: version.into(),
        }
    }
}

impl std::fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl FromStr for ModuleId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() && !name.contains(':') => {
                Ok(ModuleId::new(group, name))
            }
            _ => Err(ModelError::MalformedModuleId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ModuleId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleId> for String {
    fn from(value: ModuleId) -> Self {
        value.to_string()
    }
}

/// A module at a specific version, `group:name:version`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleVersionId {
    pub module: ModuleId,
    pub version: String,
}

impl ModuleVersionId {
    pub fn new(group: &str, name: &str, version: &str) -> Self {
        ModuleId::new(group, name).with_version(version)
    }
}

impl std::fmt::Debug for ModuleVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

impl std::fmt::Display for ModuleVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

impl FromStr for ModuleVersionId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(name), Some(version))
                if !group.is_empty() && !name.is_empty() && !version.is_empty() =>
            {
                Ok(ModuleVersionId::new(group, name, version))
            }
            _ => Err(ModelError::MalformedModuleVersionId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ModuleVersionId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleVersionId> for String {
    fn from(value: ModuleVersionId) -> Self {
        value.to_string()
    }
}

/// Identity of a component in the graph.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentId {
    /// A published component, fetched from a repository.
    Module(ModuleVersionId),
    /// A component built from a local project, such as the root of the resolution.
    Project { path: String, module: ModuleVersionId },
}

impl ComponentId {
    pub fn module_version(&self) -> &ModuleVersionId {
        match self {
            ComponentId::Module(id) => id,
            ComponentId::Project { module, .. } => module,
        }
    }

    pub fn module(&self) -> &ModuleId {
        &self.module_version().module
    }

    pub fn version(&self) -> &str {
        &self.module_version().version
    }

    pub fn is_project(&self) -> bool {
        matches!(self, ComponentId::Project { .. })
    }
}

impl std::fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentId::Module(id) => write!(f, "{}", id),
            ComponentId::Project { path, .. } => write!(f, "project {}", path),
        }
    }
}

/// A capability provided by a variant. Two variants providing the same
/// `group:name` cannot both live in the graph.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability {
    pub group: String,
    pub name: String,
    pub version: Option<String>,
}

impl Capability {
    pub fn new(group: &str, name: &str, version: Option<&str>) -> Self {
        Capability {
            group: group.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    /// The capability every component provides by default: its own module.
    pub fn implicit(id: &ModuleVersionId) -> Self {
        Capability {
            group: id.module.group.clone(),
            name: id.module.name.clone(),
            version: Some(id.version.clone()),
        }
    }

    /// The conflict key, `group:name`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}:{}", self.group, self.name, v),
            None => write!(f, "{}:{}", self.group, self.name),
        }
    }
}

impl FromStr for Capability {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, name] if !group.is_empty() && !name.is_empty() => {
                Ok(Capability::new(group, name, None))
            }
            [group, name, version] if !group.is_empty() && !name.is_empty() => {
                Ok(Capability::new(group, name, Some(version)))
            }
            _ => Err(ModelError::MalformedCapability(s.to_string())),
        }
    }
}

impl TryFrom<String> for Capability {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn parse_ids() {
        let id: ModuleVersionId = "org.example:core:1.2".parse().unwrap();
        expect!["org.example:core:1.2"].assert_eq(&id.to_string());
        expect!["org.example:core"].assert_eq(&id.module.to_string());

        assert!("org.example".parse::<ModuleId>().is_err());
        assert!("a:b:c".parse::<ModuleId>().is_err());
        assert!("a:b".parse::<ModuleVersionId>().is_err());
    }

    #[test]
    fn capability_keys_ignore_version() {
        let a: Capability = "org:logging:1.0".parse().unwrap();
        let b: Capability = "org:logging".parse().unwrap();
        assert_eq!(a.key(), b.key());
        expect!["org:logging:1.0"].assert_eq(&a.to_string());
    }
}
