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

use depgraph_util::{
    attributes::{Attributes, AttributesSchema},
    ids::Capability,
    metadata::ComponentMetadata,
};

use crate::registry::memory::DEFAULT_VARIANT;

/// Chooses the variants of a component an edge points to. Returns indices
/// into `component.variants`, or a human readable reason.
pub trait VariantSelector {
    fn select_by_attribute_matching(
        &self,
        requested: &Attributes,
        requested_capabilities: &[Capability],
        component: &ComponentMetadata,
        schema: &AttributesSchema,
    ) -> Result<Vec<usize>, String>;

    /// Used for components that do not publish attributes.
    fn select_legacy(&self, component: &ComponentMetadata) -> Result<Vec<usize>, String>;
}

pub struct AttributeMatchingVariantSelector;

impl AttributeMatchingVariantSelector {
    fn provides_requested_capabilities(
        component: &ComponentMetadata,
        variant: usize,
        requested: &[Capability],
    ) -> bool {
        let provided = component.capabilities_of(&component.variants[variant]);
        if requested.is_empty() {
            let implicit = Capability::implicit(component.module_version()).key();
            provided.iter().any(|c| c.key() == implicit)
        } else {
            requested
                .iter()
                .all(|r| provided.iter().any(|c| c.key() == r.key()))
        }
    }
}

impl VariantSelector for AttributeMatchingVariantSelector {
    fn select_by_attribute_matching(
        &self,
        requested: &Attributes,
        requested_capabilities: &[Capability],
        component: &ComponentMetadata,
        schema: &AttributesSchema,
    ) -> Result<Vec<usize>, String> {
        let candidates: Vec<usize> = (0..component.variants.len())
            .filter(|&i| schema.matches(requested, &component.variants[i].attributes))
            .filter(|&i| {
                Self::provides_requested_capabilities(component, i, requested_capabilities)
            })
            .collect();

        match candidates.len() {
            0 => {
                let mut msg = format!(
                    "No matching variant of {} was found. The consumer was configured to find {} but:",
                    component.id, requested
                );
                for v in &component.variants {
                    msg.push_str(&format!(
                        "\n  - Variant '{}' declares {}",
                        v.name, v.attributes
                    ));
                }
                Err(msg)
            }
            1 => Ok(candidates),
            _ => {
                // Most requested attributes provided, then fewest extra ones.
                let score = |i: usize| {
                    let attrs = &component.variants[i].attributes;
                    let provided = requested.iter().filter(|(k, _)| attrs.get(k).is_some()).count();
                    let extra = attrs.len() - provided;
                    (provided, std::cmp::Reverse(extra))
                };
                let best = candidates.iter().map(|&i| score(i)).max();
                let finalists: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| Some(score(i)) == best)
                    .collect();
                if finalists.len() == 1 {
                    Ok(finalists)
                } else {
                    let names: Vec<&str> = finalists
                        .iter()
                        .map(|&i| component.variants[i].name.as_str())
                        .collect();
                    Err(format!(
                        "Cannot choose between the following variants of {}: {}",
                        component.id,
                        names.join(", ")
                    ))
                }
            }
        }
    }

    fn select_legacy(&self, component: &ComponentMetadata) -> Result<Vec<usize>, String> {
        if component.variants.is_empty() {
            return Err(format!("{} does not declare any variant", component.id));
        }
        let index = component
            .variants
            .iter()
            .position(|v| v.name == DEFAULT_VARIANT)
            .unwrap_or(0);
        Ok(vec![index])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use depgraph_util::{
        ids::{ComponentId, ModuleVersionId},
        metadata::VariantMetadata,
    };
    use expect_test::expect;

    fn component() -> ComponentMetadata {
        ComponentMetadata::new(ComponentId::Module(ModuleVersionId::new("org", "lib", "1.0")))
            .with_variant(
                VariantMetadata::new("api").with_attributes(Attributes::of([("usage", "api")])),
            )
            .with_variant(
                VariantMetadata::new("runtime")
                    .with_attributes(Attributes::of([("usage", "runtime"), ("os", "any")])),
            )
            .with_variant(
                VariantMetadata::new("fixtures")
                    .with_attributes(Attributes::of([("usage", "api")]))
                    .with_capability("org:lib-fixtures:1.0".parse().unwrap()),
            )
    }

    #[test]
    fn matching() {
        let selector = AttributeMatchingVariantSelector;
        let schema = AttributesSchema::new();
        let c = component();
        let api = selector
            .select_by_attribute_matching(&Attributes::of([("usage", "api")]), &[], &c, &schema)
            .unwrap();
        assert_eq!(api, vec![0]);

        let fixtures = selector
            .select_by_attribute_matching(
                &Attributes::of([("usage", "api")]),
                &["org:lib-fixtures".parse().unwrap()],
                &c,
                &schema,
            )
            .unwrap();
        assert_eq!(fixtures, vec![2]);

        let err = selector
            .select_by_attribute_matching(&Attributes::of([("usage", "docs")]), &[], &c, &schema)
            .unwrap_err();
        expect![[r#"
            No matching variant of org:lib:1.0 was found. The consumer was configured to find {usage=docs} but:
              - Variant 'api' declares {usage=api}
              - Variant 'runtime' declares {os=any, usage=runtime}
              - Variant 'fixtures' declares {usage=api}"#]]
        .assert_eq(&err);
    }

    #[test]
    fn disambiguation_prefers_fewer_extra_attributes() {
        let selector = AttributeMatchingVariantSelector;
        let c = component();
        let picked = selector
            .select_by_attribute_matching(&Attributes::new(), &[], &c, &AttributesSchema::new())
            .unwrap();
        assert_eq!(picked, vec![0]);
    }
}
