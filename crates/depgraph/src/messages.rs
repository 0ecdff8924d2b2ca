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

//! Human readable failure messages.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::graph::{state::ResolveState, ComponentKey, EdgeKey, NodeKey};

/// Explains why no version of the module of `component` satisfies its
/// constraints, listing the path leading to every edge involved.
pub(crate) fn rejection_message(state: &ResolveState<'_>, component: ComponentKey) -> String {
    let module = state.components[component].module;
    let mut msg = format!(
        "Cannot find a version of '{}' that satisfies the version constraints:",
        state.modules[module].id
    );
    let mut edges: IndexSet<EdgeKey> = state.module_incoming_edges(module).into_iter().collect();
    edges.extend(state.modules[module].unattached_edges.iter().copied());

    let mut lines: IndexSet<String> = IndexSet::new();
    for edge in edges {
        lines.insert(edge_path(state, edge));
    }
    for line in lines {
        msg.push_str("\n   ");
        msg.push_str(&line);
    }
    msg
}

/// `Dependency path 'root' --> 'org:a:1.0' --> 'org:b:{strictly 1.5}'`
fn edge_path(state: &ResolveState<'_>, edge: EdgeKey) -> String {
    let edge_state = &state.edges[edge];
    let kind = if edge_state.constraint {
        "Constraint"
    } else {
        "Dependency"
    };
    let mut segments: Vec<String> = dependency_path(state, edge_state.from)
        .into_iter()
        .map(|n| state.components[state.nodes[n].component].id.to_string())
        .collect();
    segments.push(edge_state.dependency.dependency.selector.to_string());
    let path = segments
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(" --> ");
    format!("{} path {}", kind, path)
}

/// The shortest chain of consumers from the root down to `node`, both
/// included. Falls back to `node` alone when the root cannot be reached.
pub(crate) fn dependency_path(state: &ResolveState<'_>, node: NodeKey) -> Vec<NodeKey> {
    let root = state.root();
    let mut parents: IndexMap<NodeKey, Option<NodeKey>> = IndexMap::new();
    parents.insert(node, None);
    let mut queue = VecDeque::from([node]);
    let mut reached = node == root;
    while let Some(current) = queue.pop_front() {
        if current == root {
            reached = true;
            break;
        }
        for &incoming in &state.nodes[current].incoming {
            let from = state.edges[incoming].from;
            if parents.contains_key(&from) {
                continue;
            }
            parents.insert(from, Some(current));
            queue.push_back(from);
        }
    }
    if !reached {
        return vec![node];
    }

    let mut path = vec![root];
    let mut current = root;
    while let Some(Some(next)) = parents.get(&current) {
        path.push(*next);
        current = *next;
    }
    path
}

/// Details of the variants selected together although their attributes
/// disagree.
pub(crate) fn incompatible_variants_details(state: &ResolveState<'_>, nodes: &[NodeKey]) -> String {
    let mut lines = vec![];
    for &node in nodes {
        let node_state = &state.nodes[node];
        let component = &state.components[node_state.component];
        let Some(variant) = component
            .metadata
            .as_ref()
            .and_then(|m| m.variants.get(node_state.variant))
        else {
            continue;
        };
        lines.push(format!(
            "   - Variant '{}' with attributes {}",
            variant.name, variant.attributes
        ));
    }
    lines.join("\n")
}
