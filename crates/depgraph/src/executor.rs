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

//! Batch execution of metadata fetches.

use std::sync::Arc;

use depgraph_util::{ids::ComponentId, metadata::ComponentMetadata};

use crate::{error::ResolveFailure, resolver::ComponentMetadataResolver};

pub type MetadataResult = Result<Arc<ComponentMetadata>, ResolveFailure>;

/// Runs a batch of metadata fetches and blocks until all of them are done.
/// Results are returned in the order of `ids`.
pub trait BatchExecutor {
    fn fetch_all(
        &self,
        resolver: &dyn ComponentMetadataResolver,
        ids: &[ComponentId],
    ) -> Vec<MetadataResult>;
}

/// Fetches one after another on the calling thread.
pub struct SerialBatchExecutor;

impl BatchExecutor for SerialBatchExecutor {
    fn fetch_all(
        &self,
        resolver: &dyn ComponentMetadataResolver,
        ids: &[ComponentId],
    ) -> Vec<MetadataResult> {
        ids.iter().map(|id| resolver.resolve(id)).collect()
    }
}

/// Fetches on scoped worker threads, at most `max_parallelism` at a time.
pub struct ThreadedBatchExecutor {
    max_parallelism: usize,
}

impl ThreadedBatchExecutor {
    pub fn new(max_parallelism: usize) -> Self {
        ThreadedBatchExecutor {
            max_parallelism: max_parallelism.max(1),
        }
    }
}

impl Default for ThreadedBatchExecutor {
    fn default() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        ThreadedBatchExecutor::new(n)
    }
}

impl BatchExecutor for ThreadedBatchExecutor {
    fn fetch_all(
        &self,
        resolver: &dyn ComponentMetadataResolver,
        ids: &[ComponentId],
    ) -> Vec<MetadataResult> {
        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.max_parallelism) {
            let chunk_results: Vec<MetadataResult> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|id| scope.spawn(move || resolver.resolve(id)))
                    .collect();
                handles
                    .into_iter()
                    .zip(chunk)
                    .map(|(handle, id)| {
                        handle.join().unwrap_or_else(|_| {
                            Err(ResolveFailure::Metadata {
                                id: id.to_string(),
                                reason: "metadata fetch panicked".to_string(),
                            })
                        })
                    })
                    .collect()
            });
            results.extend(chunk_results);
        }
        results
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{registry::MemoryRegistry, resolver::RegistryResolver};
    use depgraph_util::ids::ModuleVersionId;

    #[test]
    fn threaded_keeps_order() {
        let mut registry = MemoryRegistry::new();
        for i in 0..5 {
            registry.add_module(&format!("org:m{}:1.0", i), []);
        }
        let resolver = RegistryResolver::new(&registry);
        let mut ids: Vec<ComponentId> = (0..5)
            .map(|i| ComponentId::Module(ModuleVersionId::new("org", &format!("m{}", i), "1.0")))
            .collect();
        ids.push(ComponentId::Module(ModuleVersionId::new("org", "missing", "1.0")));

        let results = ThreadedBatchExecutor::new(2).fetch_all(&resolver, &ids);
        assert_eq!(results.len(), 6);
        for (id, result) in ids.iter().zip(&results[..5]) {
            assert_eq!(&result.as_ref().unwrap().id, id);
        }
        assert!(results[5].is_err());
    }
}
