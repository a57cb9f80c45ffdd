//! In-memory graph store

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::PortResult;
use crate::model::{GraphData, WorkspaceId};
use crate::ports::GraphStore;

/// Holds subgraphs keyed by workspace and result ref
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    subgraphs: DashMap<WorkspaceId, Vec<(String, GraphData)>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the subgraph the extraction process wrote under `result_ref`
    pub fn insert_subgraph(
        &self,
        workspace_id: WorkspaceId,
        result_ref: impl Into<String>,
        graph: GraphData,
    ) {
        self.subgraphs
            .entry(workspace_id)
            .or_default()
            .push((result_ref.into(), graph));
    }

    pub fn has_workspace(&self, workspace_id: &WorkspaceId) -> bool {
        self.subgraphs.contains_key(workspace_id)
    }

    pub fn subgraph_count(&self, workspace_id: &WorkspaceId) -> usize {
        self.subgraphs.get(workspace_id).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<()> {
        self.subgraphs.remove(workspace_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_removes_only_that_workspace() {
        let store = InMemoryGraphStore::new();
        let (a, b) = (WorkspaceId::from("a"), WorkspaceId::from("b"));
        store.insert_subgraph(a.clone(), "r1", GraphData::default());
        store.insert_subgraph(a.clone(), "r2", GraphData::default());
        store.insert_subgraph(b.clone(), "r3", GraphData::default());
        assert_eq!(store.subgraph_count(&a), 2);

        store.delete_workspace(&a).await.unwrap();
        store.delete_workspace(&a).await.unwrap();
        assert!(!store.has_workspace(&a));
        assert!(store.has_workspace(&b));
    }
}
