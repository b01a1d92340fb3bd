use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::approvals::engine::DecisionRecord;
use crate::approvals::store::{ApprovalStore, ApprovalUnit};
use crate::domain::application::{ApplicationId, ApprovalChain};
use crate::errors::ApprovalError;

#[derive(Clone, Default)]
pub struct InMemoryApprovalStore {
    chains: Arc<RwLock<HashMap<String, ApprovalChain>>>,
}

impl InMemoryApprovalStore {
    pub async fn insert(&self, chain: ApprovalChain) {
        let mut chains = self.chains.write().await;
        chains.insert(chain.application.id.0.clone(), chain);
    }

    pub async fn get(&self, id: &ApplicationId) -> Option<ApprovalChain> {
        let chains = self.chains.read().await;
        chains.get(&id.0).cloned()
    }
}

#[async_trait::async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    type Unit = InMemoryApprovalUnit;

    async fn begin(&self) -> Result<Self::Unit, ApprovalError> {
        Ok(InMemoryApprovalUnit {
            chains: Arc::clone(&self.chains),
            staged: HashMap::new(),
            base_versions: HashMap::new(),
        })
    }
}

/// Buffers writes until commit, then checks every touched chain against the
/// version it was first read at.
pub struct InMemoryApprovalUnit {
    chains: Arc<RwLock<HashMap<String, ApprovalChain>>>,
    staged: HashMap<String, ApprovalChain>,
    base_versions: HashMap<String, i64>,
}

#[async_trait::async_trait]
impl ApprovalUnit for InMemoryApprovalUnit {
    async fn load_chain(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApprovalChain>, ApprovalError> {
        if let Some(chain) = self.staged.get(&id.0) {
            return Ok(Some(chain.clone()));
        }

        let chains = self.chains.read().await;
        let found = chains.get(&id.0).cloned();
        if let Some(chain) = &found {
            self.base_versions.entry(id.0.clone()).or_insert(chain.application.version);
        }
        Ok(found)
    }

    async fn store_decision(&mut self, record: &DecisionRecord) -> Result<(), ApprovalError> {
        let id = record.chain.application.id.0.clone();
        let current_version = match self.staged.get(&id) {
            Some(chain) => Some(chain.application.version),
            None => self.chains.read().await.get(&id).map(|chain| chain.application.version),
        };

        if current_version != Some(record.expected_version) {
            return Err(ApprovalError::ConcurrentModification(id));
        }

        self.base_versions.entry(id.clone()).or_insert(record.expected_version);
        self.staged.insert(id, record.chain.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), ApprovalError> {
        let mut chains = self.chains.write().await;

        for (id, base) in &self.base_versions {
            if !self.staged.contains_key(id) {
                continue;
            }
            let stored = chains.get(id).map(|chain| chain.application.version);
            if stored != Some(*base) {
                return Err(ApprovalError::ConcurrentModification(id.clone()));
            }
        }

        chains.extend(self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<(), ApprovalError> {
        Ok(())
    }
}
