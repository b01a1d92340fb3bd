use async_trait::async_trait;

use crate::approvals::engine::DecisionRecord;
use crate::domain::application::{ApplicationId, ApprovalChain};
use crate::errors::ApprovalError;

/// Source of transactional units of work over application chains.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    type Unit: ApprovalUnit;

    async fn begin(&self) -> Result<Self::Unit, ApprovalError>;
}

/// One open transaction. Nothing written through it is visible to other units
/// until `commit`; `rollback` discards every write made through it.
#[async_trait]
pub trait ApprovalUnit: Send + Sized {
    async fn load_chain(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApprovalChain>, ApprovalError>;

    /// Persists the decided steps, header status and detail document of
    /// `record`. Fails with `ConcurrentModification` when the stored header
    /// version no longer equals `record.expected_version`.
    async fn store_decision(&mut self, record: &DecisionRecord) -> Result<(), ApprovalError>;

    async fn commit(self) -> Result<(), ApprovalError>;

    async fn rollback(self) -> Result<(), ApprovalError>;
}
