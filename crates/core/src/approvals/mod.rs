pub mod bulk;
pub mod document;
pub mod engine;
pub mod memory;
pub mod service;
pub mod store;

pub use bulk::{BulkApprovalCoordinator, BulkDecisionSummary, BulkItemResult};
pub use document::{DetailDocumentSynchronizer, SyncOutcome};
pub use engine::{
    ApprovalChainEngine, DecisionCommand, DecisionRecord, DecisionRequest, DocumentSync,
};
pub use memory::{InMemoryApprovalStore, InMemoryApprovalUnit};
pub use service::{local_today, ApprovalService, Clock};
pub use store::{ApprovalStore, ApprovalUnit};
