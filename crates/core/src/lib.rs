pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;

pub use approvals::{
    ApprovalChainEngine, ApprovalService, ApprovalStore, ApprovalUnit, BulkApprovalCoordinator,
    BulkDecisionSummary, BulkItemResult, DecisionRecord, DecisionRequest,
    DetailDocumentSynchronizer,
};
pub use domain::application::{
    Application, ApplicationId, ApplicationStatus, ApprovalChain, ApprovalStep, DecisionKind,
    DecisionOutcome, OriginLink, OriginRef, StepDecision, SubmitApplication,
};
pub use errors::{ApprovalError, DocumentSyncError, InterfaceError};
