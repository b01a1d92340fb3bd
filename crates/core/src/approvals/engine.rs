use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approvals::document::{DetailDocumentSynchronizer, SyncOutcome};
use crate::approvals::store::ApprovalUnit;
use crate::domain::application::{
    ApplicationId, ApplicationStatus, ApprovalChain, ApprovalStep, DecisionOutcome, StepDecision,
};
use crate::errors::{ApprovalError, DocumentSyncError};

/// A decision as submitted by a caller, before the outcome is interpreted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub application_id: String,
    pub approver_id: String,
    pub opinion: Option<String>,
    pub outcome: Option<String>,
}

impl DecisionRequest {
    pub fn to_command(&self) -> Result<DecisionCommand, ApprovalError> {
        let application_id = self.application_id.trim();
        if application_id.is_empty() {
            return Err(ApprovalError::InvalidRequest("application id is required".to_string()));
        }

        let approver_id = self.approver_id.trim();
        if approver_id.is_empty() {
            return Err(ApprovalError::InvalidRequest("approver id is required".to_string()));
        }

        let outcome = match self.outcome.as_deref() {
            Some(raw) => raw.parse::<DecisionOutcome>()?,
            None => return Err(ApprovalError::InvalidOutcome(String::new())),
        };

        Ok(DecisionCommand {
            application_id: ApplicationId(application_id.to_string()),
            approver_id: approver_id.to_string(),
            opinion: self.opinion.clone(),
            outcome,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionCommand {
    pub application_id: ApplicationId,
    pub approver_id: String,
    pub opinion: Option<String>,
    pub outcome: DecisionOutcome,
}

/// What happened to the detail document while a decision was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentSync {
    Skipped,
    Unchanged,
    Updated { entries: usize },
    Failed(DocumentSyncError),
}

/// The chain after a decision, ready to be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionRecord {
    pub chain: ApprovalChain,
    /// Header version the decision was computed against.
    pub expected_version: i64,
    /// Sequences decided by this call: the current step plus any cascade.
    pub decided_sequences: Vec<u32>,
    pub document_sync: DocumentSync,
}

impl DecisionRecord {
    pub fn decided_steps(&self) -> impl Iterator<Item = &ApprovalStep> {
        self.chain.steps.iter().filter(|step| self.decided_sequences.contains(&step.sequence))
    }

    pub fn status(&self) -> ApplicationStatus {
        self.chain.application.status
    }
}

#[derive(Clone, Debug, Default)]
pub struct ApprovalChainEngine {
    synchronizer: DetailDocumentSynchronizer,
}

impl ApprovalChainEngine {
    pub fn new(synchronizer: DetailDocumentSynchronizer) -> Self {
        Self { synchronizer }
    }

    /// Loads the chain through `unit`, applies the decision and stores it.
    pub async fn record_decision<U>(
        &self,
        unit: &mut U,
        command: &DecisionCommand,
        today: NaiveDate,
    ) -> Result<DecisionRecord, ApprovalError>
    where
        U: ApprovalUnit,
    {
        let chain = unit
            .load_chain(&command.application_id)
            .await?
            .ok_or_else(|| ApprovalError::ApplicationNotFound(command.application_id.0.clone()))?;

        let record = self.decide(&chain, command, today)?;
        unit.store_decision(&record).await?;

        info!(
            event_name = "approval.decision.recorded",
            application_id = %command.application_id,
            approver_id = %command.approver_id,
            outcome = command.outcome.as_str(),
            decided_sequences = ?record.decided_sequences,
            status = record.status().as_str(),
            "approval decision recorded"
        );

        Ok(record)
    }

    /// Applies `command` to `chain` without touching storage.
    pub fn decide(
        &self,
        chain: &ApprovalChain,
        command: &DecisionCommand,
        today: NaiveDate,
    ) -> Result<DecisionRecord, ApprovalError> {
        let application = &chain.application;

        let current = chain
            .current_step_index()
            .ok_or_else(|| ApprovalError::NoActionableStep(application.id.0.clone()))?;

        let current_approver = &chain.steps[current].approver_id;
        if *current_approver != command.approver_id {
            return Err(ApprovalError::WrongApprover {
                application_id: application.id.0.clone(),
                expected: current_approver.clone(),
                actual: command.approver_id.clone(),
            });
        }

        let decision = StepDecision {
            outcome: command.outcome,
            decided_on: today,
            opinion: command.opinion.clone(),
        };

        let mut steps = chain.steps.clone();
        let decided_current = steps[current].decided(&decision);
        let mut decided_sequences = vec![decided_current.sequence];
        steps[current] = decided_current;
        let mut last_touched = current;

        // One person may hold several consecutive slots; an approval covers all of them.
        if command.outcome == DecisionOutcome::Approved {
            for index in current + 1..steps.len() {
                if steps[index].approver_id != command.approver_id
                    || steps[index].decision.is_some()
                {
                    break;
                }
                let cascaded = steps[index].decided(&decision);
                decided_sequences.push(cascaded.sequence);
                steps[index] = cascaded;
                last_touched = index;
            }
        }

        let status = match command.outcome {
            DecisionOutcome::Rejected => ApplicationStatus::Rejected,
            DecisionOutcome::Approved if steps[last_touched].is_final => {
                ApplicationStatus::Approved
            }
            DecisionOutcome::Approved => application.status,
        };

        let mut updated = application.with_status(status);
        updated.version = application.version + 1;

        let document_sync = match self.synchronizer.synchronize(
            application.detail_document.as_deref(),
            &steps,
            &decided_sequences,
            today,
        ) {
            Ok(SyncOutcome::Skipped) => DocumentSync::Skipped,
            Ok(SyncOutcome::Unchanged) => DocumentSync::Unchanged,
            Ok(SyncOutcome::Updated { document, entries }) => {
                updated = updated.with_detail_document(document);
                DocumentSync::Updated { entries }
            }
            Err(error) => {
                warn!(
                    event_name = "approval.document_sync.failed",
                    application_id = %application.id,
                    error = %error,
                    "detail document left untouched; step records remain authoritative"
                );
                DocumentSync::Failed(error)
            }
        };

        Ok(DecisionRecord {
            chain: ApprovalChain { application: updated, steps },
            expected_version: application.version,
            decided_sequences,
            document_sync,
        })
    }
}
