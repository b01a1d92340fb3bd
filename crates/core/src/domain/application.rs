use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ApprovalError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    None,
    Decided,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Decided => "decided",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Accepts the portal vocabulary (`승인` / `반려`) as well as the English forms.
impl FromStr for DecisionOutcome {
    type Err = ApprovalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed {
            "승인" => return Ok(Self::Approved),
            "반려" => return Ok(Self::Rejected),
            _ => {}
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            _ => Err(ApprovalError::InvalidOutcome(trimmed.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub title: Option<String>,
    pub detail_document: Option<String>,
    pub status: ApplicationStatus,
    pub requester_id: String,
    pub request_date: NaiveDate,
    pub requester_opinion: Option<String>,
    /// Bumped on every stored decision; checked before the write lands.
    pub version: i64,
}

impl Application {
    pub fn with_status(&self, status: ApplicationStatus) -> Self {
        Self { status, ..self.clone() }
    }

    pub fn with_detail_document(&self, detail_document: String) -> Self {
        Self { detail_document: Some(detail_document), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDecision {
    pub outcome: DecisionOutcome,
    pub decided_on: NaiveDate,
    pub opinion: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub application_id: ApplicationId,
    pub sequence: u32,
    pub approver_id: String,
    pub decision: Option<StepDecision>,
    pub is_final: bool,
}

impl ApprovalStep {
    pub fn pending(
        application_id: ApplicationId,
        sequence: u32,
        approver_id: String,
        is_final: bool,
    ) -> Self {
        Self { application_id, sequence, approver_id, decision: None, is_final }
    }

    pub fn decision_kind(&self) -> DecisionKind {
        if self.decision.is_some() {
            DecisionKind::Decided
        } else {
            DecisionKind::None
        }
    }

    pub fn outcome(&self) -> Option<DecisionOutcome> {
        self.decision.as_ref().map(|decision| decision.outcome)
    }

    pub fn is_approved(&self) -> bool {
        self.outcome() == Some(DecisionOutcome::Approved)
    }

    /// Returns the step as it looks once `decision` has been applied.
    pub fn decided(&self, decision: &StepDecision) -> Self {
        Self { decision: Some(decision.clone()), ..self.clone() }
    }
}

/// Association between an application and the business record it governs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginLink {
    pub id: String,
    pub application_id: ApplicationId,
    pub origin_table_code: String,
    pub origin_key: Option<String>,
    pub origin_sub_sequence: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRef {
    pub table_code: String,
    pub key: Option<String>,
    pub sub_sequence: Option<i64>,
}

/// Header plus its steps in ascending sequence order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChain {
    pub application: Application,
    pub steps: Vec<ApprovalStep>,
}

impl ApprovalChain {
    pub fn new(application: Application, mut steps: Vec<ApprovalStep>) -> Self {
        steps.sort_by_key(|step| step.sequence);
        Self { application, steps }
    }

    /// Index of the only step eligible for a decision, if any.
    ///
    /// The scan stops at the first undecided step, which is actionable only when
    /// every earlier step was approved. A rejection anywhere halts the chain.
    pub fn current_step_index(&self) -> Option<usize> {
        for (index, step) in self.steps.iter().enumerate() {
            match step.outcome() {
                None => return Some(index),
                Some(DecisionOutcome::Approved) => continue,
                Some(DecisionOutcome::Rejected) => return None,
            }
        }
        None
    }

    pub fn current_step(&self) -> Option<&ApprovalStep> {
        self.current_step_index().map(|index| &self.steps[index])
    }

    pub fn is_halted(&self) -> bool {
        self.steps.iter().any(|step| step.outcome() == Some(DecisionOutcome::Rejected))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitApplication {
    pub title: Option<String>,
    pub detail_document: Option<String>,
    pub requester_id: String,
    pub requester_opinion: Option<String>,
    pub approver_ids: Vec<String>,
    pub origin: Option<OriginRef>,
}

impl SubmitApplication {
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.requester_id.trim().is_empty() {
            return Err(ApprovalError::InvalidRequest("requester id is required".to_string()));
        }
        if self.approver_ids.is_empty() {
            return Err(ApprovalError::InvalidRequest(
                "at least one approver is required".to_string(),
            ));
        }
        if self.approver_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ApprovalError::InvalidRequest("approver ids must not be blank".to_string()));
        }
        if let Some(origin) = &self.origin {
            if origin.table_code.trim().is_empty() {
                return Err(ApprovalError::InvalidRequest(
                    "origin table code must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Builds the ordered step list for a freshly issued application id.
    pub fn steps_for(&self, application_id: &ApplicationId) -> Vec<ApprovalStep> {
        let last = self.approver_ids.len();
        self.approver_ids
            .iter()
            .enumerate()
            .map(|(index, approver_id)| {
                ApprovalStep::pending(
                    application_id.clone(),
                    (index + 1) as u32,
                    approver_id.trim().to_string(),
                    index + 1 == last,
                )
            })
            .collect()
    }
}
