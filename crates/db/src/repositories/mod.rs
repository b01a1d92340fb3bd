use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use itgov_core::domain::application::{
    Application, ApplicationId, ApplicationStatus, ApprovalStep, DecisionOutcome, StepDecision,
};
use itgov_core::errors::ApprovalError;

pub mod application;
pub mod approval_store;

pub use application::{OriginStatus, SqlApplicationRepository};
pub use approval_store::{SqlApprovalStore, SqlApprovalUnit};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) const APPLICATION_COLUMNS: &str = "id, title, detail_document, status, requester_id, \
     request_date, requester_opinion, version";

pub(crate) const STEP_COLUMNS: &str = "application_id, sequence, approver_id, decision_kind, \
     decision_date, opinion, outcome, is_final";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApprovalError {
    fn from(error: RepositoryError) -> Self {
        ApprovalError::Persistence(error.to_string())
    }
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("invalid date `{value}`: {e}")))
}

pub(crate) fn row_to_application(row: &SqliteRow) -> Result<Application, RepositoryError> {
    let status_str: String = column(row, "status")?;
    let status = ApplicationStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;
    let request_date: String = column(row, "request_date")?;

    Ok(Application {
        id: ApplicationId(column(row, "id")?),
        title: column(row, "title")?,
        detail_document: column(row, "detail_document")?,
        status,
        requester_id: column(row, "requester_id")?,
        request_date: parse_date(&request_date)?,
        requester_opinion: column(row, "requester_opinion")?,
        version: column(row, "version")?,
    })
}

pub(crate) fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let sequence: i64 = column(row, "sequence")?;
    let sequence = u32::try_from(sequence)
        .map_err(|_| RepositoryError::Decode(format!("invalid step sequence {sequence}")))?;
    let decision_kind: String = column(row, "decision_kind")?;
    let is_final: i64 = column(row, "is_final")?;

    let decision = if decision_kind == "decided" {
        let outcome: Option<String> = column(row, "outcome")?;
        let outcome = match outcome.as_deref() {
            Some("approved") => DecisionOutcome::Approved,
            Some("rejected") => DecisionOutcome::Rejected,
            other => {
                return Err(RepositoryError::Decode(format!(
                    "decided step {sequence} has outcome {other:?}"
                )))
            }
        };
        let decision_date: Option<String> = column(row, "decision_date")?;
        let decided_on = decision_date
            .as_deref()
            .map(parse_date)
            .transpose()?
            .ok_or_else(|| {
                RepositoryError::Decode(format!("decided step {sequence} has no decision date"))
            })?;
        Some(StepDecision { outcome, decided_on, opinion: column(row, "opinion")? })
    } else {
        None
    };

    Ok(ApprovalStep {
        application_id: ApplicationId(column(row, "application_id")?),
        sequence,
        approver_id: column(row, "approver_id")?,
        decision,
        is_final: is_final != 0,
    })
}
