use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use itgov_core::approvals::engine::DecisionRecord;
use itgov_core::approvals::store::{ApprovalStore, ApprovalUnit};
use itgov_core::domain::application::{ApplicationId, ApprovalChain};
use itgov_core::errors::ApprovalError;

use super::{
    row_to_application, row_to_step, RepositoryError, APPLICATION_COLUMNS, DATE_FORMAT,
    STEP_COLUMNS,
};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlApprovalStore {
    pool: DbPool,
}

impl SqlApprovalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for SqlApprovalStore {
    type Unit = SqlApprovalUnit;

    async fn begin(&self) -> Result<Self::Unit, ApprovalError> {
        let tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        Ok(SqlApprovalUnit { tx })
    }
}

/// A decision transaction. Dropping it without `commit` rolls back.
pub struct SqlApprovalUnit {
    tx: Transaction<'static, Sqlite>,
}

impl SqlApprovalUnit {
    async fn load(&mut self, id: &ApplicationId) -> Result<Option<ApprovalChain>, RepositoryError> {
        let header =
            sqlx::query(&format!("SELECT {APPLICATION_COLUMNS} FROM application WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&mut *self.tx)
                .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let application = row_to_application(&header)?;

        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step
             WHERE application_id = ? ORDER BY sequence ASC"
        ))
        .bind(&id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        let steps = rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ApprovalChain::new(application, steps)))
    }
}

#[async_trait]
impl ApprovalUnit for SqlApprovalUnit {
    async fn load_chain(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApprovalChain>, ApprovalError> {
        Ok(self.load(id).await?)
    }

    async fn store_decision(&mut self, record: &DecisionRecord) -> Result<(), ApprovalError> {
        let application = &record.chain.application;

        let updated = sqlx::query(
            "UPDATE application
             SET status = ?, detail_document = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(application.status.as_str())
        .bind(&application.detail_document)
        .bind(application.version)
        .bind(Utc::now().to_rfc3339())
        .bind(&application.id.0)
        .bind(record.expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        if updated.rows_affected() == 0 {
            return Err(ApprovalError::ConcurrentModification(application.id.0.clone()));
        }

        for step in record.decided_steps() {
            let Some(decision) = &step.decision else {
                continue;
            };

            let written = sqlx::query(
                "UPDATE approval_step
                 SET decision_kind = 'decided', decision_date = ?, opinion = ?, outcome = ?
                 WHERE application_id = ? AND sequence = ? AND decision_kind = 'none'",
            )
            .bind(decision.decided_on.format(DATE_FORMAT).to_string())
            .bind(&decision.opinion)
            .bind(decision.outcome.as_str())
            .bind(&step.application_id.0)
            .bind(i64::from(step.sequence))
            .execute(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;

            if written.rows_affected() != 1 {
                return Err(ApprovalError::ConcurrentModification(application.id.0.clone()));
            }
        }

        Ok(())
    }

    async fn commit(self) -> Result<(), ApprovalError> {
        self.tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), ApprovalError> {
        self.tx.rollback().await.map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use itgov_core::approvals::engine::{ApprovalChainEngine, DecisionRequest};
    use itgov_core::approvals::service::ApprovalService;
    use itgov_core::approvals::store::{ApprovalStore, ApprovalUnit};
    use itgov_core::config::WorkflowConfig;
    use itgov_core::domain::application::{ApplicationStatus, DecisionKind, DecisionOutcome};
    use itgov_core::errors::ApprovalError;
    use sqlx::Row;

    use super::SqlApprovalStore;
    use crate::repositories::test_support::{request_date, setup, submission};
    use crate::repositories::SqlApplicationRepository;

    fn today() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date")
    }

    fn decide(id: &str, approver: &str, outcome: &str) -> DecisionRequest {
        DecisionRequest {
            application_id: id.to_string(),
            approver_id: approver.to_string(),
            opinion: Some(format!("{approver} ok")),
            outcome: Some(outcome.to_string()),
        }
    }

    #[tokio::test]
    async fn decision_persists_steps_status_and_document() {
        let pool = setup().await;
        let repo = SqlApplicationRepository::new(pool.clone());
        let mut request = submission(&["A", "A", "B"]);
        request.detail_document = Some(
            r#"{"title":"x","approvalLine":{"0":{"id":"A"},"1":{"id":"A"},"2":{"id":"B"}}}"#
                .to_string(),
        );
        let id = repo.submit(&request, request_date()).await.expect("submit");

        let service =
            ApprovalService::new(SqlApprovalStore::new(pool.clone()), &WorkflowConfig::default())
                .with_clock(today);

        let record = service.decide(&decide(&id.0, "A", "승인")).await.expect("A decides");
        assert_eq!(record.decided_sequences, vec![1, 2]);

        let view = repo.find_view(&id).await.expect("load").expect("present");
        assert_eq!(view.application.status, ApplicationStatus::Pending);
        assert_eq!(view.application.version, 1);
        assert_eq!(view.steps[0].outcome(), Some(DecisionOutcome::Approved));
        assert_eq!(view.steps[1].decision, view.steps[0].decision);
        assert_eq!(view.steps[2].decision_kind(), DecisionKind::None);
        let document = view.application.detail_document.expect("document kept");
        assert_eq!(document.matches("2026.03.09").count(), 2);

        service.decide(&decide(&id.0, "B", "approve")).await.expect("B decides");
        let view = repo.find_view(&id).await.expect("load").expect("present");
        assert_eq!(view.application.status, ApplicationStatus::Approved);
    }

    #[tokio::test]
    async fn failing_bulk_item_rolls_back_whole_batch() {
        let pool = setup().await;
        let repo = SqlApplicationRepository::new(pool.clone());
        let first = repo.submit(&submission(&["A"]), request_date()).await.expect("first");
        let second = repo.submit(&submission(&["B"]), request_date()).await.expect("second");
        let third = repo.submit(&submission(&["A"]), request_date()).await.expect("third");

        let service =
            ApprovalService::new(SqlApprovalStore::new(pool.clone()), &WorkflowConfig::default())
                .with_clock(today);

        let result = service
            .bulk_decide(&[
                decide(&first.0, "A", "approve"),
                decide(&second.0, "A", "approve"),
                decide(&third.0, "A", "approve"),
            ])
            .await;
        assert!(matches!(
            result,
            Err(ApprovalError::BatchItemFailure { ref application_id, .. })
                if *application_id == second.0
        ));

        let decided: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM approval_step WHERE decision_kind = 'decided'",
        )
        .fetch_one(&pool)
        .await
        .expect("count decided")
        .get("count");
        assert_eq!(decided, 0);

        for id in [&first, &second, &third] {
            let view = repo.find_view(id).await.expect("load").expect("present");
            assert_eq!(view.application.status, ApplicationStatus::Pending);
            assert_eq!(view.application.version, 0);
        }
    }

    #[tokio::test]
    async fn stale_version_is_reported_as_concurrent_modification() {
        let pool = setup().await;
        let repo = SqlApplicationRepository::new(pool.clone());
        let id = repo.submit(&submission(&["A", "B"]), request_date()).await.expect("submit");

        let service =
            ApprovalService::new(SqlApprovalStore::new(pool.clone()), &WorkflowConfig::default())
                .with_clock(today);
        let chain = repo.find_view(&id).await.expect("load").expect("present");

        service.decide(&decide(&id.0, "A", "approve")).await.expect("first decision");

        // A writer that read the chain before the first decision landed.
        let engine = ApprovalChainEngine::default();
        let command = decide(&id.0, "A", "approve").to_command().expect("command");
        let stale = engine.decide(&chain, &command, today()).expect("stale decision computes");

        let store = SqlApprovalStore::new(pool.clone());
        let mut unit = store.begin().await.expect("begin");
        let result = unit.store_decision(&stale).await;
        assert!(matches!(result, Err(ApprovalError::ConcurrentModification(_))));
        unit.rollback().await.expect("rollback");
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let pool = setup().await;
        let service = ApprovalService::new(SqlApprovalStore::new(pool), &WorkflowConfig::default());

        let result = service.decide(&decide("does-not-exist", "A", "approve")).await;
        assert!(matches!(result, Err(ApprovalError::ApplicationNotFound(_))));
    }
}
