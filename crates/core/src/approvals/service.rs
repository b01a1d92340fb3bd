use chrono::NaiveDate;
use tracing::{info, warn};

use crate::approvals::bulk::{BulkApprovalCoordinator, BulkDecisionSummary};
use crate::approvals::document::DetailDocumentSynchronizer;
use crate::approvals::engine::{ApprovalChainEngine, DecisionRecord, DecisionRequest};
use crate::approvals::store::{ApprovalStore, ApprovalUnit};
use crate::config::WorkflowConfig;
use crate::errors::ApprovalError;

pub type Clock = fn() -> NaiveDate;

/// Local calendar date; the default clock for submissions and decisions.
pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Runs decisions inside store transactions. Every call either commits all of
/// its writes or rolls all of them back.
pub struct ApprovalService<S> {
    store: S,
    engine: ApprovalChainEngine,
    bulk_max_items: usize,
    clock: Clock,
}

impl<S> ApprovalService<S>
where
    S: ApprovalStore,
{
    pub fn new(store: S, workflow: &WorkflowConfig) -> Self {
        let synchronizer = DetailDocumentSynchronizer::new(workflow.document_date_format.clone());
        Self {
            store,
            engine: ApprovalChainEngine::new(synchronizer),
            bulk_max_items: workflow.bulk_max_items,
            clock: local_today,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn decide(&self, request: &DecisionRequest) -> Result<DecisionRecord, ApprovalError> {
        let command = request.to_command()?;
        let today = (self.clock)();

        let mut unit = self.store.begin().await?;
        match self.engine.record_decision(&mut unit, &command, today).await {
            Ok(record) => {
                unit.commit().await?;
                Ok(record)
            }
            Err(error) => {
                discard(unit, &command.application_id.0).await;
                Err(error)
            }
        }
    }

    /// Applies `items` in order as one unit of work. The first failing item
    /// rolls back every decision recorded before it.
    pub async fn bulk_decide(
        &self,
        items: &[DecisionRequest],
    ) -> Result<BulkDecisionSummary, ApprovalError> {
        if items.len() > self.bulk_max_items {
            return Err(ApprovalError::InvalidRequest(format!(
                "bulk request holds {} items; at most {} are accepted",
                items.len(),
                self.bulk_max_items
            )));
        }

        if items.is_empty() {
            return Ok(BulkDecisionSummary {
                total_count: 0,
                success_count: 0,
                failure_count: 0,
                results: Vec::new(),
            });
        }

        let today = (self.clock)();
        let coordinator = BulkApprovalCoordinator::new(&self.engine);

        let mut unit = self.store.begin().await?;
        match coordinator.apply(&mut unit, items, today).await {
            Ok(summary) => {
                unit.commit().await?;
                info!(
                    event_name = "approval.bulk.committed",
                    total_count = summary.total_count,
                    "bulk approval committed"
                );
                Ok(summary)
            }
            Err(error) => {
                if let Err(rollback_error) = unit.rollback().await {
                    warn!(
                        event_name = "approval.rollback.failed",
                        error = %rollback_error,
                        "bulk rollback reported an error"
                    );
                }
                warn!(
                    event_name = "approval.bulk.rolled_back",
                    total_count = items.len(),
                    error_kind = error.kind(),
                    error = %error,
                    "bulk approval rolled back"
                );
                Err(error)
            }
        }
    }
}

async fn discard<U: ApprovalUnit>(unit: U, application_id: &str) {
    if let Err(error) = unit.rollback().await {
        warn!(
            event_name = "approval.rollback.failed",
            application_id,
            error = %error,
            "decision rollback reported an error"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::ApprovalService;
    use crate::approvals::engine::{ApprovalChainEngine, DecisionCommand, DecisionRequest};
    use crate::approvals::memory::InMemoryApprovalStore;
    use crate::approvals::store::{ApprovalStore, ApprovalUnit};
    use crate::config::WorkflowConfig;
    use crate::domain::application::{
        Application, ApplicationId, ApplicationStatus, ApprovalChain, ApprovalStep,
        DecisionOutcome,
    };
    use crate::errors::ApprovalError;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).expect("valid date")
    }

    fn chain(id: &str, approvers: &[&str]) -> ApprovalChain {
        let id = ApplicationId(id.to_string());
        let steps = approvers
            .iter()
            .enumerate()
            .map(|(index, approver)| {
                ApprovalStep::pending(
                    id.clone(),
                    (index + 1) as u32,
                    approver.to_string(),
                    index + 1 == approvers.len(),
                )
            })
            .collect();
        ApprovalChain::new(
            Application {
                id,
                title: None,
                detail_document: None,
                status: ApplicationStatus::Pending,
                requester_id: "E100".to_string(),
                request_date: fixed_today(),
                requester_opinion: None,
                version: 1,
            },
            steps,
        )
    }

    fn request(id: &str, approver: &str, outcome: &str) -> DecisionRequest {
        DecisionRequest {
            application_id: id.to_string(),
            approver_id: approver.to_string(),
            opinion: None,
            outcome: Some(outcome.to_string()),
        }
    }

    async fn service_with(chains: Vec<ApprovalChain>) -> ApprovalService<InMemoryApprovalStore> {
        let store = InMemoryApprovalStore::default();
        for chain in chains {
            store.insert(chain).await;
        }
        ApprovalService::new(store, &WorkflowConfig::default()).with_clock(fixed_today)
    }

    async fn stored(
        service: &ApprovalService<InMemoryApprovalStore>,
        id: &str,
    ) -> ApprovalChain {
        service.store().get(&ApplicationId(id.to_string())).await.expect("chain present")
    }

    #[tokio::test]
    async fn decide_commits_and_uses_clock_date() {
        let service = service_with(vec![chain("APP-1", &["A", "B"])]).await;

        let record = service.decide(&request("APP-1", "A", "approve")).await.expect("decided");
        assert_eq!(record.status(), ApplicationStatus::Pending);

        let chain = stored(&service, "APP-1").await;
        let decision = chain.steps[0].decision.clone().expect("step 1 decided");
        assert_eq!(decision.decided_on, fixed_today());
        assert_eq!(chain.application.version, 2);
    }

    #[tokio::test]
    async fn failed_decision_leaves_store_untouched() {
        let service = service_with(vec![chain("APP-1", &["A", "B"])]).await;

        let result = service.decide(&request("APP-1", "B", "approve")).await;
        assert!(matches!(result, Err(ApprovalError::WrongApprover { .. })));

        let missing = service.decide(&request("APP-404", "A", "approve")).await;
        assert!(matches!(
            missing,
            Err(ApprovalError::ApplicationNotFound(ref id)) if id == "APP-404"
        ));

        let chain = stored(&service, "APP-1").await;
        assert!(chain.steps.iter().all(|step| step.decision.is_none()));
        assert_eq!(chain.application.version, 1);
    }

    #[tokio::test]
    async fn bulk_success_reports_every_item() {
        let service = service_with(vec![chain("APP-1", &["A"]), chain("APP-2", &["A", "B"])]).await;

        let summary = service
            .bulk_decide(&[request("APP-1", "A", "승인"), request("APP-2", "A", "승인")])
            .await
            .expect("bulk succeeds");

        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 0);
        assert!(summary.results.iter().all(|item| item.success));
        assert_eq!(stored(&service, "APP-1").await.application.status, ApplicationStatus::Approved);
        assert_eq!(stored(&service, "APP-2").await.application.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn bulk_failure_rolls_back_earlier_items() {
        let service = service_with(vec![
            chain("APP-1", &["A"]),
            chain("APP-2", &["B"]),
            chain("APP-3", &["A"]),
        ])
        .await;

        let result = service
            .bulk_decide(&[
                request("APP-1", "A", "approve"),
                request("APP-2", "A", "approve"),
                request("APP-3", "A", "approve"),
            ])
            .await;

        match result {
            Err(ApprovalError::BatchItemFailure { application_id, source }) => {
                assert_eq!(application_id, "APP-2");
                assert!(matches!(*source, ApprovalError::WrongApprover { .. }));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }

        for id in ["APP-1", "APP-2", "APP-3"] {
            let chain = stored(&service, id).await;
            assert!(chain.steps.iter().all(|step| step.decision.is_none()), "{id} untouched");
            assert_eq!(chain.application.status, ApplicationStatus::Pending);
        }
    }

    #[tokio::test]
    async fn bulk_sees_its_own_earlier_decisions() {
        let service = service_with(vec![chain("APP-1", &["A", "B"])]).await;

        let summary = service
            .bulk_decide(&[request("APP-1", "A", "approve"), request("APP-1", "B", "approve")])
            .await
            .expect("second item sees first");

        assert_eq!(summary.success_count, 2);
        assert_eq!(stored(&service, "APP-1").await.application.status, ApplicationStatus::Approved);
    }

    #[tokio::test]
    async fn empty_bulk_succeeds_with_zero_counts() {
        let service = service_with(Vec::new()).await;
        let summary = service.bulk_decide(&[]).await.expect("empty batch");
        assert_eq!(summary.total_count, 0);
        assert!(summary.results.is_empty());
    }

    #[tokio::test]
    async fn oversized_bulk_is_refused() {
        let store = InMemoryApprovalStore::default();
        let workflow = WorkflowConfig { bulk_max_items: 2, ..WorkflowConfig::default() };
        let service = ApprovalService::new(store, &workflow);

        let items = vec![request("APP-1", "A", "approve"); 3];
        let result = service.bulk_decide(&items).await;
        assert!(matches!(result, Err(ApprovalError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn concurrent_decisions_on_same_step_allow_one_winner() {
        let store = InMemoryApprovalStore::default();
        store.insert(chain("APP-1", &["A", "B"])).await;
        let engine = ApprovalChainEngine::default();
        let command = DecisionCommand {
            application_id: ApplicationId("APP-1".to_string()),
            approver_id: "A".to_string(),
            opinion: None,
            outcome: DecisionOutcome::Approved,
        };

        let mut first = store.begin().await.expect("begin first");
        let mut second = store.begin().await.expect("begin second");

        engine.record_decision(&mut first, &command, fixed_today()).await.expect("first decides");
        engine
            .record_decision(&mut second, &command, fixed_today())
            .await
            .expect("second decides against its snapshot");

        first.commit().await.expect("first commit wins");
        let lost = second.commit().await;
        assert!(matches!(lost, Err(ApprovalError::ConcurrentModification(_))));

        let chain = store.get(&ApplicationId("APP-1".to_string())).await.expect("present");
        assert_eq!(chain.application.version, 2);
    }
}
