use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::approvals::engine::{ApprovalChainEngine, DecisionRequest};
use crate::approvals::store::ApprovalUnit;
use crate::errors::ApprovalError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    pub application_id: String,
    pub success: bool,
    pub message: String,
}

/// Returned only when every item succeeded, so `failure_count` is always zero;
/// a failing item fails the whole call instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDecisionSummary {
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<BulkItemResult>,
}

pub struct BulkApprovalCoordinator<'a> {
    engine: &'a ApprovalChainEngine,
}

impl<'a> BulkApprovalCoordinator<'a> {
    pub fn new(engine: &'a ApprovalChainEngine) -> Self {
        Self { engine }
    }

    /// Applies every item in order through one unit. Stops at the first failure;
    /// the caller owns the unit and must roll it back in that case.
    pub async fn apply<U>(
        &self,
        unit: &mut U,
        items: &[DecisionRequest],
        today: NaiveDate,
    ) -> Result<BulkDecisionSummary, ApprovalError>
    where
        U: ApprovalUnit,
    {
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let command = item
                .to_command()
                .map_err(|error| ApprovalError::batch_item(item.application_id.clone(), error))?;

            let record = self
                .engine
                .record_decision(unit, &command, today)
                .await
                .map_err(|error| ApprovalError::batch_item(item.application_id.clone(), error))?;

            results.push(BulkItemResult {
                application_id: command.application_id.0,
                success: true,
                message: format!("decision recorded; application is {}", record.status().as_str()),
            });
        }

        Ok(BulkDecisionSummary {
            total_count: items.len(),
            success_count: results.len(),
            failure_count: 0,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::BulkApprovalCoordinator;
    use crate::approvals::engine::{ApprovalChainEngine, DecisionRequest};
    use crate::approvals::memory::InMemoryApprovalStore;
    use crate::approvals::store::{ApprovalStore, ApprovalUnit};
    use crate::domain::application::{
        Application, ApplicationId, ApplicationStatus, ApprovalChain, ApprovalStep,
    };
    use crate::errors::ApprovalError;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 2).expect("valid date")
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
                request_date: today(),
                requester_opinion: None,
                version: 0,
            },
            steps,
        )
    }

    fn item(id: &str, approver: &str, outcome: &str) -> DecisionRequest {
        DecisionRequest {
            application_id: id.to_string(),
            approver_id: approver.to_string(),
            opinion: None,
            outcome: Some(outcome.to_string()),
        }
    }

    #[tokio::test]
    async fn items_run_in_order_within_one_unit() {
        let store = InMemoryApprovalStore::default();
        store.insert(chain("APP-1", &["A", "B"])).await;
        let engine = ApprovalChainEngine::default();

        let mut unit = store.begin().await.expect("begin");
        let summary = BulkApprovalCoordinator::new(&engine)
            .apply(
                &mut unit,
                &[item("APP-1", "A", "approve"), item("APP-1", "B", "approve")],
                today(),
            )
            .await
            .expect("both decisions apply");
        unit.commit().await.expect("commit");

        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 0);
        assert_eq!(summary.results[1].message, "decision recorded; application is approved");

        let stored = store.get(&ApplicationId("APP-1".to_string())).await.expect("present");
        assert_eq!(stored.application.status, ApplicationStatus::Approved);
    }

    #[tokio::test]
    async fn malformed_item_names_the_failing_application() {
        let store = InMemoryApprovalStore::default();
        store.insert(chain("APP-1", &["A"])).await;
        store.insert(chain("APP-2", &["A"])).await;
        let engine = ApprovalChainEngine::default();

        let mut unit = store.begin().await.expect("begin");
        let result = BulkApprovalCoordinator::new(&engine)
            .apply(&mut unit, &[item("APP-1", "A", "approve"), item("APP-2", "A", "hold")], today())
            .await;
        unit.rollback().await.expect("rollback");

        match result {
            Err(ApprovalError::BatchItemFailure { application_id, source }) => {
                assert_eq!(application_id, "APP-2");
                assert!(matches!(*source, ApprovalError::InvalidOutcome(_)));
            }
            other => panic!("expected batch item failure, got {other:?}"),
        }

        let first = store.get(&ApplicationId("APP-1".to_string())).await.expect("present");
        assert!(first.steps.iter().all(|step| step.decision.is_none()));
    }
}
