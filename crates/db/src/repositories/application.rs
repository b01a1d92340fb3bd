use chrono::{NaiveDate, Utc};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use itgov_core::domain::application::{
    Application, ApplicationId, ApplicationStatus, ApprovalChain, OriginLink, SubmitApplication,
};
use itgov_core::errors::ApprovalError;

use super::{
    column, row_to_application, row_to_step, RepositoryError, APPLICATION_COLUMNS, DATE_FORMAT,
    STEP_COLUMNS,
};
use crate::DbPool;

pub const ORIGIN_LINK_PREFIX: &str = "APF_REL_";

/// Latest application linked to a business record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginStatus {
    pub link: OriginLink,
    pub application: Application,
}

pub struct SqlApplicationRepository {
    pool: DbPool,
}

impl SqlApplicationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts header, origin link and steps in one transaction.
    pub async fn submit(
        &self,
        request: &SubmitApplication,
        request_date: NaiveDate,
    ) -> Result<ApplicationId, ApprovalError> {
        request.validate()?;

        let id = ApplicationId(Uuid::new_v4().simple().to_string());
        let now = Utc::now().to_rfc3339();
        let steps = request.steps_for(&id);

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(
            "INSERT INTO application (id, title, detail_document, status, requester_id,
                                      request_date, requester_opinion, version,
                                      created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id.0)
        .bind(&request.title)
        .bind(&request.detail_document)
        .bind(ApplicationStatus::Pending.as_str())
        .bind(request.requester_id.trim())
        .bind(request_date.format(DATE_FORMAT).to_string())
        .bind(&request.requester_opinion)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if let Some(origin) = &request.origin {
            sqlx::query(
                "INSERT INTO origin_link (application_id, origin_table_code, origin_key,
                                          origin_sub_sequence, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id.0)
            .bind(origin.table_code.trim())
            .bind(&origin.key)
            .bind(origin.sub_sequence)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        for step in &steps {
            sqlx::query(
                "INSERT INTO approval_step (application_id, sequence, approver_id,
                                            decision_kind, is_final)
                 VALUES (?, ?, ?, 'none', ?)",
            )
            .bind(&id.0)
            .bind(i64::from(step.sequence))
            .bind(&step.approver_id)
            .bind(i64::from(step.is_final))
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "application.submitted",
            application_id = %id,
            step_count = steps.len(),
            linked = request.origin.is_some(),
            "application submitted"
        );

        Ok(id)
    }

    pub async fn find_view(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApprovalChain>, RepositoryError> {
        let header =
            sqlx::query(&format!("SELECT {APPLICATION_COLUMNS} FROM application WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
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
        .fetch_all(&self.pool)
        .await?;
        let steps = rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ApprovalChain::new(application, steps)))
    }

    /// Views for the ids that exist, in request order. Unknown ids are skipped.
    pub async fn find_views(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<ApprovalChain>, RepositoryError> {
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(view) = self.find_view(id).await? {
                views.push(view);
            }
        }
        Ok(views)
    }

    pub async fn find_latest_for_origin(
        &self,
        table_code: &str,
        origin_key: Option<&str>,
        sub_sequence: Option<i64>,
    ) -> Result<Option<OriginStatus>, RepositoryError> {
        let row = sqlx::query(
            "SELECT l.id AS link_id, l.origin_table_code, l.origin_key, l.origin_sub_sequence,
                    a.id, a.title, a.detail_document, a.status, a.requester_id,
                    a.request_date, a.requester_opinion, a.version
             FROM origin_link l
             JOIN application a ON a.id = l.application_id
             WHERE l.origin_table_code = ? AND l.origin_key IS ? AND l.origin_sub_sequence IS ?
             ORDER BY l.id DESC
             LIMIT 1",
        )
        .bind(table_code)
        .bind(origin_key)
        .bind(sub_sequence)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let application = row_to_application(&row)?;
        let link_id: i64 = column(&row, "link_id")?;
        let link = OriginLink {
            id: format!("{ORIGIN_LINK_PREFIX}{link_id}"),
            application_id: application.id.clone(),
            origin_table_code: column(&row, "origin_table_code")?,
            origin_key: column(&row, "origin_key")?,
            origin_sub_sequence: column(&row, "origin_sub_sequence")?,
        };

        Ok(Some(OriginStatus { link, application }))
    }

    /// True while any linked application is pending or approved; such records
    /// must not be edited or deleted.
    pub async fn has_active_application(
        &self,
        table_code: &str,
        origin_key: Option<&str>,
        sub_sequence: Option<i64>,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS (
                 SELECT 1 FROM origin_link l
                 JOIN application a ON a.id = l.application_id
                 WHERE l.origin_table_code = ? AND l.origin_key IS ?
                   AND l.origin_sub_sequence IS ?
                   AND a.status IN ('pending', 'approved')
             ) AS active",
        )
        .bind(table_code)
        .bind(origin_key)
        .bind(sub_sequence)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("active")? != 0)
    }
}

#[cfg(test)]
mod tests {
    use itgov_core::domain::application::{
        ApplicationId, ApplicationStatus, DecisionKind, OriginRef,
    };
    use itgov_core::errors::ApprovalError;

    use super::SqlApplicationRepository;
    use crate::repositories::test_support::{request_date, setup, submission};

    #[tokio::test]
    async fn submit_creates_pending_header_and_ordered_steps() {
        let repo = SqlApplicationRepository::new(setup().await);

        let request = submission(&["A", " B ", "C"]);
        let id = repo.submit(&request, request_date()).await.expect("submit");
        assert_eq!(id.0.len(), 32);
        assert!(id.0.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));

        let view = repo.find_view(&id).await.expect("load").expect("present");
        assert_eq!(view.application.status, ApplicationStatus::Pending);
        assert_eq!(view.application.request_date, request_date());
        assert_eq!(view.application.version, 0);

        let sequences: Vec<u32> = view.steps.iter().map(|step| step.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(view.steps[1].approver_id, "B");
        assert!(view.steps.iter().all(|step| step.decision_kind() == DecisionKind::None));
        let finals: Vec<bool> = view.steps.iter().map(|step| step.is_final).collect();
        assert_eq!(finals, vec![false, false, true]);
    }

    #[tokio::test]
    async fn submit_without_approvers_is_invalid() {
        let repo = SqlApplicationRepository::new(setup().await);

        let result = repo.submit(&submission(&[]), request_date()).await;
        assert!(matches!(result, Err(ApprovalError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn find_views_keeps_request_order_and_skips_unknown() {
        let repo = SqlApplicationRepository::new(setup().await);
        let first = repo.submit(&submission(&["A"]), request_date()).await.expect("first");
        let second = repo.submit(&submission(&["B"]), request_date()).await.expect("second");

        let views = repo
            .find_views(&[second.clone(), ApplicationId("missing".to_string()), first.clone()])
            .await
            .expect("bulk get");

        let ids: Vec<&ApplicationId> = views.iter().map(|view| &view.application.id).collect();
        assert_eq!(ids, vec![&second, &first]);
    }

    #[tokio::test]
    async fn latest_origin_link_wins_and_drives_active_check() {
        let pool = setup().await;
        let repo = SqlApplicationRepository::new(pool.clone());

        let mut request = submission(&["A"]);
        request.origin = Some(OriginRef {
            table_code: "TAAABB_BPROJM".to_string(),
            key: Some("PRJ-7".to_string()),
            sub_sequence: Some(1),
        });

        let older = repo.submit(&request, request_date()).await.expect("older");
        let newer = repo.submit(&request, request_date()).await.expect("newer");

        let status = repo
            .find_latest_for_origin("TAAABB_BPROJM", Some("PRJ-7"), Some(1))
            .await
            .expect("lookup")
            .expect("linked");
        assert_eq!(status.application.id, newer);
        assert!(status.link.id.starts_with("APF_REL_"));
        assert_ne!(status.application.id, older);

        assert!(repo
            .has_active_application("TAAABB_BPROJM", Some("PRJ-7"), Some(1))
            .await
            .expect("active check"));

        sqlx::query("UPDATE application SET status = 'rejected'")
            .execute(&pool)
            .await
            .expect("reject all");
        assert!(!repo
            .has_active_application("TAAABB_BPROJM", Some("PRJ-7"), Some(1))
            .await
            .expect("active check"));

        let unrelated = repo
            .find_latest_for_origin("TAAABB_BPROJM", Some("PRJ-8"), None)
            .await
            .expect("lookup");
        assert!(unrelated.is_none());
    }

    #[tokio::test]
    async fn origin_lookup_matches_missing_sub_sequence() {
        let repo = SqlApplicationRepository::new(setup().await);
        let mut request = submission(&["A"]);
        request.origin = Some(OriginRef {
            table_code: "TAAABB_BCOSTM".to_string(),
            key: Some("COST-1".to_string()),
            sub_sequence: None,
        });
        let id = repo.submit(&request, request_date()).await.expect("submit");

        let status = repo
            .find_latest_for_origin("TAAABB_BCOSTM", Some("COST-1"), None)
            .await
            .expect("lookup")
            .expect("linked");
        assert_eq!(status.application.id, id);
        assert_eq!(status.link.origin_sub_sequence, None);
    }
}
