//! Record maintenance performed through the GraphQL API.
//!
//! Every mutation runs in its own transaction and appends a change-log entry
//! next to the change it made.

use crate::models::{Actor, NewChangeLogEntry};
use crate::resources::{
    Contractor, NewContractor, NewSubmission, NewSwmsJob, Review, SwmsJob, SwmsSubmission,
};
use crate::store::{JobFilter, Store, StoreError};
use chrono::{DateTime, Utc};
use serde_json::json;
use swms_core::{JobStatus, SubmissionStatus};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub(crate) enum AdminError {
    #[error("{0} {1} not found")]
    NotFound(&'static str, Uuid),

    #[error("submission {0} has already been reviewed")]
    NotReviewable(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) fn create_job<S: Store>(
    store: &mut S,
    actor: &Actor,
    job: NewSwmsJob,
    now: DateTime<Utc>,
) -> Result<SwmsJob, AdminError> {
    store.transaction(|store: &mut S| -> Result<_, AdminError> {
        let job = store.insert_job(job)?;

        let _ = store.insert_change_log(
            NewChangeLogEntry::insert("swms_jobs", job.id, &actor.email)
                .at(now)
                .with_job_site(job.job_site_id)
                .with_details(json!({ "name": job.name, "status": job.status })),
        )?;

        info!(job = %job.id, actor = %actor.email, "job created");
        Ok(job)
    })
}

pub(crate) fn update_job_status<S: Store>(
    store: &mut S,
    actor: &Actor,
    id: Uuid,
    status: JobStatus,
    now: DateTime<Utc>,
) -> Result<SwmsJob, AdminError> {
    store.transaction(|store: &mut S| -> Result<_, AdminError> {
        let job = store
            .update_job_status(id, status)?
            .ok_or(AdminError::NotFound("job", id))?;

        let _ = store.insert_change_log(
            NewChangeLogEntry::update("swms_jobs", job.id, &actor.email)
                .at(now)
                .with_job_site(job.job_site_id)
                .with_details(json!({ "status": status })),
        )?;

        Ok(job)
    })
}

pub(crate) fn create_contractor<S: Store>(
    store: &mut S,
    actor: &Actor,
    contractor: NewContractor,
    now: DateTime<Utc>,
) -> Result<Contractor, AdminError> {
    store.transaction(|store: &mut S| -> Result<_, AdminError> {
        let contractor = store.insert_contractor(contractor)?;

        let _ = store.insert_change_log(
            NewChangeLogEntry::insert("contractors", contractor.id, &actor.email)
                .at(now)
                .with_details(json!({ "name": contractor.name })),
        )?;

        info!(contractor = %contractor.id, actor = %actor.email, "contractor created");
        Ok(contractor)
    })
}

pub(crate) fn set_contractor_active<S: Store>(
    store: &mut S,
    actor: &Actor,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> Result<Contractor, AdminError> {
    store.transaction(|store: &mut S| -> Result<_, AdminError> {
        let contractor = store
            .set_contractor_active(id, active)?
            .ok_or(AdminError::NotFound("contractor", id))?;

        let _ = store.insert_change_log(
            NewChangeLogEntry::update("contractors", contractor.id, &actor.email)
                .at(now)
                .with_details(json!({ "active": active })),
        )?;

        Ok(contractor)
    })
}

pub(crate) fn create_submission<S: Store>(
    store: &mut S,
    actor: &Actor,
    submission: NewSubmission,
    now: DateTime<Utc>,
) -> Result<SwmsSubmission, AdminError> {
    let job_id = submission.swms_job_id();

    store.transaction(|store: &mut S| -> Result<_, AdminError> {
        let job = store
            .jobs(&JobFilter::default().only(Some(job_id)))?
            .pop()
            .ok_or(AdminError::NotFound("job", job_id))?;

        let submission = store.insert_submission(submission)?;

        let _ = store.insert_change_log(
            NewChangeLogEntry::insert("swms_submissions", submission.id, &actor.email)
                .at(now)
                .with_job_site(job.job_site_id)
                .with_details(json!({
                    "swms_job_id": submission.swms_job_id,
                    "contractor_id": submission.contractor_id,
                    "status": submission.status,
                })),
        )?;

        Ok(submission)
    })
}

/// Approve or reject a single submission that has not been reviewed yet.
pub(crate) fn review_submission<S: Store>(
    store: &mut S,
    actor: &Actor,
    id: Uuid,
    status: SubmissionStatus,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<SwmsSubmission, AdminError> {
    let review = Review {
        status,
        reviewed_by: actor.email.clone(),
        reviewed_at: now,
        notes: notes.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()),
    };

    store.transaction(|store: &mut S| -> Result<_, AdminError> {
        let submission = store
            .review_submission(id, &review)?
            .ok_or(AdminError::NotReviewable(id))?;

        let site = store
            .jobs(&JobFilter::default().only(Some(submission.swms_job_id)))?
            .pop()
            .map(|job| job.job_site_id);

        let mut entry = NewChangeLogEntry::update("swms_submissions", submission.id, &actor.email)
            .at(now)
            .with_details(json!({
                "status": submission.status,
                "contractor_id": submission.contractor_id,
            }));

        if let Some(site) = site {
            entry = entry.with_job_site(site);
        }

        let _ = store.insert_change_log(entry)?;

        info!(submission = %submission.id, status = %submission.status, "submission reviewed");
        Ok(submission)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;

    fn actor() -> Actor {
        Actor {
            email: "admin@example.test".to_owned(),
        }
    }

    #[test]
    fn test_create_job_logs_change() {
        let mut store = MemoryStore::default();
        let site = Uuid::new_v4();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let job = create_job(
            &mut store,
            &actor(),
            NewSwmsJob::new(site, "Basement excavation", start),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Planned);

        let log = store.all_change_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].table_name, "swms_jobs");
        assert_eq!(log[0].action, "insert");
        assert_eq!(log[0].record_id, job.id);
        assert_eq!(log[0].job_site_id, Some(site));
    }

    #[test]
    fn test_update_unknown_job() {
        let mut store = MemoryStore::default();
        let id = Uuid::new_v4();

        let err = update_job_status(&mut store, &actor(), id, JobStatus::Active, Utc::now())
            .unwrap_err();

        assert!(matches!(err, AdminError::NotFound("job", _)));
        assert!(store.all_change_log().is_empty());
    }

    #[test]
    fn test_change_log_failure_rolls_back() {
        let mut store = MemoryStore::default();
        let contractor = store.seed_contractor("Acme", Some("ops@acme.test"));
        store.fail_on("insert_change_log");

        let result = set_contractor_active(&mut store, &actor(), contractor.id, false, Utc::now());

        assert!(matches!(result, Err(AdminError::Store(_))));

        store.fail_on("none");
        let contractors = store
            .contractors(&crate::store::ContractorFilter::default())
            .unwrap();
        assert!(contractors[0].active);
    }

    #[test]
    fn test_create_submission_requires_job() {
        let mut store = MemoryStore::default();
        let contractor = store.seed_contractor("Acme", None);

        let err = create_submission(
            &mut store,
            &actor(),
            NewSubmission::new(Uuid::new_v4(), contractor.id),
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, AdminError::NotFound("job", _)));
        assert!(store.all_submissions().is_empty());
    }

    #[test]
    fn test_review_submission_once() {
        let mut store = MemoryStore::default();
        let job = store.seed_job(Uuid::new_v4(), JobStatus::Active);
        let contractor = store.seed_contractor("Acme", None);
        let submission =
            store.seed_submission(&job, &contractor, SubmissionStatus::Submitted, Utc::now());

        let reviewed = review_submission(
            &mut store,
            &actor(),
            submission.id,
            SubmissionStatus::Rejected,
            Some("  Missing hazard controls ".to_owned()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(reviewed.status, SubmissionStatus::Rejected);
        assert_eq!(reviewed.notes.as_deref(), Some("Missing hazard controls"));
        assert_eq!(store.all_change_log()[0].job_site_id, Some(job.job_site_id));

        let err = review_submission(
            &mut store,
            &actor(),
            submission.id,
            SubmissionStatus::Approved,
            None,
            Utc::now(),
        )
        .unwrap_err();

        assert!(matches!(err, AdminError::NotReviewable(_)));
        assert_eq!(store.all_change_log().len(), 1);
    }
}
