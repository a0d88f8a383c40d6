//! The entity store.
//!
//! Everything the workflow reads or writes goes through the [`Store`] trait.
//! [`PgStore`] is the Postgres backed implementation used by the server. The
//! tests use an in-memory implementation instead, which lets the campaign
//! logic run without a database.
//!
//! A store is owned by a single request, there is no shared state between
//! stores other than the database itself.

#[cfg(test)]
pub(crate) mod memory;

use crate::models::{
    ChangeLogEntry, NewChangeLogEntry, NewNotificationAudit, NotificationAudit, Session,
};
use crate::resources::{
    Contractor, EmailCampaign, EmailSend, NewContractor, NewEmailCampaign,
    NewEmailSend, NewSubmission, NewSwmsJob, Review, SwmsJob, SwmsSubmission,
};
use chrono::{DateTime, Utc};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, PoolError, PooledConnection};
use diesel::RunQueryDsl;
use std::time::Duration;
use swms_core::{CampaignStatus, JobStatus, SubmissionStatus};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Errors returned by a [`Store`].
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    /// A failure that did not originate in diesel.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Selects jobs. An empty filter selects every job.
#[derive(Clone, Debug, Default)]
pub(crate) struct JobFilter {
    pub(crate) ids: Option<Vec<Uuid>>,
    pub(crate) job_site_id: Option<Uuid>,
    pub(crate) statuses: Vec<JobStatus>,
}

impl JobFilter {
    /// Only the job with `id`, if given.
    pub(crate) fn only(mut self, id: Option<Uuid>) -> Self {
        if let Some(id) = id {
            self.ids = Some(vec![id]);
        }
        self
    }

    pub(crate) fn at_site(mut self, job_site_id: Option<Uuid>) -> Self {
        self.job_site_id = job_site_id;
        self
    }

    pub(crate) fn with_status(mut self, status: JobStatus) -> Self {
        self.statuses.push(status);
        self
    }
}

/// Selects submissions. An empty filter selects every submission.
#[derive(Clone, Debug, Default)]
pub(crate) struct SubmissionFilter {
    /// Submissions against any job at this site.
    pub(crate) job_site_id: Option<Uuid>,
    pub(crate) swms_job_ids: Option<Vec<Uuid>>,
    pub(crate) contractor_id: Option<Uuid>,
    pub(crate) statuses: Vec<SubmissionStatus>,

    /// Submissions created strictly before this moment.
    pub(crate) created_before: Option<DateTime<Utc>>,
}

impl SubmissionFilter {
    /// Only submissions against the job with `id`, if given.
    pub(crate) fn for_job(mut self, id: Option<Uuid>) -> Self {
        if let Some(id) = id {
            self.swms_job_ids = Some(vec![id]);
        }
        self
    }

    pub(crate) fn at_site(mut self, job_site_id: Option<Uuid>) -> Self {
        self.job_site_id = job_site_id;
        self
    }

    pub(crate) fn for_contractor(mut self, contractor_id: Option<Uuid>) -> Self {
        self.contractor_id = contractor_id;
        self
    }

    pub(crate) fn with_statuses(mut self, statuses: &[SubmissionStatus]) -> Self {
        self.statuses.extend_from_slice(statuses);
        self
    }

    pub(crate) fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }
}

/// Selects contractors. An empty filter selects every contractor.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContractorFilter {
    pub(crate) ids: Option<Vec<Uuid>>,
    pub(crate) active: Option<bool>,

    /// Only contractors with a non-empty contact email address.
    pub(crate) with_email: bool,
}

impl ContractorFilter {
    /// The contractors campaign emails can be sent to.
    pub(crate) fn reachable() -> Self {
        Self {
            ids: None,
            active: Some(true),
            with_email: true,
        }
    }

    pub(crate) fn among(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }
}

/// Selects campaigns. An empty filter selects every campaign.
#[derive(Clone, Debug, Default)]
pub(crate) struct CampaignFilter {
    pub(crate) statuses: Vec<CampaignStatus>,

    /// Campaigns about a job at this site, or site-wide campaigns of this
    /// site.
    pub(crate) job_site_id: Option<Uuid>,
}

impl CampaignFilter {
    pub(crate) fn with_status(mut self, status: CampaignStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub(crate) fn at_site(mut self, job_site_id: Option<Uuid>) -> Self {
        self.job_site_id = job_site_id;
        self
    }
}

/// The operations the workflow needs from durable storage.
///
/// Methods take `&mut self`, a store is never shared between threads.
pub(crate) trait Store {
    /// Run `f` in a transaction. All changes made by `f` are kept if it
    /// returns `Ok`, and discarded otherwise.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>;

    /// Abort any statement of the current transaction running longer than
    /// `timeout`.
    fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), StoreError>;

    fn find_session(&mut self, token: Uuid) -> Result<Option<Session>, StoreError>;

    fn jobs(&mut self, filter: &JobFilter) -> Result<Vec<SwmsJob>, StoreError>;
    fn count_jobs(&mut self, filter: &JobFilter) -> Result<i64, StoreError>;
    fn insert_job(&mut self, job: NewSwmsJob) -> Result<SwmsJob, StoreError>;

    /// Returns `None` if the job does not exist.
    fn update_job_status(
        &mut self,
        id: Uuid,
        status: JobStatus,
    ) -> Result<Option<SwmsJob>, StoreError>;

    fn contractors(&mut self, filter: &ContractorFilter) -> Result<Vec<Contractor>, StoreError>;
    fn insert_contractor(&mut self, contractor: NewContractor) -> Result<Contractor, StoreError>;

    /// Returns `None` if the contractor does not exist.
    fn set_contractor_active(
        &mut self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Contractor>, StoreError>;

    fn submissions(&mut self, filter: &SubmissionFilter)
        -> Result<Vec<SwmsSubmission>, StoreError>;
    fn count_submissions(&mut self, filter: &SubmissionFilter) -> Result<i64, StoreError>;

    /// The submissions with the most recent activity, newest first. A
    /// submission was last active when it was reviewed, or else when it was
    /// created.
    fn recent_submissions(
        &mut self,
        job_site_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SwmsSubmission>, StoreError>;

    fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<SwmsSubmission, StoreError>;

    /// Apply `review` to every `submitted` submission matching `filter` as a
    /// single set-based update. Returns the number of updated rows.
    fn approve_submissions(
        &mut self,
        filter: &SubmissionFilter,
        review: &Review,
    ) -> Result<usize, StoreError>;

    /// Apply `review` to one submission that has not been reviewed yet.
    ///
    /// Returns `None` if the submission does not exist or was already
    /// reviewed.
    fn review_submission(
        &mut self,
        id: Uuid,
        review: &Review,
    ) -> Result<Option<SwmsSubmission>, StoreError>;

    fn campaigns(&mut self, filter: &CampaignFilter) -> Result<Vec<EmailCampaign>, StoreError>;
    fn count_campaigns(&mut self, filter: &CampaignFilter) -> Result<i64, StoreError>;
    fn insert_campaign(&mut self, campaign: NewEmailCampaign)
        -> Result<EmailCampaign, StoreError>;

    /// Move every `active` campaign matching `filter` to `paused` as a single
    /// set-based update. Returns the number of updated rows.
    fn pause_campaigns(&mut self, filter: &CampaignFilter) -> Result<usize, StoreError>;

    fn insert_sends(&mut self, sends: &[NewEmailSend]) -> Result<usize, StoreError>;
    fn sends(&mut self, campaign_id: Uuid) -> Result<Vec<EmailSend>, StoreError>;

    fn insert_notification_audit(
        &mut self,
        audit: NewNotificationAudit,
    ) -> Result<NotificationAudit, StoreError>;

    /// The most recent audit records, newest first. With a `job_site_id`,
    /// only audits of actions scoped to that site are read.
    fn notification_audits(
        &mut self,
        job_site_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<NotificationAudit>, StoreError>;

    fn insert_change_log(
        &mut self,
        entry: NewChangeLogEntry,
    ) -> Result<ChangeLogEntry, StoreError>;

    /// The most recent change-log entries, newest first.
    fn change_log(
        &mut self,
        job_site_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ChangeLogEntry>, StoreError>;
}

pub(crate) type PooledPgConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// A [`Store`] backed by a pooled Postgres connection.
pub(crate) struct PgStore {
    conn: PooledPgConnection,
}

impl PgStore {
    pub(crate) const fn new(conn: PooledPgConnection) -> Self {
        Self { conn }
    }
}

impl Store for PgStore {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        AnsiTransactionManager::begin_transaction(&mut *self.conn).map_err(StoreError::from)?;

        match f(self) {
            Ok(value) => {
                AnsiTransactionManager::commit_transaction(&mut *self.conn)
                    .map_err(StoreError::from)?;

                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = AnsiTransactionManager::rollback_transaction(&mut *self.conn)
                {
                    warn!(error = %rollback, "transaction rollback failed");
                }

                Err(err)
            }
        }
    }

    fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        let sql = format!("SET LOCAL statement_timeout = {}", timeout.as_millis());

        let _ = diesel::sql_query(sql).execute(&mut *self.conn)?;
        Ok(())
    }

    fn find_session(&mut self, token: Uuid) -> Result<Option<Session>, StoreError> {
        Session::find_by_token(token, &mut self.conn).map_err(Into::into)
    }

    fn jobs(&mut self, filter: &JobFilter) -> Result<Vec<SwmsJob>, StoreError> {
        SwmsJob::load(filter, &mut self.conn).map_err(Into::into)
    }

    fn count_jobs(&mut self, filter: &JobFilter) -> Result<i64, StoreError> {
        SwmsJob::count(filter, &mut self.conn).map_err(Into::into)
    }

    fn insert_job(&mut self, job: NewSwmsJob) -> Result<SwmsJob, StoreError> {
        job.create(&mut self.conn).map_err(Into::into)
    }

    fn update_job_status(
        &mut self,
        id: Uuid,
        status: JobStatus,
    ) -> Result<Option<SwmsJob>, StoreError> {
        SwmsJob::set_status(id, status, &mut self.conn).map_err(Into::into)
    }

    fn contractors(&mut self, filter: &ContractorFilter) -> Result<Vec<Contractor>, StoreError> {
        Contractor::load(filter, &mut self.conn).map_err(Into::into)
    }

    fn insert_contractor(&mut self, contractor: NewContractor) -> Result<Contractor, StoreError> {
        contractor.create(&mut self.conn).map_err(Into::into)
    }

    fn set_contractor_active(
        &mut self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Contractor>, StoreError> {
        Contractor::set_active(id, active, &mut self.conn).map_err(Into::into)
    }

    fn submissions(
        &mut self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SwmsSubmission>, StoreError> {
        SwmsSubmission::load(filter, &mut self.conn).map_err(Into::into)
    }

    fn count_submissions(&mut self, filter: &SubmissionFilter) -> Result<i64, StoreError> {
        SwmsSubmission::count(filter, &mut self.conn).map_err(Into::into)
    }

    fn recent_submissions(
        &mut self,
        job_site_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SwmsSubmission>, StoreError> {
        SwmsSubmission::recent(job_site_id, limit, &mut self.conn).map_err(Into::into)
    }

    fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<SwmsSubmission, StoreError> {
        submission.create(&mut self.conn).map_err(Into::into)
    }

    fn approve_submissions(
        &mut self,
        filter: &SubmissionFilter,
        review: &Review,
    ) -> Result<usize, StoreError> {
        SwmsSubmission::approve_all(filter, review, &mut self.conn).map_err(Into::into)
    }

    fn review_submission(
        &mut self,
        id: Uuid,
        review: &Review,
    ) -> Result<Option<SwmsSubmission>, StoreError> {
        SwmsSubmission::review(id, review, &mut self.conn).map_err(Into::into)
    }

    fn campaigns(&mut self, filter: &CampaignFilter) -> Result<Vec<EmailCampaign>, StoreError> {
        EmailCampaign::load(filter, &mut self.conn).map_err(Into::into)
    }

    fn count_campaigns(&mut self, filter: &CampaignFilter) -> Result<i64, StoreError> {
        EmailCampaign::count(filter, &mut self.conn).map_err(Into::into)
    }

    fn insert_campaign(
        &mut self,
        campaign: NewEmailCampaign,
    ) -> Result<EmailCampaign, StoreError> {
        campaign.create(&mut self.conn).map_err(Into::into)
    }

    fn pause_campaigns(&mut self, filter: &CampaignFilter) -> Result<usize, StoreError> {
        EmailCampaign::pause_all(filter, &mut self.conn).map_err(Into::into)
    }

    fn insert_sends(&mut self, sends: &[NewEmailSend]) -> Result<usize, StoreError> {
        NewEmailSend::create_all(sends, &mut self.conn).map_err(Into::into)
    }

    fn sends(&mut self, campaign_id: Uuid) -> Result<Vec<EmailSend>, StoreError> {
        EmailSend::for_campaign(campaign_id, &mut self.conn).map_err(Into::into)
    }

    fn insert_notification_audit(
        &mut self,
        audit: NewNotificationAudit,
    ) -> Result<NotificationAudit, StoreError> {
        audit.create(&mut self.conn).map_err(Into::into)
    }

    fn notification_audits(
        &mut self,
        job_site_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<NotificationAudit>, StoreError> {
        NotificationAudit::recent(job_site_id, limit, &mut self.conn).map_err(Into::into)
    }

    fn insert_change_log(
        &mut self,
        entry: NewChangeLogEntry,
    ) -> Result<ChangeLogEntry, StoreError> {
        entry.create(&mut self.conn).map_err(Into::into)
    }

    fn change_log(
        &mut self,
        job_site_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        ChangeLogEntry::recent(job_site_id, limit, &mut self.conn).map_err(Into::into)
    }
}
