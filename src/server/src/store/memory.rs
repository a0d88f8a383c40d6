//! An in-memory [`Store`], used to test the workflow without a database.
//!
//! Transactions snapshot every table when they start, and restore the
//! snapshot when the closure fails. [`MemoryStore::fail_on`] makes a single
//! operation fail, to exercise the failure paths.

use super::*;
use crate::resources::CampaignKind;
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::Reverse;
use swms_core::AuditResult;

#[derive(Clone, Debug, Default)]
struct Tables {
    sessions: Vec<Session>,
    jobs: Vec<SwmsJob>,
    contractors: Vec<Contractor>,
    submissions: Vec<SwmsSubmission>,
    campaigns: Vec<EmailCampaign>,
    sends: Vec<EmailSend>,
    audits: Vec<NotificationAudit>,
    change_log: Vec<ChangeLogEntry>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    tables: Tables,
    fail_on: Option<&'static str>,
    statement_timeout: Option<Duration>,
}

impl MemoryStore {
    /// Make every call to the store operation named `operation` fail.
    pub(crate) fn fail_on(&mut self, operation: &'static str) {
        self.fail_on = Some(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        match self.fail_on {
            Some(failing) if failing == operation => Err(StoreError::Backend(format!(
                "injected failure in {}",
                operation
            ))),
            _ => Ok(()),
        }
    }

    /// Register a session for `email`, returning its token.
    pub(crate) fn seed_session(&mut self, email: &str) -> Uuid {
        let token = Uuid::new_v4();
        let id = i32::try_from(self.tables.sessions.len()).unwrap_or(i32::MAX) + 1;

        self.tables.sessions.push(Session {
            id,
            token,
            user_email: email.to_owned(),
            created_at: Utc::now(),
        });

        token
    }

    pub(crate) fn seed_job(&mut self, job_site_id: Uuid, status: JobStatus) -> SwmsJob {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let job = NewSwmsJob::new(job_site_id, "Level 3 formwork", start)
            .with_status(status)
            .into_record();

        self.tables.jobs.push(job.clone());
        job
    }

    pub(crate) fn seed_contractor(&mut self, name: &str, email: Option<&str>) -> Contractor {
        let contractor = NewContractor::new(name, email.map(str::to_owned)).into_record();

        self.tables.contractors.push(contractor.clone());
        contractor
    }

    pub(crate) fn seed_inactive_contractor(&mut self, name: &str, email: &str) -> Contractor {
        let contractor = NewContractor::new(name, Some(email.to_owned()))
            .inactive()
            .into_record();

        self.tables.contractors.push(contractor.clone());
        contractor
    }

    pub(crate) fn seed_submission(
        &mut self,
        job: &SwmsJob,
        contractor: &Contractor,
        status: SubmissionStatus,
        created_at: DateTime<Utc>,
    ) -> SwmsSubmission {
        let submission = NewSubmission::new(job.id, contractor.id)
            .with_status(status)
            .at(created_at)
            .into_record();

        self.tables.submissions.push(submission.clone());
        submission
    }

    pub(crate) fn seed_campaign(
        &mut self,
        kind: CampaignKind,
        job: Option<&SwmsJob>,
        status: CampaignStatus,
    ) -> EmailCampaign {
        let mut campaign = NewEmailCampaign::new(kind, "seed@example.test", Utc::now())
            .for_job(job.map(|job| job.id))
            .into_record();
        campaign.status = status;

        self.tables.campaigns.push(campaign.clone());
        campaign
    }

    pub(crate) fn all_submissions(&self) -> &[SwmsSubmission] {
        &self.tables.submissions
    }

    pub(crate) fn all_campaigns(&self) -> &[EmailCampaign] {
        &self.tables.campaigns
    }

    pub(crate) fn all_sends(&self) -> &[EmailSend] {
        &self.tables.sends
    }

    pub(crate) fn all_audits(&self) -> &[NotificationAudit] {
        &self.tables.audits
    }

    pub(crate) fn audits_with(&self, result: AuditResult) -> Vec<&NotificationAudit> {
        self.tables
            .audits
            .iter()
            .filter(|audit| audit.result == result)
            .collect()
    }

    pub(crate) fn all_change_log(&self) -> &[ChangeLogEntry] {
        &self.tables.change_log
    }

    /// The last statement timeout set on this store.
    pub(crate) const fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    fn site_of(&self, job_id: Uuid) -> Option<Uuid> {
        self.tables
            .jobs
            .iter()
            .find(|job| job.id == job_id)
            .map(|job| job.job_site_id)
    }

    fn job_matches(filter: &JobFilter, job: &SwmsJob) -> bool {
        filter.ids.as_ref().map_or(true, |ids| ids.contains(&job.id))
            && filter.job_site_id.map_or(true, |site| job.job_site_id == site)
            && (filter.statuses.is_empty() || filter.statuses.contains(&job.status))
    }

    fn submission_matches(&self, filter: &SubmissionFilter, submission: &SwmsSubmission) -> bool {
        filter
            .job_site_id
            .map_or(true, |site| self.site_of(submission.swms_job_id) == Some(site))
            && filter
                .swms_job_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&submission.swms_job_id))
            && filter
                .contractor_id
                .map_or(true, |id| submission.contractor_id == id)
            && (filter.statuses.is_empty() || filter.statuses.contains(&submission.status))
            && filter
                .created_before
                .map_or(true, |before| submission.created_at < before)
    }

    fn contractor_matches(filter: &ContractorFilter, contractor: &Contractor) -> bool {
        let has_email = contractor
            .contact_email
            .as_deref()
            .map_or(false, |email| !email.is_empty());

        filter
            .ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&contractor.id))
            && filter.active.map_or(true, |active| contractor.active == active)
            && (!filter.with_email || has_email)
    }

    fn campaign_matches(&self, filter: &CampaignFilter, campaign: &EmailCampaign) -> bool {
        let in_site = |site: Uuid| {
            campaign.job_site_id == Some(site)
                || campaign
                    .swms_job_id
                    .map_or(false, |job| self.site_of(job) == Some(site))
        };

        filter.job_site_id.map_or(true, in_site)
            && (filter.statuses.is_empty() || filter.statuses.contains(&campaign.status))
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn limit(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

impl Store for MemoryStore {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.check("transaction")?;

        let snapshot = self.tables.clone();
        let result = f(self);

        if result.is_err() {
            self.tables = snapshot;
        }

        result
    }

    fn set_statement_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        self.check("set_statement_timeout")?;
        self.statement_timeout = Some(timeout);
        Ok(())
    }

    fn find_session(&mut self, token: Uuid) -> Result<Option<Session>, StoreError> {
        self.check("find_session")?;

        Ok(self
            .tables
            .sessions
            .iter()
            .find(|session| session.token == token)
            .cloned())
    }

    fn jobs(&mut self, filter: &JobFilter) -> Result<Vec<SwmsJob>, StoreError> {
        self.check("jobs")?;

        let mut jobs = self
            .tables
            .jobs
            .iter()
            .filter(|job| Self::job_matches(filter, job))
            .cloned()
            .collect::<Vec<_>>();

        jobs.sort_by_key(|job| (job.start_date, job.id));
        Ok(jobs)
    }

    fn count_jobs(&mut self, filter: &JobFilter) -> Result<i64, StoreError> {
        self.check("count_jobs")?;

        let count = self
            .tables
            .jobs
            .iter()
            .filter(|job| Self::job_matches(filter, job))
            .count();

        Ok(to_i64(count))
    }

    fn insert_job(&mut self, job: NewSwmsJob) -> Result<SwmsJob, StoreError> {
        self.check("insert_job")?;

        let job = job.into_record();
        self.tables.jobs.push(job.clone());
        Ok(job)
    }

    fn update_job_status(
        &mut self,
        id: Uuid,
        status: JobStatus,
    ) -> Result<Option<SwmsJob>, StoreError> {
        self.check("update_job_status")?;

        Ok(self
            .tables
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .map(|job| {
                job.status = status;
                job.clone()
            }))
    }

    fn contractors(&mut self, filter: &ContractorFilter) -> Result<Vec<Contractor>, StoreError> {
        self.check("contractors")?;

        let mut contractors = self
            .tables
            .contractors
            .iter()
            .filter(|contractor| Self::contractor_matches(filter, contractor))
            .cloned()
            .collect::<Vec<_>>();

        contractors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(contractors)
    }

    fn insert_contractor(&mut self, contractor: NewContractor) -> Result<Contractor, StoreError> {
        self.check("insert_contractor")?;

        let contractor = contractor.into_record();
        self.tables.contractors.push(contractor.clone());
        Ok(contractor)
    }

    fn set_contractor_active(
        &mut self,
        id: Uuid,
        active: bool,
    ) -> Result<Option<Contractor>, StoreError> {
        self.check("set_contractor_active")?;

        Ok(self
            .tables
            .contractors
            .iter_mut()
            .find(|contractor| contractor.id == id)
            .map(|contractor| {
                contractor.active = active;
                contractor.clone()
            }))
    }

    fn submissions(
        &mut self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SwmsSubmission>, StoreError> {
        self.check("submissions")?;

        let mut submissions = self
            .tables
            .submissions
            .iter()
            .filter(|submission| self.submission_matches(filter, submission))
            .cloned()
            .collect::<Vec<_>>();

        submissions.sort_by_key(|submission| (submission.created_at, submission.id));
        Ok(submissions)
    }

    fn count_submissions(&mut self, filter: &SubmissionFilter) -> Result<i64, StoreError> {
        self.check("count_submissions")?;

        let count = self
            .tables
            .submissions
            .iter()
            .filter(|submission| self.submission_matches(filter, submission))
            .count();

        Ok(to_i64(count))
    }

    fn recent_submissions(
        &mut self,
        job_site_id: Option<Uuid>,
        n: i64,
    ) -> Result<Vec<SwmsSubmission>, StoreError> {
        self.check("recent_submissions")?;

        let filter = SubmissionFilter::default().at_site(job_site_id);
        let mut submissions = self
            .tables
            .submissions
            .iter()
            .filter(|submission| self.submission_matches(&filter, submission))
            .cloned()
            .collect::<Vec<_>>();

        submissions.sort_by_key(|submission| {
            (
                Reverse(submission.reviewed_at.unwrap_or(submission.created_at)),
                submission.id,
            )
        });
        submissions.truncate(limit(n));

        Ok(submissions)
    }

    fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<SwmsSubmission, StoreError> {
        self.check("insert_submission")?;

        let submission = submission.into_record();
        if !self.tables.jobs.iter().any(|job| job.id == submission.swms_job_id) {
            return Err(StoreError::Backend("unknown swms_job_id".to_owned()));
        }

        self.tables.submissions.push(submission.clone());
        Ok(submission)
    }

    fn approve_submissions(
        &mut self,
        filter: &SubmissionFilter,
        review: &Review,
    ) -> Result<usize, StoreError> {
        self.check("approve_submissions")?;

        let ids = self
            .tables
            .submissions
            .iter()
            .filter(|submission| self.submission_matches(filter, submission))
            .filter(|submission| submission.status == SubmissionStatus::Submitted)
            .map(|submission| submission.id)
            .collect::<Vec<_>>();

        for submission in &mut self.tables.submissions {
            if ids.contains(&submission.id) {
                submission.status = review.status;
                submission.reviewed_at = Some(review.reviewed_at);
                submission.reviewed_by = Some(review.reviewed_by.clone());
                submission.notes = review.merge_notes(submission.notes.as_deref());
            }
        }

        Ok(ids.len())
    }

    fn review_submission(
        &mut self,
        id: Uuid,
        review: &Review,
    ) -> Result<Option<SwmsSubmission>, StoreError> {
        self.check("review_submission")?;

        Ok(self
            .tables
            .submissions
            .iter_mut()
            .find(|submission| submission.id == id && !submission.status.is_reviewed())
            .map(|submission| {
                submission.status = review.status;
                submission.reviewed_at = Some(review.reviewed_at);
                submission.reviewed_by = Some(review.reviewed_by.clone());
                submission.notes = review.merge_notes(submission.notes.as_deref());
                submission.clone()
            }))
    }

    fn campaigns(&mut self, filter: &CampaignFilter) -> Result<Vec<EmailCampaign>, StoreError> {
        self.check("campaigns")?;

        let mut campaigns = self
            .tables
            .campaigns
            .iter()
            .filter(|campaign| self.campaign_matches(filter, campaign))
            .cloned()
            .collect::<Vec<_>>();

        campaigns.sort_by_key(|campaign| Reverse(campaign.created_at));
        Ok(campaigns)
    }

    fn count_campaigns(&mut self, filter: &CampaignFilter) -> Result<i64, StoreError> {
        self.check("count_campaigns")?;

        let count = self
            .tables
            .campaigns
            .iter()
            .filter(|campaign| self.campaign_matches(filter, campaign))
            .count();

        Ok(to_i64(count))
    }

    fn insert_campaign(
        &mut self,
        campaign: NewEmailCampaign,
    ) -> Result<EmailCampaign, StoreError> {
        self.check("insert_campaign")?;

        let campaign = campaign.into_record();
        self.tables.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    fn pause_campaigns(&mut self, filter: &CampaignFilter) -> Result<usize, StoreError> {
        self.check("pause_campaigns")?;

        let ids = self
            .tables
            .campaigns
            .iter()
            .filter(|campaign| self.campaign_matches(filter, campaign))
            .filter(|campaign| campaign.status == CampaignStatus::Active)
            .map(|campaign| campaign.id)
            .collect::<Vec<_>>();

        for campaign in &mut self.tables.campaigns {
            if ids.contains(&campaign.id) {
                campaign.status = CampaignStatus::Paused;
            }
        }

        Ok(ids.len())
    }

    fn insert_sends(&mut self, sends: &[NewEmailSend]) -> Result<usize, StoreError> {
        self.check("insert_sends")?;

        for send in sends {
            let send = send.clone().into_record();
            let duplicate = self.tables.sends.iter().any(|existing| {
                existing.campaign_id == send.campaign_id
                    && existing.contractor_id == send.contractor_id
            });

            if duplicate {
                return Err(StoreError::Backend(
                    "duplicate (campaign_id, contractor_id)".to_owned(),
                ));
            }

            self.tables.sends.push(send);
        }

        Ok(sends.len())
    }

    fn sends(&mut self, campaign_id: Uuid) -> Result<Vec<EmailSend>, StoreError> {
        self.check("sends")?;

        Ok(self
            .tables
            .sends
            .iter()
            .filter(|send| send.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn insert_notification_audit(
        &mut self,
        audit: NewNotificationAudit,
    ) -> Result<NotificationAudit, StoreError> {
        self.check("insert_notification_audit")?;

        let audit = audit.into_record();
        self.tables.audits.push(audit.clone());
        Ok(audit)
    }

    fn notification_audits(
        &mut self,
        job_site_id: Option<Uuid>,
        n: i64,
    ) -> Result<Vec<NotificationAudit>, StoreError> {
        self.check("notification_audits")?;

        let site = job_site_id.map(|site| site.to_string());
        let mut audits = self
            .tables
            .audits
            .iter()
            .filter(|audit| {
                site.as_deref().map_or(true, |site| {
                    audit.payload.get("job_site_id").and_then(Value::as_str) == Some(site)
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        audits.reverse();
        audits.sort_by_key(|audit| Reverse(audit.created_at));
        audits.truncate(limit(n));

        Ok(audits)
    }

    fn insert_change_log(
        &mut self,
        entry: NewChangeLogEntry,
    ) -> Result<ChangeLogEntry, StoreError> {
        self.check("insert_change_log")?;

        let entry = entry.into_record();
        self.tables.change_log.push(entry.clone());
        Ok(entry)
    }

    fn change_log(
        &mut self,
        job_site_id: Option<Uuid>,
        n: i64,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        self.check("change_log")?;

        let mut entries = self
            .tables
            .change_log
            .iter()
            .filter(|entry| job_site_id.map_or(true, |site| entry.job_site_id == Some(site)))
            .cloned()
            .collect::<Vec<_>>();

        entries.reverse();
        entries.sort_by_key(|entry| Reverse(entry.created_at));
        entries.truncate(limit(n));

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut store = MemoryStore::default();
        let site = Uuid::new_v4();

        let result: Result<(), StoreError> = store.transaction(|store| {
            let _ = store.seed_job(site, JobStatus::Active);
            Err(StoreError::Backend("boom".to_owned()))
        });

        assert!(result.is_err());
        assert_eq!(store.count_jobs(&JobFilter::default()).unwrap(), 0);
    }

    #[test]
    fn test_transaction_keeps_changes_on_success() {
        let mut store = MemoryStore::default();
        let site = Uuid::new_v4();

        let result: Result<(), StoreError> = store.transaction(|store| {
            let _ = store.seed_job(site, JobStatus::Active);
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(store.count_jobs(&JobFilter::default()).unwrap(), 1);
    }

    #[test]
    fn test_fail_on() {
        let mut store = MemoryStore::default();
        store.fail_on("jobs");

        assert!(store.jobs(&JobFilter::default()).is_err());
        assert!(store.count_jobs(&JobFilter::default()).is_ok());
    }

    #[test]
    fn test_submission_site_scope() {
        let mut store = MemoryStore::default();
        let (here, there) = (Uuid::new_v4(), Uuid::new_v4());
        let contractor = store.seed_contractor("Acme", Some("ops@acme.test"));

        let job_here = store.seed_job(here, JobStatus::Active);
        let job_there = store.seed_job(there, JobStatus::Active);
        let _ = store.seed_submission(&job_here, &contractor, SubmissionStatus::Submitted, Utc::now());
        let _ = store.seed_submission(&job_there, &contractor, SubmissionStatus::Submitted, Utc::now());

        let filter = SubmissionFilter::default().at_site(Some(here));
        let found = store.submissions(&filter).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].swms_job_id, job_here.id);
    }

    #[test]
    fn test_duplicate_send_rejected() {
        let mut store = MemoryStore::default();
        let contractor = store.seed_contractor("Acme", Some("ops@acme.test"));
        let campaign = Uuid::new_v4();
        let send = NewEmailSend::new(
            campaign,
            contractor.id,
            "ops@acme.test",
            Utc::now(),
            chrono::Duration::days(7),
        );

        assert_eq!(store.insert_sends(&[send.clone()]).unwrap(), 1);
        assert!(store.insert_sends(&[send]).is_err());
    }
}
