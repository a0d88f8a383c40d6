//! The GraphQL schema of the admin console.
//!
//! Queries read the SWMS records, mutations maintain them. Campaign actions
//! are not part of the schema, those go through the command endpoint.

use crate::admin;
use crate::orchestrator;
use crate::resources::{
    timeline, Contractor, CreateContractorInput, CreateJobInput, CreateSubmissionInput,
    EmailCampaign, ReviewSubmissionInput, SwmsJob, SwmsSubmission, TimelineEvent,
};
use crate::server::RequestState;
use crate::store::{CampaignFilter, ContractorFilter, JobFilter, Store};
use chrono::{DateTime, SecondsFormat, Utc};
use juniper::{graphql_object, EmptySubscription, FieldResult, RootNode, ID};
use swms_core::{CampaignStatus, Category, ComplianceCounts, Filter, JobStatus, SubmissionStatus};
use uuid::Uuid;

pub(crate) type Schema =
    RootNode<'static, QueryRoot, MutationRoot, EmptySubscription<RequestState>>;

pub(crate) fn schema() -> Schema {
    Schema::new(QueryRoot, MutationRoot, EmptySubscription::new())
}

pub(crate) struct QueryRoot;
pub(crate) struct MutationRoot;

/// Parse a GraphQL `ID` into a record identifier.
pub(crate) fn parse_id(id: &ID) -> FieldResult<Uuid> {
    id.parse::<Uuid>()
        .map_err(|_| format!("invalid id: {}", &**id).into())
}

/// Format a timestamp the way every timestamp in the API is formatted.
pub(crate) fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The aggregate compliance state of one site, or of every site.
pub(crate) struct ComplianceSummary(ComplianceCounts);

#[graphql_object(context = RequestState)]
impl ComplianceSummary {
    fn active_jobs(&self) -> i32 {
        narrow(self.0.active_jobs)
    }

    fn approved_submissions(&self) -> i32 {
        narrow(self.0.approved_submissions)
    }

    /// Submissions still waiting on a contractor or a reviewer.
    fn pending_submissions(&self) -> i32 {
        narrow(self.0.pending_submissions)
    }

    /// Submitted submissions waiting for review longer than the overdue
    /// threshold.
    fn overdue_submissions(&self) -> i32 {
        narrow(self.0.overdue_submissions)
    }

    fn active_campaigns(&self) -> i32 {
        narrow(self.0.active_campaigns)
    }

    /// Approved submissions per active job, as a whole percentage. This is
    /// 100 when there are no active jobs.
    fn compliance_rate(&self) -> i32 {
        narrow(self.0.compliance_rate())
    }
}

fn narrow(count: i64) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

#[graphql_object(context = RequestState)]
impl QueryRoot {
    /// Return a list of jobs, optionally limited to one site or status.
    fn jobs(
        context: &RequestState,
        job_site_id: Option<ID>,
        status: Option<JobStatus>,
    ) -> FieldResult<Vec<SwmsJob>> {
        let mut filter = JobFilter::default().at_site(job_site_id.as_ref().map(parse_id).transpose()?);
        if let Some(status) = status {
            filter = filter.with_status(status);
        }

        context.store()?.jobs(&filter).map_err(Into::into)
    }

    /// Return a single job, based on the job ID.
    ///
    /// This query can return `null` if no job is found matching the
    /// provided ID.
    fn job(context: &RequestState, id: ID) -> FieldResult<Option<SwmsJob>> {
        let filter = JobFilter::default().only(Some(parse_id(&id)?));

        Ok(context.store()?.jobs(&filter)?.pop())
    }

    /// Return the registered contractors.
    fn contractors(
        context: &RequestState,
        active_only: Option<bool>,
    ) -> FieldResult<Vec<Contractor>> {
        let filter = ContractorFilter {
            active: active_only.filter(|active| *active),
            ..ContractorFilter::default()
        };

        context.store()?.contractors(&filter).map_err(Into::into)
    }

    /// Return the email campaigns, optionally limited to one status.
    fn campaigns(
        context: &RequestState,
        status: Option<CampaignStatus>,
    ) -> FieldResult<Vec<EmailCampaign>> {
        let mut filter = CampaignFilter::default();
        if let Some(status) = status {
            filter = filter.with_status(status);
        }

        context.store()?.campaigns(&filter).map_err(Into::into)
    }

    /// The counts behind the compliance dashboard.
    fn compliance_summary(
        context: &RequestState,
        job_site_id: Option<ID>,
    ) -> FieldResult<ComplianceSummary> {
        let site = job_site_id.as_ref().map(parse_id).transpose()?;
        let mut store = context.store()?;

        let counts = orchestrator::compliance_counts(
            &mut *store,
            site,
            Utc::now(),
            context.settings.overdue_threshold,
        )?;

        Ok(ComplianceSummary(counts))
    }

    /// The activity feed, most recent first.
    ///
    /// Leave out `category` to get events of every category. `limit`
    /// defaults to 50, and is capped at 500.
    fn timeline(
        context: &RequestState,
        job_site_id: Option<ID>,
        category: Option<Category>,
        limit: Option<i32>,
    ) -> FieldResult<Vec<TimelineEvent>> {
        let site = job_site_id.as_ref().map(parse_id).transpose()?;
        let limit = timeline::clamp_limit(limit.map(i64::from));

        let timeline = timeline::read(&mut *context.store()?, site, limit)?;
        let filter = category.map_or(Filter::All, Filter::Only);

        Ok(timeline
            .filter(filter)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .map(TimelineEvent)
            .collect())
    }
}

#[graphql_object(context = RequestState)]
impl MutationRoot {
    /// Create a new job.
    fn create_job(context: &RequestState, job: CreateJobInput) -> FieldResult<SwmsJob> {
        let job = job.into_new_job()?;

        admin::create_job(&mut *context.store()?, &context.actor, job, Utc::now())
            .map_err(Into::into)
    }

    /// Move a job to another status.
    fn update_job_status(
        context: &RequestState,
        id: ID,
        status: JobStatus,
    ) -> FieldResult<SwmsJob> {
        let id = parse_id(&id)?;

        admin::update_job_status(&mut *context.store()?, &context.actor, id, status, Utc::now())
            .map_err(Into::into)
    }

    /// Register a new contractor.
    fn create_contractor(
        context: &RequestState,
        contractor: CreateContractorInput,
    ) -> FieldResult<Contractor> {
        let contractor = contractor.into_new_contractor()?;

        admin::create_contractor(&mut *context.store()?, &context.actor, contractor, Utc::now())
            .map_err(Into::into)
    }

    /// Activate or deactivate a contractor. Inactive contractors receive no
    /// campaign emails.
    fn set_contractor_active(
        context: &RequestState,
        id: ID,
        active: bool,
    ) -> FieldResult<Contractor> {
        let id = parse_id(&id)?;

        admin::set_contractor_active(&mut *context.store()?, &context.actor, id, active, Utc::now())
            .map_err(Into::into)
    }

    /// Record a submission against a job.
    fn create_submission(
        context: &RequestState,
        submission: CreateSubmissionInput,
    ) -> FieldResult<SwmsSubmission> {
        let submission = submission.into_new_submission()?;

        admin::create_submission(&mut *context.store()?, &context.actor, submission, Utc::now())
            .map_err(Into::into)
    }

    /// Approve or reject a single submission.
    ///
    /// A submission that was already approved or rejected can't be reviewed
    /// again.
    fn review_submission(
        context: &RequestState,
        review: ReviewSubmissionInput,
    ) -> FieldResult<SwmsSubmission> {
        let id = parse_id(&review.id)?;
        let status = SubmissionStatus::from(review.decision);

        admin::review_submission(
            &mut *context.store()?,
            &context.actor,
            id,
            status,
            review.notes,
            Utc::now(),
        )
        .map_err(Into::into)
    }
}
