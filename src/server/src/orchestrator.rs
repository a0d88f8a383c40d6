//! The campaign orchestrator.
//!
//! Every action follows the same shape: select the candidate rows, create or
//! update rows, and summarise what was done. Procedures don't open
//! transactions and don't write audit records, the dispatcher wraps each call
//! in a transaction and records the outcome.
//!
//! Finding nothing to do is not an error. It produces a summary with zero
//! counts, like any other run.

use crate::command::{Action, Command, Justification, ReportKind, Scope};
use crate::config::WorkflowSettings;
use crate::dispatch::ActionError;
use crate::models::Actor;
use crate::report::{ReportExporter, ReportRequest};
use crate::resources::{CampaignKind, Contractor, NewEmailCampaign, NewEmailSend, Review};
use crate::store::{CampaignFilter, ContractorFilter, JobFilter, Store, StoreError, SubmissionFilter};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use swms_core::{CampaignStatus, ComplianceCounts, JobStatus, OverdueThreshold, SubmissionStatus};
use tracing::debug;
use uuid::Uuid;

/// Everything a procedure needs to know besides the command itself.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Context<'a> {
    pub(crate) actor: &'a Actor,
    pub(crate) now: DateTime<Utc>,
    pub(crate) settings: &'a WorkflowSettings,
}

/// The result of a successful action.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Outcome {
    /// A human readable summary.
    pub(crate) message: String,

    /// The machine readable summary, returned to the caller and stored in
    /// the audit record.
    pub(crate) data: Value,
}

impl Outcome {
    fn new(message: String, data: Value) -> Self {
        Self { message, data }
    }
}

/// Run the procedure matching `command`.
pub(crate) fn run<S, X>(
    store: &mut S,
    exporter: &X,
    ctx: &Context<'_>,
    command: &Command,
) -> Result<Outcome, ActionError>
where
    S: Store,
    X: ReportExporter,
{
    let scope = &command.scope;

    let outcome = match &command.action {
        Action::SendReminder => send_reminder(store, ctx, scope)?,
        Action::BulkApprove { criteria } => bulk_approve(store, ctx, scope, criteria)?,
        Action::ComplianceCheck => compliance_check(store, ctx, scope)?,
        Action::UrgentNotification { message } => urgent_notification(store, ctx, scope, message)?,
        Action::WeeklyCampaign => weekly_campaign(store, ctx, scope)?,
        Action::GenerateReport { kind } => generate_report(store, exporter, ctx, scope, *kind)?,
        Action::BroadcastUpdate { message } => broadcast_update(store, ctx, scope, message)?,
        Action::PauseCampaigns => pause_campaigns(store, scope)?,
    };

    Ok(outcome)
}

/// Create a reminder campaign for every active job with submissions still
/// waiting on the contractor or a reviewer.
pub(crate) fn send_reminder<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    scope: &Scope,
) -> Result<Outcome, StoreError> {
    let filter = JobFilter::default()
        .only(scope.swms_job_id)
        .at_site(scope.job_site_id)
        .with_status(JobStatus::Active);

    let mut campaigns_created = 0;
    let mut reminders_sent = 0;
    let mut jobs = vec![];

    for job in store.jobs(&filter)? {
        let filter = SubmissionFilter::default()
            .for_job(Some(job.id))
            .for_contractor(scope.contractor_id)
            .with_statuses(&SubmissionStatus::REMINDABLE);

        let submissions = store.submissions(&filter)?;
        if submissions.is_empty() {
            continue;
        }

        let contractors = reachable_contractors(
            store,
            submissions.iter().map(|submission| submission.contractor_id),
        )?;

        let campaign = NewEmailCampaign::new(CampaignKind::ManualReminder, &ctx.actor.email, ctx.now)
            .for_job(Some(job.id))
            .for_site(Some(job.job_site_id));

        let campaign = store.insert_campaign(campaign)?;
        let sent = fan_out(store, ctx, campaign.id, &contractors)?;

        debug!(job = %job.id, campaign = %campaign.id, sent, "reminder campaign created");

        campaigns_created += 1;
        reminders_sent += sent;
        jobs.push(json!({
            "swms_job_id": job.id,
            "campaign_id": campaign.id,
            "reminders_sent": sent,
        }));
    }

    Ok(Outcome::new(
        format!(
            "Sent {} reminders across {} campaigns",
            reminders_sent, campaigns_created
        ),
        json!({
            "reminders_sent": reminders_sent,
            "campaigns_created": campaigns_created,
            "jobs": jobs,
        }),
    ))
}

/// Approve every submitted submission in scope in one go.
pub(crate) fn bulk_approve<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    scope: &Scope,
    criteria: &Justification,
) -> Result<Outcome, StoreError> {
    let filter = SubmissionFilter::default()
        .at_site(scope.job_site_id)
        .for_job(scope.swms_job_id)
        .for_contractor(scope.contractor_id)
        .with_statuses(&[SubmissionStatus::Submitted]);

    let review = Review {
        status: SubmissionStatus::Approved,
        reviewed_by: ctx.actor.email.clone(),
        reviewed_at: ctx.now,
        notes: Some(format!("Bulk approved: {}", criteria)),
    };

    let approved = store.approve_submissions(&filter, &review)?;

    Ok(Outcome::new(
        format!("Approved {} submissions", approved),
        json!({ "approved_count": approved }),
    ))
}

/// Gather the five compliance counts, optionally limited to one job site.
pub(crate) fn compliance_counts<S: Store>(
    store: &mut S,
    job_site_id: Option<Uuid>,
    now: DateTime<Utc>,
    threshold: OverdueThreshold,
) -> Result<ComplianceCounts, StoreError> {
    let submissions = SubmissionFilter::default().at_site(job_site_id);

    Ok(ComplianceCounts {
        active_jobs: store.count_jobs(
            &JobFilter::default()
                .at_site(job_site_id)
                .with_status(JobStatus::Active),
        )?,
        approved_submissions: store.count_submissions(
            &submissions
                .clone()
                .with_statuses(&[SubmissionStatus::Approved]),
        )?,
        pending_submissions: store
            .count_submissions(&submissions.clone().with_statuses(&SubmissionStatus::AWAITING))?,
        overdue_submissions: store.count_submissions(
            &submissions
                .with_statuses(&[SubmissionStatus::Submitted])
                .created_before(threshold.cutoff(now)),
        )?,
        active_campaigns: store.count_campaigns(
            &CampaignFilter::default()
                .at_site(job_site_id)
                .with_status(CampaignStatus::Active),
        )?,
    })
}

pub(crate) fn compliance_check<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    scope: &Scope,
) -> Result<Outcome, StoreError> {
    let counts = compliance_counts(
        store,
        scope.job_site_id,
        ctx.now,
        ctx.settings.overdue_threshold,
    )?;
    let rate = counts.compliance_rate();

    Ok(Outcome::new(
        format!("Compliance rate is {}%", rate),
        json!({
            "activeJobs": counts.active_jobs,
            "approvedSubmissions": counts.approved_submissions,
            "pendingSubmissions": counts.pending_submissions,
            "overdueSubmissions": counts.overdue_submissions,
            "activeCampaigns": counts.active_campaigns,
            "compliance_rate": rate,
        }),
    ))
}

/// Alert every reachable contractor working on the job, or at the site, or
/// everywhere, depending on the scope.
pub(crate) fn urgent_notification<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    scope: &Scope,
    message: &Justification,
) -> Result<Outcome, StoreError> {
    let contractors = audience(store, scope.swms_job_id, scope.job_site_id)?;

    let campaign = NewEmailCampaign::new(CampaignKind::UrgentSafetyAlert, &ctx.actor.email, ctx.now)
        .for_job(scope.swms_job_id)
        .for_site(scope.job_site_id)
        .with_message(Some(message.as_str().to_owned()));

    let campaign = store.insert_campaign(campaign)?;
    let sent = fan_out(store, ctx, campaign.id, &contractors)?;

    Ok(Outcome::new(
        format!("Urgent notification sent to {} contractors", sent),
        json!({ "campaign_id": campaign.id, "notifications_sent": sent }),
    ))
}

/// Send a message to every reachable contractor at the site, or everywhere.
pub(crate) fn broadcast_update<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    scope: &Scope,
    message: &Justification,
) -> Result<Outcome, StoreError> {
    let contractors = audience(store, None, scope.job_site_id)?;

    let campaign = NewEmailCampaign::new(CampaignKind::SiteBroadcast, &ctx.actor.email, ctx.now)
        .for_site(scope.job_site_id)
        .with_message(Some(message.as_str().to_owned()));

    let campaign = store.insert_campaign(campaign)?;
    let sent = fan_out(store, ctx, campaign.id, &contractors)?;

    Ok(Outcome::new(
        format!("Broadcast sent to {} contractors", sent),
        json!({ "campaign_id": campaign.id, "recipients": sent }),
    ))
}

/// Create one weekly reminder campaign per active job. No emails are
/// recorded, the weekly scheduler takes care of those.
pub(crate) fn weekly_campaign<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    scope: &Scope,
) -> Result<Outcome, StoreError> {
    let filter = JobFilter::default()
        .at_site(scope.job_site_id)
        .with_status(JobStatus::Active);

    let mut created = 0;
    for job in store.jobs(&filter)? {
        let campaign = NewEmailCampaign::new(CampaignKind::WeeklyReminder, &ctx.actor.email, ctx.now)
            .for_job(Some(job.id))
            .for_site(Some(job.job_site_id));

        let _ = store.insert_campaign(campaign)?;
        created += 1;
    }

    Ok(Outcome::new(
        format!("Created {} weekly campaigns", created),
        json!({ "campaigns_created": created }),
    ))
}

pub(crate) fn generate_report<S, X>(
    store: &mut S,
    exporter: &X,
    ctx: &Context<'_>,
    scope: &Scope,
    kind: ReportKind,
) -> Result<Outcome, ActionError>
where
    S: Store,
    X: ReportExporter,
{
    let request = ReportRequest {
        kind,
        scope: *scope,
        requested_by: &ctx.actor.email,
        now: ctx.now,
        threshold: ctx.settings.overdue_threshold,
    };

    let handle = exporter.export(store, &request)?;

    Ok(Outcome::new(
        format!("Generated {} report", kind.as_str()),
        json!({ "download_url": handle.download_url, "report_type": kind.as_str() }),
    ))
}

/// Pause every active campaign in scope in one go.
pub(crate) fn pause_campaigns<S: Store>(store: &mut S, scope: &Scope) -> Result<Outcome, StoreError> {
    let filter = CampaignFilter::default()
        .at_site(scope.job_site_id)
        .with_status(CampaignStatus::Active);

    let paused = store.pause_campaigns(&filter)?;

    Ok(Outcome::new(
        format!("Paused {} campaigns", paused),
        json!({ "campaigns_paused": paused }),
    ))
}

/// The contractors to notify: those with a submission against `job`, else
/// those with a submission at `site`, else everyone. Only contractors that
/// can receive email are returned.
fn audience<S: Store>(
    store: &mut S,
    job: Option<Uuid>,
    site: Option<Uuid>,
) -> Result<Vec<Contractor>, StoreError> {
    let filter = match (job, site) {
        (Some(job), _) => SubmissionFilter::default().for_job(Some(job)),
        (None, Some(site)) => SubmissionFilter::default().at_site(Some(site)),
        (None, None) => return store.contractors(&ContractorFilter::reachable()),
    };

    let submissions = store.submissions(&filter)?;
    reachable_contractors(store, submissions.iter().map(|s| s.contractor_id))
}

/// Look up the distinct contractors in `ids` that can receive email.
fn reachable_contractors<S, I>(store: &mut S, ids: I) -> Result<Vec<Contractor>, StoreError>
where
    S: Store,
    I: IntoIterator<Item = Uuid>,
{
    let ids = ids.into_iter().collect::<BTreeSet<_>>();
    if ids.is_empty() {
        return Ok(vec![]);
    }

    store.contractors(&ContractorFilter::reachable().among(ids.into_iter().collect()))
}

/// Record one pending email per contractor, each with its own portal token.
fn fan_out<S: Store>(
    store: &mut S,
    ctx: &Context<'_>,
    campaign_id: Uuid,
    contractors: &[Contractor],
) -> Result<usize, StoreError> {
    let sends = contractors
        .iter()
        .filter_map(|contractor| {
            contractor.reachable_email().map(|email| {
                NewEmailSend::new(
                    campaign_id,
                    contractor.id,
                    email,
                    ctx.now,
                    ctx.settings.portal_token_ttl,
                )
            })
        })
        .collect::<Vec<_>>();

    store.insert_sends(&sends)
}
