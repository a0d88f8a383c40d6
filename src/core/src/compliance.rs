//! The status engine: pure functions turning stored rows and counts into
//! compliance figures.
//!
//! Nothing in this module keeps state between calls. Feeding the same input
//! twice produces the same output, which is what allows the server to compute
//! these figures on every request from freshly read rows.

use crate::status::SubmissionStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::hash::Hash;

/// The number of hours a lodged submission may wait for review before it
/// counts as overdue, unless configured otherwise.
pub const DEFAULT_OVERDUE_HOURS: i64 = 48;

/// How long a lodged submission may sit in the `submitted` state before it is
/// reported as overdue.
///
/// Every overdue figure in the system is computed from one instance of this
/// type, so the threshold can't drift between call sites.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OverdueThreshold {
    hours: i64,
}

impl OverdueThreshold {
    /// Create a threshold of `hours` hours. Negative values are clamped to
    /// zero.
    pub fn hours(hours: i64) -> Self {
        Self {
            hours: hours.max(0),
        }
    }

    /// The configured number of hours.
    pub const fn as_hours(self) -> i64 {
        self.hours
    }

    /// The threshold as a duration.
    pub fn as_duration(self) -> Duration {
        Duration::hours(self.hours)
    }

    /// Submissions lodged before the returned instant are overdue at `now`.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.as_duration()
    }

    /// Returns `true` if something lodged at `lodged_at` is overdue at `now`.
    pub fn is_overdue(self, lodged_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        lodged_at < self.cutoff(now)
    }
}

impl Default for OverdueThreshold {
    fn default() -> Self {
        Self::hours(DEFAULT_OVERDUE_HOURS)
    }
}

/// Compute `numerator / denominator` as a whole percentage, rounding halves
/// up. Negative inputs are treated as zero.
///
/// Returns `None` if the denominator is zero, leaving it up to the caller to
/// decide what an empty population means.
pub fn percentage(numerator: i64, denominator: i64) -> Option<i64> {
    let numerator = numerator.max(0);
    let denominator = denominator.max(0);

    if denominator == 0 {
        return None;
    }

    Some((numerator.saturating_mul(200) + denominator) / denominator.saturating_mul(2))
}

/// The system-wide compliance rate: approved submissions per active job, as a
/// percentage.
///
/// Having no active jobs means there is nothing to comply with, so the rate is
/// 100 in that case.
///
/// The rate is not capped, multiple approved submissions per job can push it
/// past 100.
pub fn compliance_rate(approved_submissions: i64, active_jobs: i64) -> i64 {
    percentage(approved_submissions, active_jobs).unwrap_or(100)
}

/// The five aggregate counts gathered by a compliance check.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCounts {
    /// Jobs in the `active` state.
    pub active_jobs: i64,

    /// Submissions in the `approved` state.
    pub approved_submissions: i64,

    /// Submissions still waiting on a contractor or a reviewer.
    pub pending_submissions: i64,

    /// Submissions waiting for review longer than the overdue threshold.
    pub overdue_submissions: i64,

    /// Campaigns in the `active` state.
    pub active_campaigns: i64,
}

impl ComplianceCounts {
    /// See [`compliance_rate`].
    pub fn compliance_rate(&self) -> i64 {
        compliance_rate(self.approved_submissions, self.active_jobs)
    }
}

/// The subset of a submission the status engine needs to know about.
///
/// Implemented by the stored submission model, and by whatever test fixture
/// wants to exercise the engine.
pub trait SubmissionRecord {
    /// Identifies the contractor that owns the submission.
    type ContractorId: Eq + Hash;

    /// The contractor that owns the submission.
    fn contractor_id(&self) -> &Self::ContractorId;

    /// The current review state.
    fn status(&self) -> SubmissionStatus;

    /// The moment the submission was created.
    fn created_at(&self) -> DateTime<Utc>;
}

/// Completion figures for a single job.
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLObject))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    /// Distinct contractors with at least one submission against the job.
    pub total_contractors: i32,

    /// Distinct contractors that lodged a document.
    pub submitted: i32,

    /// Submissions still waiting for the contractor.
    pub pending: i32,

    /// Submissions waiting for review longer than the overdue threshold.
    pub overdue: i32,

    /// `submitted / total_contractors` as a whole percentage, or zero if the
    /// job has no contractors yet.
    pub completion_percentage: i32,
}

/// Compute the [`JobMetrics`] for the submissions of a single job.
pub fn job_metrics<R>(records: &[R], now: DateTime<Utc>, threshold: OverdueThreshold) -> JobMetrics
where
    R: SubmissionRecord,
{
    let contractors = records
        .iter()
        .map(SubmissionRecord::contractor_id)
        .collect::<HashSet<_>>();

    let submitted = records
        .iter()
        .filter(|r| r.status().is_lodged())
        .map(SubmissionRecord::contractor_id)
        .collect::<HashSet<_>>();

    let pending = records
        .iter()
        .filter(|r| r.status() == SubmissionStatus::Pending)
        .count();

    let overdue = records
        .iter()
        .filter(|r| r.status() == SubmissionStatus::Submitted)
        .filter(|r| threshold.is_overdue(r.created_at(), now))
        .count();

    let completion = percentage(to_i64(submitted.len()), to_i64(contractors.len())).unwrap_or(0);

    JobMetrics {
        total_contractors: to_i32(contractors.len()),
        submitted: to_i32(submitted.len()),
        pending: to_i32(pending),
        overdue: to_i32(overdue),
        completion_percentage: i32::try_from(completion).unwrap_or(i32::MAX),
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
