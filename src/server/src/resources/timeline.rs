//! Reads the activity timeline of the SWMS records.
//!
//! The timeline is assembled from three sources, read in this order:
//! submissions, the change-log and the notification audits. Each row is
//! turned into a [`swms_core::Event`], after which [`Timeline::merge`] orders
//! the lot.

use crate::models::{ChangeLogEntry, NotificationAudit};
use crate::resources::SwmsSubmission;
use crate::store::{Store, StoreError};
use serde_json::Value;
use swms_core::{AuditResult, Category, Event, Outcome, SubmissionStatus, Timeline};
use uuid::Uuid;

/// The number of events returned when no limit is given.
pub(crate) const DEFAULT_LIMIT: i64 = 50;

/// The maximum number of events returned by a single read.
pub(crate) const MAX_LIMIT: i64 = 500;

/// Clamp a requested limit to `1..=MAX_LIMIT`.
pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).max(1).min(MAX_LIMIT)
}

/// Read and merge the three sources.
///
/// With a `job_site_id`, only submissions against jobs at that site, changes
/// made at that site, and audits of actions scoped to that site are read.
/// Every source is limited to its `limit` most recent rows, the caller
/// truncates the merged result after filtering.
pub(crate) fn read<S: Store>(
    store: &mut S,
    job_site_id: Option<Uuid>,
    limit: i64,
) -> Result<Timeline, StoreError> {
    let submissions = store
        .recent_submissions(job_site_id, limit)?
        .iter()
        .flat_map(submission_events)
        .collect();

    let audits = store
        .change_log(job_site_id, limit)?
        .iter()
        .map(change_log_event)
        .collect();

    let notifications = store
        .notification_audits(job_site_id, limit)?
        .iter()
        .map(notification_event)
        .collect();

    Ok(Timeline::merge(submissions, audits, notifications))
}

/// A submission produces one event when it was created, and one when it was
/// reviewed.
fn submission_events(submission: &SwmsSubmission) -> Vec<Event> {
    let contractor_id = Some(submission.contractor_id.to_string());

    let mut events = vec![Event {
        kind: "submission_submitted".to_owned(),
        category: Category::Submissions,
        title: "SWMS submitted".to_owned(),
        description: format!("Submission for job {}", submission.swms_job_id),
        timestamp: submission.created_at,
        contractor_id: contractor_id.clone(),
        status: if submission.status == SubmissionStatus::Pending {
            Outcome::Pending
        } else {
            Outcome::Info
        },
    }];

    if let Some(reviewed_at) = submission.reviewed_at {
        let (kind, title, status) = match submission.status {
            SubmissionStatus::Approved => ("submission_approved", "SWMS approved", Outcome::Success),
            SubmissionStatus::Rejected => ("submission_rejected", "SWMS rejected", Outcome::Failure),
            _ => ("submission_reviewed", "SWMS reviewed", Outcome::Pending),
        };

        let reviewer = submission.reviewed_by.as_deref().unwrap_or("unknown reviewer");

        events.push(Event {
            kind: kind.to_owned(),
            category: Category::Submissions,
            title: title.to_owned(),
            description: format!("Reviewed by {}", reviewer),
            timestamp: reviewed_at,
            contractor_id,
            status,
        });
    }

    events
}

fn change_log_event(entry: &ChangeLogEntry) -> Event {
    let contractor_id = if entry.table_name == "contractors" {
        Some(entry.record_id.to_string())
    } else {
        string_field(&entry.details, "contractor_id")
    };

    Event {
        kind: format!("audit_{}", entry.action),
        category: Category::Audits,
        title: format!("{} {}", entry.table_name, entry.action),
        description: format!("Record {} changed by {}", entry.record_id, entry.changed_by),
        timestamp: entry.created_at,
        contractor_id,
        status: Outcome::Info,
    }
}

fn notification_event(audit: &NotificationAudit) -> Event {
    let description = string_field(&audit.payload, "message").unwrap_or_else(|| audit.kind.clone());

    Event {
        kind: audit.kind.clone(),
        category: Category::Emails,
        title: format!("Action {}", audit.kind),
        description,
        timestamp: audit.created_at,
        contractor_id: string_field(&audit.payload, "contractor_id"),
        status: match audit.result {
            AuditResult::Success => Outcome::Success,
            AuditResult::Failure => Outcome::Failure,
        },
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

pub(crate) mod graphql {
    //! All GraphQL related functionality is encapsulated in this module. The
    //! relevant functions and structs are re-exported through
    //! [`crate::graphql`].

    use super::*;
    use crate::server::RequestState;
    use juniper::graphql_object;

    /// A single entry of the activity timeline.
    pub(crate) struct TimelineEvent(pub(crate) Event);

    #[graphql_object(context = RequestState)]
    impl TimelineEvent {
        /// A machine readable tag, such as `submission_approved` or the name
        /// of a campaign action.
        fn kind(&self) -> &str {
            self.0.kind.as_ref()
        }

        fn category(&self) -> Category {
            self.0.category
        }

        fn title(&self) -> &str {
            self.0.title.as_ref()
        }

        fn description(&self) -> &str {
            self.0.description.as_ref()
        }

        /// When the event happened, as an RFC 3339 timestamp.
        fn timestamp(&self) -> String {
            self.0.iso_timestamp()
        }

        /// The contractor involved, if any.
        fn contractor_id(&self) -> Option<&str> {
            self.0.contractor_id.as_deref()
        }

        fn status(&self) -> Outcome {
            self.0.status
        }
    }
}
