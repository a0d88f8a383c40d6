//! The status enums shared by every SWMS record.
//!
//! With the `diesel` feature enabled, each enum maps onto a Postgres enum type
//! of the same (snake cased) name, and a `<Enum>Mapping` SQL type is generated
//! for use in table definitions. The `juniper` feature exposes the enums as
//! GraphQL enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle of a SWMS job.
///
/// Transitions are driven by administrators, no transition between the
/// variants is enforced.
#[cfg_attr(feature = "diesel", derive(diesel_derive_enum::DbEnum))]
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job is known, but work has not started.
    Planned,

    /// Work is ongoing, contractors are expected to lodge their SWMS.
    Active,

    /// Work has finished.
    Completed,

    /// The job will not go ahead.
    Cancelled,
}

/// The review state of a contractor's submission against a job.
#[cfg_attr(feature = "diesel", derive(diesel_derive_enum::DbEnum))]
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// The contractor has been asked for a SWMS, but has not lodged one.
    Pending,

    /// A SWMS is lodged and waiting for a reviewer.
    Submitted,

    /// A reviewer picked up the submission.
    UnderReview,

    /// The SWMS was accepted.
    Approved,

    /// The SWMS was refused.
    Rejected,
}

impl SubmissionStatus {
    /// Submissions that still need action from either the contractor or a
    /// reviewer.
    pub const AWAITING: [Self; 3] = [Self::Pending, Self::Submitted, Self::UnderReview];

    /// Submissions that are eligible for a reminder.
    pub const REMINDABLE: [Self; 2] = [Self::Pending, Self::Submitted];

    /// Returns `true` if the contractor lodged a document for this submission,
    /// regardless of the outcome of the review so far.
    pub fn is_lodged(self) -> bool {
        match self {
            Self::Submitted | Self::UnderReview | Self::Approved => true,
            Self::Pending | Self::Rejected => false,
        }
    }

    /// Returns `true` once a reviewer made a final decision.
    pub fn is_reviewed(self) -> bool {
        match self {
            Self::Approved | Self::Rejected => true,
            Self::Pending | Self::Submitted | Self::UnderReview => false,
        }
    }
}

/// The state of an email campaign.
#[cfg_attr(feature = "diesel", derive(diesel_derive_enum::DbEnum))]
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// The campaign is live.
    Active,

    /// The campaign was put on hold by an administrator.
    Paused,

    /// The campaign ran its course.
    Completed,
}

/// The delivery state of a single campaign email.
#[cfg_attr(feature = "diesel", derive(diesel_derive_enum::DbEnum))]
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for the notification service to pick it up.
    Pending,

    /// Handed over to the mail provider.
    Sent,

    /// Confirmed delivered by the mail provider.
    Delivered,

    /// Delivery failed.
    Failed,

    /// The receiving server rejected the email.
    Bounced,
}

/// The outcome stored alongside a notification audit record.
#[cfg_attr(feature = "diesel", derive(diesel_derive_enum::DbEnum))]
#[cfg_attr(feature = "juniper", derive(juniper::GraphQLEnum))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// The audited action completed.
    Success,

    /// The audited action failed, and none of its changes were kept.
    Failure,
}

macro_rules! impl_display {
    ($($ty:ident { $($variant:ident => $name:literal),+ $(,)? })+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let name = match self {
                        $($ty::$variant => $name),+
                    };

                    f.write_str(name)
                }
            }
        )+
    };
}

impl_display! {
    JobStatus {
        Planned => "planned",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
    SubmissionStatus {
        Pending => "pending",
        Submitted => "submitted",
        UnderReview => "under_review",
        Approved => "approved",
        Rejected => "rejected",
    }
    CampaignStatus {
        Active => "active",
        Paused => "paused",
        Completed => "completed",
    }
    DeliveryStatus {
        Pending => "pending",
        Sent => "sent",
        Delivered => "delivered",
        Failed => "failed",
        Bounced => "bounced",
    }
    AuditResult {
        Success => "success",
        Failure => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        let status = SubmissionStatus::UnderReview;
        let json = serde_json::to_string(&status).unwrap();

        assert_eq!(json, format!(r#""{}""#, status));
    }

    #[test]
    fn test_lodged_statuses() {
        let lodged = [
            SubmissionStatus::Pending,
            SubmissionStatus::Submitted,
            SubmissionStatus::UnderReview,
            SubmissionStatus::Approved,
            SubmissionStatus::Rejected,
        ]
        .iter()
        .filter(|s| s.is_lodged())
        .count();

        assert_eq!(lodged, 3);
        assert!(!SubmissionStatus::Rejected.is_lodged());
    }

    #[test]
    fn test_awaiting_is_never_reviewed() {
        assert!(SubmissionStatus::AWAITING.iter().all(|s| !s.is_reviewed()));
    }
}
