//! An [`EmailCampaign`] is a batch of reminder or notification emails.
//!
//! A campaign is tied to a single job, or to a job site as a whole. The
//! individual emails are tracked as [`EmailSend`]s, one per contractor. This
//! server only records them, delivery is up to the notification service which
//! picks up every send in the `pending` state.

pub(crate) mod send;

use crate::schema::{swms_email_campaigns, swms_jobs};
use crate::store::CampaignFilter;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use swms_core::CampaignStatus;
use uuid::Uuid;

pub(crate) use send::{EmailSend, NewEmailSend};

/// The campaign types created by this server.
///
/// The `campaign_type` column itself is free-form, campaigns created by other
/// systems can carry any tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CampaignKind {
    ManualReminder,
    UrgentSafetyAlert,
    WeeklyReminder,
    SiteBroadcast,
}

impl CampaignKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            CampaignKind::ManualReminder => "manual_reminder",
            CampaignKind::UrgentSafetyAlert => "urgent_safety_alert",
            CampaignKind::WeeklyReminder => "weekly_reminder",
            CampaignKind::SiteBroadcast => "site_broadcast",
        }
    }
}

impl fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The model representing a campaign stored in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Identifiable, Queryable, Selectable)]
#[diesel(table_name = swms_email_campaigns)]
pub(crate) struct EmailCampaign {
    pub(crate) id: Uuid,
    pub(crate) swms_job_id: Option<Uuid>,
    pub(crate) job_site_id: Option<Uuid>,
    pub(crate) campaign_type: String,
    pub(crate) status: CampaignStatus,
    pub(crate) message: Option<String>,
    pub(crate) scheduled_date: DateTime<Utc>,
    pub(crate) created_by: String,
    pub(crate) created_at: DateTime<Utc>,
}

/// Applies a [`CampaignFilter`] to a boxed `swms_email_campaigns` query or
/// update.
///
/// A campaign belongs to a site if its job is at that site, or if it is a
/// site-wide campaign of that site.
macro_rules! campaign_filters {
    ($query:expr, $filter:expr) => {{
        let filter: &CampaignFilter = $filter;
        let mut query = $query;

        if let Some(site) = filter.job_site_id {
            query = query.filter(
                swms_email_campaigns::job_site_id.eq(site).or(swms_email_campaigns::swms_job_id
                    .eq_any(
                        swms_jobs::table
                            .filter(swms_jobs::job_site_id.eq(site))
                            .select(swms_jobs::id.nullable()),
                    )),
            );
        }

        if !filter.statuses.is_empty() {
            query = query.filter(swms_email_campaigns::status.eq_any(filter.statuses.clone()));
        }

        query
    }};
}

impl EmailCampaign {
    pub(crate) fn load(filter: &CampaignFilter, conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        let query = swms_email_campaigns::table
            .order((
                swms_email_campaigns::created_at.desc(),
                swms_email_campaigns::id.asc(),
            ))
            .into_boxed();

        campaign_filters!(query, filter).load(conn)
    }

    pub(crate) fn count(filter: &CampaignFilter, conn: &mut PgConnection) -> QueryResult<i64> {
        let query = swms_email_campaigns::table.count().into_boxed();

        campaign_filters!(query, filter).get_result(conn)
    }

    /// Move every `active` campaign matching `filter` to `paused`, in one
    /// statement. Returns the number of paused campaigns.
    pub(crate) fn pause_all(filter: &CampaignFilter, conn: &mut PgConnection) -> QueryResult<usize> {
        let target = campaign_filters!(
            diesel::update(swms_email_campaigns::table)
                .filter(swms_email_campaigns::status.eq(CampaignStatus::Active))
                .into_boxed(),
            filter
        );

        target
            .set(swms_email_campaigns::status.eq(CampaignStatus::Paused))
            .execute(conn)
    }
}

/// Contains all the details needed to store a campaign in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Insertable)]
#[diesel(table_name = swms_email_campaigns)]
pub(crate) struct NewEmailCampaign {
    id: Uuid,
    swms_job_id: Option<Uuid>,
    job_site_id: Option<Uuid>,
    campaign_type: String,
    status: CampaignStatus,
    message: Option<String>,
    scheduled_date: DateTime<Utc>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl NewEmailCampaign {
    /// Initialize an `active` campaign, scheduled for `now`.
    pub(crate) fn new(kind: CampaignKind, created_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            swms_job_id: None,
            job_site_id: None,
            campaign_type: kind.as_str().to_owned(),
            status: CampaignStatus::Active,
            message: None,
            scheduled_date: now,
            created_by: created_by.to_owned(),
            created_at: now,
        }
    }

    pub(crate) fn for_job(mut self, swms_job_id: Option<Uuid>) -> Self {
        self.swms_job_id = swms_job_id;
        self
    }

    pub(crate) fn for_site(mut self, job_site_id: Option<Uuid>) -> Self {
        self.job_site_id = job_site_id;
        self
    }

    pub(crate) fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub(crate) fn create(self, conn: &mut PgConnection) -> QueryResult<EmailCampaign> {
        diesel::insert_into(swms_email_campaigns::table)
            .values(&self)
            .get_result(conn)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> EmailCampaign {
        EmailCampaign {
            id: self.id,
            swms_job_id: self.swms_job_id,
            job_site_id: self.job_site_id,
            campaign_type: self.campaign_type,
            status: self.status,
            message: self.message,
            scheduled_date: self.scheduled_date,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

pub(crate) mod graphql {
    //! All GraphQL related functionality is encapsulated in this module. The
    //! relevant functions and structs are re-exported through
    //! [`crate::graphql`].

    use super::*;
    use crate::graphql::rfc3339;
    use crate::server::RequestState;
    use crate::store::Store;
    use juniper::{graphql_object, FieldResult, ID};

    #[graphql_object(context = RequestState)]
    impl EmailCampaign {
        /// The unique identifier for a specific campaign.
        fn id(&self) -> ID {
            ID::new(self.id.to_string())
        }

        /// The job this campaign is about, `null` for site-wide campaigns.
        fn swms_job_id(&self) -> Option<ID> {
            self.swms_job_id.map(|id| ID::new(id.to_string()))
        }

        /// The site a site-wide campaign is addressed to.
        fn job_site_id(&self) -> Option<ID> {
            self.job_site_id.map(|id| ID::new(id.to_string()))
        }

        /// A free-form tag, such as `manual_reminder` or `site_broadcast`.
        fn campaign_type(&self) -> &str {
            self.campaign_type.as_ref()
        }

        fn status(&self) -> CampaignStatus {
            self.status
        }

        /// The message carried by urgent alerts and broadcasts.
        fn message(&self) -> Option<&str> {
            self.message.as_deref()
        }

        fn scheduled_date(&self) -> String {
            rfc3339(self.scheduled_date)
        }

        /// The email address of the administrator who started the campaign.
        fn created_by(&self) -> &str {
            self.created_by.as_ref()
        }

        /// The individual emails of this campaign.
        fn sends(&self, context: &RequestState) -> FieldResult<Vec<EmailSend>> {
            context.store()?.sends(self.id).map_err(Into::into)
        }
    }
}
