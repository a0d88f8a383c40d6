//! A [`SwmsJob`] is a package of work at a job site that requires every
//! contractor working on it to lodge a Safe Work Method Statement.
//!
//! Jobs are created by administrators. Their status is changed by
//! administrators as well, there is no automatic transition between states.
//! While a job is `active`, it takes part in reminders, weekly campaigns and
//! the compliance rate.

use crate::schema::swms_jobs;
use crate::store::JobFilter;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use swms_core::JobStatus;
use uuid::Uuid;

/// The model representing a SWMS job stored in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Identifiable, Queryable, Selectable)]
#[diesel(table_name = swms_jobs)]
pub(crate) struct SwmsJob {
    pub(crate) id: Uuid,
    pub(crate) job_site_id: Uuid,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) start_date: NaiveDate,
    pub(crate) end_date: Option<NaiveDate>,
    pub(crate) status: JobStatus,
    pub(crate) created_at: DateTime<Utc>,
}

/// Applies a [`JobFilter`] to a boxed `swms_jobs` query.
macro_rules! job_filters {
    ($query:expr, $filter:expr) => {{
        let filter: &JobFilter = $filter;
        let mut query = $query;

        if let Some(ids) = &filter.ids {
            query = query.filter(swms_jobs::id.eq_any(ids.clone()));
        }

        if let Some(site) = filter.job_site_id {
            query = query.filter(swms_jobs::job_site_id.eq(site));
        }

        if !filter.statuses.is_empty() {
            query = query.filter(swms_jobs::status.eq_any(filter.statuses.clone()));
        }

        query
    }};
}

impl SwmsJob {
    pub(crate) fn load(filter: &JobFilter, conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        let query = swms_jobs::table
            .order((swms_jobs::start_date.asc(), swms_jobs::id.asc()))
            .into_boxed();

        job_filters!(query, filter).load(conn)
    }

    pub(crate) fn count(filter: &JobFilter, conn: &mut PgConnection) -> QueryResult<i64> {
        let query = swms_jobs::table.count().into_boxed();

        job_filters!(query, filter).get_result(conn)
    }

    pub(crate) fn set_status(
        id: Uuid,
        status: JobStatus,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<Self>> {
        diesel::update(swms_jobs::table.find(id))
            .set(swms_jobs::status.eq(status))
            .get_result(conn)
            .optional()
    }
}

/// Contains all the details needed to store a job in the database.
///
/// Use [`NewSwmsJob::new`] to initialize this struct.
#[derive(Clone, Debug, Deserialize, Serialize, Insertable)]
#[diesel(table_name = swms_jobs)]
pub(crate) struct NewSwmsJob {
    id: Uuid,
    job_site_id: Uuid,
    name: String,
    description: Option<String>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    status: JobStatus,
    created_at: DateTime<Utc>,
}

impl NewSwmsJob {
    /// Initialize a `NewSwmsJob` struct in the `planned` state, which can be
    /// inserted into the database using [`NewSwmsJob::create`].
    pub(crate) fn new(job_site_id: Uuid, name: &str, start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_site_id,
            name: name.to_owned(),
            description: None,
            start_date,
            end_date: None,
            status: JobStatus::Planned,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub(crate) fn with_end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = end_date;
        self
    }

    pub(crate) fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn create(self, conn: &mut PgConnection) -> QueryResult<SwmsJob> {
        diesel::insert_into(swms_jobs::table)
            .values(&self)
            .get_result(conn)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> SwmsJob {
        SwmsJob {
            id: self.id,
            job_site_id: self.job_site_id,
            name: self.name,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

pub(crate) mod graphql {
    //! All GraphQL related functionality is encapsulated in this module. The
    //! relevant functions and structs are re-exported through
    //! [`crate::graphql`].
    //!
    //! API documentation in this module is also used in the GraphQL API itself
    //! as documentation for the clients.
    //!
    //! You can browse to `/graphql/playground` to see all relevant query,
    //! mutation, and type documentation.

    use super::*;
    use crate::graphql::parse_id;
    use crate::resources::SwmsSubmission;
    use crate::server::RequestState;
    use crate::store::{Store, SubmissionFilter};
    use juniper::{graphql_object, FieldResult, GraphQLInputObject, ID};
    use swms_core::{job_metrics, JobMetrics};

    /// Contains all the data needed to create a new `SwmsJob`.
    #[derive(Clone, Debug, Deserialize, Serialize, GraphQLInputObject)]
    pub(crate) struct CreateJobInput {
        /// The `id` of the job site at which the work takes place.
        pub(crate) job_site_id: ID,

        /// A short, descriptive name of the work.
        pub(crate) name: String,

        /// An optional description of the work.
        pub(crate) description: Option<String>,

        /// The first day of work, formatted as `YYYY-MM-DD`.
        pub(crate) start_date: String,

        /// The (optional) last day of work, formatted as `YYYY-MM-DD`.
        pub(crate) end_date: Option<String>,

        /// The initial status, defaults to `PLANNED`.
        pub(crate) status: Option<JobStatus>,
    }

    impl CreateJobInput {
        pub(crate) fn into_new_job(self) -> FieldResult<NewSwmsJob> {
            let start_date = NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")?;
            let end_date = self
                .end_date
                .as_deref()
                .map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
                .transpose()?;

            if let Some(end) = end_date {
                if end < start_date {
                    return Err("end date cannot be before the start date".into());
                }
            }

            Ok(
                NewSwmsJob::new(parse_id(&self.job_site_id)?, self.name.trim(), start_date)
                    .with_description(self.description)
                    .with_end_date(end_date)
                    .with_status(self.status.unwrap_or(JobStatus::Planned)),
            )
        }
    }

    #[graphql_object(context = RequestState)]
    impl SwmsJob {
        /// The unique identifier for a specific job.
        fn id(&self) -> ID {
            ID::new(self.id.to_string())
        }

        /// The job site at which the work takes place.
        fn job_site_id(&self) -> ID {
            ID::new(self.job_site_id.to_string())
        }

        /// A descriptive name of the job.
        fn name(&self) -> &str {
            self.name.as_ref()
        }

        /// An (optional) detailed description of the work.
        fn description(&self) -> Option<&str> {
            self.description.as_deref()
        }

        /// The first day of work, formatted as `YYYY-MM-DD`.
        fn start_date(&self) -> String {
            self.start_date.to_string()
        }

        /// The last day of work, if known.
        fn end_date(&self) -> Option<String> {
            self.end_date.map(|date| date.to_string())
        }

        /// The status of the job.
        fn status(&self) -> JobStatus {
            self.status
        }

        /// The submissions contractors made against this job.
        fn submissions(&self, context: &RequestState) -> FieldResult<Vec<SwmsSubmission>> {
            let filter = SubmissionFilter::default().for_job(Some(self.id));

            context.store()?.submissions(&filter).map_err(Into::into)
        }

        /// Completion figures for this job, computed from its submissions at
        /// the moment of the request.
        fn metrics(&self, context: &RequestState) -> FieldResult<JobMetrics> {
            let filter = SubmissionFilter::default().for_job(Some(self.id));
            let submissions = context.store()?.submissions(&filter)?;

            Ok(job_metrics(
                &submissions,
                Utc::now(),
                context.settings.overdue_threshold,
            ))
        }
    }
}
