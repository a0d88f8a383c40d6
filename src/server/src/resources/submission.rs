//! A [`SwmsSubmission`] is the response of a contractor to a job.
//!
//! A submission starts out `pending` when the contractor is asked for a SWMS,
//! becomes `submitted` once the document is lodged and ends up `approved` or
//! `rejected` after review. Nothing in this server moves a reviewed submission
//! back into an earlier state.

use crate::schema::{swms_jobs, swms_submissions};
use crate::store::SubmissionFilter;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text, Timestamptz};
use serde::{Deserialize, Serialize};
use swms_core::{SubmissionRecord, SubmissionStatus};
use uuid::Uuid;

diesel::sql_function! {
    /// Postgres' `concat_ws`, which skips `NULL` arguments.
    fn concat_ws(separator: Text, head: Nullable<Text>, tail: Text) -> Nullable<Text>;
}

diesel::sql_function! {
    /// The review time of a submission, falling back to its creation time.
    #[sql_name = "coalesce"]
    fn last_activity(reviewed_at: Nullable<Timestamptz>, created_at: Timestamptz) -> Timestamptz;
}

/// Separates notes appended by successive reviews.
pub(crate) const NOTES_SEPARATOR: &str = "\n";

/// The model representing a submission stored in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Identifiable, Queryable, Selectable)]
#[diesel(table_name = swms_submissions)]
pub(crate) struct SwmsSubmission {
    pub(crate) id: Uuid,
    pub(crate) swms_job_id: Uuid,
    pub(crate) contractor_id: Uuid,
    pub(crate) worker_id: Option<Uuid>,
    pub(crate) status: SubmissionStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) reviewed_at: Option<DateTime<Utc>>,
    pub(crate) reviewed_by: Option<String>,
    pub(crate) notes: Option<String>,
}

impl SubmissionRecord for SwmsSubmission {
    type ContractorId = Uuid;

    fn contractor_id(&self) -> &Uuid {
        &self.contractor_id
    }

    fn status(&self) -> SubmissionStatus {
        self.status
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A review decision, applied to one or many submissions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Review {
    pub(crate) status: SubmissionStatus,
    pub(crate) reviewed_by: String,
    pub(crate) reviewed_at: DateTime<Utc>,

    /// Appended to the existing notes of the submission, if any.
    pub(crate) notes: Option<String>,
}

impl Review {
    #[cfg(test)]
    /// The notes after applying this review to a submission with `existing`
    /// notes.
    pub(crate) fn merge_notes(&self, existing: Option<&str>) -> Option<String> {
        match (existing, self.notes.as_deref()) {
            (Some(old), Some(new)) => Some(format!("{}{}{}", old, NOTES_SEPARATOR, new)),
            (None, Some(new)) => Some(new.to_owned()),
            (old, None) => old.map(str::to_owned),
        }
    }
}

/// Applies a [`SubmissionFilter`] to a boxed `swms_submissions` query or
/// update.
macro_rules! submission_filters {
    ($query:expr, $filter:expr) => {{
        let filter: &SubmissionFilter = $filter;
        let mut query = $query;

        if let Some(site) = filter.job_site_id {
            query = query.filter(
                swms_submissions::swms_job_id.eq_any(
                    swms_jobs::table
                        .filter(swms_jobs::job_site_id.eq(site))
                        .select(swms_jobs::id),
                ),
            );
        }

        if let Some(jobs) = &filter.swms_job_ids {
            query = query.filter(swms_submissions::swms_job_id.eq_any(jobs.clone()));
        }

        if let Some(contractor) = filter.contractor_id {
            query = query.filter(swms_submissions::contractor_id.eq(contractor));
        }

        if !filter.statuses.is_empty() {
            query = query.filter(swms_submissions::status.eq_any(filter.statuses.clone()));
        }

        if let Some(before) = filter.created_before {
            query = query.filter(swms_submissions::created_at.lt(before));
        }

        query
    }};
}

impl SwmsSubmission {
    pub(crate) fn load(
        filter: &SubmissionFilter,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        let query = swms_submissions::table
            .order((swms_submissions::created_at.asc(), swms_submissions::id.asc()))
            .into_boxed();

        submission_filters!(query, filter).load(conn)
    }

    pub(crate) fn count(filter: &SubmissionFilter, conn: &mut PgConnection) -> QueryResult<i64> {
        let query = swms_submissions::table.count().into_boxed();

        submission_filters!(query, filter).get_result(conn)
    }

    /// Load the `limit` submissions with the most recent activity, newest
    /// first.
    pub(crate) fn recent(
        job_site_id: Option<Uuid>,
        limit: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        let filter = SubmissionFilter::default().at_site(job_site_id);
        let query = swms_submissions::table
            .order((
                last_activity(swms_submissions::reviewed_at, swms_submissions::created_at).desc(),
                swms_submissions::id.asc(),
            ))
            .limit(limit)
            .into_boxed();

        submission_filters!(query, &filter).load(conn)
    }

    /// Apply `review` to every `submitted` row matching `filter`, in one
    /// statement. Returns the number of transitioned rows.
    pub(crate) fn approve_all(
        filter: &SubmissionFilter,
        review: &Review,
        conn: &mut PgConnection,
    ) -> QueryResult<usize> {
        let target = submission_filters!(
            diesel::update(swms_submissions::table)
                .filter(swms_submissions::status.eq(SubmissionStatus::Submitted))
                .into_boxed(),
            filter
        );

        let stamp = (
            swms_submissions::status.eq(review.status),
            swms_submissions::reviewed_at.eq(review.reviewed_at),
            swms_submissions::reviewed_by.eq(&review.reviewed_by),
        );

        match &review.notes {
            Some(text) => target
                .set((
                    stamp,
                    swms_submissions::notes.eq(concat_ws(
                        NOTES_SEPARATOR,
                        swms_submissions::notes,
                        text,
                    )),
                ))
                .execute(conn),
            None => target.set(stamp).execute(conn),
        }
    }

    /// Apply `review` to a single submission, as long as it wasn't reviewed
    /// before.
    ///
    /// Returns `None` if the submission does not exist, or is already
    /// approved or rejected.
    pub(crate) fn review(
        submission_id: Uuid,
        review: &Review,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<Self>> {
        use crate::schema::swms_submissions::dsl::*;

        let target = swms_submissions
            .filter(id.eq(submission_id))
            .filter(status.eq_any(SubmissionStatus::AWAITING.to_vec()));

        let stamp = (
            status.eq(review.status),
            reviewed_at.eq(review.reviewed_at),
            reviewed_by.eq(&review.reviewed_by),
        );

        match &review.notes {
            Some(text) => diesel::update(target)
                .set((stamp, notes.eq(concat_ws(NOTES_SEPARATOR, notes, text))))
                .get_result(conn)
                .optional(),
            None => diesel::update(target)
                .set(stamp)
                .get_result(conn)
                .optional(),
        }
    }
}

/// Contains all the details needed to store a submission in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Insertable)]
#[diesel(table_name = swms_submissions)]
pub(crate) struct NewSubmission {
    id: Uuid,
    swms_job_id: Uuid,
    contractor_id: Uuid,
    worker_id: Option<Uuid>,
    status: SubmissionStatus,
    created_at: DateTime<Utc>,
    notes: Option<String>,
}

impl NewSubmission {
    /// Initialize a `pending` submission of `contractor_id` against
    /// `swms_job_id`.
    pub(crate) fn new(swms_job_id: Uuid, contractor_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            swms_job_id,
            contractor_id,
            worker_id: None,
            status: SubmissionStatus::Pending,
            created_at: Utc::now(),
            notes: None,
        }
    }

    pub(crate) const fn swms_job_id(&self) -> Uuid {
        self.swms_job_id
    }

    pub(crate) fn with_status(mut self, status: SubmissionStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn with_worker(mut self, worker_id: Option<Uuid>) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub(crate) fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub(crate) fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub(crate) fn create(self, conn: &mut PgConnection) -> QueryResult<SwmsSubmission> {
        diesel::insert_into(swms_submissions::table)
            .values(&self)
            .get_result(conn)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> SwmsSubmission {
        SwmsSubmission {
            id: self.id,
            swms_job_id: self.swms_job_id,
            contractor_id: self.contractor_id,
            worker_id: self.worker_id,
            status: self.status,
            created_at: self.created_at,
            reviewed_at: None,
            reviewed_by: None,
            notes: self.notes,
        }
    }
}

pub(crate) mod graphql {
    //! All GraphQL related functionality is encapsulated in this module. The
    //! relevant functions and structs are re-exported through
    //! [`crate::graphql`].

    use super::*;
    use crate::graphql::{parse_id, rfc3339};
    use crate::server::RequestState;
    use juniper::{graphql_object, FieldResult, GraphQLEnum, GraphQLInputObject, ID};

    /// Contains all the data needed to record a new `SwmsSubmission`.
    #[derive(Clone, Debug, Deserialize, Serialize, GraphQLInputObject)]
    pub(crate) struct CreateSubmissionInput {
        /// The job the submission is made against.
        pub(crate) swms_job_id: ID,

        /// The contractor making the submission.
        pub(crate) contractor_id: ID,

        /// The individual worker who signed the SWMS, if known.
        pub(crate) worker_id: Option<ID>,

        /// The initial status, defaults to `PENDING`.
        ///
        /// Submissions can't be created in a reviewed state, use
        /// `reviewSubmission` for that.
        pub(crate) status: Option<SubmissionStatus>,
    }

    impl CreateSubmissionInput {
        pub(crate) fn into_new_submission(self) -> FieldResult<NewSubmission> {
            let status = self.status.unwrap_or(SubmissionStatus::Pending);
            if status.is_reviewed() {
                return Err(format!("cannot create a submission as {}", status).into());
            }

            let worker = self.worker_id.as_ref().map(parse_id).transpose()?;

            Ok(
                NewSubmission::new(parse_id(&self.swms_job_id)?, parse_id(&self.contractor_id)?)
                    .with_status(status)
                    .with_worker(worker),
            )
        }
    }

    /// The decision of a reviewer.
    #[derive(Clone, Copy, Debug, Deserialize, Serialize, GraphQLEnum)]
    pub(crate) enum Decision {
        /// Accept the SWMS.
        Approve,

        /// Refuse the SWMS.
        Reject,
    }

    impl From<Decision> for SubmissionStatus {
        fn from(decision: Decision) -> Self {
            match decision {
                Decision::Approve => Self::Approved,
                Decision::Reject => Self::Rejected,
            }
        }
    }

    /// Contains the decision on a single submission.
    #[derive(Clone, Debug, Deserialize, Serialize, GraphQLInputObject)]
    pub(crate) struct ReviewSubmissionInput {
        /// The submission to review.
        pub(crate) id: ID,

        pub(crate) decision: Decision,

        /// Notes appended to the submission, for instance the reason for a
        /// rejection.
        pub(crate) notes: Option<String>,
    }

    #[graphql_object(context = RequestState)]
    impl SwmsSubmission {
        /// The unique identifier for a specific submission.
        fn id(&self) -> ID {
            ID::new(self.id.to_string())
        }

        fn swms_job_id(&self) -> ID {
            ID::new(self.swms_job_id.to_string())
        }

        fn contractor_id(&self) -> ID {
            ID::new(self.contractor_id.to_string())
        }

        fn worker_id(&self) -> Option<ID> {
            self.worker_id.map(|id| ID::new(id.to_string()))
        }

        /// The review state of the submission.
        fn status(&self) -> SubmissionStatus {
            self.status
        }

        /// When the submission was created, as an RFC 3339 timestamp.
        fn created_at(&self) -> String {
            rfc3339(self.created_at)
        }

        /// When the submission was reviewed, if it was.
        fn reviewed_at(&self) -> Option<String> {
            self.reviewed_at.map(rfc3339)
        }

        /// Who reviewed the submission, if anyone did.
        fn reviewed_by(&self) -> Option<&str> {
            self.reviewed_by.as_deref()
        }

        /// Reviewer notes, one line per review action.
        fn notes(&self) -> Option<&str> {
            self.notes.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(notes: Option<&str>) -> Review {
        Review {
            status: SubmissionStatus::Approved,
            reviewed_by: "admin@example.test".to_owned(),
            reviewed_at: Utc::now(),
            notes: notes.map(str::to_owned),
        }
    }

    #[test]
    fn test_merge_notes() {
        assert_eq!(review(None).merge_notes(None), None);
        assert_eq!(review(None).merge_notes(Some("a")), Some("a".to_owned()));
        assert_eq!(review(Some("b")).merge_notes(None), Some("b".to_owned()));
        assert_eq!(
            review(Some("b")).merge_notes(Some("a")),
            Some("a\nb".to_owned())
        );
    }

    #[test]
    fn test_new_submission_is_pending() {
        let record = NewSubmission::new(Uuid::new_v4(), Uuid::new_v4()).into_record();

        assert_eq!(record.status, SubmissionStatus::Pending);
        assert!(record.reviewed_at.is_none());
    }
}
