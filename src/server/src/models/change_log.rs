use crate::schema::swms_audit_log;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

/// A row in the SWMS change-log.
///
/// The change-log records every administrative change made to jobs,
/// contractors and submissions, next to the change itself.
#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = swms_audit_log)]
pub(crate) struct ChangeLogEntry {
    pub(crate) id: Uuid,
    pub(crate) table_name: String,
    pub(crate) record_id: Uuid,
    pub(crate) action: String,
    pub(crate) changed_by: String,
    pub(crate) job_site_id: Option<Uuid>,
    pub(crate) details: Value,
    pub(crate) created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    /// Load the most recent entries, newest first, optionally limited to the
    /// changes made at one job site.
    pub(crate) fn recent(
        job_site_id: Option<Uuid>,
        limit: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        let mut query = swms_audit_log::table
            .order((swms_audit_log::created_at.desc(), swms_audit_log::id))
            .limit(limit)
            .into_boxed();

        if let Some(site) = job_site_id {
            query = query.filter(swms_audit_log::job_site_id.eq(site));
        }

        query.load(conn)
    }
}

/// Use this struct to append a change-log entry.
#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = swms_audit_log)]
pub(crate) struct NewChangeLogEntry {
    id: Uuid,
    table_name: String,
    record_id: Uuid,
    action: String,
    changed_by: String,
    job_site_id: Option<Uuid>,
    details: Value,
    created_at: DateTime<Utc>,
}

impl NewChangeLogEntry {
    /// Record an `insert` into `table`.
    pub(crate) fn insert(table: &'static str, record_id: Uuid, changed_by: &str) -> Self {
        Self::new(table, "insert", record_id, changed_by)
    }

    /// Record an `update` of a row in `table`.
    pub(crate) fn update(table: &'static str, record_id: Uuid, changed_by: &str) -> Self {
        Self::new(table, "update", record_id, changed_by)
    }

    fn new(table: &'static str, action: &'static str, record_id: Uuid, changed_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            table_name: table.to_owned(),
            record_id,
            action: action.to_owned(),
            changed_by: changed_by.to_owned(),
            job_site_id: None,
            details: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub(crate) fn with_job_site(mut self, job_site_id: Uuid) -> Self {
        self.job_site_id = Some(job_site_id);
        self
    }

    pub(crate) fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub(crate) fn create(self, conn: &mut PgConnection) -> QueryResult<ChangeLogEntry> {
        diesel::insert_into(swms_audit_log::table)
            .values(&self)
            .get_result(conn)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> ChangeLogEntry {
        ChangeLogEntry {
            id: self.id,
            table_name: self.table_name,
            record_id: self.record_id,
            action: self.action,
            changed_by: self.changed_by,
            job_site_id: self.job_site_id,
            details: self.details,
            created_at: self.created_at,
        }
    }
}
