use crate::schema::notification_audits;
use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Text};
use serde_json::Value;
use swms_core::AuditResult;
use uuid::Uuid;

/// The model representing a notification audit record.
///
/// Audit records are append-only. Every campaign action writes exactly one,
/// describing what was done and on whose behalf.
#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = notification_audits)]
pub(crate) struct NotificationAudit {
    pub(crate) id: Uuid,
    pub(crate) kind: String,
    pub(crate) payload: Value,
    pub(crate) result: AuditResult,
    pub(crate) created_at: DateTime<Utc>,
}

impl NotificationAudit {
    /// Load the most recent audit records, newest first, optionally only
    /// those whose payload names `job_site_id`.
    pub(crate) fn recent(
        job_site_id: Option<Uuid>,
        limit: i64,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        let mut query = notification_audits::table
            .order((notification_audits::created_at.desc(), notification_audits::id))
            .limit(limit)
            .into_boxed();

        if let Some(site) = job_site_id {
            query = query
                .filter(sql::<Bool>("payload ->> 'job_site_id' = ").bind::<Text, _>(site.to_string()));
        }

        query.load(conn)
    }
}

/// Use this struct to append a new audit record.
#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = notification_audits)]
pub(crate) struct NewNotificationAudit {
    id: Uuid,
    kind: String,
    payload: Value,
    result: AuditResult,
    created_at: DateTime<Utc>,
}

impl NewNotificationAudit {
    pub(crate) fn new(kind: &str, payload: Value, result: AuditResult, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.to_owned(),
            payload,
            result,
            created_at: at,
        }
    }

    pub(crate) fn create(self, conn: &mut PgConnection) -> QueryResult<NotificationAudit> {
        diesel::insert_into(notification_audits::table)
            .values(&self)
            .get_result(conn)
    }

    #[cfg(test)]
    /// Turn the insert into the row it would produce.
    ///
    /// Used by stores that don't generate any column values themselves.
    pub(crate) fn into_record(self) -> NotificationAudit {
        NotificationAudit {
            id: self.id,
            kind: self.kind,
            payload: self.payload,
            result: self.result,
            created_at: self.created_at,
        }
    }
}
