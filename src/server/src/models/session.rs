use crate::schema::sessions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// The model representing a session stored in the database.
///
/// Sessions are issued by the authentication collaborator. This server only
/// looks them up to authenticate a request.
#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = sessions)]
pub(crate) struct Session {
    pub(crate) id: i32,
    pub(crate) token: Uuid,
    pub(crate) user_email: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn find_by_token(token: Uuid, conn: &mut PgConnection) -> QueryResult<Option<Self>> {
        sessions::table
            .filter(sessions::token.eq(token))
            .first(conn)
            .optional()
    }
}

/// The authenticated user on whose behalf an action runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Actor {
    pub(crate) email: String,
}

impl From<&Session> for Actor {
    fn from(session: &Session) -> Self {
        Self {
            email: session.user_email.clone(),
        }
    }
}
