//! An [`EmailSend`] is a single email of a campaign, addressed to one
//! contractor.
//!
//! Each send carries a portal token, which lets the contractor open the
//! submission portal without logging in. The token is only stored on the send
//! itself.

use crate::schema::swms_email_sends;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use swms_core::DeliveryStatus;
use uuid::Uuid;

/// The number of random bytes in a portal token.
const TOKEN_BYTES: usize = 32;

/// An opaque, unguessable token granting access to the submission portal.
#[derive(Clone, Eq, PartialEq)]
pub(crate) struct PortalToken(String);

impl PortalToken {
    /// Generate a fresh token from the operating system's random number
    /// generator.
    pub(crate) fn generate() -> Self {
        let mut bytes = [0_u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials, keep them out of logs.
impl fmt::Debug for PortalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PortalToken(..)")
    }
}

/// The model representing a campaign email stored in the database.
#[derive(Clone, Identifiable, Queryable, Selectable)]
#[diesel(table_name = swms_email_sends)]
pub(crate) struct EmailSend {
    pub(crate) id: Uuid,
    pub(crate) campaign_id: Uuid,
    pub(crate) contractor_id: Uuid,
    pub(crate) email_address: String,
    pub(crate) portal_token: String,
    pub(crate) token_expires_at: DateTime<Utc>,
    pub(crate) delivery_status: DeliveryStatus,
    pub(crate) created_at: DateTime<Utc>,
}

impl EmailSend {
    pub(crate) fn for_campaign(campaign_id: Uuid, conn: &mut PgConnection) -> QueryResult<Vec<Self>> {
        swms_email_sends::table
            .filter(swms_email_sends::campaign_id.eq(campaign_id))
            .order(swms_email_sends::created_at.asc())
            .load(conn)
    }
}

impl fmt::Debug for EmailSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSend")
            .field("id", &self.id)
            .field("campaign_id", &self.campaign_id)
            .field("contractor_id", &self.contractor_id)
            .field("email_address", &self.email_address)
            .field("portal_token", &format_args!(".."))
            .field("token_expires_at", &self.token_expires_at)
            .field("delivery_status", &self.delivery_status)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Contains all the details needed to store a send in the database.
#[derive(Clone, Insertable)]
#[diesel(table_name = swms_email_sends)]
pub(crate) struct NewEmailSend {
    id: Uuid,
    campaign_id: Uuid,
    contractor_id: Uuid,
    email_address: String,
    portal_token: String,
    token_expires_at: DateTime<Utc>,
    delivery_status: DeliveryStatus,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for NewEmailSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewEmailSend")
            .field("id", &self.id)
            .field("campaign_id", &self.campaign_id)
            .field("contractor_id", &self.contractor_id)
            .field("email_address", &self.email_address)
            .field("portal_token", &format_args!(".."))
            .field("token_expires_at", &self.token_expires_at)
            .finish()
    }
}

impl NewEmailSend {
    /// Initialize a `pending` send with a freshly generated portal token,
    /// valid for `ttl` from `now`.
    pub(crate) fn new(
        campaign_id: Uuid,
        contractor_id: Uuid,
        email_address: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            contractor_id,
            email_address: email_address.to_owned(),
            portal_token: PortalToken::generate().0,
            token_expires_at: now + ttl,
            delivery_status: DeliveryStatus::Pending,
            created_at: now,
        }
    }

    pub(crate) fn create_all(sends: &[Self], conn: &mut PgConnection) -> QueryResult<usize> {
        if sends.is_empty() {
            return Ok(0);
        }

        diesel::insert_into(swms_email_sends::table)
            .values(sends)
            .execute(conn)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> EmailSend {
        EmailSend {
            id: self.id,
            campaign_id: self.campaign_id,
            contractor_id: self.contractor_id,
            email_address: self.email_address,
            portal_token: self.portal_token,
            token_expires_at: self.token_expires_at,
            delivery_status: self.delivery_status,
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
    use juniper::{graphql_object, ID};

    // The portal token is never exposed.
    #[graphql_object(context = RequestState)]
    impl EmailSend {
        fn id(&self) -> ID {
            ID::new(self.id.to_string())
        }

        fn contractor_id(&self) -> ID {
            ID::new(self.contractor_id.to_string())
        }

        fn email_address(&self) -> &str {
            self.email_address.as_ref()
        }

        /// When the portal link in the email stops working.
        fn token_expires_at(&self) -> String {
            rfc3339(self.token_expires_at)
        }

        fn delivery_status(&self) -> DeliveryStatus {
            self.delivery_status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_unique() {
        let tokens = (0..100)
            .map(|_| PortalToken::generate().as_str().to_owned())
            .collect::<HashSet<_>>();

        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = PortalToken::generate();

        assert_eq!(token.as_str().len(), 43);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let token = PortalToken::generate();

        assert!(!format!("{:?}", token).contains(token.as_str()));
    }

    #[test]
    fn test_send_debug_hides_token() {
        let new = NewEmailSend::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "ops@acme.test",
            Utc::now(),
            Duration::days(7),
        );
        let token = new.portal_token.clone();

        assert!(!format!("{:?}", new).contains(&token));
        assert!(format!("{:?}", new).contains("ops@acme.test"));
        assert!(!format!("{:?}", new.into_record()).contains(&token));
    }

    #[test]
    fn test_send_expiry() {
        let now = Utc::now();
        let send = NewEmailSend::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "ops@acme.test",
            now,
            Duration::days(7),
        )
        .into_record();

        assert_eq!(send.token_expires_at, now + Duration::days(7));
        assert_eq!(send.delivery_status, DeliveryStatus::Pending);
    }
}
