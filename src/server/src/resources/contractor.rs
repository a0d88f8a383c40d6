//! A [`Contractor`] is a company working on one or more jobs.
//!
//! Contractors are never deleted, they are deactivated instead. Inactive
//! contractors, and contractors without a contact email address, never receive
//! campaign emails.

use crate::schema::contractors;
use crate::store::ContractorFilter;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The model representing a contractor stored in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Identifiable, Queryable, Selectable)]
#[diesel(table_name = contractors)]
pub(crate) struct Contractor {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) abn: Option<String>,
    pub(crate) contact_email: Option<String>,
    pub(crate) contact_phone: Option<String>,
    pub(crate) active: bool,
    pub(crate) created_at: DateTime<Utc>,
}

impl Contractor {
    /// The email address to send campaign emails to, if the contractor can
    /// receive any.
    pub(crate) fn reachable_email(&self) -> Option<&str> {
        if !self.active {
            return None;
        }

        self.contact_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }

    pub(crate) fn load(
        filter: &ContractorFilter,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        let mut query = contractors::table
            .order((contractors::name.asc(), contractors::id.asc()))
            .into_boxed();

        if let Some(ids) = &filter.ids {
            query = query.filter(contractors::id.eq_any(ids.clone()));
        }

        if let Some(active) = filter.active {
            query = query.filter(contractors::active.eq(active));
        }

        if filter.with_email {
            query = query.filter(contractors::contact_email.is_not_null());
            query = query.filter(contractors::contact_email.ne(""));
        }

        query.load(conn)
    }

    pub(crate) fn set_active(
        id: Uuid,
        active: bool,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<Self>> {
        diesel::update(contractors::table.find(id))
            .set(contractors::active.eq(active))
            .get_result(conn)
            .optional()
    }
}

/// Contains all the details needed to store a contractor in the database.
#[derive(Clone, Debug, Deserialize, Serialize, Insertable)]
#[diesel(table_name = contractors)]
pub(crate) struct NewContractor {
    id: Uuid,
    name: String,
    abn: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl NewContractor {
    /// Initialize an active `NewContractor`.
    pub(crate) fn new(name: &str, contact_email: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            abn: None,
            contact_email,
            contact_phone: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn with_abn(mut self, abn: Option<String>) -> Self {
        self.abn = abn;
        self
    }

    pub(crate) fn with_phone(mut self, phone: Option<String>) -> Self {
        self.contact_phone = phone;
        self
    }

    pub(crate) fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub(crate) fn create(self, conn: &mut PgConnection) -> QueryResult<Contractor> {
        diesel::insert_into(contractors::table)
            .values(&self)
            .get_result(conn)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> Contractor {
        Contractor {
            id: self.id,
            name: self.name,
            abn: self.abn,
            contact_email: self.contact_email,
            contact_phone: self.contact_phone,
            active: self.active,
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

    use super::*;
    use crate::server::RequestState;
    use juniper::{graphql_object, FieldResult, GraphQLInputObject, ID};

    /// Contains all the data needed to register a new `Contractor`.
    #[derive(Clone, Debug, Deserialize, Serialize, GraphQLInputObject)]
    pub(crate) struct CreateContractorInput {
        /// The registered business name.
        pub(crate) name: String,

        /// The Australian Business Number, if known.
        pub(crate) abn: Option<String>,

        /// The address campaign emails are sent to.
        ///
        /// Contractors without an email address are skipped by every campaign.
        pub(crate) contact_email: Option<String>,

        /// A phone number for the site office.
        pub(crate) contact_phone: Option<String>,
    }

    impl CreateContractorInput {
        pub(crate) fn into_new_contractor(self) -> FieldResult<NewContractor> {
            let name = self.name.trim();
            if name.is_empty() {
                return Err("contractor name cannot be empty".into());
            }

            let email = self
                .contact_email
                .map(|email| email.trim().to_owned())
                .filter(|email| !email.is_empty());

            if let Some(email) = &email {
                if !email.contains('@') {
                    return Err(format!("invalid email address: {}", email).into());
                }
            }

            Ok(NewContractor::new(name, email)
                .with_abn(self.abn)
                .with_phone(self.contact_phone))
        }
    }

    #[graphql_object(context = RequestState)]
    impl Contractor {
        /// The unique identifier for a specific contractor.
        fn id(&self) -> ID {
            ID::new(self.id.to_string())
        }

        /// The registered business name.
        fn name(&self) -> &str {
            self.name.as_ref()
        }

        fn abn(&self) -> Option<&str> {
            self.abn.as_deref()
        }

        fn contact_email(&self) -> Option<&str> {
            self.contact_email.as_deref()
        }

        fn contact_phone(&self) -> Option<&str> {
            self.contact_phone.as_deref()
        }

        /// Inactive contractors are excluded from every campaign.
        fn active(&self) -> bool {
            self.active
        }
    }
}
