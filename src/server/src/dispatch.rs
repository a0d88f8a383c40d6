//! The campaign action dispatcher.
//!
//! A request goes through authentication, parsing and validation before the
//! store is touched. The selected procedure then runs inside one transaction,
//! together with the success audit record. If anything in the transaction
//! fails, all of it is rolled back, and a failure audit record is written
//! outside of it.

use crate::command::{ActionRequest, Command};
use crate::config::WorkflowSettings;
use crate::models::{Actor, NewNotificationAudit};
use crate::orchestrator::{self, Context, Outcome};
use crate::report::{ExportError, ReportExporter};
use crate::store::{Store, StoreError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use swms_core::AuditResult;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub(crate) enum ActionError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Action is required")]
    MissingAction,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Dependency(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Action timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Unexpected(String),
}

impl ActionError {
    /// Whether a failure audit record is written for this error.
    ///
    /// Requests that never got past validation leave no trace.
    const fn is_audited(&self) -> bool {
        matches!(
            self,
            ActionError::Dependency(_) | ActionError::Export(_) | ActionError::Unexpected(_)
        )
    }

    /// The message shown to the caller. Internal failures are not spelled
    /// out.
    pub(crate) fn public_message(&self) -> String {
        match self {
            ActionError::Dependency(_) | ActionError::Export(_) | ActionError::Unexpected(_) => {
                "Action failed".to_owned()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for ActionError {
    fn status_code(&self) -> StatusCode {
        match self {
            ActionError::Unauthorized => StatusCode::UNAUTHORIZED,
            ActionError::MissingAction
            | ActionError::UnknownAction(_)
            | ActionError::Validation(_) => StatusCode::BAD_REQUEST,
            ActionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ActionError::Dependency(_) | ActionError::Export(_) | ActionError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(("Cache-Control", "no-cache"))
            .json(Envelope::failure(self))
    }
}

/// The response body of the command endpoint.
#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct Envelope {
    pub(crate) success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl Envelope {
    pub(crate) fn success(outcome: Outcome) -> Self {
        Self {
            success: true,
            message: Some(outcome.message),
            data: Some(outcome.data),
            error: None,
        }
    }

    pub(crate) fn failure(err: &ActionError) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(err.public_message()),
        }
    }
}

/// Authenticates, validates and runs campaign actions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Dispatcher<'a, X> {
    exporter: &'a X,
    settings: &'a WorkflowSettings,
}

impl<'a, X: ReportExporter> Dispatcher<'a, X> {
    pub(crate) const fn new(exporter: &'a X, settings: &'a WorkflowSettings) -> Self {
        Self { exporter, settings }
    }

    /// Handle a raw request: authenticate `token`, parse `body`, and run the
    /// resulting command before `deadline`.
    pub(crate) fn handle<S: Store>(
        &self,
        store: &mut S,
        token: &str,
        body: &[u8],
        deadline: Instant,
    ) -> Result<Outcome, ActionError> {
        let actor = authenticate(store, token)?;
        let command = Command::try_from(ActionRequest::from_slice(body)?)?;

        self.dispatch(store, &actor, &command, Utc::now(), deadline)
    }

    /// Run `command` on behalf of `actor` and record the outcome.
    ///
    /// The transaction is rolled back if `deadline` passes before it commits,
    /// so an action reported as timed out never takes effect.
    pub(crate) fn dispatch<S: Store>(
        &self,
        store: &mut S,
        actor: &Actor,
        command: &Command,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<Outcome, ActionError> {
        let tag = command.action.tag();
        let ctx = Context {
            actor,
            now,
            settings: self.settings,
        };

        let result = store.transaction(|store: &mut S| -> Result<Outcome, ActionError> {
            store.set_statement_timeout(self.time_left(deadline)?)?;

            let outcome = orchestrator::run(store, self.exporter, &ctx, command)?;
            let _ = self.time_left(deadline)?;

            let payload = audit_payload(actor, command, &outcome.message, "summary", &outcome.data);
            let _ = store.insert_notification_audit(NewNotificationAudit::new(
                tag,
                payload,
                AuditResult::Success,
                now,
            ))?;

            let _ = self.time_left(deadline)?;
            Ok(outcome)
        });

        match &result {
            Ok(outcome) => {
                info!(action = tag, actor = %actor.email, message = %outcome.message, "action completed");
            }
            Err(err) if err.is_audited() => {
                error!(action = tag, actor = %actor.email, error = %err, "action failed");

                let payload = audit_payload(
                    actor,
                    command,
                    "Action failed",
                    "error",
                    &Value::String(err.to_string()),
                );
                let audit = NewNotificationAudit::new(tag, payload, AuditResult::Failure, now);

                if let Err(audit_err) = store.insert_notification_audit(audit) {
                    warn!(action = tag, error = %audit_err, "unable to record failed action");
                }
            }
            Err(err @ ActionError::Timeout(_)) => {
                warn!(action = tag, actor = %actor.email, error = %err, "action rolled back");
            }
            Err(err) => {
                info!(action = tag, actor = %actor.email, error = %err, "action rejected");
            }
        }

        result
    }

    /// The time left until `deadline`. Fails once nothing is left.
    fn time_left(&self, deadline: Instant) -> Result<Duration, ActionError> {
        let left = deadline.saturating_duration_since(Instant::now());

        // A zero statement timeout disables the limit altogether.
        if left.as_millis() == 0 {
            return Err(ActionError::Timeout(self.settings.action_timeout.as_secs()));
        }

        Ok(left)
    }
}

/// Resolve a session token to the actor it belongs to.
pub(crate) fn authenticate<S: Store>(store: &mut S, token: &str) -> Result<Actor, ActionError> {
    let token = token
        .trim()
        .parse::<Uuid>()
        .map_err(|_| ActionError::Unauthorized)?;

    store
        .find_session(token)?
        .as_ref()
        .map(Actor::from)
        .ok_or(ActionError::Unauthorized)
}

fn audit_payload(actor: &Actor, command: &Command, message: &str, key: &str, detail: &Value) -> Value {
    let scope = &command.scope;
    let mut payload = json!({
        "actor": actor.email,
        "job_site_id": scope.job_site_id.map(|id| id.to_string()),
        "contractor_id": scope.contractor_id.map(|id| id.to_string()),
        "swms_job_id": scope.swms_job_id.map(|id| id.to_string()),
        "justification": command.action.justification().map(|j| j.as_str()),
        "message": message,
    });

    if let Value::Object(map) = &mut payload {
        let _ = map.insert(key.to_owned(), detail.clone());
    }

    payload
}
