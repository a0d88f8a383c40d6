//! Parsing of command requests into typed [`Command`]s.
//!
//! The admin console posts a loosely typed request: an action tag, an optional
//! scope and a bag of parameters. Everything is validated here, before any
//! store access takes place. An orchestrator procedure only ever sees a
//! well-formed [`Command`].

use crate::dispatch::ActionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// The maximum length, in characters, of a free-text justification.
pub(crate) const MAX_JUSTIFICATION_CHARS: usize = 2000;

/// The raw request body of the command endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct ActionRequest {
    pub(crate) action: Option<String>,
    pub(crate) job_site_id: Option<Uuid>,
    pub(crate) contractor_id: Option<Uuid>,
    pub(crate) swms_job_id: Option<Uuid>,
    pub(crate) parameters: Option<Value>,
}

impl ActionRequest {
    /// Parse a request body. An empty body is an empty request.
    pub(crate) fn from_slice(body: &[u8]) -> Result<Self, ActionError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body)
            .map_err(|err| ActionError::Validation(format!("invalid request body: {}", err)))
    }
}

/// The records an action is restricted to. Every field is optional, an empty
/// scope covers everything.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub(crate) struct Scope {
    pub(crate) job_site_id: Option<Uuid>,
    pub(crate) contractor_id: Option<Uuid>,
    pub(crate) swms_job_id: Option<Uuid>,
}

/// A trimmed, non-empty piece of free text of at most
/// [`MAX_JUSTIFICATION_CHARS`] characters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct Justification(String);

impl Justification {
    /// Validate the value of the `field` parameter.
    pub(crate) fn parse(field: &str, value: Option<&str>) -> Result<Self, ActionError> {
        let text = value.map(str::trim).unwrap_or_default();

        if text.is_empty() {
            return Err(ActionError::Validation(format!("{} is required", field)));
        }

        if text.chars().count() > MAX_JUSTIFICATION_CHARS {
            return Err(ActionError::Validation(format!(
                "{} must be at most {} characters",
                field, MAX_JUSTIFICATION_CHARS
            )));
        }

        Ok(Self(text.to_owned()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Justification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The reports `generate-report` can produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReportKind {
    Compliance,
    Submissions,
}

impl Default for ReportKind {
    fn default() -> Self {
        ReportKind::Compliance
    }
}

impl ReportKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            ReportKind::Compliance => "compliance",
            ReportKind::Submissions => "submissions",
        }
    }
}

/// The closed set of campaign actions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Action {
    SendReminder,
    BulkApprove { criteria: Justification },
    ComplianceCheck,
    UrgentNotification { message: Justification },
    WeeklyCampaign,
    GenerateReport { kind: ReportKind },
    BroadcastUpdate { message: Justification },
    PauseCampaigns,
}

impl Action {
    /// The tag used for this action on the wire and in the audit log.
    pub(crate) const fn tag(&self) -> &'static str {
        match self {
            Action::SendReminder => "send-reminder",
            Action::BulkApprove { .. } => "bulk-approve",
            Action::ComplianceCheck => "compliance-check",
            Action::UrgentNotification { .. } => "urgent-notification",
            Action::WeeklyCampaign => "weekly-campaign",
            Action::GenerateReport { .. } => "generate-report",
            Action::BroadcastUpdate { .. } => "broadcast-update",
            Action::PauseCampaigns => "pause-campaigns",
        }
    }

    /// The free text given with the action, if it takes any.
    pub(crate) fn justification(&self) -> Option<&Justification> {
        match self {
            Action::BulkApprove { criteria } => Some(criteria),
            Action::UrgentNotification { message } | Action::BroadcastUpdate { message } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// A validated command, ready to be run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Command {
    pub(crate) scope: Scope,
    pub(crate) action: Action,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkApproveParameters {
    approval_criteria: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrgentNotificationParameters {
    urgent_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastUpdateParameters {
    broadcast_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReportParameters {
    report_type: Option<ReportKind>,
}

fn parameters<T>(tag: &str, parameters: &Value) -> Result<T, ActionError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(parameters.clone()).map_err(|err| {
        ActionError::Validation(format!("invalid parameters for {}: {}", tag, err))
    })
}

impl TryFrom<ActionRequest> for Command {
    type Error = ActionError;

    fn try_from(request: ActionRequest) -> Result<Self, Self::Error> {
        let tag = request
            .action
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .ok_or(ActionError::MissingAction)?;

        let params = match request.parameters {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value) => value,
        };

        let action = match tag {
            "send-reminder" => Action::SendReminder,
            "bulk-approve" => {
                let p: BulkApproveParameters = parameters(tag, &params)?;
                Action::BulkApprove {
                    criteria: Justification::parse(
                        "approvalCriteria",
                        p.approval_criteria.as_deref(),
                    )?,
                }
            }
            "compliance-check" => Action::ComplianceCheck,
            "urgent-notification" => {
                let p: UrgentNotificationParameters = parameters(tag, &params)?;
                Action::UrgentNotification {
                    message: Justification::parse("urgentMessage", p.urgent_message.as_deref())?,
                }
            }
            "weekly-campaign" => Action::WeeklyCampaign,
            "generate-report" => {
                let p: GenerateReportParameters = parameters(tag, &params)?;
                Action::GenerateReport {
                    kind: p.report_type.unwrap_or_default(),
                }
            }
            "broadcast-update" => {
                let p: BroadcastUpdateParameters = parameters(tag, &params)?;
                Action::BroadcastUpdate {
                    message: Justification::parse(
                        "broadcastMessage",
                        p.broadcast_message.as_deref(),
                    )?,
                }
            }
            "pause-campaigns" => Action::PauseCampaigns,
            other => return Err(ActionError::UnknownAction(other.to_owned())),
        };

        Ok(Self {
            scope: Scope {
                job_site_id: request.job_site_id,
                contractor_id: request.contractor_id,
                swms_job_id: request.swms_job_id,
            },
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command(body: Value) -> Result<Command, ActionError> {
        let request: ActionRequest = serde_json::from_value(body).unwrap();
        Command::try_from(request)
    }

    #[test]
    fn test_missing_action() {
        assert!(matches!(command(json!({})), Err(ActionError::MissingAction)));
        assert!(matches!(
            command(json!({ "action": "  " })),
            Err(ActionError::MissingAction)
        ));
    }

    #[test]
    fn test_unknown_action() {
        let err = command(json!({ "action": "frobnicate" })).unwrap_err();

        assert_eq!(err.to_string(), "Unknown action: frobnicate");
    }

    #[test]
    fn test_every_tag_round_trips() {
        let bodies = vec![
            json!({ "action": "send-reminder" }),
            json!({ "action": "bulk-approve", "parameters": { "approvalCriteria": "ok" } }),
            json!({ "action": "compliance-check" }),
            json!({ "action": "urgent-notification", "parameters": { "urgentMessage": "stop" } }),
            json!({ "action": "weekly-campaign" }),
            json!({ "action": "generate-report" }),
            json!({ "action": "broadcast-update", "parameters": { "broadcastMessage": "hi" } }),
            json!({ "action": "pause-campaigns" }),
        ];

        for body in bodies {
            let tag = body["action"].as_str().unwrap().to_owned();
            assert_eq!(command(body).unwrap().action.tag(), tag);
        }
    }

    #[test]
    fn test_blank_justification_rejected() {
        let err = command(json!({
            "action": "bulk-approve",
            "parameters": { "approvalCriteria": "   " }
        }))
        .unwrap_err();

        assert_eq!(err.to_string(), "approvalCriteria is required");

        let err = command(json!({
            "action": "urgent-notification",
            "parameters": { "urgentMessage": "" }
        }))
        .unwrap_err();

        assert_eq!(err.to_string(), "urgentMessage is required");

        let err = command(json!({ "action": "broadcast-update" })).unwrap_err();

        assert_eq!(err.to_string(), "broadcastMessage is required");
    }

    #[test]
    fn test_justification_trimmed_and_bounded() {
        let ok = Justification::parse("x", Some("  scaffold check  ")).unwrap();
        assert_eq!(ok.as_str(), "scaffold check");

        let exact = "a".repeat(MAX_JUSTIFICATION_CHARS);
        assert!(Justification::parse("x", Some(&exact)).is_ok());

        let long = "a".repeat(MAX_JUSTIFICATION_CHARS + 1);
        assert!(matches!(
            Justification::parse("x", Some(&long)),
            Err(ActionError::Validation(_))
        ));
    }

    #[test]
    fn test_report_kind() {
        let cmd = command(json!({ "action": "generate-report" })).unwrap();
        assert_eq!(
            cmd.action,
            Action::GenerateReport {
                kind: ReportKind::Compliance
            }
        );

        let cmd = command(json!({
            "action": "generate-report",
            "parameters": { "reportType": "submissions" }
        }))
        .unwrap();
        assert_eq!(
            cmd.action,
            Action::GenerateReport {
                kind: ReportKind::Submissions
            }
        );

        assert!(command(json!({
            "action": "generate-report",
            "parameters": { "reportType": "payroll" }
        }))
        .is_err());
    }

    #[test]
    fn test_scope() {
        let site = Uuid::new_v4();
        let cmd = command(json!({ "action": "weekly-campaign", "job_site_id": site })).unwrap();

        assert_eq!(cmd.scope.job_site_id, Some(site));
        assert_eq!(cmd.scope.swms_job_id, None);
    }

    #[test]
    fn test_from_slice() {
        assert!(ActionRequest::from_slice(b"").unwrap().action.is_none());
        assert!(matches!(
            ActionRequest::from_slice(b"{not json"),
            Err(ActionError::Validation(_))
        ));
        assert!(matches!(
            ActionRequest::from_slice(br#"{"action":"x","job_site_id":"nope"}"#),
            Err(ActionError::Validation(_))
        ));
    }
}
