use crate::dispatch::{self, ActionError, Dispatcher, Envelope};
use crate::graphql::Schema;
use crate::server::{RequestState, ServerError, State};
use crate::store::PgStore;
use actix_web::rt::time::timeout;
use actix_web::web::{self, Bytes, Data, Json};
use actix_web::{http::header, HttpRequest, HttpResponse};
use juniper::http::{graphiql, playground, GraphQLRequest};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

/// How long the request waits past the action deadline for the transaction
/// to settle. The dispatcher itself gives up at the deadline.
const SETTLE_GRACE: Duration = Duration::from_secs(1);

/// See: <https://tools.ietf.org/html/draft-inadarei-api-health-check-03>
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Status {
    Pass,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub(crate) struct Health {
    status: Status,
    version: &'static str,
    release_id: &'static str,
}

/// Run a campaign action.
///
/// The token is checked for presence before a connection is taken from the
/// pool. The whole action, including waiting for a connection, must finish
/// within the configured action timeout, otherwise its transaction is rolled
/// back.
pub(super) async fn campaigns(
    state: Data<State>,
    request: HttpRequest,
    body: Bytes,
) -> Result<HttpResponse, ActionError> {
    let token = auth_token(&request).ok_or(ActionError::Unauthorized)?;
    let limit = state.config.workflow.action_timeout;
    let deadline = Instant::now() + limit;

    let work = web::block(move || {
        let conn = state
            .pool
            .get_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|err| {
                warn!(error = %err, "no database connection before the deadline");
                ActionError::Timeout(limit.as_secs())
            })?;
        let mut store = PgStore::new(conn);

        Dispatcher::new(&state.exporter, &state.config.workflow).handle(
            &mut store,
            &token,
            &body,
            deadline,
        )
    });

    let outcome = match timeout(limit + SETTLE_GRACE, work).await {
        Ok(Ok(result)) => result?,
        Ok(Err(err)) => return Err(ActionError::Unexpected(err.to_string())),
        Err(_) => {
            warn!(seconds = limit.as_secs(), "action timed out");
            return Err(ActionError::Timeout(limit.as_secs()));
        }
    };

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .json(Envelope::success(outcome)))
}

pub(super) async fn graphiql() -> HttpResponse {
    let html = graphiql::graphiql_source("/graphql", None);
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

pub(super) async fn playground() -> HttpResponse {
    let html = playground::playground_source("/graphql", None);
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

pub(super) async fn graphql(
    state: Data<State>,
    schema: Data<Schema>,
    request: HttpRequest,
    graphql: Json<GraphQLRequest>,
) -> Result<HttpResponse, ServerError> {
    let token = auth_token(&request).ok_or(ServerError::Authentication)?;

    let response = web::block(move || {
        let conn = state.pool.get()?;
        let mut store = PgStore::new(conn);
        let actor = dispatch::authenticate(&mut store, &token).map_err(|err| match err {
            ActionError::Unauthorized => ServerError::Authentication,
            other => ServerError::Internal(other.to_string()),
        })?;

        let context = RequestState::new(store, actor, state.config.workflow);
        let response = graphql.execute_sync(&**schema, &context);

        serde_json::to_string(&response).map_err(Into::<ServerError>::into)
    })
    .await??;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .body(response))
}

pub(super) async fn health() -> HttpResponse {
    let health = Health {
        status: Status::Pass,
        version: env!("CARGO_PKG_VERSION_MAJOR"),
        release_id: env!("CARGO_PKG_VERSION"),
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .json(health)
}

/// The session token of the request, with an optional `Bearer` prefix
/// removed.
fn auth_token(request: &HttpRequest) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();

    if token.is_empty() {
        return None;
    }

    Some(token.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::report::FileExporter;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use diesel::r2d2::{ConnectionManager, Pool};
    use serde_json::Value;

    // The pool never connects, every test here must be answered before a
    // connection is needed.
    fn state() -> Data<State> {
        state_with_timeout(None)
    }

    fn state_with_timeout(seconds: Option<&str>) -> Data<State> {
        let config = Config::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://localhost:1/unreachable".to_owned()),
            "SWMS_ACTION_TIMEOUT_SECS" => seconds.map(str::to_owned),
            _ => None,
        })
        .unwrap();

        Data::new(State {
            pool: Pool::builder().build_unchecked(ConnectionManager::new(config.database_url.as_str())),
            exporter: FileExporter::new(std::env::temp_dir()),
            config,
        })
    }

    #[::core::prelude::v1::test]
    fn test_auth_token_missing() {
        let req = test::TestRequest::default().to_http_request();

        assert_eq!(auth_token(&req), None);
    }

    #[::core::prelude::v1::test]
    fn test_auth_token_exists() {
        let req = test::TestRequest::default()
            .insert_header(("authorization", "token"))
            .to_http_request();

        assert_eq!(auth_token(&req).as_deref(), Some("token"));
    }

    #[::core::prelude::v1::test]
    fn test_auth_token_bearer() {
        let req = test::TestRequest::default()
            .insert_header(("authorization", "Bearer 2a1b"))
            .to_http_request();

        assert_eq!(auth_token(&req).as_deref(), Some("2a1b"));
    }

    #[actix_web::test]
    async fn test_campaigns_unauthenticated() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .route("/api/swms/campaigns", web::post().to(campaigns)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/swms/campaigns")
            .set_payload(r#"{"action":"compliance-check"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::read_body_json(resp).await;

        assert_eq!(body, serde_json::json!({ "success": false, "error": "Unauthorized" }));
    }

    #[actix_web::test]
    async fn test_campaigns_connection_wait_times_out() {
        let app = test::init_service(
            App::new()
                .app_data(state_with_timeout(Some("1")))
                .route("/api/swms/campaigns", web::post().to(campaigns)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/swms/campaigns")
            .insert_header(("authorization", uuid::Uuid::new_v4().to_string()))
            .set_payload(r#"{"action":"compliance-check"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

        let body: Value = test::read_body_json(resp).await;

        assert_eq!(
            body,
            serde_json::json!({ "success": false, "error": "Action timed out after 1s" })
        );
    }

    #[actix_web::test]
    async fn test_graphql_unauthenticated() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .app_data(Data::new(crate::graphql::schema()))
                .route("/graphql", web::post().to(graphql)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/graphql")
            .set_json(serde_json::json!({ "query": "{ jobs { id } }" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::read_body_json(resp).await;

        assert_eq!(body["errors"][0]["message"], "Unauthorized");
    }

    #[actix_web::test]
    async fn test_health() {
        let resp = health().await;

        assert_eq!(resp.status(), StatusCode::OK);
    }
}
