use crate::config::{Config, WorkflowSettings};
use crate::graphql;
use crate::handlers;
use crate::models::Actor;
use crate::report::{FileExporter, REPORTS_PATH};
use crate::store::{PgStore, StoreError};
use crate::MIGRATIONS;
use actix_files::Files;
use actix_web::error::BlockingError;
use actix_web::{
    http::{header, StatusCode},
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, ResponseError,
};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use diesel_migrations::MigrationHarness;
use juniper::FieldResult;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
use serde_json::json;
use std::error;
use std::fs;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::info;

/// The context of a single GraphQL request.
pub(crate) struct RequestState {
    store: Mutex<PgStore>,

    /// The authenticated user making the request. Unauthenticated requests
    /// never get this far.
    pub(crate) actor: Actor,

    pub(crate) settings: WorkflowSettings,
}

impl juniper::Context for RequestState {}

impl RequestState {
    pub(crate) fn new(store: PgStore, actor: Actor, settings: WorkflowSettings) -> Self {
        Self {
            store: Mutex::new(store),
            actor,
            settings,
        }
    }

    /// Exclusive access to the store of this request.
    pub(crate) fn store(&self) -> FieldResult<MutexGuard<'_, PgStore>> {
        self.store
            .lock()
            .map_err(|_| "store unavailable after an earlier failure".into())
    }
}

#[derive(Debug, Error)]
pub(crate) enum ServerError {
    #[error("Unauthorized")]
    Authentication,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication => StatusCode::UNAUTHORIZED,
            ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(json!({ "errors": [{ "message": self.to_string() }] }))
    }
}

impl From<BlockingError> for ServerError {
    fn from(err: BlockingError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<PoolError> for ServerError {
    fn from(err: PoolError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

pub(crate) type DatabasePool = Pool<ConnectionManager<PgConnection>>;

pub(crate) struct State {
    pub(crate) pool: DatabasePool,
    pub(crate) config: Config,
    pub(crate) exporter: FileExporter,
}

pub(crate) struct Server {
    state: State,
}

impl Server {
    pub(crate) fn from_environment() -> Result<Self, Box<dyn error::Error>> {
        let config = Config::from_environment()?;
        let pool = Pool::builder().build(ConnectionManager::new(config.database_url.as_str()))?;

        run_migrations(&pool)?;
        fs::create_dir_all(&config.report_dir)?;

        Ok(Self {
            state: State {
                pool,
                exporter: FileExporter::new(config.report_dir.clone()),
                config,
            },
        })
    }

    pub(crate) fn run_to_completion(self) -> Result<(), Box<dyn error::Error>> {
        actix_web::rt::System::new().block_on(self.serve())
    }

    async fn serve(self) -> Result<(), Box<dyn error::Error>> {
        let bind = self.state.config.bind.clone();
        let tls = self.state.config.tls.clone();
        let root = self.state.config.root.clone();
        let reports = self.state.exporter.dir().clone();

        let schema = web::Data::new(graphql::schema());
        let state = web::Data::new(self.state);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .wrap(Compress::default())
                .wrap(
                    DefaultHeaders::new()
                        .add((header::CACHE_CONTROL, "max-age=43200, must-revalidate"))
                        .add((header::VARY, "Accept-Encoding, Accept, Accept-Language")),
                )
                .app_data(state.clone())
                .app_data(schema.clone())
                .route("/api/swms/campaigns", web::post().to(handlers::campaigns))
                .route("/graphql/playground", web::get().to(handlers::playground))
                .route("/graphql/graphiql", web::get().to(handlers::graphiql))
                .route("/graphql", web::post().to(handlers::graphql))
                .route("/health", web::get().to(handlers::health))
                .service(Files::new(REPORTS_PATH, reports.clone()))
                .service(Files::new("/", root.clone()).index_file("index.html"))
        });

        let server = if let Some(tls) = tls {
            let mut builder = SslAcceptor::mozilla_modern_v5(SslMethod::tls())?;

            builder.set_private_key_file(&tls.key_path, SslFiletype::PEM)?;
            builder.set_certificate_chain_file(&tls.chain_path)?;

            server.bind_openssl(&bind, builder)
        } else {
            server.bind(&bind)
        }?;

        info!(%bind, "server listening");

        server.run().await.map_err(Into::into)
    }
}

/// Bring the database schema up to date.
pub(crate) fn run_migrations(pool: &DatabasePool) -> Result<(), Box<dyn error::Error>> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| err.to_string())?;

    for version in applied {
        info!(%version, "migration applied");
    }

    Ok(())
}

/// Run the pending migrations and exit.
pub(crate) fn migrate() -> Result<(), Box<dyn error::Error>> {
    let config = Config::from_environment()?;
    let pool = Pool::builder()
        .max_size(1)
        .build(ConnectionManager::new(config.database_url.as_str()))?;

    run_migrations(&pool)
}
