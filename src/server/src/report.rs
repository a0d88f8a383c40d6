//! Report generation for the `generate-report` action.
//!
//! The [`ReportExporter`] trait is the seam to whatever produces the report
//! document. The server uses a [`FileExporter`], which writes a JSON document
//! into the report directory. That directory is served under `/reports`.

use crate::command::{ReportKind, Scope};
use crate::orchestrator::compliance_counts;
use crate::store::{Store, StoreError, SubmissionFilter};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::fs;
use std::io;
use std::path::PathBuf;
use swms_core::OverdueThreshold;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// The URL path under which the report directory is served.
pub(crate) const REPORTS_PATH: &str = "/reports";

#[derive(Debug, Error)]
pub(crate) enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unable to write report: {0}")]
    Io(#[from] io::Error),

    #[error("unable to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// What to put in a report.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ReportRequest<'a> {
    pub(crate) kind: ReportKind,
    pub(crate) scope: Scope,
    pub(crate) requested_by: &'a str,
    pub(crate) now: DateTime<Utc>,
    pub(crate) threshold: OverdueThreshold,
}

/// Where to fetch a generated report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ReportHandle {
    pub(crate) download_url: String,
}

pub(crate) trait ReportExporter {
    fn export<S: Store>(
        &self,
        store: &mut S,
        request: &ReportRequest<'_>,
    ) -> Result<ReportHandle, ExportError>;
}

/// Writes reports as JSON documents into a directory.
#[derive(Clone, Debug)]
pub(crate) struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub(crate) fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl ReportExporter for FileExporter {
    fn export<S: Store>(
        &self,
        store: &mut S,
        request: &ReportRequest<'_>,
    ) -> Result<ReportHandle, ExportError> {
        let site = request.scope.job_site_id;

        let body = match request.kind {
            ReportKind::Compliance => {
                let counts = compliance_counts(store, site, request.now, request.threshold)?;
                json!({ "counts": counts, "compliance_rate": counts.compliance_rate() })
            }
            ReportKind::Submissions => {
                let filter = SubmissionFilter::default()
                    .at_site(site)
                    .for_job(request.scope.swms_job_id)
                    .for_contractor(request.scope.contractor_id);

                json!({ "submissions": store.submissions(&filter)? })
            }
        };

        let document = json!({
            "report_type": request.kind.as_str(),
            "generated_at": request.now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "generated_by": request.requested_by,
            "scope": request.scope,
            "report": body,
        });

        let name = format!(
            "{}-{}-{}.json",
            request.kind.as_str(),
            request.now.format("%Y%m%dT%H%M%SZ"),
            Uuid::new_v4().simple()
        );

        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(&name), serde_json::to_vec_pretty(&document)?)?;

        info!(report = %name, "report written");

        Ok(ReportHandle {
            download_url: format!("{}/{}", REPORTS_PATH, name),
        })
    }
}
