//! The report request pipeline.
//!
//! Each request goes straight down the line: method check, authentication,
//! authorization, configuration check, render, upload, insert. Any failure
//! ends the request with one error response; nothing is retried. The only
//! cleanup is deleting the uploaded PDF if the metadata insert fails, and
//! that is best effort.

use anyhow::{anyhow, Context};
use lambda_http::http::{
    header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use lambda_http::{Body, Request, Response};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    auth::{bearer_token, AuthProvider, AuthenticatedUser},
    config::HandlerConfig,
    payload::ComparisonPayload,
    records::{NewComparison, RecordStore},
    renderer::ReportRenderer,
    storage::{report_path, ObjectStore},
};

/// The only role allowed to generate reports.
pub const ADMIN_ROLE: &str = "administrador";

pub const REPORT_CONTENT_TYPE: &str = "application/pdf";

const CORS_ALLOW_HEADERS: &str =
    "authorization, x-client-info, apikey, content-type, x-openenergies-app";

const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred...";

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Authentication required.")]
    Unauthenticated,

    #[error("Forbidden: Only administrators can perform this action.")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            HandlerError::Forbidden => StatusCode::FORBIDDEN,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A report that made it all the way into storage and the database.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredReport {
    pub comparison_id: String,
    pub file_path: String,
}

pub struct Handler {
    auth: Arc<dyn AuthProvider>,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<dyn ReportRenderer>,
    config: HandlerConfig,
}

impl Handler {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn ReportRenderer>,
        config: HandlerConfig,
    ) -> Self {
        Handler {
            auth,
            records,
            objects,
            renderer,
            config,
        }
    }

    /// Handle one request. Never fails: every outcome is a response.
    pub async fn handle(&self, request: Request) -> Response<Body> {
        if request.method() == Method::OPTIONS {
            return preflight();
        }

        match self.process(&request).await {
            Ok(report) => {
                info!(
                    "stored comparison {} at {}",
                    report.comparison_id, report.file_path
                );
                json_response(
                    StatusCode::OK,
                    json!({
                        "success": true,
                        "comparisonId": report.comparison_id,
                        "filePath": report.file_path,
                    }),
                )
            }
            Err(e) => self.error_response(e),
        }
    }

    async fn process(&self, request: &Request) -> Result<StoredReport, HandlerError> {
        if request.method() != Method::POST {
            return Err(HandlerError::MethodNotAllowed);
        }

        let user = self.authenticate(request).await?;
        self.authorize(&user).await?;

        let target = self.config.renderer_target()?;

        let body = body_bytes(request.body())?;
        let payload: ComparisonPayload =
            serde_json::from_slice(body).context("invalid comparison payload")?;
        payload.validate_periods()?;

        info!(
            "rendering {:?} comparison for user {} (cliente={:?}, punto={:?})",
            payload.tarifa, user.id, payload.cliente_id, payload.punto_id
        );

        // The rendering service gets exactly what we were sent.
        let pdf = self.renderer.render(&target, body).await?;

        self.store(&user, &payload, pdf).await
    }

    async fn authenticate(&self, request: &Request) -> Result<AuthenticatedUser, HandlerError> {
        let token = bearer_token(request.headers()).ok_or(HandlerError::Unauthenticated)?;

        match self.auth.user_from_token(token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(HandlerError::Unauthenticated),
            Err(e) => {
                warn!("identity exchange failed: {:#}", e);
                Err(HandlerError::Unauthenticated)
            }
        }
    }

    async fn authorize(&self, user: &AuthenticatedUser) -> Result<(), HandlerError> {
        match self.records.user_role(&user.id).await {
            Ok(Some(role)) if role == ADMIN_ROLE => Ok(()),
            Ok(role) => {
                info!(
                    "user {} ({}) with role {:?} refused",
                    user.id,
                    user.email.as_deref().unwrap_or("no email"),
                    role
                );
                Err(HandlerError::Forbidden)
            }
            Err(e) => {
                warn!("role lookup for user {} failed: {:#}", user.id, e);
                Err(HandlerError::Forbidden)
            }
        }
    }

    async fn store(
        &self,
        user: &AuthenticatedUser,
        payload: &ComparisonPayload,
        pdf: Vec<u8>,
    ) -> Result<StoredReport, HandlerError> {
        let bucket = &self.config.bucket;
        let file_path = report_path(&user.id);

        tokio::time::timeout(
            self.config.upload_timeout,
            self.objects.upload(bucket, &file_path, pdf, REPORT_CONTENT_TYPE),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "upload of {} timed out after {:?}",
                file_path,
                self.config.upload_timeout
            )
        })??;

        let row = NewComparison {
            creado_por_user_id: user.id.clone(),
            cliente_id: payload.cliente_id.clone(),
            punto_id: payload.punto_id.clone(),
            prospecto_nombre: payload.prospect_name().map(str::to_owned),
            ruta_pdf: file_path.clone(),
        };

        match self.records.insert_comparison(&row).await {
            Ok(comparison_id) => Ok(StoredReport {
                comparison_id,
                file_path,
            }),

            Err(e) => {
                // Don't leave an unreferenced PDF behind. If this fails too,
                // the insert error is still the one we report.
                if let Err(cleanup) = self
                    .objects
                    .delete(bucket, std::slice::from_ref(&file_path))
                    .await
                {
                    error!("failed to remove orphaned {}: {:#}", file_path, cleanup);
                }

                Err(e.context("failed to record comparison metadata").into())
            }
        }
    }

    fn error_response(&self, e: HandlerError) -> Response<Body> {
        let status = e.status();

        match e {
            HandlerError::MethodNotAllowed => {
                let mut resp = Response::new(Body::from("Method Not Allowed"));
                *resp.status_mut() = status;
                let h = resp.headers_mut();
                h.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
                resp
            }

            HandlerError::Internal(inner) => {
                error!("request failed: {:?}", inner);

                let body = if self.config.expose_error_details {
                    json!({
                        "error": INTERNAL_ERROR_MESSAGE,
                        "details": format!("{:#}", inner),
                        "stack": format!("{:?}", inner),
                    })
                } else {
                    json!({ "error": INTERNAL_ERROR_MESSAGE })
                };

                json_response(status, body)
            }

            other => json_response(status, json!({ "error": other.to_string() })),
        }
    }
}

fn body_bytes(body: &Body) -> anyhow::Result<&[u8]> {
    match body {
        Body::Text(s) => Ok(s.as_bytes()),
        Body::Binary(b) => Ok(b.as_slice()),
        Body::Empty => Err(anyhow!("Expected a request body.")),
    }
}

fn preflight() -> Response<Body> {
    let mut resp = Response::new(Body::from("ok"));
    let h = resp.headers_mut();
    h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    h.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    resp
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    let h = resp.headers_mut();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}
