//! The comparison report Lambda
//!
//! This library crate implements the single endpoint that turns a tariff
//! comparison into a stored PDF report. The front end POSTs the comparison;
//! we check that the caller is an administrator, have the rendering service
//! produce the PDF, put it in the documents bucket, and record a row pointing
//! at it. The same code is compiled into two executables:
//! `comparativa-report-lambda`, which speaks the API Gateway "proxy event"
//! protocol for the cloud deployment, and `comparativa-report-oneshot`, which
//! runs one request from the command line for local testing.
//!
//! The collaborators (identity provider, record store, object store,
//! renderer) are traits so that the pipeline in [`handler`] can be exercised
//! without any of them.

use anyhow::Context;
use aws_config::{retry::RetryConfig, BehaviorVersion};
use lambda_http::{Body, Error, Request, Response};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub mod auth;
pub mod config;
pub mod handler;
pub mod payload;
pub mod records;
pub mod renderer;
pub mod storage;

#[cfg(test)]
mod testing;

use config::Settings;
use handler::Handler;

pub struct Services {
    handler: Handler,
}

impl Services {
    /// Set up logging and build the live service clients from the environment.
    pub async fn init() -> Result<Self, Error> {
        init_logging()?;
        let settings = Settings::from_env()?;
        Self::from_settings(settings).await
    }

    pub async fn from_settings(settings: Settings) -> Result<Self, Error> {
        // Every collaborator call happens at most once per request, including
        // underneath the SDK.
        let config = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let ddb_config = match &settings.dynamodb_endpoint {
            Some(endpoint) => aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build(),
            None => aws_sdk_dynamodb::config::Builder::from(&config).build(),
        };

        let s3_config = match &settings.s3_endpoint {
            Some(endpoint) => aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build(),
            None => aws_sdk_s3::config::Builder::from(&config).build(),
        };

        let auth = auth::HttpAuthProvider::new(&settings.store_url, &settings.store_anon_key)?;
        let records = records::DynamoRecordStore::new(
            aws_sdk_dynamodb::Client::from_conf(ddb_config),
            &settings.users_table,
            &settings.comparisons_table,
        );
        let objects = storage::S3ObjectStore::new(aws_sdk_s3::Client::from_conf(s3_config));
        let renderer = renderer::HttpReportRenderer::new(settings.render_timeout)?;

        if settings.handler.renderer_target().is_err() {
            tracing::warn!("report service is not configured; report requests will fail");
        }

        let handler = Handler::new(
            Arc::new(auth),
            Arc::new(records),
            Arc::new(objects),
            Arc::new(renderer),
            settings.handler,
        );

        Ok(Services { handler })
    }

    /// Handle one invocation of the report endpoint.
    pub async fn handle(&self, request: Request) -> Response<Body> {
        self.handler.handle(request).await
    }
}

fn init_logging() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false) // don't print the module name
        .without_time() // don't print time (CloudWatch has it)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the tracing subscriber")?;

    // Dependencies that log through `log` end up in the same place.
    tracing_log::LogTracer::init().context("failed to install the log bridge")?;
    Ok(())
}
