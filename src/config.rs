//! Runtime settings, read from the environment once per cold start.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use crate::renderer::RendererTarget;

pub const STORE_URL: &str = "STORE_URL";
pub const STORE_ANON_KEY: &str = "STORE_ANON_KEY";
pub const REPORT_SERVICE_URL: &str = "REPORT_SERVICE_URL";
pub const REPORT_INTERNAL_TOKEN: &str = "REPORT_INTERNAL_TOKEN";
pub const REPORT_BUCKET: &str = "REPORT_BUCKET";
pub const S3_ENDPOINT: &str = "S3_ENDPOINT";
pub const USERS_TABLE: &str = "USERS_TABLE";
pub const COMPARISONS_TABLE: &str = "COMPARISONS_TABLE";
pub const DYNAMODB_ENDPOINT: &str = "DYNAMODB_ENDPOINT";
pub const REPORT_RENDER_TIMEOUT_SECS: &str = "REPORT_RENDER_TIMEOUT_SECS";
pub const REPORT_UPLOAD_TIMEOUT_SECS: &str = "REPORT_UPLOAD_TIMEOUT_SECS";
pub const REPORT_HIDE_ERROR_DETAILS: &str = "REPORT_HIDE_ERROR_DETAILS";

const DEFAULT_BUCKET: &str = "documentos";
const DEFAULT_USERS_TABLE: &str = "usuarios_app";
const DEFAULT_COMPARISONS_TABLE: &str = "comparativas";
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

/// The part of the settings that the request handler itself looks at.
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub bucket: String,
    pub report_service_url: Option<String>,
    pub report_internal_token: Option<String>,
    pub upload_timeout: Duration,

    /// Whether 500 responses carry the error message and chain. On by
    /// default; see `REPORT_HIDE_ERROR_DETAILS`.
    pub expose_error_details: bool,
}

impl HandlerConfig {
    /// Resolve where to send the payload for rendering.
    ///
    /// The two secrets are checked per request rather than at startup, so that
    /// a half-configured deployment still answers preflights and auth failures
    /// normally.
    pub fn renderer_target(&self) -> Result<RendererTarget> {
        let base_url = self
            .report_service_url
            .clone()
            .ok_or_else(|| anyhow!("Missing renderer configuration: {REPORT_SERVICE_URL}"))?;
        let token = self
            .report_internal_token
            .clone()
            .ok_or_else(|| anyhow!("Missing renderer configuration: {REPORT_INTERNAL_TOKEN}"))?;
        Ok(RendererTarget { base_url, token })
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub store_url: String,
    pub store_anon_key: String,
    pub s3_endpoint: Option<String>,
    pub users_table: String,
    pub comparisons_table: String,
    pub dynamodb_endpoint: Option<String>,
    pub render_timeout: Duration,
    pub handler: HandlerConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &str| {
            get(name).ok_or_else(|| anyhow!("required environment variable {name} is not set"))
        };
        let secs = |name: &str, default: u64| -> Result<Duration> {
            match get(name) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{name} should be a whole number of seconds")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let handler = HandlerConfig {
            bucket: get(REPORT_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_owned()),
            report_service_url: get(REPORT_SERVICE_URL),
            report_internal_token: get(REPORT_INTERNAL_TOKEN),
            upload_timeout: secs(REPORT_UPLOAD_TIMEOUT_SECS, DEFAULT_UPLOAD_TIMEOUT_SECS)?,
            expose_error_details: !get(REPORT_HIDE_ERROR_DETAILS)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        };

        Ok(Settings {
            store_url: require(STORE_URL)?,
            store_anon_key: require(STORE_ANON_KEY)?,
            s3_endpoint: get(S3_ENDPOINT),
            users_table: get(USERS_TABLE).unwrap_or_else(|| DEFAULT_USERS_TABLE.to_owned()),
            comparisons_table: get(COMPARISONS_TABLE)
                .unwrap_or_else(|| DEFAULT_COMPARISONS_TABLE.to_owned()),
            dynamodb_endpoint: get(DYNAMODB_ENDPOINT),
            render_timeout: secs(REPORT_RENDER_TIMEOUT_SECS, DEFAULT_RENDER_TIMEOUT_SECS)?,
            handler,
        })
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        (STORE_URL, "https://store.example.com"),
        (STORE_ANON_KEY, "anon"),
    ];

    #[test]
    fn defaults() {
        let s = settings(BASE).unwrap();
        assert_eq!(s.handler.bucket, "documentos");
        assert_eq!(s.users_table, "usuarios_app");
        assert_eq!(s.comparisons_table, "comparativas");
        assert_eq!(s.render_timeout, Duration::from_secs(60));
        assert_eq!(s.handler.upload_timeout, Duration::from_secs(30));
        assert!(s.handler.expose_error_details);
        assert!(s.s3_endpoint.is_none());
        assert!(s.dynamodb_endpoint.is_none());
    }

    #[test]
    fn store_settings_are_required() {
        let err = settings(&[(STORE_URL, "https://store.example.com")]).unwrap_err();
        assert!(err.to_string().contains(STORE_ANON_KEY));

        let err = settings(&[(STORE_URL, "  "), (STORE_ANON_KEY, "anon")]).unwrap_err();
        assert!(err.to_string().contains(STORE_URL));
    }

    #[test]
    fn overrides() {
        let mut vars = BASE.to_vec();
        vars.extend_from_slice(&[
            (REPORT_BUCKET, "otro"),
            (REPORT_UPLOAD_TIMEOUT_SECS, " 5 "),
            (REPORT_RENDER_TIMEOUT_SECS, "90"),
            (REPORT_HIDE_ERROR_DETAILS, "TRUE"),
            (S3_ENDPOINT, "http://localhost:9000"),
        ]);
        let s = settings(&vars).unwrap();
        assert_eq!(s.handler.bucket, "otro");
        assert_eq!(s.handler.upload_timeout, Duration::from_secs(5));
        assert_eq!(s.render_timeout, Duration::from_secs(90));
        assert!(!s.handler.expose_error_details);
        assert_eq!(s.s3_endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn bad_timeout() {
        let mut vars = BASE.to_vec();
        vars.push((REPORT_RENDER_TIMEOUT_SECS, "soon"));
        let err = settings(&vars).unwrap_err();
        assert!(err.to_string().contains(REPORT_RENDER_TIMEOUT_SECS));
    }

    #[test]
    fn renderer_target_needs_both_secrets() {
        let mut vars = BASE.to_vec();
        vars.push((REPORT_SERVICE_URL, "https://pdf.example.com"));
        let s = settings(&vars).unwrap();
        let err = s.handler.renderer_target().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Missing renderer configuration: {REPORT_INTERNAL_TOKEN}")
        );

        vars.push((REPORT_INTERNAL_TOKEN, "s3cret"));
        let target = settings(&vars).unwrap().handler.renderer_target().unwrap();
        assert_eq!(target.base_url, "https://pdf.example.com");
        assert_eq!(target.token, "s3cret");
    }
}
