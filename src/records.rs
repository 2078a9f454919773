//! User profiles and comparison metadata in DynamoDB.
//!
//! Two tables: the users table maps a `user_id` to its profile (we only care
//! about `rol`), and the comparisons table gets one item per generated
//! report, keyed by a fresh UUID.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// The metadata row written after a report has been stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewComparison {
    pub creado_por_user_id: String,
    pub cliente_id: Option<String>,
    pub punto_id: Option<String>,
    pub prospecto_nombre: Option<String>,
    pub ruta_pdf: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The `rol` of the user's profile, or `None` if there is no profile.
    async fn user_role(&self, user_id: &str) -> Result<Option<String>>;

    /// Insert a comparison row and return its id.
    async fn insert_comparison(&self, row: &NewComparison) -> Result<String>;
}

#[derive(Deserialize)]
struct UserProfile {
    rol: Option<String>,
}

#[derive(Serialize)]
struct ComparisonItem<'a> {
    id: &'a str,
    creado_por_user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cliente_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    punto_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prospecto_nombre: Option<&'a str>,
    ruta_pdf: &'a str,
    creado_en: u64,
}

fn comparison_item(id: &str, row: &NewComparison, now: u64) -> Result<HashMap<String, AttributeValue>> {
    let item = ComparisonItem {
        id,
        creado_por_user_id: &row.creado_por_user_id,
        cliente_id: row.cliente_id.as_deref(),
        punto_id: row.punto_id.as_deref(),
        prospecto_nombre: row.prospecto_nombre.as_deref(),
        ruta_pdf: &row.ruta_pdf,
        creado_en: now,
    };
    Ok(serde_dynamo::to_item(item)?)
}

#[derive(Clone, Debug)]
pub struct DynamoRecordStore {
    client: aws_sdk_dynamodb::Client,
    users_table: String,
    comparisons_table: String,
}

impl DynamoRecordStore {
    pub fn new(client: aws_sdk_dynamodb::Client, users_table: &str, comparisons_table: &str) -> Self {
        DynamoRecordStore {
            client,
            users_table: users_table.to_owned(),
            comparisons_table: comparisons_table.to_owned(),
        }
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn user_role(&self, user_id: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.users_table)
            .key("user_id", AttributeValue::S(user_id.to_owned()))
            .projection_expression("rol")
            .consistent_read(true)
            .send()
            .await
            .with_context(|| format!("failed to look up profile of user `{user_id}`"))?;

        let Some(item) = result.item else {
            return Ok(None);
        };

        let profile: UserProfile = serde_dynamo::from_item(item)
            .with_context(|| format!("malformed profile for user `{user_id}`"))?;
        Ok(profile.rol)
    }

    async fn insert_comparison(&self, row: &NewComparison) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.client
            .put_item()
            .table_name(&self.comparisons_table)
            .set_item(Some(comparison_item(&id, row, now)?))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .with_context(|| format!("failed to insert comparison `{id}`"))?;

        Ok(id)
    }
}
