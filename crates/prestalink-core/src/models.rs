//! Domain records shared by the importer, the stores and the stock rules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Local id of a row owned by the ERP store.
pub type LocalId = i64;

/// Id of a configured PrestaShop backend; scopes every binding.
pub type BackendId = i64;

/// Identifier of an entity on the remote shop.
///
/// PrestaShop ids are integers but the webservice often serializes them as
/// strings, so both are accepted when reading a [`RemoteRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub i64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(RemoteId)
            .map_err(|e| AppError::InvalidField {
                field: "id".to_string(),
                reason: format!("`{}` is not a remote id: {}", s, e),
            })
    }
}

/// Local entity types the connector binds to remote ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "product.template")]
    ProductTemplate,
    #[serde(rename = "product.image")]
    ProductImage,
    #[serde(rename = "sale.order")]
    SaleOrder,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::ProductTemplate => "product.template",
            Model::ProductImage => "product.image",
            Model::SaleOrder => "sale.order",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product.template" => Ok(Model::ProductTemplate),
            "product.image" => Ok(Model::ProductImage),
            "sale.order" => Ok(Model::SaleOrder),
            other => Err(AppError::Generic(format!("Unknown model: {}", other))),
        }
    }
}

/// How imported images are stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageImportType {
    /// Keep only the public URL of the image.
    #[default]
    Url,
    /// Download the image and store the binary in the database.
    Db,
}

impl ImageImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageImportType::Url => "url",
            ImageImportType::Db => "db",
        }
    }
}

/// Backend configuration record handed to mappers and importers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub id: BackendId,
    pub name: String,
    /// Base URL of the shop, e.g. `https://shop.example.com`.
    pub location: String,
    pub import_image_type: ImageImportType,
    pub resize_images: bool,
}

/// Raw entity fetched from the remote shop.
///
/// Ephemeral: only lives for the duration of one import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(Map<String, Value>);

impl RemoteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for adapters and tests.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a required string field.
    pub fn str_field(&self, key: &str) -> Result<&str, AppError> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(AppError::InvalidField {
                field: key.to_string(),
                reason: format!("expected a string, got {}", other),
            }),
            None => Err(AppError::MissingField(key.to_string())),
        }
    }

    /// Returns a required id field, accepting numbers and numeric strings.
    pub fn remote_id(&self, key: &str) -> Result<RemoteId, AppError> {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_i64().map(RemoteId).ok_or_else(|| {
                AppError::InvalidField {
                    field: key.to_string(),
                    reason: format!("{} is not an integer id", n),
                }
            }),
            Some(Value::String(s)) => s.parse::<RemoteId>().map_err(|_| AppError::InvalidField {
                field: key.to_string(),
                reason: format!("`{}` is not an integer id", s),
            }),
            Some(other) => Err(AppError::InvalidField {
                field: key.to_string(),
                reason: format!("expected an id, got {}", other),
            }),
            None => Err(AppError::MissingField(key.to_string())),
        }
    }
}

impl From<Map<String, Value>> for RemoteRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Value of a single local field produced by a mapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(bytes: Vec<u8>) -> Self {
        FieldValue::Bytes(bytes)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Partial or complete set of local field values.
pub type FieldSet = BTreeMap<String, FieldValue>;

/// Persistent association between a remote id and a local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub id: LocalId,
    pub backend_id: BackendId,
    pub model: Model,
    pub remote_id: RemoteId,
    pub local_id: LocalId,
}

/// The slice of a local record the connector reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub model: Model,
    pub id: LocalId,
    pub name: String,
}

impl LocalRecord {
    pub fn record_ref(&self) -> RecordRef {
        RecordRef {
            model: self.model,
            id: self.id,
        }
    }
}

/// Pointer to a local record, used to link checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub model: Model,
    pub id: LocalId,
}

/// Item needing human attention after a failed import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: LocalId,
    pub backend_id: BackendId,
    pub record: Option<RecordRef>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Result of persisting a mapped record together with its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(LocalId),
    Updated(LocalId),
}

impl UpsertOutcome {
    pub fn local_id(&self) -> LocalId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}
