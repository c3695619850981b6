//! Domain payloads accepted by the HTTP API and the documents built from them.
//!
//! Validation is deliberately permissive: declared fields are type-checked,
//! undeclared fields are dropped, and loosely typed fields (`medicationName`,
//! `summary`, ...) are carried as raw JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{CoreError, Result};
use crate::time::Timestamp;

/// Document field names shared by the repositories and the stores.
pub mod fields {
    pub const USER_ID: &str = "userId";
    pub const MEDICATION_ID: &str = "medicationId";
    pub const TIMESTAMP: &str = "timestamp";
    pub const START_DATE: &str = "startDate";
    pub const CREATED_AT: &str = "createdAt";
}

/// Id returned for dose records that are kept on the device only.
pub const LOCAL_ONLY_RECORD_ID: &str = "local-only";

/// Checks a decoded payload beyond what its type already guarantees.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Response language for AI routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }

    fn other(&self) -> Self {
        match self {
            Self::Zh => Self::En,
            Self::En => Self::Zh,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zh" => Ok(Self::Zh),
            "en" => Ok(Self::En),
            other => Err(CoreError::invalid_language(other)),
        }
    }
}

/// A name or instruction that is either plain text or a `{zh, en}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Localized {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zh: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        en: Option<String>,
    },
}

impl LocalizedText {
    /// Reads a loosely typed JSON value; anything else than a string or an
    /// object yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Text in `lang`, falling back to the other language.
    pub fn resolve(&self, lang: Language) -> Option<&str> {
        match self {
            Self::Plain(text) => Some(text.as_str()),
            Self::Localized { .. } => self.get(lang).or_else(|| self.get(lang.other())),
        }
    }

    fn get(&self, lang: Language) -> Option<&str> {
        match (self, lang) {
            (Self::Localized { zh: Some(t), .. }, Language::Zh) => Some(t.as_str()),
            (Self::Localized { en: Some(t), .. }, Language::En) => Some(t.as_str()),
            _ => None,
        }
    }
}

/// The user's three meal times as `HH:MM` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealTimes {
    #[serde(default = "default_breakfast")]
    pub breakfast: String,
    #[serde(default = "default_lunch")]
    pub lunch: String,
    #[serde(default = "default_dinner")]
    pub dinner: String,
}

fn default_breakfast() -> String {
    "08:00".into()
}
fn default_lunch() -> String {
    "12:00".into()
}
fn default_dinner() -> String {
    "18:00".into()
}

impl Default for MealTimes {
    fn default() -> Self {
        Self {
            breakfast: default_breakfast(),
            lunch: default_lunch(),
            dinner: default_dinner(),
        }
    }
}

/// `duration` is either a number of days or free text such as "2 weeks".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Number(Number),
    Text(String),
}

/// Body of `POST /api/medications` and `PUT /api/medications/:id`.
///
/// Every field is optional, so the same type serves creation and partial
/// updates; absent fields are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_instruction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_frequency: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_schedules: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_vitamin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage_inferred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_medication_window: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_medication_window_inferred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_instruction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_instruction_inferred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Value>,
    /// Accepted for compatibility; the server always assigns `createdAt`.
    #[serde(default, skip_serializing)]
    pub created_at: Option<Value>,
}

impl MedicationPayload {
    /// Builds the document for a new medication owned by `user_id`.
    pub fn into_new_document(self, user_id: &str, now: Timestamp) -> Result<Map<String, Value>> {
        let start_date = match &self.start_date {
            Some(value) => Timestamp::from_client_value(value)?,
            None => now,
        };
        let mut doc = to_object(&self)?;
        doc.insert(fields::USER_ID.into(), Value::String(user_id.to_string()));
        doc.insert(fields::START_DATE.into(), Value::String(start_date.to_stored()?));
        doc.insert(fields::CREATED_AT.into(), Value::String(now.to_stored()?));
        Ok(doc)
    }

    /// Builds the field set for a partial update; only present fields appear.
    pub fn into_update_fields(self, user_id: &str) -> Result<Map<String, Value>> {
        let start_date = self
            .start_date
            .as_ref()
            .map(Timestamp::from_client_value)
            .transpose()?;
        let mut doc = to_object(&self)?;
        if let Some(start_date) = start_date {
            doc.insert(fields::START_DATE.into(), Value::String(start_date.to_stored()?));
        }
        doc.insert(fields::USER_ID.into(), Value::String(user_id.to_string()));
        Ok(doc)
    }
}

impl Validate for MedicationPayload {
    fn validate(&self) -> Result<()> {
        if let Some(value) = &self.start_date {
            Timestamp::from_client_value(value)?;
        }
        Ok(())
    }
}

/// Body of `POST /api/medications/:id/records`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    pub time_slot: String,
    pub status: String,
    #[serde(default, skip_serializing)]
    pub timestamp: Option<Value>,
}

impl RecordPayload {
    /// Builds the dose record document for `medication_id`.
    pub fn into_document(
        self,
        user_id: &str,
        medication_id: &str,
        now: Timestamp,
    ) -> Result<Map<String, Value>> {
        let timestamp = match &self.timestamp {
            Some(value) => Timestamp::from_client_value(value)?,
            None => now,
        };
        let mut doc = to_object(&self)?;
        doc.insert(
            fields::MEDICATION_ID.into(),
            Value::String(medication_id.to_string()),
        );
        doc.insert(fields::USER_ID.into(), Value::String(user_id.to_string()));
        doc.insert(fields::TIMESTAMP.into(), Value::String(timestamp.to_stored()?));
        Ok(doc)
    }
}

impl Validate for RecordPayload {
    fn validate(&self) -> Result<()> {
        if let Some(value) = &self.timestamp {
            Timestamp::from_client_value(value)?;
        }
        Ok(())
    }
}

/// Partial meal times sent to `POST /api/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealTimesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakfast: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lunch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dinner: Option<String>,
}

/// Body of `POST /api/settings`; merged into the stored settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_times: Option<MealTimesPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notification: Option<Value>,
}

impl SettingsPayload {
    pub fn into_document(self) -> Result<Map<String, Value>> {
        to_object(&self)
    }
}

impl Validate for SettingsPayload {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Body of `POST /api/ai/text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub lang: Language,
}

impl Validate for TextPromptRequest {
    fn validate(&self) -> Result<()> {
        if self.prompt.is_empty() {
            return Err(CoreError::validation("prompt must not be empty"));
        }
        Ok(())
    }
}

/// Body of `POST /api/ai/analyze-image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisRequest {
    pub image_base64: String,
    #[serde(default)]
    pub lang: Language,
    #[serde(default)]
    pub meal_times: MealTimes,
    #[serde(default)]
    pub existing_meds: Vec<Value>,
}

impl Validate for ImageAnalysisRequest {
    fn validate(&self) -> Result<()> {
        if self.image_base64.len() < 10 {
            return Err(CoreError::validation(
                "imageBase64 must be at least 10 characters",
            ));
        }
        Ok(())
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::validation(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
