pub mod error;
pub mod id;
pub mod model;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use id::{IdError, generate_id, validate_id};
pub use model::{
    DurationValue, ImageAnalysisRequest, LOCAL_ONLY_RECORD_ID, Language, LocalizedText,
    MealTimes, MealTimesPatch, MedicationPayload, RecordPayload, SettingsPayload,
    TextPromptRequest, Validate, fields,
};
pub use time::{Timestamp, from_unix_millis, now_utc};
