// Document id handling
use thiserror::Error;

const MAX_ID_BYTES: usize = 1500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("document id must not be empty")]
    Empty,
    #[error("document id must not contain '/'")]
    ContainsSlash,
    #[error("document id '{0}' is reserved")]
    Reserved(String),
    #[error("document id exceeds {MAX_ID_BYTES} bytes")]
    TooLong,
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Rejects ids that cannot name a single document segment.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.contains('/') {
        return Err(IdError::ContainsSlash);
    }
    if id == "." || id == ".." || (id.starts_with("__") && id.ends_with("__")) {
        return Err(IdError::Reserved(id.to_string()));
    }
    if id.len() > MAX_ID_BYTES {
        return Err(IdError::TooLong);
    }
    Ok(())
}
