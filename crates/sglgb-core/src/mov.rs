//! # MOV Metadata
//!
//! Means of Verification. The file bytes live in an external object store
//! (uploads go through signed URLs); the engine only tracks metadata and
//! checks it against the owning `file_upload` field.

use crate::form_schema::{FormField, FormSchema, check_file};
use crate::{IndicatorId, MovId, PortalError, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovFile {
    pub id: MovId,
    pub indicator_id: IndicatorId,
    /// The `file_upload` field this file satisfies.
    pub field_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// Object-store key returned by the upload step.
    pub storage_key: String,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
}

/// Upload notification sent by the client after the object store accepted the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMov {
    pub indicator_id: IndicatorId,
    pub field_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_key: String,
}

impl NewMov {
    /// Validate against the indicator's form and the global size ceiling.
    pub fn check(&self, form: &FormSchema, max_bytes: u64) -> Result<(), PortalError> {
        if self.file_name.trim().is_empty() || self.storage_key.trim().is_empty() {
            return Err(PortalError::InvalidSchema(
                "file_name and storage_key are required".to_string(),
            ));
        }
        let field = match form.field(&self.field_id) {
            Some(FormField::FileUpload(f)) => f,
            Some(other) => {
                return Err(PortalError::InvalidSchema(format!(
                    "field '{}' is a {}, not a file_upload",
                    self.field_id,
                    other.type_name()
                )));
            }
            None => {
                return Err(PortalError::InvalidSchema(format!(
                    "unknown field '{}'",
                    self.field_id
                )));
            }
        };
        if self.size_bytes > max_bytes {
            return Err(PortalError::InvalidSchema(format!(
                "'{}' is {} bytes; the portal accepts at most {}",
                self.file_name, self.size_bytes, max_bytes
            )));
        }
        match check_file(field, &self.file_name, self.size_bytes) {
            Some(error) => Err(PortalError::InvalidResponse(vec![error])),
            None => Ok(()),
        }
    }

    /// Attach identity and timestamp.
    #[must_use]
    pub fn into_file(self, id: MovId, uploaded_by: UserId, uploaded_at: DateTime<Utc>) -> MovFile {
        MovFile {
            id,
            indicator_id: self.indicator_id,
            field_id: self.field_id,
            file_name: self.file_name,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            storage_key: self.storage_key,
            uploaded_by,
            uploaded_at,
        }
    }
}
