//! # Form Schema
//!
//! Dynamic per-indicator forms. A [`FormSchema`] is an ordered list of
//! [`FormField`]s, a discriminated union tagged by `field_type`:
//!
//! ```json
//! { "fields": [
//!     { "field_type": "number_input", "field_id": "budget_pct",
//!       "label": "Budget utilization (%)", "required": true,
//!       "min_value": 0, "max_value": 100 },
//!     { "field_type": "file_upload", "field_id": "resolution",
//!       "label": "Signed resolution", "required": true,
//!       "allowed_file_types": ["pdf"] }
//! ] }
//! ```
//!
//! The schema is edited as a list (add, remove, drag-and-drop move,
//! duplicate) and linted with [`FormSchema::validate`]. Submitted values are
//! checked with [`FormSchema::validate_response`], which reports every
//! offending field rather than stopping at the first.

use crate::mov::MovFile;
use crate::primitives::{MAX_FIELD_ID_LENGTH, MAX_FORM_FIELDS, MAX_TEXT_RESPONSE_LENGTH};
use crate::PortalError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Submitted values for one indicator, keyed by `field_id`.
pub type ResponseData = BTreeMap<String, Value>;

/// Wire format for date values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// FIELD DEFINITIONS
// =============================================================================

/// One selectable option of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

impl FieldOption {
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Single-line or multi-line text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextField {
    pub field_id: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// Numeric input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberField {
    pub field_id: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default = "default_true")]
    pub allow_decimal: bool,
}

/// Checkbox group, radio buttons, or dropdown.
///
/// `min_selections` / `max_selections` only apply to checkbox groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceField {
    pub field_id: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<usize>,
}

/// Calendar date in `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateField {
    pub field_id: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<NaiveDate>,
}

/// MOV upload slot. Values are satisfied by attached [`MovFile`]s, not by
/// entries in the response data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileField {
    pub field_id: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    /// Lowercase extensions without the dot. Empty means any type.
    #[serde(default)]
    pub allowed_file_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
}

fn default_true() -> bool {
    true
}

/// A form field, tagged by `field_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field_type", rename_all = "snake_case")]
pub enum FormField {
    TextInput(TextField),
    TextArea(TextField),
    NumberInput(NumberField),
    CheckboxGroup(ChoiceField),
    RadioButton(ChoiceField),
    Dropdown(ChoiceField),
    DatePicker(DateField),
    FileUpload(FileField),
}

/// Coarse value kind of a field, used for calculation-rule compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    MultiChoice,
    SingleChoice,
    Date,
    File,
}

impl FormField {
    #[must_use]
    pub fn field_id(&self) -> &str {
        match self {
            FormField::TextInput(f) | FormField::TextArea(f) => &f.field_id,
            FormField::NumberInput(f) => &f.field_id,
            FormField::CheckboxGroup(f) | FormField::RadioButton(f) | FormField::Dropdown(f) => {
                &f.field_id
            }
            FormField::DatePicker(f) => &f.field_id,
            FormField::FileUpload(f) => &f.field_id,
        }
    }

    fn field_id_mut(&mut self) -> &mut String {
        match self {
            FormField::TextInput(f) | FormField::TextArea(f) => &mut f.field_id,
            FormField::NumberInput(f) => &mut f.field_id,
            FormField::CheckboxGroup(f) | FormField::RadioButton(f) | FormField::Dropdown(f) => {
                &mut f.field_id
            }
            FormField::DatePicker(f) => &mut f.field_id,
            FormField::FileUpload(f) => &mut f.field_id,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            FormField::TextInput(f) | FormField::TextArea(f) => &f.label,
            FormField::NumberInput(f) => &f.label,
            FormField::CheckboxGroup(f) | FormField::RadioButton(f) | FormField::Dropdown(f) => {
                &f.label
            }
            FormField::DatePicker(f) => &f.label,
            FormField::FileUpload(f) => &f.label,
        }
    }

    fn label_mut(&mut self) -> &mut String {
        match self {
            FormField::TextInput(f) | FormField::TextArea(f) => &mut f.label,
            FormField::NumberInput(f) => &mut f.label,
            FormField::CheckboxGroup(f) | FormField::RadioButton(f) | FormField::Dropdown(f) => {
                &mut f.label
            }
            FormField::DatePicker(f) => &mut f.label,
            FormField::FileUpload(f) => &mut f.label,
        }
    }

    #[must_use]
    pub fn required(&self) -> bool {
        match self {
            FormField::TextInput(f) | FormField::TextArea(f) => f.required,
            FormField::NumberInput(f) => f.required,
            FormField::CheckboxGroup(f) | FormField::RadioButton(f) | FormField::Dropdown(f) => {
                f.required
            }
            FormField::DatePicker(f) => f.required,
            FormField::FileUpload(f) => f.required,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            FormField::TextInput(_) | FormField::TextArea(_) => FieldKind::Text,
            FormField::NumberInput(_) => FieldKind::Number,
            FormField::CheckboxGroup(_) => FieldKind::MultiChoice,
            FormField::RadioButton(_) | FormField::Dropdown(_) => FieldKind::SingleChoice,
            FormField::DatePicker(_) => FieldKind::Date,
            FormField::FileUpload(_) => FieldKind::File,
        }
    }

    /// The `field_type` tag as it appears on the wire.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            FormField::TextInput(_) => "text_input",
            FormField::TextArea(_) => "text_area",
            FormField::NumberInput(_) => "number_input",
            FormField::CheckboxGroup(_) => "checkbox_group",
            FormField::RadioButton(_) => "radio_button",
            FormField::Dropdown(_) => "dropdown",
            FormField::DatePicker(_) => "date_picker",
            FormField::FileUpload(_) => "file_upload",
        }
    }
}

// =============================================================================
// VALIDATION RESULTS
// =============================================================================

/// Why a submitted value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    UnknownField,
    Required,
    WrongType,
    TooShort,
    TooLong,
    BelowMinimum,
    AboveMaximum,
    DecimalNotAllowed,
    InvalidOption,
    TooFewSelections,
    TooManySelections,
    InvalidDate,
    DateOutOfRange,
    FileTypeNotAllowed,
    FileTooLarge,
    TooManyFiles,
}

/// A rejected field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field_id: String,
    pub code: FieldErrorCode,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field_id: impl Into<String>, code: FieldErrorCode, message: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            code,
            message: message.into(),
        }
    }
}

/// A problem found while linting a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    pub field_id: Option<String>,
    pub message: String,
}

impl SchemaIssue {
    fn field(field_id: &str, message: impl Into<String>) -> Self {
        Self {
            field_id: Some(field_id.to_string()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field_id {
            Some(id) => write!(f, "{}: {}", id, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// How many required fields a response fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub required_total: usize,
    pub required_filled: usize,
    pub complete: bool,
}

// =============================================================================
// FORM SCHEMA
// =============================================================================

/// Ordered list of fields describing one indicator's form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl FormSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fields(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, field_id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.field_id() == field_id)
    }

    fn position(&self, field_id: &str) -> Result<usize, PortalError> {
        self.fields
            .iter()
            .position(|f| f.field_id() == field_id)
            .ok_or_else(|| PortalError::InvalidSchema(format!("unknown field '{}'", field_id)))
    }

    // -------------------------------------------------------------------------
    // List editor
    // -------------------------------------------------------------------------

    /// Append a field. Rejects duplicate ids.
    pub fn add_field(&mut self, field: FormField) -> Result<(), PortalError> {
        if self.fields.len() >= MAX_FORM_FIELDS {
            return Err(PortalError::InvalidSchema(format!(
                "form exceeds {} fields",
                MAX_FORM_FIELDS
            )));
        }
        if self.field(field.field_id()).is_some() {
            return Err(PortalError::InvalidSchema(format!(
                "duplicate field id '{}'",
                field.field_id()
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Remove a field by id and return it.
    pub fn remove_field(&mut self, field_id: &str) -> Result<FormField, PortalError> {
        let index = self.position(field_id)?;
        Ok(self.fields.remove(index))
    }

    /// Drag-and-drop reorder: the field at `from` ends up at index `to`.
    pub fn move_field(&mut self, from: usize, to: usize) -> Result<(), PortalError> {
        let len = self.fields.len();
        if from >= len || to >= len {
            return Err(PortalError::InvalidSchema(format!(
                "move {} -> {} out of bounds for {} fields",
                from, to, len
            )));
        }
        let field = self.fields.remove(from);
        self.fields.insert(to, field);
        Ok(())
    }

    /// Copy a field directly after the original. Returns the new field id.
    pub fn duplicate_field(&mut self, field_id: &str) -> Result<String, PortalError> {
        let index = self.position(field_id)?;
        let mut copy = self.fields[index].clone();

        let mut candidate = format!("{}_copy", field_id);
        let mut n = 2u32;
        while self.field(&candidate).is_some() {
            candidate = format!("{}_copy_{}", field_id, n);
            n = n.saturating_add(1);
        }

        *copy.field_id_mut() = candidate.clone();
        let label = format!("{} (copy)", copy.label());
        *copy.label_mut() = label;
        self.fields.insert(index + 1, copy);
        Ok(candidate)
    }

    /// Replace a field in place. The replacement may rename the field as long
    /// as the new id is free.
    pub fn replace_field(&mut self, field_id: &str, field: FormField) -> Result<(), PortalError> {
        let index = self.position(field_id)?;
        if field.field_id() != field_id && self.field(field.field_id()).is_some() {
            return Err(PortalError::InvalidSchema(format!(
                "duplicate field id '{}'",
                field.field_id()
            )));
        }
        self.fields[index] = field;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Schema lint
    // -------------------------------------------------------------------------

    /// Collect every structural problem in the schema.
    #[must_use]
    pub fn lint(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();

        if self.fields.len() > MAX_FORM_FIELDS {
            issues.push(SchemaIssue {
                field_id: None,
                message: format!("form exceeds {} fields", MAX_FORM_FIELDS),
            });
        }

        for field in &self.fields {
            let id = field.field_id();
            if !is_valid_field_id(id) {
                issues.push(SchemaIssue::field(
                    id,
                    "field id must start with a lowercase letter and contain only a-z, 0-9, _",
                ));
            }
            if !seen.insert(id) {
                issues.push(SchemaIssue::field(id, "duplicate field id"));
            }
            if field.label().trim().is_empty() {
                issues.push(SchemaIssue::field(id, "label is empty"));
            }
            lint_constraints(field, &mut issues);
        }

        issues
    }

    /// Lint and fail with `InvalidSchema` if anything is wrong.
    pub fn validate(&self) -> Result<(), PortalError> {
        let issues = self.lint();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(PortalError::InvalidSchema(
                issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            ))
        }
    }

    // -------------------------------------------------------------------------
    // Response validation
    // -------------------------------------------------------------------------

    /// Check submitted values (and the MOVs attached to this indicator)
    /// against the schema. Returns every error found.
    #[must_use]
    pub fn validate_response(&self, values: &ResponseData, movs: &[MovFile]) -> Vec<FieldError> {
        let mut errors = Vec::new();

        for key in values.keys() {
            if self.field(key).is_none() {
                errors.push(FieldError::new(
                    key.as_str(),
                    FieldErrorCode::UnknownField,
                    "field is not part of this form",
                ));
            }
        }

        for field in &self.fields {
            if let FormField::FileUpload(f) = field {
                let attached: Vec<&MovFile> =
                    movs.iter().filter(|m| m.field_id == f.field_id).collect();
                check_files(f, &attached, &mut errors);
                continue;
            }

            match values.get(field.field_id()).filter(|v| !is_blank(v)) {
                None => {
                    if field.required() {
                        errors.push(FieldError::new(
                            field.field_id(),
                            FieldErrorCode::Required,
                            format!("{} is required", field.label()),
                        ));
                    }
                }
                Some(value) => check_value(field, value, &mut errors),
            }
        }

        errors
    }

    /// Required-field fill rate. Does not look at constraint errors.
    #[must_use]
    pub fn completion(&self, values: &ResponseData, movs: &[MovFile]) -> Completion {
        let mut required_total = 0usize;
        let mut required_filled = 0usize;

        for field in self.fields.iter().filter(|f| f.required()) {
            required_total += 1;
            let filled = match field {
                FormField::FileUpload(f) => movs.iter().any(|m| m.field_id == f.field_id),
                _ => values
                    .get(field.field_id())
                    .is_some_and(|v| !is_blank(v)),
            };
            if filled {
                required_filled += 1;
            }
        }

        Completion {
            required_total,
            required_filled,
            complete: required_filled == required_total,
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn is_valid_field_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    id.len() <= MAX_FIELD_ID_LENGTH
        && first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Null, whitespace-only strings and empty arrays count as "not answered".
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Parse a `YYYY-MM-DD` string value.
#[must_use]
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok())
}

/// Lowercased extension of a file name, without the dot.
#[must_use]
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn lint_constraints(field: &FormField, issues: &mut Vec<SchemaIssue>) {
    let id = field.field_id();
    match field {
        FormField::TextInput(f) | FormField::TextArea(f) => {
            if let (Some(min), Some(max)) = (f.min_length, f.max_length) {
                if min > max {
                    issues.push(SchemaIssue::field(id, "min_length exceeds max_length"));
                }
            }
            if f.max_length == Some(0) {
                issues.push(SchemaIssue::field(id, "max_length must be positive"));
            }
        }
        FormField::NumberInput(f) => {
            if let (Some(min), Some(max)) = (f.min_value, f.max_value) {
                if min > max {
                    issues.push(SchemaIssue::field(id, "min_value exceeds max_value"));
                }
            }
            if f.min_value.is_some_and(|v| !v.is_finite())
                || f.max_value.is_some_and(|v| !v.is_finite())
            {
                issues.push(SchemaIssue::field(id, "bounds must be finite"));
            }
        }
        FormField::CheckboxGroup(f) | FormField::RadioButton(f) | FormField::Dropdown(f) => {
            if f.options.is_empty() {
                issues.push(SchemaIssue::field(id, "at least one option is required"));
            }
            let mut values = BTreeSet::new();
            for option in &f.options {
                if option.value.trim().is_empty() {
                    issues.push(SchemaIssue::field(id, "option value is empty"));
                }
                if !values.insert(option.value.as_str()) {
                    issues.push(SchemaIssue::field(
                        id,
                        format!("duplicate option value '{}'", option.value),
                    ));
                }
            }
            if let (Some(min), Some(max)) = (f.min_selections, f.max_selections) {
                if min > max {
                    issues.push(SchemaIssue::field(
                        id,
                        "min_selections exceeds max_selections",
                    ));
                }
            }
            if f.min_selections.is_some_and(|m| m > f.options.len()) {
                issues.push(SchemaIssue::field(
                    id,
                    "min_selections exceeds number of options",
                ));
            }
            if f.max_selections.is_some_and(|m| m > f.options.len()) {
                issues.push(SchemaIssue::field(
                    id,
                    "max_selections exceeds number of options",
                ));
            }
        }
        FormField::DatePicker(f) => {
            if let (Some(min), Some(max)) = (f.min_date, f.max_date) {
                if min > max {
                    issues.push(SchemaIssue::field(id, "min_date is after max_date"));
                }
            }
        }
        FormField::FileUpload(f) => {
            if f.max_file_size_bytes == Some(0) {
                issues.push(SchemaIssue::field(id, "max_file_size_bytes must be positive"));
            }
            if f.max_files == Some(0) {
                issues.push(SchemaIssue::field(id, "max_files must be positive"));
            }
            if f
                .allowed_file_types
                .iter()
                .any(|t| t.is_empty() || t.starts_with('.'))
            {
                issues.push(SchemaIssue::field(
                    id,
                    "file types are bare extensions such as 'pdf'",
                ));
            }
        }
    }
}

fn check_value(field: &FormField, value: &Value, errors: &mut Vec<FieldError>) {
    let id = field.field_id();
    match field {
        FormField::TextInput(f) | FormField::TextArea(f) => {
            let Some(text) = value.as_str() else {
                errors.push(FieldError::new(id, FieldErrorCode::WrongType, "expected text"));
                return;
            };
            let len = text.chars().count();
            if f.min_length.is_some_and(|min| len < min) {
                errors.push(FieldError::new(
                    id,
                    FieldErrorCode::TooShort,
                    format!("must be at least {} characters", f.min_length.unwrap_or(0)),
                ));
            }
            let max = f.max_length.unwrap_or(MAX_TEXT_RESPONSE_LENGTH);
            if len > max {
                errors.push(FieldError::new(
                    id,
                    FieldErrorCode::TooLong,
                    format!("must be at most {} characters", max),
                ));
            }
        }
        FormField::NumberInput(f) => {
            let Some(n) = value.as_f64() else {
                errors.push(FieldError::new(id, FieldErrorCode::WrongType, "expected a number"));
                return;
            };
            if !f.allow_decimal && n.fract() != 0.0 {
                errors.push(FieldError::new(
                    id,
                    FieldErrorCode::DecimalNotAllowed,
                    "must be a whole number",
                ));
            }
            if let Some(min) = f.min_value {
                if n < min {
                    errors.push(FieldError::new(
                        id,
                        FieldErrorCode::BelowMinimum,
                        format!("must be at least {}", min),
                    ));
                }
            }
            if let Some(max) = f.max_value {
                if n > max {
                    errors.push(FieldError::new(
                        id,
                        FieldErrorCode::AboveMaximum,
                        format!("must be at most {}", max),
                    ));
                }
            }
        }
        FormField::CheckboxGroup(f) => {
            let Some(items) = value.as_array() else {
                errors.push(FieldError::new(
                    id,
                    FieldErrorCode::WrongType,
                    "expected a list of options",
                ));
                return;
            };
            let mut selected = BTreeSet::new();
            for item in items {
                match item.as_str() {
                    Some(s) if f.options.iter().any(|o| o.value == s) => {
                        selected.insert(s);
                    }
                    _ => errors.push(FieldError::new(
                        id,
                        FieldErrorCode::InvalidOption,
                        format!("'{}' is not an option", item),
                    )),
                }
            }
            if let Some(min) = f.min_selections {
                if selected.len() < min {
                    errors.push(FieldError::new(
                        id,
                        FieldErrorCode::TooFewSelections,
                        format!("select at least {}", min),
                    ));
                }
            }
            if let Some(max) = f.max_selections {
                if selected.len() > max {
                    errors.push(FieldError::new(
                        id,
                        FieldErrorCode::TooManySelections,
                        format!("select at most {}", max),
                    ));
                }
            }
        }
        FormField::RadioButton(f) | FormField::Dropdown(f) => match value.as_str() {
            Some(s) if f.options.iter().any(|o| o.value == s) => {}
            Some(s) => errors.push(FieldError::new(
                id,
                FieldErrorCode::InvalidOption,
                format!("'{}' is not an option", s),
            )),
            None => errors.push(FieldError::new(
                id,
                FieldErrorCode::WrongType,
                "expected an option value",
            )),
        },
        FormField::DatePicker(f) => {
            let Some(date) = parse_date(value) else {
                errors.push(FieldError::new(
                    id,
                    FieldErrorCode::InvalidDate,
                    "expected a date in YYYY-MM-DD format",
                ));
                return;
            };
            let too_early = f.min_date.is_some_and(|min| date < min);
            let too_late = f.max_date.is_some_and(|max| date > max);
            if too_early || too_late {
                errors.push(FieldError::new(
                    id,
                    FieldErrorCode::DateOutOfRange,
                    "date is outside the allowed range",
                ));
            }
        }
        FormField::FileUpload(_) => {}
    }
}

fn check_files(field: &FileField, attached: &[&MovFile], errors: &mut Vec<FieldError>) {
    let id = field.field_id.as_str();
    if attached.is_empty() {
        if field.required {
            errors.push(FieldError::new(
                id,
                FieldErrorCode::Required,
                format!("{} requires at least one file", field.label),
            ));
        }
        return;
    }
    if let Some(max) = field.max_files {
        if attached.len() > max {
            errors.push(FieldError::new(
                id,
                FieldErrorCode::TooManyFiles,
                format!("at most {} files", max),
            ));
        }
    }
    for mov in attached {
        if let Some(error) = check_file(field, &mov.file_name, mov.size_bytes) {
            errors.push(error);
        }
    }
}

/// Check one file's name and size against a file field's constraints.
#[must_use]
pub fn check_file(field: &FileField, file_name: &str, size_bytes: u64) -> Option<FieldError> {
    let id = field.field_id.as_str();
    if !field.allowed_file_types.is_empty() {
        let allowed = file_extension(file_name).is_some_and(|ext| {
            field
                .allowed_file_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&ext))
        });
        if !allowed {
            return Some(FieldError::new(
                id,
                FieldErrorCode::FileTypeNotAllowed,
                format!(
                    "'{}' is not one of: {}",
                    file_name,
                    field.allowed_file_types.join(", ")
                ),
            ));
        }
    }
    if field.max_file_size_bytes.is_some_and(|max| size_bytes > max) {
        return Some(FieldError::new(
            id,
            FieldErrorCode::FileTooLarge,
            format!("'{}' exceeds the size limit", file_name),
        ));
    }
    None
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndicatorId, MovId, UserId};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn text(id: &str, required: bool) -> FormField {
        FormField::TextInput(TextField {
            field_id: id.to_string(),
            label: id.to_uppercase(),
            required,
            help_text: None,
            min_length: Some(3),
            max_length: Some(10),
            placeholder: None,
        })
    }

    fn number(id: &str) -> FormField {
        FormField::NumberInput(NumberField {
            field_id: id.to_string(),
            label: "Amount".to_string(),
            required: true,
            help_text: None,
            min_value: Some(0.0),
            max_value: Some(100.0),
            allow_decimal: false,
        })
    }

    fn checkbox(id: &str) -> FormField {
        FormField::CheckboxGroup(ChoiceField {
            field_id: id.to_string(),
            label: "Documents".to_string(),
            required: true,
            help_text: None,
            options: vec![
                FieldOption::new("a", "A"),
                FieldOption::new("b", "B"),
                FieldOption::new("c", "C"),
            ],
            min_selections: Some(2),
            max_selections: None,
        })
    }

    fn upload(id: &str) -> FormField {
        FormField::FileUpload(FileField {
            field_id: id.to_string(),
            label: "Resolution".to_string(),
            required: true,
            help_text: None,
            allowed_file_types: vec!["pdf".to_string()],
            max_file_size_bytes: Some(1000),
            max_files: Some(1),
        })
    }

    fn mov(field_id: &str, name: &str, size: u64) -> MovFile {
        MovFile {
            id: MovId(1),
            indicator_id: IndicatorId(1),
            field_id: field_id.to_string(),
            file_name: name.to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: size,
            storage_key: format!("movs/{}", name),
            uploaded_by: UserId(1),
            uploaded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("date"),
        }
    }

    #[test]
    fn field_type_tag_round_trips() {
        let json = json!({
            "field_type": "radio_button",
            "field_id": "has_plan",
            "label": "Has plan?",
            "required": true,
            "options": [{"value": "yes", "label": "Yes"}, {"value": "no", "label": "No"}]
        });
        let field: FormField = serde_json::from_value(json).expect("deserialize");
        assert_eq!(field.type_name(), "radio_button");
        assert_eq!(field.kind(), FieldKind::SingleChoice);
        let back = serde_json::to_value(&field).expect("serialize");
        assert_eq!(back["field_type"], "radio_button");
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let mut schema = FormSchema::new();
        schema.add_field(text("name", true)).expect("first");
        assert!(schema.add_field(text("name", false)).is_err());
    }

    #[test]
    fn move_field_reorders() {
        let mut schema =
            FormSchema::with_fields(vec![text("aa", true), text("bb", true), text("cc", true)]);
        schema.move_field(0, 2).expect("move");
        let ids: Vec<_> = schema.fields.iter().map(FormField::field_id).collect();
        assert_eq!(ids, vec!["bb", "cc", "aa"]);
        assert!(schema.move_field(0, 3).is_err());
    }

    #[test]
    fn duplicate_field_gets_unique_id() {
        let mut schema = FormSchema::with_fields(vec![text("name", true)]);
        let first = schema.duplicate_field("name").expect("dup");
        let second = schema.duplicate_field("name").expect("dup");
        assert_eq!(first, "name_copy");
        assert_eq!(second, "name_copy_2");
        assert_eq!(schema.fields[1].field_id(), "name_copy_2");
        assert_eq!(schema.fields[1].label(), "NAME (copy)");
    }

    #[test]
    fn lint_finds_structural_problems() {
        let schema = FormSchema::with_fields(vec![
            text("Bad-Id", true),
            FormField::Dropdown(ChoiceField {
                field_id: "pick".to_string(),
                label: " ".to_string(),
                required: false,
                help_text: None,
                options: vec![],
                min_selections: None,
                max_selections: None,
            }),
        ]);
        let issues = schema.lint();
        assert!(issues.iter().any(|i| i.message.contains("lowercase")));
        assert!(issues.iter().any(|i| i.message.contains("label is empty")));
        assert!(issues.iter().any(|i| i.message.contains("at least one option")));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn selection_bounds_cannot_exceed_options() {
        let mut field = checkbox("docs");
        if let FormField::CheckboxGroup(f) = &mut field {
            f.min_selections = None;
            f.max_selections = Some(4);
        }
        let issues = FormSchema::with_fields(vec![field.clone()]).lint();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("max_selections exceeds number of options"));

        if let FormField::CheckboxGroup(f) = &mut field {
            f.max_selections = Some(3);
        }
        assert!(FormSchema::with_fields(vec![field]).validate().is_ok());
    }

    #[test]
    fn valid_response_has_no_errors() {
        let schema = FormSchema::with_fields(vec![text("name", true), number("amount"), checkbox("docs")]);
        let mut values = ResponseData::new();
        values.insert("name".into(), json!("Juan"));
        values.insert("amount".into(), json!(42));
        values.insert("docs".into(), json!(["a", "c"]));
        assert!(schema.validate_response(&values, &[]).is_empty());
        assert!(schema.completion(&values, &[]).complete);
    }

    #[test]
    fn response_errors_are_all_reported() {
        let schema = FormSchema::with_fields(vec![text("name", true), number("amount"), checkbox("docs")]);
        let mut values = ResponseData::new();
        values.insert("amount".into(), json!(150.5));
        values.insert("docs".into(), json!(["a", "z"]));
        values.insert("extra".into(), json!(1));

        let codes: Vec<_> = schema
            .validate_response(&values, &[])
            .into_iter()
            .map(|e| e.code)
            .collect();
        assert!(codes.contains(&FieldErrorCode::UnknownField));
        assert!(codes.contains(&FieldErrorCode::Required));
        assert!(codes.contains(&FieldErrorCode::DecimalNotAllowed));
        assert!(codes.contains(&FieldErrorCode::AboveMaximum));
        assert!(codes.contains(&FieldErrorCode::InvalidOption));
        assert!(codes.contains(&FieldErrorCode::TooFewSelections));
    }

    #[test]
    fn blank_optional_fields_are_skipped() {
        let schema = FormSchema::with_fields(vec![text("note", false)]);
        let mut values = ResponseData::new();
        values.insert("note".into(), json!("   "));
        assert!(schema.validate_response(&values, &[]).is_empty());
    }

    #[test]
    fn date_values_are_parsed_and_bounded() {
        let schema = FormSchema::with_fields(vec![FormField::DatePicker(DateField {
            field_id: "posted_on".into(),
            label: "Posted on".into(),
            required: true,
            help_text: None,
            min_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            max_date: NaiveDate::from_ymd_opt(2024, 12, 31),
        })]);
        let mut values = ResponseData::new();
        values.insert("posted_on".into(), json!("2023-12-31"));
        let errors = schema.validate_response(&values, &[]);
        assert_eq!(errors[0].code, FieldErrorCode::DateOutOfRange);

        values.insert("posted_on".into(), json!("31/12/2024"));
        let errors = schema.validate_response(&values, &[]);
        assert_eq!(errors[0].code, FieldErrorCode::InvalidDate);
    }

    #[test]
    fn file_fields_are_satisfied_by_movs() {
        let schema = FormSchema::with_fields(vec![upload("resolution")]);
        let values = ResponseData::new();

        let errors = schema.validate_response(&values, &[]);
        assert_eq!(errors[0].code, FieldErrorCode::Required);
        assert!(!schema.completion(&values, &[]).complete);

        let good = mov("resolution", "Signed.PDF", 500);
        assert!(schema.validate_response(&values, &[good.clone()]).is_empty());
        assert!(schema.completion(&values, &[good.clone()]).complete);

        let wrong_type = mov("resolution", "scan.png", 500);
        let errors = schema.validate_response(&values, &[wrong_type]);
        assert_eq!(errors[0].code, FieldErrorCode::FileTypeNotAllowed);

        let big = mov("resolution", "big.pdf", 5000);
        let errors = schema.validate_response(&values, &[good, big]);
        let codes: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&FieldErrorCode::TooManyFiles));
        assert!(codes.contains(&FieldErrorCode::FileTooLarge));
    }

    #[test]
    fn file_extension_handles_edge_cases() {
        assert_eq!(file_extension("a.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension(".hidden"), None);
        assert_eq!(file_extension("noext"), None);
    }
}
