//! Input schemas for every create/edit flow.
//!
//! Forms deserialize with `#[serde(default)]` so an absent field reaches the
//! validators as blank and is reported as a field error rather than a parse
//! failure.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::Id;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_A_VALID_CHOICE: &str = "Not a valid choice";
pub const NOT_AN_INTEGER: &str = "Not a valid integer value.";
pub const NOT_A_DATE: &str = "Not a valid date value.";

/// Field name → messages, in field order.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(error("required", REQUIRED));
    }
    Ok(())
}

const NO_TEMPLATE: u8 = u8::MAX;

fn no_template() -> u8 {
    NO_TEMPLATE
}

fn layout_choice(value: u8) -> Result<(), ValidationError> {
    match value {
        0 | 1 => Ok(()),
        NO_TEMPLATE => Err(error("required", REQUIRED)),
        _ => Err(error("choice", NOT_A_VALID_CHOICE)),
    }
}

/// Numeric and date inputs arrive as raw JSON so a bad value becomes a field
/// error. Null and blank strings mean "no value".
fn parse_int(value: &Value) -> Result<Option<i32>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()).map(Some).ok_or(()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(|_| ()),
        _ => Err(()),
    }
}

fn parse_date(value: &Value) -> Result<Option<NaiveDate>, ()> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Some).map_err(|_| ()),
        _ => Err(()),
    }
}

fn non_negative_int(value: &Value) -> Result<(), ValidationError> {
    match parse_int(value) {
        Ok(Some(n)) if n < 0 => Err(error("range", "Number must be at least 0.")),
        Ok(_) => Ok(()),
        Err(()) => Err(error("integer", NOT_AN_INTEGER)),
    }
}

fn iso_date(value: &Value) -> Result<(), ValidationError> {
    parse_date(value).map(|_| ()).map_err(|()| error("date", NOT_A_DATE))
}

/// Flattens validator output into the field error map returned to clients.
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, errs) in errors.field_errors() {
        let messages = errs
            .iter()
            .map(|e| match &e.message {
                Some(m) => m.to_string(),
                None => e.code.to_string(),
            })
            .collect();
        out.insert(field.to_string(), messages);
    }
    out
}

pub fn single_error(field: &str, message: &str) -> FieldErrors {
    FieldErrors::from([(field.to_string(), vec![message.to_string()])])
}

/// Name-only records: artwork types, tags and statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct NameForm {
    #[validate(
        custom(function = "not_blank"),
        length(max = 128, message = "Field cannot be longer than 128 characters.")
    )]
    pub name: String,
}

pub type ArtworkTypeForm = NameForm;
pub type TagForm = NameForm;
pub type StatusForm = NameForm;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct FeatureForm {
    #[validate(
        custom(function = "not_blank"),
        length(max = 128, message = "Field cannot be longer than 128 characters.")
    )]
    pub name: String,
    #[validate(range(min = 1, message = "This field is required."))]
    pub type_id: Id,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct FeaturesValueForm {
    #[validate(length(max = 32, message = "Field cannot be longer than 32 characters."))]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct ArtworkForm {
    #[validate(range(min = 1, message = "This field is required."))]
    pub type_id: Id,
    #[validate(
        custom(function = "not_blank"),
        length(max = 128, message = "Field cannot be longer than 128 characters.")
    )]
    pub name: String,
    #[validate(length(max = 32, message = "Field cannot be longer than 32 characters."))]
    pub author: Option<String>,
    #[validate(length(max = 10, message = "Field cannot be longer than 10 characters."))]
    pub year: Option<String>,
    #[validate(custom(function = "non_negative_int"))]
    #[schema(value_type = Option<i32>)]
    pub buy_price: Option<Value>,
    #[validate(length(max = 200, message = "Field cannot be longer than 200 characters."))]
    pub info: Option<String>,
}

impl ArtworkForm {
    /// Parsed price; only meaningful after validation.
    pub fn buy_price(&self) -> Option<i32> {
        self.buy_price.as_ref().and_then(|v| parse_int(v).ok().flatten())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct ClientForm {
    #[validate(
        custom(function = "not_blank"),
        length(max = 64, message = "Field cannot be longer than 64 characters.")
    )]
    pub name: String,
    #[validate(
        custom(function = "not_blank"),
        length(max = 16, message = "Field cannot be longer than 16 characters.")
    )]
    pub phone: String,
    #[validate(custom(function = "iso_date"))]
    #[schema(value_type = Option<String>, format = Date)]
    pub birthday: Option<Value>,
    #[validate(length(max = 200, message = "Field cannot be longer than 200 characters."))]
    pub info: Option<String>,
}

impl ClientForm {
    pub fn birthday(&self) -> Option<NaiveDate> {
        self.birthday.as_ref().and_then(|v| parse_date(v).ok().flatten())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct OfferForm {
    #[validate(range(min = 1, message = "This field is required."))]
    pub artwork_id: Id,
    #[validate(range(min = 1, message = "This field is required."))]
    pub client_id: Id,
    #[validate(custom(function = "non_negative_int"))]
    #[schema(value_type = Option<i32>)]
    pub price: Option<Value>,
    #[validate(range(min = 1, message = "This field is required."))]
    pub status_id: Id,
    #[validate(length(max = 200, message = "Field cannot be longer than 200 characters."))]
    pub info: Option<String>,
}

impl OfferForm {
    pub fn price(&self) -> Option<i32> {
        self.price.as_ref().and_then(|v| parse_int(v).ok().flatten())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct AttachmentForm {
    pub main_image: bool,
    #[validate(length(max = 200, message = "Field cannot be longer than 200 characters."))]
    pub info: Option<String>,
}

/// PDF layout picker: 0 puts the image above the text, 1 below it.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SelectTemplateForm {
    #[serde(default = "no_template")]
    #[validate(custom(function = "layout_choice"))]
    pub template: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct SearchForm {
    #[validate(range(min = 1, message = "This field is required."))]
    pub feature_id: Id,
    #[validate(custom(function = "not_blank"))]
    pub value: String,
    pub page: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct LoginForm {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(custom(function = "not_blank"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct UserForm {
    #[validate(
        custom(function = "not_blank"),
        length(max = 128, message = "Field cannot be longer than 128 characters.")
    )]
    pub name: String,
    #[validate(length(min = 8, message = "Field must be at least 8 characters long."))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_is_required() {
        let form = NameForm { name: "   ".into() };
        let errs = field_errors(&form.validate().unwrap_err());
        assert_eq!(errs["name"], vec![REQUIRED.to_string()]);
    }

    #[test]
    fn missing_select_is_required() {
        let form: ArtworkForm = serde_json::from_str(r#"{"name":"Sunset"}"#).unwrap();
        let errs = field_errors(&form.validate().unwrap_err());
        assert!(errs.contains_key("type_id"));
        assert!(!errs.contains_key("name"));
    }

    #[test]
    fn length_limits_apply() {
        let form = ClientForm {
            name: "Ann".into(),
            phone: "0".repeat(17),
            birthday: None,
            info: Some("x".repeat(201)),
        };
        let errs = field_errors(&form.validate().unwrap_err());
        assert!(errs.contains_key("phone"));
        assert!(errs.contains_key("info"));
        assert!(!errs.contains_key("name"));
    }

    #[test]
    fn client_birthday_parses_iso_dates() {
        let form: ClientForm =
            serde_json::from_str(r#"{"name":"Ann","phone":"123","birthday":"1990-04-01"}"#).unwrap();
        assert!(form.validate().is_ok());
        assert_eq!(form.birthday(), NaiveDate::from_ymd_opt(1990, 4, 1));
    }

    #[test]
    fn typed_inputs_report_field_errors() {
        let form: ClientForm =
            serde_json::from_str(r#"{"name":"Ann","phone":"123","birthday":"1990-13-45"}"#).unwrap();
        let errs = field_errors(&form.validate().unwrap_err());
        assert_eq!(errs["birthday"], vec![NOT_A_DATE.to_string()]);

        let form: ArtworkForm = serde_json::from_str(r#"{"type_id":1,"name":"Sunset","buy_price":"abc"}"#).unwrap();
        let errs = field_errors(&form.validate().unwrap_err());
        assert_eq!(errs["buy_price"], vec![NOT_AN_INTEGER.to_string()]);

        let form: ArtworkForm = serde_json::from_str(r#"{"type_id":1,"name":"Sunset","buy_price":"120"}"#).unwrap();
        assert!(form.validate().is_ok());
        assert_eq!(form.buy_price(), Some(120));

        let form: OfferForm =
            serde_json::from_str(r#"{"artwork_id":1,"client_id":1,"status_id":1,"price":-5}"#).unwrap();
        let errs = field_errors(&form.validate().unwrap_err());
        assert!(errs.contains_key("price"));
        let form: OfferForm =
            serde_json::from_str(r#"{"artwork_id":1,"client_id":1,"status_id":1,"price":""}"#).unwrap();
        assert!(form.validate().is_ok());
        assert_eq!(form.price(), None);
    }

    #[test]
    fn template_must_be_known_layout() {
        assert!(SelectTemplateForm { template: 1 }.validate().is_ok());
        let errs = field_errors(&SelectTemplateForm { template: 2 }.validate().unwrap_err());
        assert_eq!(errs["template"], vec![NOT_A_VALID_CHOICE.to_string()]);
        let missing: SelectTemplateForm = serde_json::from_str("{}").unwrap();
        let errs = field_errors(&missing.validate().unwrap_err());
        assert_eq!(errs["template"], vec![REQUIRED.to_string()]);
    }

    #[test]
    fn offer_requires_all_choices() {
        let errs = field_errors(&OfferForm::default().validate().unwrap_err());
        for field in ["artwork_id", "client_id", "status_id"] {
            assert!(errs.contains_key(field), "{field} should be required");
        }
    }
}
