//! Shipment request model and validation
//!
//! A shipment arrives as JSON from the requester: a `From` block in the
//! portal's own PascalCase shape and a `To` block in the requester's
//! snake_case shape. [`Shipment::from_json`] validates every field before
//! deserializing so callers get a full map of problems in one pass.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use common::ValidationError;
use common::validation::{FieldRule, FieldType, check_object};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{LABEL_TIME_FORMAT, MAIL_CLASS_GROUND};

const SENDER_RULES: &[FieldRule] = &[
    ("FullName", FieldType::String, true),
    ("Company", FieldType::String, false),
    ("Address1", FieldType::String, true),
    ("Address2", FieldType::String, false),
    ("Address3", FieldType::String, false),
    ("City", FieldType::String, true),
    ("State", FieldType::String, true),
    ("ZIPCode", FieldType::String, true),
    ("PhoneNumber", FieldType::String, false),
];

const RECIPIENT_RULES: &[FieldRule] = &[
    ("recipient_name", FieldType::String, true),
    ("recipient_phone", FieldType::String, true),
    ("recipient_postcode", FieldType::String, true),
    ("address1", FieldType::String, true),
    ("address2", FieldType::String, false),
    ("city", FieldType::String, true),
    ("state", FieldType::String, true),
    ("weight_lb", FieldType::Number, true),
    ("length_in", FieldType::Number, true),
    ("width_in", FieldType::Number, true),
    ("height_in", FieldType::Number, true),
    ("mail_class", FieldType::String, true),
];

/// Sender block, in the portal's field naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sender {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address3: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(rename = "ZIPCode")]
    pub zip_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Recipient block plus parcel dimensions and mail class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_postcode: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub weight_lb: f64,
    pub length_in: f64,
    pub width_in: f64,
    pub height_in: f64,
    pub mail_class: String,
}

impl Recipient {
    /// Split `recipient_postcode` into ZIP and ZIP+4 add-on (`""` if absent).
    pub fn zip_parts(&self) -> (&str, &str) {
        let mut parts = self.recipient_postcode.splitn(2, '-');
        let zip = parts.next().unwrap_or_default();
        let add_on = parts.next().unwrap_or_default();
        (zip, add_on)
    }
}

/// One label request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    #[serde(rename = "From")]
    pub from: Sender,
    #[serde(rename = "To")]
    pub to: Recipient,
}

impl Shipment {
    /// Parse and validate a shipment from raw JSON text.
    ///
    /// Malformed JSON is reported under the `$` path.
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ValidationError::single("$", format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::new();
        match value.as_object() {
            Some(root) => {
                match root.get("From") {
                    Some(from) => check_object(from, "From", SENDER_RULES, &mut errors),
                    None => errors.insert("From", "required"),
                }
                match root.get("To") {
                    Some(to) => check_object(to, "To", RECIPIENT_RULES, &mut errors),
                    None => errors.insert("To", "required"),
                }
            }
            None => errors.insert("$", "expected object"),
        }
        errors.into_result(())?;

        serde_json::from_value(value).map_err(|e| ValidationError::single("$", e.to_string()))
    }

    /// Ground service prints as "Ground", everything else as "Priority".
    pub fn is_ground(&self) -> bool {
        self.to.mail_class == MAIL_CLASS_GROUND
    }

    /// Label family used in rendered file names.
    pub fn service_name(&self) -> &'static str {
        if self.is_ground() { "Ground" } else { "Priority" }
    }

    /// Human-friendly label id: lowercased sender name (first space replaced
    /// with `_`) followed by the request time.
    pub fn label_id<Tz>(&self, at: DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let name = self.from.full_name.to_lowercase().replacen(' ', "_", 1);
        format!("{name}-{}", at.format(LABEL_TIME_FORMAT))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use serde_json::json;

    pub(crate) fn sample_value() -> Value {
        json!({
            "From": {
                "FullName": "Jane Sender",
                "Address1": "1 Main St",
                "City": "Austin",
                "State": "TX",
                "ZIPCode": "78701",
                "PhoneNumber": "5125550100"
            },
            "To": {
                "recipient_name": "Bob Receiver",
                "recipient_phone": "2125550199",
                "recipient_postcode": "10001-1234",
                "address1": "350 5th Ave",
                "address2": "Suite 10",
                "city": "New York",
                "state": "ny",
                "weight_lb": 2.5,
                "length_in": 10,
                "width_in": 8,
                "height_in": 4,
                "mail_class": "USPM"
            }
        })
    }

    pub(crate) fn sample() -> Shipment {
        Shipment::from_value(sample_value()).unwrap()
    }

    #[test]
    fn parses_valid_shipment() {
        let shipment = Shipment::from_json(&sample_value().to_string()).unwrap();
        assert_eq!(shipment.from.full_name, "Jane Sender");
        assert_eq!(shipment.to.address2.as_deref(), Some("Suite 10"));
        assert_eq!(shipment.to.length_in, 10.0);
        assert!(!shipment.is_ground());
        assert_eq!(shipment.service_name(), "Priority");
    }

    #[test]
    fn reports_every_bad_field() {
        let mut value = sample_value();
        value["From"].as_object_mut().unwrap().remove("City");
        value["To"]["weight_lb"] = json!("heavy");
        value["To"]["address2"] = Value::Null;

        let err = Shipment::from_value(value).unwrap_err();
        assert_eq!(err.fields.len(), 2, "got: {err}");
        assert_eq!(err.fields["From.City"], "required");
        assert_eq!(err.fields["To.weight_lb"], "expected number");
    }

    #[test]
    fn missing_blocks_are_required() {
        let err = Shipment::from_value(json!({})).unwrap_err();
        assert_eq!(err.fields["From"], "required");
        assert_eq!(err.fields["To"], "required");
    }

    #[test]
    fn malformed_json_reports_root() {
        let err = Shipment::from_json("{not json").unwrap_err();
        assert!(err.fields["$"].starts_with("invalid JSON"));
    }

    #[test]
    fn zip_parts_split_on_dash() {
        let mut shipment = sample();
        assert_eq!(shipment.to.zip_parts(), ("10001", "1234"));
        shipment.to.recipient_postcode = "73301".into();
        assert_eq!(shipment.to.zip_parts(), ("73301", ""));
    }

    #[test]
    fn label_id_uses_first_space_only() {
        let mut shipment = sample();
        shipment.from.full_name = "Mary Ann Smith".into();
        let at = Utc.with_ymd_and_hms(2024, 7, 10, 18, 5, 0).unwrap();
        assert_eq!(shipment.label_id(at), "mary_ann smith-Jul 10, 2024, 6:05 PM");
    }

    #[test]
    fn label_id_uses_the_given_zone() {
        let central = FixedOffset::west_opt(5 * 3600).unwrap();
        let at = Utc
            .with_ymd_and_hms(2024, 7, 10, 18, 5, 0)
            .unwrap()
            .with_timezone(&central);
        assert_eq!(sample().label_id(at), "jane_sender-Jul 10, 2024, 1:05 PM");
    }
}
