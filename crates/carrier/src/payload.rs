//! CreateIndicium request body
//!
//! The body merges the shipment's sender and recipient with a fixed set of
//! label-layout defaults. Address and rate blocks are typed; the flat layout
//! keys are kept as a JSON template since the portal only ever sees them as
//! constants.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::shipment::Shipment;

/// Quoted rate amount sent with every request. The portal re-rates anyway.
pub const QUOTED_AMOUNT: f64 = 8.62;

const PRINT_LAYOUT: &str = "Normal4X6";

fn layout_defaults() -> Value {
    json!({
        "costCodeID": 0,
        "Customs": "",
        "deliveryNotification": false,
        "EltronPrinterDPType": "Default",
        "integratorTxId": "00000000-0000-0000-0000-000000000000",
        "keepUrlSplit": true,
        "labelColumn": 1,
        "labelRow": 1,
        "Reference1": "",
        "memo": "",
        "printMemo": false,
        "NonDeliveryOption": "Return",
        "OrderID": "",
        "printerName": null,
        "printerOrientation": "portrait",
        "printerTray": null,
        "printInstructions": false,
        "PrintLayout": PRINT_LAYOUT,
        "recipientEmail": "",
        "rotationDegrees": 0,
        "SampleOnly": false,
        "TrackingNumber": "",
        "verticalOffset": 0,
        "ImageType": "EncryptedPngUrl",
        "printerPaperHeight": 6,
        "printerPaperWidth": 4,
    })
}

/// Sender address as used for both `ReturnTo` and `Rate.From`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FromAddress {
    pub full_name: String,
    pub company: Option<String>,
    pub address1: String,
    pub address2: Option<String>,
    pub address3: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(rename = "ZIPCode")]
    pub zip_code: String,
    pub phone_number: Option<String>,
    pub cleanse_hash: String,
    pub override_hash: String,
}

/// Recipient address in the portal's cleansed-address shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ToAddress {
    pub full_name: String,
    pub company: String,
    pub phone_number: String,
    pub address1: String,
    pub address2: Option<String>,
    pub address3: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "ZIPCode")]
    pub zip_code: String,
    #[serde(rename = "ZIPCodeAddOn")]
    pub zip_code_add_on: String,
    pub country: String,
    #[serde(rename = "freeFormAddress")]
    pub free_form_address: String,
    pub cleanse_message: String,
    pub cleanse_hash: String,
    pub override_hash: String,
    pub email_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOn {
    #[serde(rename = "AddOnType")]
    pub add_on_type: String,
    #[serde(rename = "Amount")]
    pub amount: f64,
}

/// Rate block: addresses, service, weight and dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rate {
    pub from: FromAddress,
    pub to: ToAddress,
    pub amount: f64,
    pub service_type: String,
    pub deliver_days: Option<Value>,
    pub error: Option<Value>,
    pub weight_lb: f64,
    pub weight_oz: f64,
    pub package_type: String,
    pub ship_date: NaiveDate,
    pub ship_date_specified: bool,
    pub insured_value: f64,
    pub registered_value: f64,
    #[serde(rename = "CODValue")]
    pub cod_value: f64,
    pub declared_value: f64,
    pub rectangular_shaped: bool,
    pub prohibitions: Option<Value>,
    pub restrictions: Option<Value>,
    pub observations: Option<Value>,
    pub regulations: Option<Value>,
    #[serde(rename = "GEMNotes")]
    pub gem_notes: Option<Value>,
    pub max_dimensions: Option<Value>,
    pub dim_weighting: Option<Value>,
    pub add_ons: Vec<AddOn>,
    pub effective_weight_in_ounces: f64,
    #[serde(rename = "IsIntraBMC")]
    pub is_intra_bmc: bool,
    pub zone: u32,
    pub rate_category: u32,
    pub non_machinable: bool,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub print_layout: String,
}

/// The variable part of a CreateIndicium body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndiciumPayload {
    #[serde(rename = "CustomerID")]
    pub customer_id: Option<String>,
    #[serde(rename = "ReturnTo")]
    pub return_to: FromAddress,
    #[serde(rename = "Rate")]
    pub rate: Rate,
}

impl IndiciumPayload {
    pub fn build(shipment: &Shipment, customer_id: Option<&str>, ship_date: NaiveDate) -> Self {
        let from = &shipment.from;
        let to = &shipment.to;

        let from_address = FromAddress {
            full_name: from.full_name.clone(),
            company: from.company.clone(),
            address1: from.address1.clone(),
            address2: from.address2.clone(),
            address3: from.address3.clone(),
            city: from.city.clone(),
            state: from.state.clone(),
            zip_code: from.zip_code.clone(),
            phone_number: from.phone_number.clone(),
            cleanse_hash: String::new(),
            override_hash: String::new(),
        };

        let state = to.state.to_uppercase();
        let (zip, add_on) = to.zip_parts();
        let to_address = ToAddress {
            full_name: to.recipient_name.clone(),
            company: String::new(),
            phone_number: to.recipient_phone.clone(),
            address1: to.address1.clone(),
            address2: to.address2.clone(),
            address3: String::new(),
            city: to.city.clone(),
            free_form_address: format!(
                "{}\n{}\n{}, {} {}",
                to.recipient_name, to.address1, to.city, state, to.recipient_postcode
            ),
            state,
            zip_code: zip.to_string(),
            zip_code_add_on: add_on.to_string(),
            country: "US".to_string(),
            cleanse_message: "Cleansed".to_string(),
            cleanse_hash: String::new(),
            override_hash: String::new(),
            email_address: String::new(),
        };

        let rate = Rate {
            from: from_address.clone(),
            to: to_address,
            amount: QUOTED_AMOUNT,
            service_type: to.mail_class.clone(),
            deliver_days: None,
            error: None,
            weight_lb: to.weight_lb,
            weight_oz: 0.0,
            package_type: "Package".to_string(),
            ship_date,
            ship_date_specified: true,
            insured_value: 0.0,
            registered_value: 0.0,
            cod_value: 0.0,
            declared_value: 1.0,
            rectangular_shaped: true,
            prohibitions: None,
            restrictions: None,
            observations: None,
            regulations: None,
            gem_notes: None,
            max_dimensions: None,
            dim_weighting: None,
            add_ons: ["SCAHP", "USADC"]
                .into_iter()
                .map(|t| AddOn {
                    add_on_type: t.to_string(),
                    amount: 0.0,
                })
                .collect(),
            effective_weight_in_ounces: 0.0,
            is_intra_bmc: false,
            zone: 0,
            rate_category: 0,
            non_machinable: false,
            length: to.length_in,
            width: to.width_in,
            height: to.height_in,
            print_layout: PRINT_LAYOUT.to_string(),
        };

        Self {
            customer_id: customer_id.map(str::to_string),
            return_to: from_address,
            rate,
        }
    }

    /// Full request body: layout defaults plus the typed blocks.
    pub fn to_body(&self) -> serde_json::Result<Value> {
        let mut body = match layout_defaults() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Value::Object(typed) = serde_json::to_value(self)? {
            body.extend(typed);
        }
        Ok(Value::Object(body))
    }
}
