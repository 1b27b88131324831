//! Reading history files.
//!
//! The current format is `{"day": "YYYYMMDD", "items": [record, ...]}` with records in their serde shape. Files
//! written by earlier versions of the tool may instead be a bare array of items, use Japanese or older English field
//! names, and hold amounts as formatted strings (`"¥100,000"`, `"100,000円"`). All of that is normalised here, at the
//! file boundary, so the rest of the engine only ever sees [`InvoiceOrder`].
use chrono::{DateTime, NaiveDateTime, Utc};
use ipg_common::{MinorUnits, DEFAULT_CURRENCY};
use log::*;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db_types::{DayStamp, InvoiceOrder, LocalId, OrderStatus};

#[derive(Debug, Clone, Error)]
pub enum LegacyFormatError {
    #[error("Not valid JSON. {0}")]
    Json(String),
    #[error("Unrecognised document shape: {0}")]
    Shape(String),
    #[error("Item {index} cannot be read: {message}")]
    Item { index: usize, message: String },
}

const ID_KEYS: &[&str] = &["local_id", "id", "ID", "管理番号"];
const CUSTOMER_KEYS: &[&str] = &["customer", "customer_name", "name", "顧客名", "お客様名", "氏名", "宛名"];
const MINOR_AMOUNT_KEYS: &[&str] = &["amount_minor"];
const AMOUNT_KEYS: &[&str] = &["amount", "price", "total", "金額", "請求金額", "合計"];
const CURRENCY_KEYS: &[&str] = &["currency", "currency_code", "通貨"];
const ORDER_ID_KEYS: &[&str] = &["paypal_order_id", "order_id", "paypal_id", "注文ID", "オーダーID"];
const URL_KEYS: &[&str] = &["approval_url", "link", "url", "payment_link", "paypal_link", "支払いリンク", "リンク"];
const STATUS_KEYS: &[&str] = &["status", "state", "ステータス", "状態"];
const CREATED_KEYS: &[&str] = &["created_at", "created", "timestamp", "date", "作成日時", "日時"];

/// Reads a history file. `day` is the partition the file name claims, used for records that do not say when they
/// were created.
pub fn parse_partition(day: &DayStamp, bytes: &[u8]) -> Result<Vec<InvoiceOrder>, LegacyFormatError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    let doc: Value = serde_json::from_slice(bytes).map_err(|e| LegacyFormatError::Json(e.to_string()))?;
    let items = match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(stamp) = map.get("day").and_then(Value::as_str) {
                if stamp != day.as_str() {
                    warn!("🗃️ History file for {day} claims to be for {stamp}. Using {day}.");
                }
            }
            match map.remove("items") {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => return Err(LegacyFormatError::Shape("'items' is not an array".into())),
            }
        },
        other => return Err(LegacyFormatError::Shape(format!("top level is {}", type_name(&other)))),
    };
    items.into_iter().enumerate().map(|(index, item)| normalise_item(day, index, item)).collect()
}

fn normalise_item(day: &DayStamp, index: usize, item: Value) -> Result<InvoiceOrder, LegacyFormatError> {
    let map = match item {
        Value::Object(map) => map,
        other => {
            let message = format!("expected an object, found {}", type_name(&other));
            return Err(LegacyFormatError::Item { index, message });
        },
    };
    match serde_json::from_value::<InvoiceOrder>(Value::Object(map.clone())) {
        Ok(order) => Ok(order),
        Err(e) => {
            trace!("🗃️ Item {index} of {day} is not in the current format ({e}). Normalising it.");
            Ok(normalise_legacy(day, index, &map))
        },
    }
}

fn normalise_legacy(day: &DayStamp, index: usize, map: &Map<String, Value>) -> InvoiceOrder {
    let field = |keys: &[&str]| keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null());
    let text = |keys: &[&str]| field(keys).and_then(as_text);

    let local_id = text(ID_KEYS).map(LocalId::from).unwrap_or_else(|| LocalId(format!("{day}-legacy-{index:04}")));
    let currency = text(CURRENCY_KEYS).map(|c| c.to_ascii_uppercase()).unwrap_or_else(|| DEFAULT_CURRENCY.into());
    let mut notes = Vec::new();
    let amount_minor = match (field(MINOR_AMOUNT_KEYS), field(AMOUNT_KEYS)) {
        (Some(v), _) => parse_minor_amount(v),
        (None, Some(v)) => parse_major_amount(v, &currency),
        (None, None) => Err("no amount".to_string()),
    }
    .unwrap_or_else(|e| {
        warn!("🗃️ Legacy record {local_id} in {day} has an unreadable amount ({e}). Recording it as zero.");
        notes.push(format!("unreadable legacy amount: {e}"));
        MinorUnits::default()
    });
    let created_at = text(CREATED_KEYS).and_then(|s| parse_timestamp(&s)).unwrap_or_else(|| day.start_of_day());
    let paypal_order_id = text(ORDER_ID_KEYS);
    let approval_url = text(URL_KEYS);
    let mut status = text(STATUS_KEYS).and_then(|s| parse_legacy_status(&s)).unwrap_or(match paypal_order_id {
        Some(_) => OrderStatus::Issued,
        None => OrderStatus::Draft,
    });
    let mut prior_status = map.get("prior_status").and_then(as_text).and_then(|s| s.parse().ok());
    if status.requires_remote_id() && paypal_order_id.is_none() {
        warn!("🗃️ Legacy record {local_id} in {day} is {status} but has no PayPal order id. Marking it as ERROR.");
        notes.push(format!("legacy record was {status} without a PayPal order id"));
        prior_status = Some(status);
        status = OrderStatus::Error;
    }
    let last_status_at = map
        .get("last_status_at")
        .and_then(as_text)
        .and_then(|s| parse_timestamp(&s))
        .unwrap_or(created_at);
    InvoiceOrder {
        local_id,
        created_at,
        customer: text(CUSTOMER_KEYS).unwrap_or_default(),
        amount_minor,
        currency,
        paypal_order_id,
        approval_url,
        status,
        prior_status,
        last_status_at,
        last_event_id: map.get("last_event_id").and_then(as_text),
        last_remote_at: map.get("last_remote_at").and_then(as_text).and_then(|s| parse_timestamp(&s)),
        capture_id: map.get("capture_id").and_then(as_text),
        note: (!notes.is_empty()).then(|| notes.join("; ")),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_minor_amount(value: &Value) -> Result<MinorUnits, String> {
    match value {
        Value::Number(n) => n.as_u64().map(MinorUnits::from).ok_or_else(|| format!("{n} is not a whole amount")),
        Value::String(s) => {
            s.replace(',', "").trim().parse::<u64>().map(MinorUnits::from).map_err(|e| format!("'{s}': {e}"))
        },
        other => Err(format!("amount is {}", type_name(other))),
    }
}

fn parse_major_amount(value: &Value, currency: &str) -> Result<MinorUnits, String> {
    match value {
        Value::Number(n) => MinorUnits::from_decimal_str(&n.to_string(), currency).map_err(|e| e.to_string()),
        Value::String(s) => MinorUnits::parse_formatted(s, currency).map_err(|e| e.to_string()),
        other => Err(format!("amount is {}", type_name(other))),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|ts| ts.and_utc())
}

fn parse_legacy_status(s: &str) -> Option<OrderStatus> {
    if let Ok(status) = s.parse::<OrderStatus>() {
        return Some(status);
    }
    let status = match s.trim().to_ascii_uppercase().as_str() {
        "CREATED" | "SAVED" | "PAYER_ACTION_REQUIRED" | "発行済" | "未払い" => OrderStatus::Issued,
        "VOIDED" | "CANCELED" | "キャンセル" | "取消" => OrderStatus::Cancelled,
        "承認済" => OrderStatus::Approved,
        "支払済" | "完了" | "CAPTURED" | "PAID" => OrderStatus::Completed,
        "返金" | "返金済" | "PARTIALLY_REFUNDED" => OrderStatus::Refunded,
        "期限切れ" => OrderStatus::Expired,
        _ => return None,
    };
    Some(status)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
