use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use ipg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------       DayStamp        ---------------------------------------------------------
/// The `YYYYMMDD` key of a history partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayStamp(String);

#[derive(Debug, Clone, Error)]
#[error("Invalid day stamp (expected YYYYMMDD): {0}")]
pub struct DayStampError(String);

impl DayStamp {
    pub fn from_datetime(ts: &DateTime<Utc>) -> Self {
        Self(ts.format("%Y%m%d").to_string())
    }

    pub fn today() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Midnight (UTC) at the start of the day.
    pub fn start_of_day(&self) -> DateTime<Utc> {
        NaiveDate::parse_from_str(&self.0, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .unwrap_or_default()
    }
}

impl FromStr for DayStamp {
    type Err = DayStampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == 8
            && s.bytes().all(|b| b.is_ascii_digit())
            && NaiveDate::parse_from_str(s, "%Y%m%d").is_ok();
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(DayStampError(s.to_string()))
        }
    }
}

impl TryFrom<String> for DayStamp {
    type Error = DayStampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayStamp> for String {
    fn from(value: DayStamp) -> Self {
        value.0
    }
}

impl Display for DayStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------        LocalId        ---------------------------------------------------------
/// The store-assigned identifier of an invoice record. Freshly minted ids have the form `YYYYMMDD-xxxxxxxx`, where the
/// prefix is the partition the record lives in. Ids read from older history files may have any shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub String);

impl LocalId {
    pub fn generate(day: &DayStamp) -> Self {
        Self(format!("{day}-{:08x}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The partition encoded in the id, if it has one.
    pub fn day_hint(&self) -> Option<DayStamp> {
        self.0.get(..8).filter(|_| self.0.as_bytes().get(8) == Some(&b'-')).and_then(|d| d.parse().ok())
    }
}

impl From<String> for LocalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LocalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------      OrderStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Stored locally, no PayPal order yet.
    Draft,
    /// A PayPal order exists and its approval link has been handed out.
    Issued,
    /// The buyer approved the payment at PayPal.
    Approved,
    /// Funds were captured.
    Completed,
    /// All or part of the capture was refunded.
    Refunded,
    Cancelled,
    Expired,
    /// Something went wrong. The last good status is kept in `prior_status`.
    Error,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        Self::Draft,
        Self::Issued,
        Self::Approved,
        Self::Completed,
        Self::Refunded,
        Self::Cancelled,
        Self::Expired,
        Self::Error,
    ];

    /// No transition may leave these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refunded | Self::Cancelled | Self::Expired)
    }

    /// Terminal, or captured. Settled orders can no longer take money, so bulk operations leave them alone.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || *self == Self::Completed
    }

    /// Records in these states must carry the PayPal order id.
    pub fn requires_remote_id(&self) -> bool {
        matches!(self, Self::Approved | Self::Completed | Self::Refunded | Self::Cancelled)
    }

    /// Position in the lifecycle, used to break ties between observations made at the same instant.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Draft | Self::Error => 0,
            Self::Issued => 1,
            Self::Approved => 2,
            Self::Completed | Self::Cancelled | Self::Expired => 3,
            Self::Refunded => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Issued => "ISSUED",
            Self::Approved => "APPROVED",
            Self::Completed => "COMPLETED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Error => "ERROR",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|st| st.as_str() == upper).ok_or_else(|| ConversionError(s.to_string()))
    }
}

//--------------------------------------      InvoiceOrder     ---------------------------------------------------------
/// The local record tying an ingested invoice to a remote PayPal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceOrder {
    pub local_id: LocalId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub customer: String,
    pub amount_minor: MinorUnits,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paypal_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_status: Option<OrderStatus>,
    pub last_status_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
    /// Remote timestamp of the newest observation applied to this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_remote_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl InvoiceOrder {
    pub fn new_draft(local_id: LocalId, created_at: DateTime<Utc>, invoice: NewInvoice) -> Self {
        Self {
            local_id,
            created_at,
            customer: invoice.customer,
            amount_minor: invoice.amount_minor,
            currency: invoice.currency,
            paypal_order_id: None,
            approval_url: None,
            status: OrderStatus::Draft,
            prior_status: None,
            last_status_at: created_at,
            last_event_id: None,
            last_remote_at: None,
            capture_id: None,
            note: None,
        }
    }

    /// The partition this record belongs to: the day it was created.
    pub fn day(&self) -> DayStamp {
        DayStamp::from_datetime(&self.created_at)
    }

    pub fn amount_display(&self) -> String {
        format!("{} {}", self.amount_minor.to_decimal_string(&self.currency), self.currency)
    }
}

impl Display for InvoiceOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} for '{}' ({})", self.local_id, self.amount_display(), self.customer, self.status)
    }
}

//--------------------------------------       NewInvoice      ---------------------------------------------------------
/// The outcome of invoice extraction: who pays, and how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    #[serde(default)]
    pub customer: String,
    pub amount_minor: MinorUnits,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    ipg_common::DEFAULT_CURRENCY.to_string()
}

impl NewInvoice {
    pub fn new<S: Into<String>>(customer: S, amount_minor: u64, currency: &str) -> Self {
        Self { customer: customer.into(), amount_minor: MinorUnits::from(amount_minor), currency: currency.to_string() }
    }

    /// Checks the invoice can be turned into a PayPal order.
    pub fn validate(&self) -> Result<(), String> {
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(format!("'{}' is not an ISO 4217 currency code", self.currency));
        }
        if self.amount_minor.value() == 0 {
            return Err("The invoice amount must be greater than zero".to_string());
        }
        Ok(())
    }
}

//--------------------------------------      StatusUpdate     ---------------------------------------------------------
/// A requested status transition, with the provenance used for idempotence and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    /// The webhook event this update came from
    pub event_id: Option<String>,
    /// When the remote system made the observation
    pub remote_time: Option<DateTime<Utc>>,
    pub capture_id: Option<String>,
    pub note: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self { status, event_id: None, remote_time: None, capture_id: None, note: None }
    }

    pub fn with_event_id<S: Into<String>>(mut self, event_id: S) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_remote_time(mut self, remote_time: Option<DateTime<Utc>>) -> Self {
        self.remote_time = remote_time;
        self
    }

    pub fn with_capture_id(mut self, capture_id: Option<String>) -> Self {
        self.capture_id = capture_id;
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// The result of `update_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub changed: bool,
    pub previous: OrderStatus,
    pub order: InvoiceOrder,
}
