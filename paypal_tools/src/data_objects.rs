//! Request and response documents of the PayPal REST API (Orders v2, Payments v2, OAuth2 and webhook notifications).
//! Only the fields the gateway relies on are modelled; everything else is ignored on deserialization.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime of the token in seconds
    pub expires_in: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

impl Money {
    pub fn new<S: Into<String>, V: Into<String>>(currency_code: S, value: V) -> Self {
        Self { currency_code: currency_code.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LinkDescription {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

//--------------------------------------        Orders         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusCode {
    #[default]
    Created,
    Saved,
    Approved,
    Voided,
    Completed,
    PayerActionRequired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureStatus {
    #[default]
    Completed,
    Declined,
    PartiallyRefunded,
    Pending,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Capture {
    pub id: String,
    pub status: CaptureStatus,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Authorization {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Payments {
    #[serde(default)]
    pub captures: Vec<Capture>,
    #[serde(default)]
    pub authorizations: Vec<Authorization>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PurchaseUnit {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub payments: Option<Payments>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalOrder {
    pub id: String,
    pub status: OrderStatusCode,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

impl PayPalOrder {
    /// The buyer-facing link. PayPal names it `approve` for classic orders and `payer-action` when a payment source
    /// experience context was supplied.
    pub fn approval_url(&self) -> Option<&str> {
        self.links.iter().find(|l| l.rel == "approve" || l.rel == "payer-action").map(|l| l.href.as_str())
    }

    pub fn captures(&self) -> impl Iterator<Item = &Capture> {
        self.purchase_units.iter().filter_map(|u| u.payments.as_ref()).flat_map(|p| p.captures.iter())
    }

    pub fn authorizations(&self) -> impl Iterator<Item = &Authorization> {
        self.purchase_units.iter().filter_map(|u| u.payments.as_ref()).flat_map(|p| p.authorizations.iter())
    }

    pub fn is_authorize_intent(&self) -> bool {
        self.intent.as_deref().map(|i| i.eq_ignore_ascii_case("AUTHORIZE")).unwrap_or(false)
    }

    /// The most recent remote modification time we can see, from the order itself or any of its captures.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.captures().filter_map(|c| c.update_time.or(c.create_time)).chain(self.update_time).max()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperienceContext {
    pub return_url: String,
    pub cancel_url: String,
    pub user_action: String,
    pub shipping_preference: String,
}

/// Body of `POST /v2/checkout/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderRequest {
    pub intent: String,
    pub purchase_units: Vec<PurchaseUnit>,
    pub payment_source: Value,
}

impl NewOrderRequest {
    /// A capture-intent order for a single invoice. `reference` ties the remote order back to our record and doubles
    /// as the idempotency key of the create call.
    pub fn for_invoice(reference: &str, description: &str, amount: Money, return_url: &str, cancel_url: &str) -> Self {
        let unit = PurchaseUnit {
            reference_id: Some(reference.to_string()),
            custom_id: Some(reference.to_string()),
            invoice_id: Some(reference.to_string()),
            description: (!description.is_empty()).then(|| description.chars().take(127).collect()),
            amount: Some(amount),
            payments: None,
        };
        let context = ExperienceContext {
            return_url: return_url.to_string(),
            cancel_url: cancel_url.to_string(),
            user_action: "PAY_NOW".to_string(),
            shipping_preference: "NO_SHIPPING".to_string(),
        };
        let payment_source = serde_json::json!({ "paypal": { "experience_context": context } });
        Self { intent: "CAPTURE".to_string(), purchase_units: vec![unit], payment_source }
    }

    pub fn reference(&self) -> Option<&str> {
        self.purchase_units.first().and_then(|u| u.reference_id.as_deref())
    }
}

//--------------------------------------        Refunds        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Cancelled,
    Failed,
    #[default]
    Pending,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Refund {
    pub id: String,
    pub status: RefundStatus,
    #[serde(default)]
    pub amount: Option<Money>,
}

//--------------------------------------        Webhooks       ---------------------------------------------------------
/// The envelope PayPal posts to webhook listeners.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub resource: Value,
}

impl WebhookEvent {
    pub fn is_order_event(&self) -> bool {
        self.event_type.starts_with("CHECKOUT.ORDER.")
    }

    pub fn is_capture_event(&self) -> bool {
        self.event_type.starts_with("PAYMENT.CAPTURE.")
    }

    /// The PayPal order this event is about. Order events carry the order as the resource; capture (and refund) events
    /// reference it through `supplementary_data.related_ids`.
    pub fn related_order_id(&self) -> Option<&str> {
        if self.is_order_event() {
            self.resource["id"].as_str()
        } else {
            self.resource["supplementary_data"]["related_ids"]["order_id"].as_str()
        }
    }

    /// The capture affected by a `PAYMENT.CAPTURE.*` event.
    pub fn capture_id(&self) -> Option<&str> {
        if !self.is_capture_event() {
            return None;
        }
        if self.resource_type.as_deref() == Some("refund") || self.event_type == "PAYMENT.CAPTURE.REFUNDED" {
            self.resource["supplementary_data"]["related_ids"]["capture_id"].as_str().or_else(|| {
                // Refund resources link back to their capture with rel="up"
                self.resource["links"]
                    .as_array()?
                    .iter()
                    .find(|l| l["rel"].as_str() == Some("up"))
                    .and_then(|l| l["href"].as_str())
                    .and_then(|href| href.rsplit('/').next())
            })
        } else {
            self.resource["id"].as_str()
        }
    }
}

/// The transmission headers PayPal attaches to each webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

impl WebhookHeaders {
    pub const AUTH_ALGO: &'static str = "PAYPAL-AUTH-ALGO";
    pub const CERT_URL: &'static str = "PAYPAL-CERT-URL";
    pub const TRANSMISSION_ID: &'static str = "PAYPAL-TRANSMISSION-ID";
    pub const TRANSMISSION_SIG: &'static str = "PAYPAL-TRANSMISSION-SIG";
    pub const TRANSMISSION_TIME: &'static str = "PAYPAL-TRANSMISSION-TIME";

    /// Builds the header set with a lookup function, returning `None` if any header is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where F: Fn(&str) -> Option<String> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Some(Self {
            auth_algo: get(Self::AUTH_ALGO)?,
            cert_url: get(Self::CERT_URL)?,
            transmission_id: get(Self::TRANSMISSION_ID)?,
            transmission_sig: get(Self::TRANSMISSION_SIG)?,
            transmission_time: get(Self::TRANSMISSION_TIME)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifySignatureRequest<'a> {
    pub auth_algo: &'a str,
    pub cert_url: &'a str,
    pub transmission_id: &'a str,
    pub transmission_sig: &'a str,
    pub transmission_time: &'a str,
    pub webhook_id: &'a str,
    pub webhook_event: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifySignatureResponse {
    pub verification_status: String,
}
