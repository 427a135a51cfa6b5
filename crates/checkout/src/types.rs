use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    Browsing,
    ProductSelected,
    QuantityConfirmed,
    PaymentMethodSelected,
    PaymentInitiated,
    Paid,
    Failed,
    Closed,
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Browsing => "browsing",
            Self::ProductSelected => "product_selected",
            Self::QuantityConfirmed => "quantity_confirmed",
            Self::PaymentMethodSelected => "payment_method_selected",
            Self::PaymentInitiated => "payment_initiated",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CheckoutState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "browsing" => Ok(Self::Browsing),
            "product_selected" => Ok(Self::ProductSelected),
            "quantity_confirmed" => Ok(Self::QuantityConfirmed),
            "payment_method_selected" => Ok(Self::PaymentMethodSelected),
            "payment_initiated" => Ok(Self::PaymentInitiated),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown checkout state: {other}")),
        }
    }
}

/// Volatile per-conversation checkout progress. One row per conversation at
/// a time; `outbound_message_count` tracks the 3-message budget from
/// `ProductSelected` through `PaymentInitiated` (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub state: CheckoutState,
    pub product_sku: Option<String>,
    pub quantity: Option<u32>,
    pub payment_method: Option<String>,
    pub order_id: Option<String>,
    pub outbound_message_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Failed,
    Canceled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Server-computed order. `unit_price_cents`/`total_cents` are always priced
/// from the catalog at order-creation time — never from model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub checkout_session_id: String,
    pub customer_id: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Succeeded,
    Failed,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiated => "initiated",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: String,
    pub tenant_id: String,
    pub order_id: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
