use serde::{Deserialize, Serialize};

/// A tenant-scoped, sellable catalog item. This is the platform's ground
/// truth for price and availability claims the AI agent makes to customers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub in_stock: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A single factual claim the agent drafted, extracted before the message
/// is sent to the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Price { item_name: String, claimed_cents: i64 },
    Availability { item_name: String, claimed_in_stock: bool },
}

/// Outcome of validating one claim against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundingVerdict {
    /// The claim matches the catalog record exactly.
    Grounded,
    /// The claim contradicts the catalog; callers should rewrite or drop it
    /// rather than let it reach the customer.
    Contradicted { catalog_value: String },
    /// No catalog item matched the claim's subject closely enough to judge
    /// it — treated as ungrounded rather than silently passed.
    NoMatchingItem,
}
