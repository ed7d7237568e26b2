//! Order, payment and customer-tracking models

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::production::{ProductType, ProductionStatus, STAGE_CATALOG};

/// Order fulfilment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    ReadyForDelivery,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "ready_for_delivery" => Some(OrderStatus::ReadyForDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::ReadyForDelivery => 2,
            OrderStatus::Delivered => 3,
            OrderStatus::Completed => 4,
            OrderStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Orders only move forward; cancellation is allowed until delivery
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            OrderStatus::Cancelled => self.rank() < OrderStatus::Delivered.rank(),
            _ => next.rank() > self.rank(),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    Pending,
    Accepted,
    Rejected,
}

impl AcceptanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptanceStatus::Pending => "pending",
            AcceptanceStatus::Accepted => "accepted",
            AcceptanceStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AcceptanceStatus::Pending),
            "accepted" => Some(AcceptanceStatus::Accepted),
            "rejected" => Some(AcceptanceStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    CodPending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::CodPending => "cod_pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "cod_pending" => Some(PaymentStatus::CodPending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Xendit,
    Maya,
    Stripe,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Xendit => "xendit",
            PaymentMethod::Maya => "maya",
            PaymentMethod::Stripe => "stripe",
        }
    }

    /// Cash on delivery waits for the courier; online methods wait for a webhook
    pub fn initial_payment_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::Cod => PaymentStatus::CodPending,
            _ => PaymentStatus::Unpaid,
        }
    }
}

// ============================================================================
// Payment provider mapping
// ============================================================================

/// Map a Xendit invoice/charge status onto the order payment status
pub fn xendit_payment_status(status: &str) -> Option<PaymentStatus> {
    match status.to_ascii_uppercase().as_str() {
        "SUCCEEDED" | "PAID" | "SETTLED" => Some(PaymentStatus::Paid),
        "FAILED" | "VOIDED" | "EXPIRED" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// Map a Maya checkout status onto the order payment status
pub fn maya_payment_status(status: &str) -> Option<PaymentStatus> {
    match status.to_ascii_uppercase().as_str() {
        "SUCCESS" | "PAYMENT_SUCCESS" => Some(PaymentStatus::Paid),
        "FAILED" | "PAYMENT_FAILED" | "VOIDED" | "CANCELLED" | "PAYMENT_EXPIRED" => {
            Some(PaymentStatus::Failed)
        }
        _ => None,
    }
}

/// Reference sent to payment providers: `ORD-<order id>-<unix seconds>`
pub fn order_reference(order_id: Uuid, at: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", order_id, at.timestamp())
}

/// Recover the order id from a provider reference
pub fn parse_order_reference(reference: &str) -> Option<Uuid> {
    let rest = reference.trim().strip_prefix("ORD-")?;
    let candidate = rest.get(..36)?;
    let id = Uuid::parse_str(candidate).ok()?;
    match rest.get(36..) {
        None | Some("") => Some(id),
        Some(suffix) if suffix.starts_with('-') => Some(id),
        _ => None,
    }
}

// ============================================================================
// Order tracking
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingType {
    Alkansya,
    Custom,
}

impl TrackingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingType::Alkansya => "alkansya",
            TrackingType::Custom => "custom",
        }
    }

    pub fn for_product(product_type: ProductType) -> Self {
        if product_type.requires_tracking() {
            TrackingType::Custom
        } else {
            TrackingType::Alkansya
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Pending,
    InProduction,
    ReadyForDelivery,
    Completed,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Pending => "pending",
            TrackingStatus::InProduction => "in_production",
            TrackingStatus::ReadyForDelivery => "ready_for_delivery",
            TrackingStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TrackingStatus::Pending),
            "in_production" => Some(TrackingStatus::InProduction),
            "ready_for_delivery" => Some(TrackingStatus::ReadyForDelivery),
            "completed" => Some(TrackingStatus::Completed),
            _ => None,
        }
    }

    /// Customer-facing status for a production
    pub fn from_production(status: ProductionStatus, requires_tracking: bool) -> Self {
        match (status, requires_tracking) {
            (ProductionStatus::Completed, false) => TrackingStatus::ReadyForDelivery,
            (ProductionStatus::Completed, true) => TrackingStatus::Completed,
            (ProductionStatus::InProgress, _) => TrackingStatus::InProduction,
            (ProductionStatus::Pending | ProductionStatus::Hold, _) => TrackingStatus::Pending,
        }
    }

    /// Message shown to the customer on the order page
    pub fn customer_message(&self) -> &'static str {
        match self {
            TrackingStatus::Pending => "Your order is queued for production",
            TrackingStatus::InProduction => "Your order is being crafted",
            TrackingStatus::ReadyForDelivery => "Your order is ready for delivery",
            TrackingStatus::Completed => "Your order has been completed",
        }
    }
}

/// Customer-facing progress for a production
pub fn tracking_progress(
    status: ProductionStatus,
    requires_tracking: bool,
    overall_progress: Decimal,
) -> Decimal {
    if status == ProductionStatus::Completed {
        return Decimal::ONE_HUNDRED;
    }
    if !requires_tracking {
        return Decimal::ZERO;
    }
    overall_progress
}

/// Human-readable duration: minutes below an hour, hours below a day, else days
pub fn format_duration(minutes: i64) -> String {
    if minutes < 60 {
        format!("{} minutes", minutes)
    } else if minutes < 1440 {
        format!("{:.1} hours", minutes as f64 / 60.0)
    } else {
        format!("{:.1} days", minutes as f64 / 1440.0)
    }
}

/// Predicted completion from the observed pace of progress.
///
/// Returns `None` until some progress has been made.
pub fn predict_completion(
    started_at: DateTime<Utc>,
    progress: Decimal,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if progress <= Decimal::ZERO {
        return None;
    }
    if progress >= Decimal::ONE_HUNDRED {
        return Some(now);
    }
    let elapsed_minutes = Decimal::from((now - started_at).num_minutes().max(0));
    let remaining = Decimal::ONE_HUNDRED - progress;
    let minutes_left = (elapsed_minutes / progress * remaining).ceil();
    let minutes_left = minutes_left.to_i64()?;
    Some(now + Duration::minutes(minutes_left))
}

/// Planned duration of the whole tracked pipeline in minutes
pub fn pipeline_minutes() -> i64 {
    STAGE_CATALOG
        .iter()
        .map(|s| i64::from(s.duration_hours) * 60)
        .sum()
}

/// One order line as priced at checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

pub fn order_total(lines: &[PricedLine]) -> Decimal {
    lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_parse_order_reference() {
        let id = Uuid::new_v4();
        let reference = order_reference(id, Utc::now());
        assert_eq!(parse_order_reference(&reference), Some(id));
        assert_eq!(parse_order_reference(&format!("ORD-{}", id)), Some(id));
        assert_eq!(parse_order_reference("ORD-123-456"), None);
        assert_eq!(parse_order_reference("INV-abc"), None);
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(xendit_payment_status("SUCCEEDED"), Some(PaymentStatus::Paid));
        assert_eq!(xendit_payment_status("VOIDED"), Some(PaymentStatus::Failed));
        assert_eq!(xendit_payment_status("PENDING"), None);
        assert_eq!(maya_payment_status("PAYMENT_SUCCESS"), Some(PaymentStatus::Paid));
        assert_eq!(maya_payment_status("cancelled"), Some(PaymentStatus::Failed));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45 minutes");
        assert_eq!(format_duration(90), "1.5 hours");
        assert_eq!(format_duration(2880), "2.0 days");
    }

    #[test]
    fn test_initial_payment_status() {
        assert_eq!(PaymentMethod::Cod.initial_payment_status(), PaymentStatus::CodPending);
        assert_eq!(PaymentMethod::Maya.initial_payment_status(), PaymentStatus::Unpaid);
    }
}
