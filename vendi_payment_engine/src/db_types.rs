use std::{convert::Infallible, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use vendi_common::{Paise, INR_CURRENCY_CODE};

use crate::helpers::new_order_id;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The public, opaque identifier for an order. Generated when the order is placed and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      MachineCode      -------------------------------------------------------
/// The public identifier a vending machine presents when calling the server.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MachineCode(pub String);

impl Display for MachineCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for MachineCode {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl MachineCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
/// The canonical order status enumeration. This enum, together with [`OrderStatusType::can_transition_to`], is the
/// single source of truth for the order state machine. No handler may compare raw status strings.
///
/// There is deliberately no separate `Paid` status. An order that has been paid for is immediately awaiting pickup,
/// and carries its pickup code, so the two are one state: `ReadyForPickup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been placed, and no verified payment exists for it yet.
    Pending,
    /// Payment has been verified. The order holds an active pickup code and waits at the machine.
    ReadyForPickup,
    /// The machine has accepted the pickup code and is dispensing. The code has been consumed.
    Preparing,
    /// The machine reported a successful dispense. Terminal.
    Completed,
    /// The order was abandoned, failed or administratively cancelled. Terminal.
    Cancelled,
}

impl OrderStatusType {
    /// The legal transition table:
    ///
    /// | From \ To      | ReadyForPickup | Preparing | Completed | Cancelled |
    /// |----------------|----------------|-----------|-----------|-----------|
    /// | Pending        | ✓ (payment)    |           |           | ✓         |
    /// | ReadyForPickup |                | ✓ (code)  |           | ✓         |
    /// | Preparing      |                |           | ✓         | ✓         |
    /// | Completed      |                |           |           |           |
    /// | Cancelled      |                |           |           |           |
    pub fn can_transition_to(self, target: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, target),
            (Pending, ReadyForPickup)
                | (Pending, Cancelled)
                | (ReadyForPickup, Preparing)
                | (ReadyForPickup, Cancelled)
                | (Preparing, Completed)
                | (Preparing, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Cancelled)
    }

    /// An order in a blocking status prevents its owner from placing another order.
    pub fn is_blocking(self) -> bool {
        matches!(self, OrderStatusType::Pending | OrderStatusType::ReadyForPickup | OrderStatusType::Preparing)
    }

    /// Position on the happy-path spine. `Cancelled` is off the spine and has no rank.
    /// Used to tell a stale, re-delivered transition (target at or behind the current status) from a genuinely
    /// forbidden one.
    pub fn rank(self) -> Option<u8> {
        match self {
            OrderStatusType::Pending => Some(0),
            OrderStatusType::ReadyForPickup => Some(1),
            OrderStatusType::Preparing => Some(2),
            OrderStatusType::Completed => Some(3),
            OrderStatusType::Cancelled => None,
        }
    }

    /// True when a request to move to `target` re-delivers a transition that has already happened, i.e. the order is
    /// already at, or beyond, the requested status.
    pub fn is_stale_target(self, target: OrderStatusType) -> bool {
        if self == target {
            return true;
        }
        match (self.rank(), target.rank()) {
            (Some(current), Some(target)) => target <= current,
            _ => false,
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::ReadyForPickup => write!(f, "ReadyForPickup"),
            OrderStatusType::Preparing => write!(f, "Preparing"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "ReadyForPickup" => Ok(Self::ReadyForPickup),
            "Preparing" => Ok(Self::Preparing),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------      StatusActor      -------------------------------------------------------
/// Who drove a status change. Recorded in every history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum StatusActor {
    User,
    Gateway,
    Machine,
    Admin,
    System,
}

impl Display for StatusActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusActor::User => write!(f, "User"),
            StatusActor::Gateway => write!(f, "Gateway"),
            StatusActor::Machine => write!(f, "Machine"),
            StatusActor::Admin => write!(f, "Admin"),
            StatusActor::System => write!(f, "System"),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: String,
    pub machine_id: i64,
    /// Net price, frozen at order time from the catalog.
    pub price: Paise,
    /// GST portion, frozen at order time from the catalog.
    pub gst: Paise,
    /// Always `price + gst`. Never recomputed after creation, even if the catalog changes.
    pub total: Paise,
    pub status: OrderStatusType,
    /// Present exactly while the order is `ReadyForPickup`. Cleared when consumed or cancelled.
    pub pickup_code: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub preparing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: String,
    /// The internal id of the machine the order is placed against.
    pub machine_id: i64,
    pub price: Paise,
    pub gst: Paise,
    pub total: Paise,
}

impl NewOrder {
    pub fn new(user_id: String, machine_id: i64, price: Paise, gst: Paise) -> Self {
        Self { order_id: new_order_id(), user_id, machine_id, price, gst, total: price + gst }
    }
}

//--------------------------------------    OrderItemLine      -------------------------------------------------------
/// One line of an order, with the unit price and GST snapshotted at order time so that later catalog edits can never
/// change what the customer was charged.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItemLine {
    pub item_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: Paise,
    pub unit_gst: Paise,
}

//--------------------------------------   OrderStatusEntry    -------------------------------------------------------
/// Append-only audit record of a single status change. The first entry for an order is always `Pending`, written in
/// the same transaction that inserts the order, and the last entry always matches the order's current status.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderStatusEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub actor: StatusActor,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  PaymentStatusType    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatusType {
    Pending,
    Success,
    Failure,
    Cancelled,
    Refunded,
}

impl Display for PaymentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatusType::Pending => write!(f, "Pending"),
            PaymentStatusType::Success => write!(f, "Success"),
            PaymentStatusType::Failure => write!(f, "Failure"),
            PaymentStatusType::Cancelled => write!(f, "Cancelled"),
            PaymentStatusType::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Success" => Ok(Self::Success),
            "Failure" => Ok(Self::Failure),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentSource      -------------------------------------------------------
/// Which channel produced a payment record. Audit only: both channels authenticate independently, so neither is more
/// trusted than the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentSource {
    /// The client-confirmed verify call.
    Client,
    /// The asynchronous gateway webhook.
    Webhook,
}

impl Display for PaymentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentSource::Client => write!(f, "Client"),
            PaymentSource::Webhook => write!(f, "Webhook"),
        }
    }
}

//--------------------------------------       Payment         -------------------------------------------------------
/// A payment attempt against an order. An order may accumulate several payment records (retries, failures), but at
/// most one of them is ever `verified`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: OrderId,
    /// The gateway's reference for the checkout session.
    pub gateway_order_id: String,
    /// The gateway's reference for the payment attempt. The natural deduplication key for webhook redelivery.
    pub gateway_payment_id: Option<String>,
    pub amount: Paise,
    pub currency: String,
    pub status: PaymentStatusType,
    /// Set only once an authenticity check has passed for a `Success` transition.
    pub verified: bool,
    pub source: PaymentSource,
    pub method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewPayment       -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub gateway_order_id: String,
    pub amount: Paise,
    pub currency: String,
    pub source: PaymentSource,
}

impl NewPayment {
    pub fn new(order_id: OrderId, gateway_order_id: String, amount: Paise) -> Self {
        Self { order_id, gateway_order_id, amount, currency: INR_CURRENCY_CODE.to_string(), source: PaymentSource::Client }
    }
}

//--------------------------------------  PaymentStatusEntry   -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentStatusEntry {
    pub id: i64,
    pub payment_id: i64,
    pub status: PaymentStatusType,
    pub actor: StatusActor,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  MachineStatusType    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum MachineStatusType {
    Idle,
    Dispensing,
    Maintenance,
}

impl Display for MachineStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineStatusType::Idle => write!(f, "Idle"),
            MachineStatusType::Dispensing => write!(f, "Dispensing"),
            MachineStatusType::Maintenance => write!(f, "Maintenance"),
        }
    }
}

//--------------------------------------       Machine         -------------------------------------------------------
/// A vending machine. Registration and administration of machines is not part of this engine; only the identity and
/// the active flag matter to the order flow.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Machine {
    pub id: i64,
    pub machine_code: MachineCode,
    pub name: String,
    pub location: String,
    pub is_active: bool,
    pub status: MachineStatusType,
    pub current_order_id: Option<OrderId>,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewMachine       -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMachine {
    pub machine_code: MachineCode,
    pub name: String,
    pub location: String,
}

//--------------------------------------         Item          -------------------------------------------------------
/// A catalog item. Catalog administration is out of scope; the order flow only reads price, GST and availability.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: Paise,
    pub gst: Paise,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewItem        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub price: Paise,
    pub gst: Paise,
}

#[cfg(test)]
mod test {
    use super::OrderStatusType::*;

    #[test]
    fn transition_table() {
        assert!(Pending.can_transition_to(ReadyForPickup));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(ReadyForPickup.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Completed));
        assert!(Preparing.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Preparing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!ReadyForPickup.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn stale_targets() {
        assert!(Preparing.is_stale_target(ReadyForPickup));
        assert!(Completed.is_stale_target(Preparing));
        assert!(ReadyForPickup.is_stale_target(ReadyForPickup));
        assert!(Cancelled.is_stale_target(Cancelled));
        assert!(!Pending.is_stale_target(ReadyForPickup));
        assert!(!ReadyForPickup.is_stale_target(Preparing));
        assert!(!Cancelled.is_stale_target(Completed));
    }
}
