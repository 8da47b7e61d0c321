use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{MachineCode, Order, OrderId},
    traits::{DispenseStart, OrderFlowDatabase, OrderFlowError},
};

/// `DispenseApi` is the machine-facing flow: a vending machine presents a pickup code to start dispensing, and
/// reports back when the dispense has finished.
///
/// Failure responses from [`DispenseApi::start`] are deliberately uniform. A wrong code, a valid code on the wrong
/// machine and an already-consumed code all produce the same [`OrderFlowError::InvalidPickupCode`], so the endpoint
/// leaks nothing to a caller guessing codes.
pub struct DispenseApi<B> {
    db: B,
}

impl<B> Debug for DispenseApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispenseApi")
    }
}

impl<B> DispenseApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> DispenseApi<B>
where B: OrderFlowDatabase
{
    /// Validates a pickup code presented at a machine and starts the dispense.
    ///
    /// On success the order moves `ReadyForPickup → Preparing`, which is also the moment the code is consumed
    /// (cleared). A second call with the same code — including the same machine retrying in quick succession — finds
    /// no matching ready order and gets the generic invalid-code error, never a second dispense.
    pub async fn start(&self, machine_code: &MachineCode, pickup_code: &str) -> Result<DispenseStart, OrderFlowError> {
        if pickup_code.len() < 4 || pickup_code.len() > 6 || !pickup_code.chars().all(|c| c.is_ascii_digit()) {
            debug!("🏭️ Malformed pickup code presented at machine {machine_code}");
            return Err(OrderFlowError::InvalidPickupCode);
        }
        let machine = self
            .db
            .fetch_machine(machine_code)
            .await?
            .ok_or_else(|| OrderFlowError::MachineNotFound(machine_code.clone()))?;
        if !machine.is_active {
            warn!("🏭️ Dispense attempt on inactive machine {machine_code}");
            return Err(OrderFlowError::MachineInactive(machine_code.clone()));
        }
        let started = self.db.start_dispense(&machine, pickup_code).await?;
        info!("🏭️ Machine {machine_code} started dispensing order [{}]", started.order.order_id);
        Ok(started)
    }

    /// Marks an order's dispense as finished: `Preparing → Completed`. The second of two duplicate calls finds the
    /// order already completed and is rejected as a stale transition.
    pub async fn dispense_complete(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.complete_dispense(order_id).await?;
        info!("🏭️ Order [{}] completed and dispensed", order.order_id);
        Ok(order)
    }
}
