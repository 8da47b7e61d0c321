use chrono::Duration;
use log::*;
use tokio::task::JoinHandle;
use vendi_payment_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};

/// Starts the pending-order expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Orders that sit in `Pending` past the configured payment window are cancelled through the normal transition
/// path (actor `System`), so they release the owner's one-blocking-order slot and show up properly in the audit
/// history.
pub fn start_expiry_worker(db: SqliteDatabase, pending_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = OrderFlowApi::new(db);
        info!("🕰️ Pending order expiry worker started (window: {} min)", pending_timeout.num_minutes());
        loop {
            timer.tick().await;
            match api.expire_stale_orders(pending_timeout).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No pending orders to expire"),
                Ok(expired) => {
                    info!("🕰️ {} pending orders expired", expired.len());
                    debug!("🕰️ Expired orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running pending order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] user: {} total: {}", o.order_id, o.user_id, o.total))
        .collect::<Vec<String>>()
        .join(", ")
}
