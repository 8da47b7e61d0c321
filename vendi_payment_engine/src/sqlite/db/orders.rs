use chrono::Duration;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderItemLine, OrderStatusEntry, OrderStatusType, StatusActor},
    helpers::codes,
    traits::OrderFlowError,
};

/// Inserts a new order, its line items and the seeding `Pending` history entry.
///
/// This is not atomic on its own; callers embed it in a transaction and pass `&mut tx` as the connection. The
/// partial unique index on blocking orders means that if two creations race past the application-level check, the
/// second insert fails and is reported as a conflict rather than corrupting the one-open-order rule.
pub async fn insert_order(
    order: NewOrder,
    lines: &[OrderItemLine],
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    if let Some(existing) = fetch_blocking_order_for_user(&order.user_id, &mut *conn).await? {
        return Err(OrderFlowError::ActiveOrderExists(existing.status));
    }
    let inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_id, user_id, machine_id, price, gst, total)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(order.machine_id)
    .bind(order.price)
    .bind(order.gst)
    .bind(order.total)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            OrderFlowError::ActiveOrderExists(OrderStatusType::Pending)
        } else {
            e.into()
        }
    })?;
    for line in lines {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, item_id, item_name, quantity, unit_price, unit_gst)
                VALUES ($1, $2, $3, $4, $5, $6);
            "#,
        )
        .bind(inserted.order_id.as_str())
        .bind(line.item_id)
        .bind(&line.item_name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.unit_gst)
        .execute(&mut *conn)
        .await?;
    }
    insert_status_entry(&inserted.order_id, OrderStatusType::Pending, StatusActor::User, "Order created", conn)
        .await?;
    debug!("📝️ Order [{}] inserted with id {}", inserted.order_id, inserted.id);
    Ok(inserted)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_latest_order_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_blocking_order_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "SELECT * FROM orders WHERE user_id = $1 AND status IN ('Pending', 'ReadyForPickup', 'Preparing') LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_items(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItemLine>, sqlx::Error> {
    let lines = sqlx::query_as(
        "SELECT item_id, item_name, quantity, unit_price, unit_gst FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(lines)
}

/// Moves `order` to `target`, applying the target's side effects and appending the history entry.
///
/// The caller supplies its snapshot of the order; the status write is conditioned on that snapshot's status, so a
/// concurrent transition that commits first makes this one match zero rows. In that case the order is re-read and
/// the attempt is classified as stale (the order is already at or past `target`) or invalid — exactly one of two
/// racing attempts can ever succeed.
pub(crate) async fn apply_transition(
    order: &Order,
    target: OrderStatusType,
    actor: StatusActor,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    if order.status.is_stale_target(target) {
        return Err(OrderFlowError::StaleTransition { order_id: order.order_id.clone(), target });
    }
    if !order.status.can_transition_to(target) {
        return Err(OrderFlowError::InvalidTransition {
            order_id: order.order_id.clone(),
            from: order.status,
            to: target,
        });
    }
    let expected = order.status;
    let updated: Option<Order> = match target {
        OrderStatusType::ReadyForPickup => {
            let code = mint_pickup_code(order.machine_id, &mut *conn).await?;
            sqlx::query_as(
                r#"
                    UPDATE orders
                    SET status = $1, pickup_code = $2, paid_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
                    WHERE id = $3 AND status = $4
                    RETURNING *;
                "#,
            )
            .bind(target)
            .bind(code)
            .bind(order.id)
            .bind(expected)
            .fetch_optional(&mut *conn)
            .await?
        },
        OrderStatusType::Preparing => {
            sqlx::query_as(
                r#"
                    UPDATE orders
                    SET status = $1, pickup_code = NULL, preparing_at = CURRENT_TIMESTAMP,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $2 AND status = $3
                    RETURNING *;
                "#,
            )
            .bind(target)
            .bind(order.id)
            .bind(expected)
            .fetch_optional(&mut *conn)
            .await?
        },
        OrderStatusType::Completed => {
            sqlx::query_as(
                r#"
                    UPDATE orders
                    SET status = $1, completed = 1, completed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
                    WHERE id = $2 AND status = $3
                    RETURNING *;
                "#,
            )
            .bind(target)
            .bind(order.id)
            .bind(expected)
            .fetch_optional(&mut *conn)
            .await?
        },
        OrderStatusType::Cancelled => {
            sqlx::query_as(
                r#"
                    UPDATE orders
                    SET status = $1, pickup_code = NULL, updated_at = CURRENT_TIMESTAMP
                    WHERE id = $2 AND status = $3
                    RETURNING *;
                "#,
            )
            .bind(target)
            .bind(order.id)
            .bind(expected)
            .fetch_optional(&mut *conn)
            .await?
        },
        OrderStatusType::Pending => {
            return Err(OrderFlowError::InvalidTransition {
                order_id: order.order_id.clone(),
                from: order.status,
                to: target,
            })
        },
    };
    let updated = match updated {
        Some(o) => o,
        None => {
            // Lost a race: someone advanced the order between our read and this write.
            let current = fetch_order_by_order_id(&order.order_id, &mut *conn)
                .await?
                .ok_or_else(|| OrderFlowError::OrderNotFound(order.order_id.clone()))?;
            trace!(
                "📝️ Conditional status write for order [{}] matched nothing; current status is {}",
                order.order_id,
                current.status
            );
            return Err(if current.status.is_stale_target(target) {
                OrderFlowError::StaleTransition { order_id: order.order_id.clone(), target }
            } else {
                OrderFlowError::InvalidTransition {
                    order_id: order.order_id.clone(),
                    from: current.status,
                    to: target,
                }
            });
        },
    };
    insert_status_entry(&updated.order_id, target, actor, reason, conn).await?;
    Ok(updated)
}

/// Atomically consumes a pickup code at a machine: the matching `ReadyForPickup` order moves to `Preparing` and the
/// code is cleared, in one conditional statement. This is the first write of the dispense transaction, so two
/// machines (or one machine calling twice) racing on the same code serialize on the row and exactly one wins.
pub(crate) async fn consume_pickup_code(
    machine_id: i64,
    pickup_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Preparing', pickup_code = NULL, preparing_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE machine_id = $1 AND pickup_code = $2 AND status = 'ReadyForPickup'
            RETURNING *;
        "#,
    )
    .bind(machine_id)
    .bind(pickup_code)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(order) = &order {
        insert_status_entry(
            &order.order_id,
            OrderStatusType::Preparing,
            StatusActor::Machine,
            "Pickup code accepted by machine",
            conn,
        )
        .await?;
    }
    Ok(order)
}

/// Cancels `Pending` orders that have been waiting for payment for longer than `older_than`.
pub(crate) async fn expire_pending(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderFlowError> {
    let stale: Vec<Order> = sqlx::query_as(
        format!(
            "SELECT * FROM orders WHERE status = 'Pending' AND (unixepoch(CURRENT_TIMESTAMP) - \
             unixepoch(created_at)) > {}",
            older_than.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut expired = Vec::with_capacity(stale.len());
    for order in stale {
        match apply_transition(
            &order,
            OrderStatusType::Cancelled,
            StatusActor::System,
            "Payment window elapsed",
            &mut *conn,
        )
        .await
        {
            Ok(o) => expired.push(o),
            // A payment was verified between the select and the write. The order lives on.
            Err(OrderFlowError::StaleTransition { .. }) | Err(OrderFlowError::InvalidTransition { .. }) => {},
            Err(e) => return Err(e),
        }
    }
    Ok(expired)
}

pub async fn fetch_status_history(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub(crate) async fn insert_status_entry(
    order_id: &OrderId,
    status: OrderStatusType,
    actor: StatusActor,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, actor, reason) VALUES ($1, $2, $3, $4)")
        .bind(order_id.as_str())
        .bind(status)
        .bind(actor)
        .bind(reason)
        .execute(conn)
        .await?;
    Ok(())
}

/// Picks a pickup code that is not currently active for any order on the machine. Candidates are drawn up front so
/// no RNG state is held across the queries; 4-digit codes are preferred, widening to 5 and 6 digits if the machine
/// is unusually congested.
async fn mint_pickup_code(machine_id: i64, conn: &mut SqliteConnection) -> Result<String, OrderFlowError> {
    let candidates: Vec<String> = {
        let mut rng = rand::thread_rng();
        [4u32, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 6]
            .iter()
            .map(|&digits| codes::random_pickup_code(&mut rng, digits))
            .collect()
    };
    for candidate in candidates {
        let clash: Option<i64> =
            sqlx::query_scalar("SELECT id FROM orders WHERE machine_id = $1 AND pickup_code = $2")
                .bind(machine_id)
                .bind(&candidate)
                .fetch_optional(&mut *conn)
                .await?;
        if clash.is_none() {
            return Ok(candidate);
        }
    }
    Err(OrderFlowError::CodeAllocation(format!("No free pickup code found for machine {machine_id}")))
}
