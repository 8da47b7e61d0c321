use log::debug;
use sqlx::SqliteConnection;
use vendi_common::Paise;

use crate::{
    db_types::{NewPayment, OrderId, Payment, PaymentSource, PaymentStatusEntry, PaymentStatusType, StatusActor},
    traits::OrderFlowError,
};

pub async fn insert_pending_payment(
    payment: NewPayment,
    conn: &mut SqliteConnection,
) -> Result<Payment, OrderFlowError> {
    let inserted: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, gateway_order_id, amount, currency, source)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payment.order_id)
    .bind(payment.gateway_order_id)
    .bind(payment.amount)
    .bind(payment.currency)
    .bind(payment.source)
    .fetch_one(&mut *conn)
    .await?;
    insert_status_entry(
        inserted.id,
        PaymentStatusType::Pending,
        actor_for_source(inserted.source),
        "Payment initiated",
        conn,
    )
    .await?;
    debug!("📝️ Payment attempt {} recorded for order [{}]", inserted.id, inserted.order_id);
    Ok(inserted)
}

pub async fn fetch_payment_by_gateway_payment_id(
    gateway_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE gateway_payment_id = $1")
        .bind(gateway_payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_any_by_gateway_order_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE gateway_order_id = $1 ORDER BY id DESC LIMIT 1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payments_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Claims the open (unverified) payment record for a checkout session, marking it `Success` and `verified` and
/// stamping the gateway payment reference onto it, in one conditional statement.
///
/// This is deliberately the first write of the verification transaction: under concurrent duplicate deliveries the
/// writers serialize here and exactly one gets the row; the others match nothing and fall through to the duplicate
/// handling. Returns `None` when no open record exists (already verified, or unknown session).
pub(crate) async fn claim_open_payment(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    source: PaymentSource,
    method: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, OrderFlowError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments
            SET gateway_payment_id = $1, status = 'Success', verified = 1, source = $2, method = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE gateway_order_id = $4 AND verified = 0
            RETURNING *;
        "#,
    )
    .bind(gateway_payment_id)
    .bind(source)
    .bind(method)
    .bind(gateway_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(payment) = &payment {
        insert_status_entry(
            payment.id,
            PaymentStatusType::Success,
            actor_for_source(source),
            "Payment verified",
            conn,
        )
        .await?;
    }
    Ok(payment)
}

/// Marks the open payment record for a checkout session as failed. The record stays unverified, so a later retry on
/// the same session can still claim it.
pub(crate) async fn mark_failed(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    source: PaymentSource,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, OrderFlowError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments
            SET gateway_payment_id = $1, status = 'Failure', source = $2, updated_at = CURRENT_TIMESTAMP
            WHERE gateway_order_id = $3 AND verified = 0
            RETURNING *;
        "#,
    )
    .bind(gateway_payment_id)
    .bind(source)
    .bind(gateway_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(payment) = &payment {
        insert_status_entry(payment.id, PaymentStatusType::Failure, actor_for_source(source), reason, conn).await?;
    }
    Ok(payment)
}

/// Records a captured payment that arrived after its order was already paid for through a different payment attempt.
/// The order's verified payment is untouched (at most one may exist); this row exists purely for the audit trail and
/// eventual refund handling.
pub(crate) async fn insert_superseded_success(
    order_id: &OrderId,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    amount: Paise,
    currency: &str,
    source: PaymentSource,
    conn: &mut SqliteConnection,
) -> Result<Payment, OrderFlowError> {
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, gateway_order_id, gateway_payment_id, amount, currency, status, verified,
                                  source)
            VALUES ($1, $2, $3, $4, $5, 'Success', 0, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(gateway_order_id)
    .bind(gateway_payment_id)
    .bind(amount)
    .bind(currency)
    .bind(source)
    .fetch_one(&mut *conn)
    .await?;
    insert_status_entry(
        payment.id,
        PaymentStatusType::Success,
        actor_for_source(source),
        "Captured after order was already paid",
        conn,
    )
    .await?;
    Ok(payment)
}

pub async fn fetch_payment_history(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentStatusEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM payment_status_history WHERE payment_id = $1 ORDER BY id")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub(crate) async fn insert_status_entry(
    payment_id: i64,
    status: PaymentStatusType,
    actor: StatusActor,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    sqlx::query("INSERT INTO payment_status_history (payment_id, status, actor, reason) VALUES ($1, $2, $3, $4)")
        .bind(payment_id)
        .bind(status)
        .bind(actor)
        .bind(reason)
        .execute(conn)
        .await?;
    Ok(())
}

fn actor_for_source(source: PaymentSource) -> StatusActor {
    match source {
        PaymentSource::Client => StatusActor::User,
        PaymentSource::Webhook => StatusActor::Gateway,
    }
}
