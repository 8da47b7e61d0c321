use sqlx::SqliteConnection;

use crate::{
    db_types::{Machine, MachineCode, NewMachine, OrderId},
    traits::OrderFlowError,
};

pub async fn fetch_machine_by_code(
    code: &MachineCode,
    conn: &mut SqliteConnection,
) -> Result<Option<Machine>, sqlx::Error> {
    let machine = sqlx::query_as("SELECT * FROM machines WHERE machine_code = $1")
        .bind(code.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(machine)
}

/// Registers a machine. Machine administration is handled elsewhere; this exists for provisioning and tests.
pub async fn register_machine(machine: NewMachine, conn: &mut SqliteConnection) -> Result<Machine, OrderFlowError> {
    let machine = sqlx::query_as(
        "INSERT INTO machines (machine_code, name, location) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(machine.machine_code)
    .bind(machine.name)
    .bind(machine.location)
    .fetch_one(conn)
    .await?;
    Ok(machine)
}

pub async fn set_machine_active(
    machine_id: i64,
    is_active: bool,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    sqlx::query("UPDATE machines SET is_active = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(is_active)
        .bind(machine_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn set_dispensing(
    machine_id: i64,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Machine, OrderFlowError> {
    let machine: Option<Machine> = sqlx::query_as(
        r#"
            UPDATE machines
            SET status = 'Dispensing', current_order_id = $1, last_order_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(machine_id)
    .fetch_optional(conn)
    .await?;
    machine.ok_or(OrderFlowError::DatabaseError(format!("Machine {machine_id} disappeared mid-dispense")))
}

pub(crate) async fn set_idle(machine_id: i64, conn: &mut SqliteConnection) -> Result<(), OrderFlowError> {
    sqlx::query(
        "UPDATE machines SET status = 'Idle', current_order_id = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(machine_id)
    .execute(conn)
    .await?;
    Ok(())
}
