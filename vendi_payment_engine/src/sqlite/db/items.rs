use sqlx::SqliteConnection;
use vendi_common::Paise;

use crate::{
    db_types::{Item, NewItem},
    traits::OrderFlowError,
};

pub async fn fetch_item(item_id: i64, conn: &mut SqliteConnection) -> Result<Option<Item>, sqlx::Error> {
    let item = sqlx::query_as("SELECT * FROM items WHERE id = $1").bind(item_id).fetch_optional(conn).await?;
    Ok(item)
}

/// Adds a catalog item. Catalog administration is handled elsewhere; this exists for provisioning and tests.
pub async fn add_item(item: NewItem, conn: &mut SqliteConnection) -> Result<Item, OrderFlowError> {
    let item = sqlx::query_as("INSERT INTO items (name, price, gst) VALUES ($1, $2, $3) RETURNING *")
        .bind(item.name)
        .bind(item.price)
        .bind(item.gst)
        .fetch_one(conn)
        .await?;
    Ok(item)
}

pub async fn set_item_price(
    item_id: i64,
    price: Paise,
    gst: Paise,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    sqlx::query("UPDATE items SET price = $1, gst = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3")
        .bind(price)
        .bind(gst)
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_item_availability(
    item_id: i64,
    is_available: bool,
    conn: &mut SqliteConnection,
) -> Result<(), OrderFlowError> {
    sqlx::query("UPDATE items SET is_available = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(is_available)
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(())
}
