//! Seed helpers for machines and catalog items. Registration and catalog CRUD are not part of the engine's public
//! API, so tests reach through to the low-level database functions.

use vendi_common::Paise;

use crate::{
    db_types::{Item, Machine, MachineCode, NewItem, NewMachine},
    sqlite::db::{items, machines},
    SqliteDatabase,
};

pub async fn seed_machine(db: &SqliteDatabase, code: &str) -> Machine {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    machines::register_machine(
        NewMachine {
            machine_code: MachineCode::from(code),
            name: format!("Test machine {code}"),
            location: "Test lab".to_string(),
        },
        &mut conn,
    )
    .await
    .expect("Error seeding machine")
}

pub async fn set_machine_active(db: &SqliteDatabase, machine_id: i64, active: bool) {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    machines::set_machine_active(machine_id, active, &mut conn).await.expect("Error toggling machine");
}

pub async fn seed_item(db: &SqliteDatabase, name: &str, price_rupees: i64, gst_rupees: i64) -> Item {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    items::add_item(
        NewItem { name: name.to_string(), price: Paise::from_rupees(price_rupees), gst: Paise::from_rupees(gst_rupees) },
        &mut conn,
    )
    .await
    .expect("Error seeding item")
}

pub async fn reprice_item(db: &SqliteDatabase, item_id: i64, price: Paise, gst: Paise) {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    items::set_item_price(item_id, price, gst, &mut conn).await.expect("Error repricing item");
}

pub async fn set_item_available(db: &SqliteDatabase, item_id: i64, available: bool) {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    items::set_item_availability(item_id, available, &mut conn).await.expect("Error toggling item");
}
