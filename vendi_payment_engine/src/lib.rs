//! Vendi Payment Engine
//!
//! The core library behind the Vendi vending-machine food-ordering platform. It owns the one genuinely stateful part
//! of the system: the order lifecycle, its coupling to payment verification, and machine dispensing. Everything else
//! (storefront and admin UIs, authentication, catalog administration, SMS) lives outside and talks to this engine
//! through narrow interfaces.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly;
//!    instead, use the public API. The exception is the data types used in the database, which are defined in the
//!    [`db_types`] module and are public.
//! 2. The engine public API ([`OrderFlowApi`], [`PaymentReconciliationApi`], [`DispenseApi`]). These are generic
//!    over the storage traits in [`traits`], so any backend that implements those traits can drive the engine.
//!
//! The central design rule: an order's status is only ever changed through the engine's transition operation, which
//! validates the move against one canonical transition table and commits the status write, its side effects and the
//! history append as a single conditional transaction. Of two concurrent attempts, exactly one succeeds.

pub mod db_types;
pub mod helpers;
pub mod traits;
mod vpe_api;

#[cfg(feature = "sqlite")]
mod sqlite;

pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use vpe_api::{DispenseApi, OrderFlowApi, PaymentReconciliationApi, ReconciliationError};
