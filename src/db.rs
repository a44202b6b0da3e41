// src/db.rs
//! Storage seams. Handlers only see these traits; `ScyllaStore` backs the
//! running service and `MemoryStore` backs tests and local runs.

mod memory;
mod scylla_store;

pub use memory::MemoryStore;
pub use scylla_store::ScyllaStore;

use crate::error::StoreError;
use crate::models::{Lot, User};
use crate::watchlist::Watchlist;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts `user` unless its email is already registered. Returns
    /// `false`, writing nothing, when the email is taken.
    async fn create_user(&self, user: &User) -> Result<bool, StoreError>;

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Replaces the watchlist only if the stored revision still equals
    /// `expected_revision`. Returns whether the write was applied.
    async fn swap_watchlist(
        &self,
        user_id: &str,
        expected_revision: u64,
        next: &Watchlist,
    ) -> Result<bool, StoreError>;
}

/// Lots are returned in lot key order.
#[async_trait]
pub trait LotStore: Send + Sync {
    async fn lots_for_user(&self, user_id: &str) -> Result<Vec<Lot>, StoreError>;

    /// Every lot whose key starts with `symbol#`.
    async fn lots_for_symbol(&self, user_id: &str, symbol: &str) -> Result<Vec<Lot>, StoreError>;

    /// Inserts or overwrites the lot stored under `(lot.user_id, lot.lot_id)`.
    async fn put_lot(&self, lot: &Lot) -> Result<(), StoreError>;

    async fn delete_lot(&self, user_id: &str, lot_id: &str) -> Result<(), StoreError>;
}

/// One backend serving both stores.
pub fn shared<S>(store: S) -> (Arc<dyn UserStore>, Arc<dyn LotStore>)
where
    S: UserStore + LotStore + 'static,
{
    let store = Arc::new(store);
    (store.clone(), store)
}
