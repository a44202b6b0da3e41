// src/db/memory.rs
use super::{LotStore, UserStore};
use crate::error::StoreError;
use crate::ledger::symbol_key_range;
use crate::models::{Lot, User};
use crate::watchlist::Watchlist;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct Users {
    by_id: HashMap<String, User>,
    id_by_email: HashMap<String, String>,
}

/// In-process store with the same atomicity as the Scylla backend: each
/// call is atomic, sequences of calls are not.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Users>,
    lots: Mutex<BTreeMap<(String, String), Lot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut users = self.users.lock().await;
        if users.id_by_email.contains_key(&user.email) {
            return Ok(false);
        }
        users
            .id_by_email
            .insert(user.email.clone(), user.id.clone());
        users.by_id.insert(user.id.clone(), user.clone());
        Ok(true)
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().await.by_id.get(id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users
            .id_by_email
            .get(email)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn swap_watchlist(
        &self,
        user_id: &str,
        expected_revision: u64,
        next: &Watchlist,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.lock().await;
        match users.by_id.get_mut(user_id) {
            Some(user) if user.watchlist.revision() == expected_revision => {
                user.watchlist = next.clone();
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LotStore for MemoryStore {
    async fn lots_for_user(&self, user_id: &str) -> Result<Vec<Lot>, StoreError> {
        let lots = self.lots.lock().await;
        Ok(lots
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|(_, lot)| lot.clone())
            .collect())
    }

    async fn lots_for_symbol(&self, user_id: &str, symbol: &str) -> Result<Vec<Lot>, StoreError> {
        let (start, end) = symbol_key_range(symbol);
        let lots = self.lots.lock().await;
        Ok(lots
            .range((user_id.to_string(), start)..(user_id.to_string(), end))
            .map(|(_, lot)| lot.clone())
            .collect())
    }

    async fn put_lot(&self, lot: &Lot) -> Result<(), StoreError> {
        self.lots
            .lock()
            .await
            .insert((lot.user_id.clone(), lot.lot_id.clone()), lot.clone());
        Ok(())
    }

    async fn delete_lot(&self, user_id: &str, lot_id: &str) -> Result<(), StoreError> {
        self.lots
            .lock()
            .await
            .remove(&(user_id.to_string(), lot_id.to_string()));
        Ok(())
    }
}
