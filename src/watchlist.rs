// src/watchlist.rs
use crate::db::UserStore;
use crate::error::ApiError;
use crate::models::{present, AddSymbolRequest, WatchedSymbol};
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_SECTOR: &str = "Unknown";

#[derive(Debug, Error, PartialEq)]
pub enum WatchlistError {
    #[error("Symbol already exists")]
    Duplicate,
    #[error("Symbol not found")]
    Missing,
}

impl From<WatchlistError> for ApiError {
    fn from(err: WatchlistError) -> Self {
        match err {
            WatchlistError::Duplicate => ApiError::business_rule(err.to_string()),
            WatchlistError::Missing => ApiError::not_found(err.to_string()),
        }
    }
}

/// The symbols a user tracks, plus the revision the store compares on write.
///
/// Mutations return a new list with the revision bumped; the original is
/// kept so its revision can be used as the expected value of the swap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watchlist {
    symbols: Vec<WatchedSymbol>,
    revision: u64,
}

impl Watchlist {
    pub fn new(symbols: Vec<WatchedSymbol>, revision: u64) -> Self {
        Watchlist { symbols, revision }
    }

    pub fn symbols(&self) -> &[WatchedSymbol] {
        &self.symbols
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s.symbol == symbol)
    }

    pub fn with_added(&self, entry: WatchedSymbol) -> Result<Watchlist, WatchlistError> {
        if self.contains(&entry.symbol) {
            return Err(WatchlistError::Duplicate);
        }
        let mut symbols = self.symbols.clone();
        symbols.push(entry);
        Ok(Watchlist::new(symbols, self.revision + 1))
    }

    pub fn with_removed(&self, symbol: &str) -> Result<Watchlist, WatchlistError> {
        if !self.contains(symbol) {
            return Err(WatchlistError::Missing);
        }
        let symbols = self
            .symbols
            .iter()
            .filter(|s| s.symbol != symbol)
            .cloned()
            .collect();
        Ok(Watchlist::new(symbols, self.revision + 1))
    }
}

pub struct WatchlistService {
    users: Arc<dyn UserStore>,
}

impl WatchlistService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        WatchlistService { users }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<WatchedSymbol>, ApiError> {
        let watchlist = self.load(user_id, "Could not retrieve symbols").await?;
        Ok(watchlist.symbols().to_vec())
    }

    pub async fn add(
        &self,
        user_id: &str,
        request: AddSymbolRequest,
    ) -> Result<Vec<WatchedSymbol>, ApiError> {
        let (symbol, name) = match (present(&request.symbol), present(&request.name)) {
            (Some(symbol), Some(name)) => (symbol.to_string(), name.to_string()),
            _ => return Err(ApiError::validation("Symbol and name are required")),
        };
        let sector = present(&request.sector).unwrap_or(DEFAULT_SECTOR).to_string();

        let current = self.load(user_id, "Could not add symbol").await?;
        let next = current.with_added(WatchedSymbol {
            symbol,
            name,
            sector,
            added_at: Utc::now(),
        })?;
        self.swap(user_id, &current, &next, "Could not add symbol")
            .await?;
        Ok(next.symbols().to_vec())
    }

    pub async fn remove(&self, user_id: &str, symbol: &str) -> Result<Vec<WatchedSymbol>, ApiError> {
        if symbol.trim().is_empty() {
            return Err(ApiError::validation("Symbol is required"));
        }
        let current = self.load(user_id, "Could not remove symbol").await?;
        let next = current.with_removed(symbol)?;
        self.swap(user_id, &current, &next, "Could not remove symbol")
            .await?;
        Ok(next.symbols().to_vec())
    }

    async fn load(&self, user_id: &str, failure: &str) -> Result<Watchlist, ApiError> {
        match self.users.user_by_id(user_id).await {
            Ok(Some(user)) => Ok(user.watchlist),
            Ok(None) => Err(ApiError::not_found("User not found")),
            Err(e) => Err(ApiError::internal(failure, e)),
        }
    }

    async fn swap(
        &self,
        user_id: &str,
        current: &Watchlist,
        next: &Watchlist,
        failure: &str,
    ) -> Result<(), ApiError> {
        let applied = self
            .users
            .swap_watchlist(user_id, current.revision(), next)
            .await
            .map_err(|e| ApiError::internal(failure, e))?;
        if !applied {
            warn!(
                "Watchlist for {} changed under revision {}",
                user_id,
                current.revision()
            );
            return Err(ApiError::Conflict(
                "Watchlist was modified concurrently, retry the request".to_string(),
            ));
        }
        info!(
            "Watchlist for {} now at revision {} with {} symbols",
            user_id,
            next.revision(),
            next.symbols().len()
        );
        Ok(())
    }
}
