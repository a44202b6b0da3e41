// src/portfolio.rs
use crate::db::LotStore;
use crate::error::ApiError;
use crate::ledger::{self, Position};
use crate::models::{present, AddLotRequest, Lot, TradeRequest, UpdateLotRequest};
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

const NO_PORTFOLIO: &str = "No portfolio found for symbol";

/// Position ledger operations for one authenticated user at a time.
pub struct PortfolioService {
    lots: Arc<dyn LotStore>,
}

impl PortfolioService {
    pub fn new(lots: Arc<dyn LotStore>) -> Self {
        PortfolioService { lots }
    }

    pub async fn list_positions(&self, user_id: &str) -> Result<BTreeMap<String, Position>, ApiError> {
        let lots = self
            .lots
            .lots_for_user(user_id)
            .await
            .map_err(|e| ApiError::internal("Failed to fetch portfolio", e))?;
        Ok(ledger::aggregate(&lots))
    }

    /// Appends a lot; existing lots of the symbol are left alone.
    pub async fn add_lot(&self, user_id: &str, request: AddLotRequest) -> Result<Lot, ApiError> {
        let symbol = present(&request.symbol)
            .ok_or_else(|| ApiError::validation("Missing required fields"))?;
        let symbol = ledger::validate_symbol(symbol)?;
        let fields = ledger::lot_fields(
            request.shares.as_ref(),
            request.purchase_price.as_ref(),
            request.purchase_date.as_deref(),
        )?;

        let lot = new_lot(user_id, symbol, fields.shares, fields.price, fields.purchase_date);
        self.lots
            .put_lot(&lot)
            .await
            .map_err(|e| ApiError::internal("Failed to add stock to portfolio", e))?;
        info!("Added lot {} for {}", lot.lot_id, user_id);
        Ok(lot)
    }

    /// Rewrites the most recent lot of `symbol` in place.
    pub async fn update_lot(
        &self,
        user_id: &str,
        symbol: &str,
        request: UpdateLotRequest,
    ) -> Result<Lot, ApiError> {
        let symbol = ledger::validate_symbol(symbol)?;
        let fields = ledger::lot_fields(
            request.shares.as_ref(),
            request.purchase_price.as_ref(),
            request.purchase_date.as_deref(),
        )?;

        let lots = self
            .lots
            .lots_for_symbol(user_id, symbol)
            .await
            .map_err(|e| ApiError::internal("Failed to update portfolio", e))?;
        let mut lot = lots
            .into_iter()
            .max_by(|a, b| a.lot_id.cmp(&b.lot_id))
            .ok_or_else(|| ApiError::not_found(NO_PORTFOLIO))?;

        lot.shares = fields.shares;
        lot.purchase_price = fields.price;
        lot.purchase_date = fields.purchase_date;
        lot.updated_at = Utc::now();
        self.lots
            .put_lot(&lot)
            .await
            .map_err(|e| ApiError::internal("Failed to update portfolio", e))?;
        info!("Updated lot {} for {}", lot.lot_id, user_id);
        Ok(lot)
    }

    /// Deletes every lot of `symbol` one by one. An interrupted run leaves
    /// the remaining lots in place.
    pub async fn delete_symbol(&self, user_id: &str, symbol: &str) -> Result<usize, ApiError> {
        let symbol = ledger::validate_symbol(symbol)?;
        let lots = self
            .lots
            .lots_for_symbol(user_id, symbol)
            .await
            .map_err(|e| ApiError::internal("Failed to delete from portfolio", e))?;
        if lots.is_empty() {
            return Err(ApiError::not_found(NO_PORTFOLIO));
        }

        for lot in &lots {
            self.lots
                .delete_lot(user_id, &lot.lot_id)
                .await
                .map_err(|e| ApiError::internal("Failed to delete from portfolio", e))?;
        }
        info!("Removed {} lots of {} for {}", lots.len(), symbol, user_id);
        Ok(lots.len())
    }

    /// Never fails for an unknown symbol: it yields the empty position.
    pub async fn position(&self, user_id: &str, symbol: &str) -> Result<Position, ApiError> {
        let symbol = ledger::validate_symbol(symbol)?;
        let lots = self
            .lots
            .lots_for_symbol(user_id, symbol)
            .await
            .map_err(|e| ApiError::internal("Failed to fetch portfolio item", e))?;
        Ok(Position::from_lots(symbol, &lots))
    }

    pub async fn buy(
        &self,
        user_id: &str,
        symbol: &str,
        request: TradeRequest,
    ) -> Result<Lot, ApiError> {
        let symbol = ledger::validate_symbol(symbol)?;
        let trade = ledger::trade(request.shares.as_ref(), request.price.as_ref())?;

        let lot = new_lot(user_id, symbol, trade.shares, trade.price, now_date());
        self.lots
            .put_lot(&lot)
            .await
            .map_err(|e| ApiError::internal("Failed to process purchase", e))?;
        info!("{} bought {} {} at {}", user_id, trade.shares, symbol, trade.price);
        Ok(lot)
    }

    /// Records a sale as a negative lot, refusing to sell more than is held.
    pub async fn sell(
        &self,
        user_id: &str,
        symbol: &str,
        request: TradeRequest,
    ) -> Result<Lot, ApiError> {
        let symbol = ledger::validate_symbol(symbol)?;
        let trade = ledger::trade(request.shares.as_ref(), request.price.as_ref())?;

        let lots = self
            .lots
            .lots_for_symbol(user_id, symbol)
            .await
            .map_err(|e| ApiError::internal("Failed to process sale", e))?;
        if lots.is_empty() {
            return Err(ApiError::not_found(NO_PORTFOLIO));
        }
        let held = ledger::held_shares(&lots);
        if ledger::exceeds_holding(trade.shares, held) {
            warn!(
                "{} tried to sell {} {} while holding {}",
                user_id, trade.shares, symbol, held
            );
            return Err(ApiError::business_rule("Not enough shares to sell"));
        }

        let lot = new_lot(user_id, symbol, -trade.shares, trade.price, now_date());
        self.lots
            .put_lot(&lot)
            .await
            .map_err(|e| ApiError::internal("Failed to process sale", e))?;
        info!("{} sold {} {} at {}", user_id, trade.shares, symbol, trade.price);
        Ok(lot)
    }
}

fn now_date() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_lot(user_id: &str, symbol: &str, shares: f64, price: f64, purchase_date: String) -> Lot {
    let now = Utc::now();
    Lot {
        user_id: user_id.to_string(),
        lot_id: ledger::new_lot_id(symbol, now),
        symbol: symbol.to_string(),
        shares,
        purchase_price: price,
        purchase_date,
        created_at: now,
        updated_at: now,
    }
}
