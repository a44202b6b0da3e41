// src/ledger.rs
//! Lot keys, input validation and the aggregation of lots into positions.
//!
//! Every lot is stored under `SYMBOL#<timestamp>#<uuid>`. The part before the
//! first `#` is the base symbol; the timestamp keeps one symbol's lots in
//! chronological key order and the uuid makes each key unique.

use crate::error::ApiError;
use crate::models::{Lot, NumericInput};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const KEY_SEPARATOR: char = '#';

/// Share totals closer to zero than this are treated as a closed position.
const ZERO_SHARES: f64 = 1e-9;

pub fn base_symbol(lot_id: &str) -> &str {
    match lot_id.split_once(KEY_SEPARATOR) {
        Some((base, _)) => base,
        None => lot_id,
    }
}

pub fn new_lot_id(symbol: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}{}{}",
        symbol,
        KEY_SEPARATOR,
        at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        KEY_SEPARATOR,
        Uuid::new_v4().simple()
    )
}

/// Half-open key range `[start, end)` holding every lot of `symbol`.
pub fn symbol_key_range(symbol: &str) -> (String, String) {
    // '$' is the character right after '#'.
    (format!("{}#", symbol), format!("{}$", symbol))
}

pub fn validate_symbol(symbol: &str) -> Result<&str, ApiError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::validation("Symbol is required"));
    }
    if symbol.contains(KEY_SEPARATOR) {
        return Err(ApiError::validation(format!(
            "Symbol must not contain '{}'",
            KEY_SEPARATOR
        )));
    }
    Ok(symbol)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Purchase {
    pub date: String,
    pub shares: f64,
    pub price: f64,
    pub total: f64,
}

impl From<&Lot> for Purchase {
    fn from(lot: &Lot) -> Self {
        Purchase {
            date: lot.purchase_date.clone(),
            shares: lot.shares,
            price: lot.purchase_price,
            total: lot.shares * lot.purchase_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub total_shares: f64,
    pub total_investment: f64,
    /// `None` while the position holds no shares.
    pub average_cost: Option<f64>,
    pub purchases: Vec<Purchase>,
}

impl Position {
    pub fn empty(symbol: &str) -> Self {
        Position {
            symbol: symbol.to_string(),
            total_shares: 0.0,
            total_investment: 0.0,
            average_cost: None,
            purchases: Vec::new(),
        }
    }

    /// Aggregates `lots`, which must all belong to `symbol`. Purchases are
    /// listed in lot key order.
    pub fn from_lots<'a, I>(symbol: &str, lots: I) -> Self
    where
        I: IntoIterator<Item = &'a Lot>,
    {
        let mut lots: Vec<&Lot> = lots.into_iter().collect();
        lots.sort_by(|a, b| a.lot_id.cmp(&b.lot_id));

        let mut position = Position::empty(symbol);
        for lot in lots {
            let purchase = Purchase::from(lot);
            position.total_shares += purchase.shares;
            position.total_investment += purchase.total;
            position.purchases.push(purchase);
        }
        position.average_cost = average_cost(position.total_investment, position.total_shares);
        position
    }
}

pub fn average_cost(total_investment: f64, total_shares: f64) -> Option<f64> {
    if total_shares.abs() < ZERO_SHARES {
        None
    } else {
        Some(total_investment / total_shares)
    }
}

/// Groups lots by base symbol and aggregates each group.
pub fn aggregate(lots: &[Lot]) -> BTreeMap<String, Position> {
    let mut groups: BTreeMap<&str, Vec<&Lot>> = BTreeMap::new();
    for lot in lots {
        groups.entry(base_symbol(&lot.lot_id)).or_default().push(lot);
    }

    groups
        .into_iter()
        .map(|(symbol, lots)| (symbol.to_string(), Position::from_lots(symbol, lots)))
        .collect()
}

pub fn held_shares(lots: &[Lot]) -> f64 {
    lots.iter().map(|lot| lot.shares).sum()
}

/// True when selling `requested` would leave the holding below zero.
/// Rounding residue in `held` within `ZERO_SHARES` does not count.
pub fn exceeds_holding(requested: f64, held: f64) -> bool {
    requested - held > ZERO_SHARES
}

/// Validated body of an add or update request.
#[derive(Debug, Clone, PartialEq)]
pub struct LotFields {
    pub shares: f64,
    pub price: f64,
    pub purchase_date: String,
}

pub fn lot_fields(
    shares: Option<&NumericInput>,
    price: Option<&NumericInput>,
    purchase_date: Option<&str>,
) -> Result<LotFields, ApiError> {
    let (shares, price, purchase_date) = match (shares, price, purchase_date) {
        (Some(shares), Some(price), Some(date))
            if !shares.is_blank() && !price.is_blank() && !date.trim().is_empty() =>
        {
            (shares, price, date.trim())
        }
        _ => return Err(ApiError::validation("Missing required fields")),
    };

    let (shares, price) = match (shares.value(), price.value()) {
        (Some(shares), Some(price)) => (shares, price),
        _ => return Err(ApiError::validation("Invalid numeric values")),
    };
    if shares == 0.0 {
        return Err(ApiError::validation("Shares must be non-zero"));
    }
    if price < 0.0 {
        return Err(ApiError::validation("Purchase price must not be negative"));
    }
    if !is_valid_date(purchase_date) {
        return Err(ApiError::validation("Invalid purchase date"));
    }

    Ok(LotFields {
        shares,
        price,
        purchase_date: purchase_date.to_string(),
    })
}

/// Validated body of a buy or sell request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub shares: f64,
    pub price: f64,
}

pub fn trade(shares: Option<&NumericInput>, price: Option<&NumericInput>) -> Result<Trade, ApiError> {
    let (shares, price) = match (shares, price) {
        (Some(shares), Some(price)) if !shares.is_blank() && !price.is_blank() => (shares, price),
        _ => return Err(ApiError::validation("Shares and price are required")),
    };
    let (shares, price) = match (shares.value(), price.value()) {
        (Some(shares), Some(price)) => (shares, price),
        _ => return Err(ApiError::validation("Invalid numeric values")),
    };
    if shares <= 0.0 {
        return Err(ApiError::validation("Shares must be greater than zero"));
    }
    if price < 0.0 {
        return Err(ApiError::validation("Price must not be negative"));
    }
    Ok(Trade { shares, price })
}

fn is_valid_date(date: &str) -> bool {
    DateTime::parse_from_rfc3339(date).is_ok() || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}
