// src/models.rs
use crate::watchlist::Watchlist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. The password hash never leaves the service.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub watchlist: Watchlist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchedSymbol {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub added_at: DateTime<Utc>,
}

/// One recorded buy (positive shares) or sell (negative shares).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub user_id: String,
    /// Storage key: `SYMBOL#timestamp#uuid`.
    pub lot_id: String,
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub purchase_date: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Profile {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub token: String,
}

/// A number sent either as a JSON number or as a numeric string. Any other
/// JSON value lands in `Other` and never yields a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl NumericInput {
    pub fn is_blank(&self) -> bool {
        matches!(self, NumericInput::Text(text) if text.trim().is_empty())
    }

    pub fn value(&self) -> Option<f64> {
        let value = match self {
            NumericInput::Number(n) => *n,
            NumericInput::Text(text) => text.trim().parse::<f64>().ok()?,
            NumericInput::Other(_) => return None,
        };
        value.is_finite().then(|| value)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLotRequest {
    pub symbol: Option<String>,
    pub shares: Option<NumericInput>,
    pub purchase_price: Option<NumericInput>,
    pub purchase_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLotRequest {
    pub shares: Option<NumericInput>,
    pub purchase_price: Option<NumericInput>,
    pub purchase_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TradeRequest {
    pub shares: Option<NumericInput>,
    pub price: Option<NumericInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddSymbolRequest {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
}

/// Trims the field and treats an empty result as absent.
pub fn present(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
