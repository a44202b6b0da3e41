// src/db/scylla_store.rs
use super::{LotStore, UserStore};
use crate::error::StoreError;
use crate::ledger::symbol_key_range;
use crate::models::{Lot, User, WatchedSymbol};
use crate::watchlist::Watchlist;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::query::Query;
use scylla::{Session, SessionBuilder};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, created_at, updated_at, watchlist, watchlist_revision";
const LOT_COLUMNS: &str =
    "user_id, lot_id, symbol, shares, purchase_price, purchase_date, created_at, updated_at";

pub struct ScyllaStore {
    session: Session,
    keyspace: String,
}

impl ScyllaStore {
    /// Connects to `node` and creates the keyspace and tables if needed.
    /// `keyspace` is interpolated into CQL and must already be validated.
    pub async fn connect(node: &str, keyspace: &str) -> Result<Self, StoreError> {
        let session = SessionBuilder::new().known_node(node).build().await?;
        let store = ScyllaStore {
            session,
            keyspace: keyspace.to_string(),
        };
        store.init_schema().await?;
        info!("Successfully connected to ScyllaDB at {}.", node);
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let ks = &self.keyspace;
        self.session.query(Query::new(format!("CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': 1}}", ks)), &[]).await?;
        self.session.query(Query::new(format!("CREATE TABLE IF NOT EXISTS {}.users (id TEXT PRIMARY KEY, email TEXT, password_hash TEXT, first_name TEXT, last_name TEXT, created_at TEXT, updated_at TEXT, watchlist TEXT, watchlist_revision BIGINT)", ks)), &[]).await?;
        self.session.query(Query::new(format!("CREATE TABLE IF NOT EXISTS {}.users_by_email (email TEXT PRIMARY KEY, user_id TEXT)", ks)), &[]).await?;
        self.session.query(Query::new(format!("CREATE TABLE IF NOT EXISTS {}.lots (user_id TEXT, lot_id TEXT, symbol TEXT, shares DOUBLE, purchase_price DOUBLE, purchase_date TEXT, created_at TEXT, updated_at TEXT, PRIMARY KEY (user_id, lot_id)) WITH CLUSTERING ORDER BY (lot_id ASC)", ks)), &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for ScyllaStore {
    async fn create_user(&self, user: &User) -> Result<bool, StoreError> {
        let claim = Query::new(format!(
            "INSERT INTO {}.users_by_email (email, user_id) VALUES (?, ?) IF NOT EXISTS",
            self.keyspace
        ));
        let result = self
            .session
            .query(claim, (user.email.as_str(), user.id.as_str()))
            .await?;
        if !applied(result.rows)? {
            return Ok(false);
        }

        let watchlist = serde_json::to_string(user.watchlist.symbols())?;
        let insert = Query::new(format!(
            "INSERT INTO {}.users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.keyspace, USER_COLUMNS
        ));
        let values = (
            user.id.as_str(),
            user.email.as_str(),
            user.password_hash.as_str(),
            user.first_name.as_str(),
            user.last_name.as_str(),
            user.created_at.to_rfc3339(),
            user.updated_at.to_rfc3339(),
            watchlist,
            user.watchlist.revision() as i64,
        );
        if let Err(e) = self.session.query(insert, values).await {
            // Release the email so the address can register again.
            let release = Query::new(format!(
                "DELETE FROM {}.users_by_email WHERE email = ?",
                self.keyspace
            ));
            if let Err(cleanup) = self.session.query(release, (user.email.as_str(),)).await {
                error!("Failed to release email claim for {}: {}", user.id, cleanup);
            }
            return Err(e.into());
        }
        Ok(true)
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let select = Query::new(format!(
            "SELECT {} FROM {}.users WHERE id = ?",
            USER_COLUMNS, self.keyspace
        ));
        let rows = self.session.query(select, (id,)).await?.rows;
        match rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let select = Query::new(format!(
            "SELECT user_id FROM {}.users_by_email WHERE email = ?",
            self.keyspace
        ));
        let rows = self.session.query(select, (email,)).await?.rows;
        let user_id = match rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => text(&row, 0, "user_id")?,
            None => return Ok(None),
        };
        self.user_by_id(&user_id).await
    }

    async fn swap_watchlist(
        &self,
        user_id: &str,
        expected_revision: u64,
        next: &Watchlist,
    ) -> Result<bool, StoreError> {
        let update = Query::new(format!(
            "UPDATE {}.users SET watchlist = ?, watchlist_revision = ?, updated_at = ? WHERE id = ? IF watchlist_revision = ?",
            self.keyspace
        ));
        let values = (
            serde_json::to_string(next.symbols())?,
            next.revision() as i64,
            Utc::now().to_rfc3339(),
            user_id,
            expected_revision as i64,
        );
        let result = self.session.query(update, values).await?;
        applied(result.rows)
    }
}

#[async_trait]
impl LotStore for ScyllaStore {
    async fn lots_for_user(&self, user_id: &str) -> Result<Vec<Lot>, StoreError> {
        let select = Query::new(format!(
            "SELECT {} FROM {}.lots WHERE user_id = ?",
            LOT_COLUMNS, self.keyspace
        ));
        let rows = self.session.query(select, (user_id,)).await?.rows;
        rows.unwrap_or_default().iter().map(lot_from_row).collect()
    }

    async fn lots_for_symbol(&self, user_id: &str, symbol: &str) -> Result<Vec<Lot>, StoreError> {
        let (start, end) = symbol_key_range(symbol);
        let select = Query::new(format!(
            "SELECT {} FROM {}.lots WHERE user_id = ? AND lot_id >= ? AND lot_id < ?",
            LOT_COLUMNS, self.keyspace
        ));
        let rows = self
            .session
            .query(select, (user_id, start, end))
            .await?
            .rows;
        rows.unwrap_or_default().iter().map(lot_from_row).collect()
    }

    async fn put_lot(&self, lot: &Lot) -> Result<(), StoreError> {
        let insert = Query::new(format!(
            "INSERT INTO {}.lots ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace, LOT_COLUMNS
        ));
        let values = (
            lot.user_id.as_str(),
            lot.lot_id.as_str(),
            lot.symbol.as_str(),
            lot.shares,
            lot.purchase_price,
            lot.purchase_date.as_str(),
            lot.created_at.to_rfc3339(),
            lot.updated_at.to_rfc3339(),
        );
        self.session.query(insert, values).await?;
        Ok(())
    }

    async fn delete_lot(&self, user_id: &str, lot_id: &str) -> Result<(), StoreError> {
        let delete = Query::new(format!(
            "DELETE FROM {}.lots WHERE user_id = ? AND lot_id = ?",
            self.keyspace
        ));
        self.session.query(delete, (user_id, lot_id)).await?;
        Ok(())
    }
}

/// Reads the `[applied]` flag of a lightweight transaction.
fn applied(rows: Option<Vec<Row>>) -> Result<bool, StoreError> {
    let row = rows
        .and_then(|rows| rows.into_iter().next())
        .ok_or_else(|| StoreError::Decode("conditional write returned no rows".to_string()))?;
    match row.columns.first() {
        Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
        other => Err(StoreError::Decode(format!(
            "unexpected [applied] column: {:?}",
            other
        ))),
    }
}

fn column<'a>(row: &'a Row, index: usize, name: &str) -> Result<&'a CqlValue, StoreError> {
    row.columns
        .get(index)
        .and_then(|value| value.as_ref())
        .ok_or_else(|| StoreError::Decode(format!("missing column {}", name)))
}

fn text(row: &Row, index: usize, name: &str) -> Result<String, StoreError> {
    column(row, index, name)?
        .as_text()
        .cloned()
        .ok_or_else(|| StoreError::Decode(format!("column {} is not text", name)))
}

fn double(row: &Row, index: usize, name: &str) -> Result<f64, StoreError> {
    column(row, index, name)?
        .as_double()
        .ok_or_else(|| StoreError::Decode(format!("column {} is not a double", name)))
}

fn timestamp(row: &Row, index: usize, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = text(row, index, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("column {} holds {:?}: {}", name, raw, e)))
}

fn user_from_row(row: &Row) -> Result<User, StoreError> {
    // Rows written before a watchlist existed carry nulls here.
    let symbols: Vec<WatchedSymbol> = match row.columns.get(7).and_then(|v| v.as_ref()) {
        Some(value) => {
            let json = value
                .as_text()
                .ok_or_else(|| StoreError::Decode("column watchlist is not text".to_string()))?;
            serde_json::from_str(json)?
        }
        None => Vec::new(),
    };
    let revision = row
        .columns
        .get(8)
        .and_then(|v| v.as_ref())
        .and_then(|v| v.as_bigint())
        .unwrap_or(0);

    Ok(User {
        id: text(row, 0, "id")?,
        email: text(row, 1, "email")?,
        password_hash: text(row, 2, "password_hash")?,
        first_name: text(row, 3, "first_name")?,
        last_name: text(row, 4, "last_name")?,
        created_at: timestamp(row, 5, "created_at")?,
        updated_at: timestamp(row, 6, "updated_at")?,
        watchlist: Watchlist::new(symbols, revision.max(0) as u64),
    })
}

fn lot_from_row(row: &Row) -> Result<Lot, StoreError> {
    Ok(Lot {
        user_id: text(row, 0, "user_id")?,
        lot_id: text(row, 1, "lot_id")?,
        symbol: text(row, 2, "symbol")?,
        shares: double(row, 3, "shares")?,
        purchase_price: double(row, 4, "purchase_price")?,
        purchase_date: text(row, 5, "purchase_date")?,
        created_at: timestamp(row, 6, "created_at")?,
        updated_at: timestamp(row, 7, "updated_at")?,
    })
}
