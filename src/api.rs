// src/api.rs
use crate::accounts::AccountService;
use crate::auth::{with_auth, AuthUser, Credentials};
use crate::db::{LotStore, UserStore};
use crate::error::{handle_rejection, ApiError};
use crate::ledger::Position;
use crate::models::{
    AddLotRequest, AddSymbolRequest, LoginRequest, RegisterRequest, TradeRequest, UpdateLotRequest,
};
use crate::portfolio::PortfolioService;
use crate::watchlist::WatchlistService;
use log::{info, warn};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Shared handles every handler receives.
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<AccountService>,
    pub watchlist: Arc<WatchlistService>,
    pub portfolio: Arc<PortfolioService>,
    pub credentials: Arc<Credentials>,
}

impl Services {
    pub fn new(
        users: Arc<dyn UserStore>,
        lots: Arc<dyn LotStore>,
        credentials: Credentials,
    ) -> Self {
        let credentials = Arc::new(credentials);
        Services {
            accounts: Arc::new(AccountService::new(users.clone(), credentials.clone())),
            watchlist: Arc::new(WatchlistService::new(users)),
            portfolio: Arc::new(PortfolioService::new(lots)),
            credentials,
        }
    }
}

/// Position plus the live-valuation fields the dashboard fills in itself.
#[derive(Serialize)]
struct PositionDetail {
    #[serde(flatten)]
    position: Position,
    current_value: f64,
    profit_loss: f64,
    profit_loss_percentage: f64,
}

pub fn routes(
    services: Services,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["authorization", "content-type"])
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"]);

    auth_routes(services.clone())
        .or(symbol_routes(services.clone()))
        .or(portfolio_routes(services))
        .with(cors)
        .recover(handle_rejection)
        .with(warp::log("portfolio_tracker::api"))
}

fn auth_routes(
    services: Services,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(register_handler);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(login_handler);

    let profile = warp::path!("auth" / "profile")
        .and(warp::get())
        .and(with_auth(services.credentials.clone()))
        .and(with_services(services))
        .and_then(profile_handler);

    register.or(login).or(profile)
}

fn symbol_routes(
    services: Services,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let auth = with_auth(services.credentials.clone());

    let list = warp::path!("stock-symbols")
        .and(warp::get())
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and_then(list_symbols_handler);

    let add = warp::path!("stock-symbols")
        .and(warp::post())
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(add_symbol_handler);

    let remove = warp::path!("stock-symbols" / String)
        .and(warp::delete())
        .and_then(decode_symbol)
        .and(auth)
        .and(with_services(services))
        .and_then(remove_symbol_handler);

    list.or(add).or(remove)
}

fn portfolio_routes(
    services: Services,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let auth = with_auth(services.credentials.clone());

    let list = warp::path!("portfolio")
        .and(warp::get())
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and_then(list_portfolio_handler);

    let add = warp::path!("portfolio")
        .and(warp::post())
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(add_lot_handler);

    let get = warp::path!("portfolio" / String)
        .and(warp::get())
        .and_then(decode_symbol)
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and_then(get_position_handler);

    let update = warp::path!("portfolio" / String)
        .and(warp::put())
        .and_then(decode_symbol)
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(update_lot_handler);

    let delete = warp::path!("portfolio" / String)
        .and(warp::delete())
        .and_then(decode_symbol)
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and_then(delete_symbol_handler);

    let buy = warp::path!("portfolio" / String / "buy")
        .and(warp::post())
        .and_then(decode_symbol)
        .and(auth.clone())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(buy_handler);

    let sell = warp::path!("portfolio" / String / "sell")
        .and(warp::post())
        .and_then(decode_symbol)
        .and(auth)
        .and(with_services(services))
        .and(json_body())
        .and_then(sell_handler);

    list.or(add)
        .or(get)
        .or(update)
        .or(delete)
        .or(buy)
        .or(sell)
}

fn with_services(
    services: Services,
) -> impl Filter<Extract = (Services,), Error = Infallible> + Clone {
    warp::any().map(move || services.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Path segments arrive percent-encoded, so `%5EGSPC` becomes `^GSPC`.
async fn decode_symbol(raw: String) -> Result<String, Rejection> {
    match percent_decode_str(&raw).decode_utf8() {
        Ok(symbol) => Ok(symbol.into_owned()),
        Err(_) => Err(reject(
            "Failed to decode symbol",
            ApiError::validation("Invalid symbol"),
        )),
    }
}

/// Internal errors were already logged with their cause when built.
fn reject(context: &str, err: ApiError) -> Rejection {
    if !matches!(err, ApiError::Internal(_)) {
        warn!("{}: {}", context, err);
    }
    warp::reject::custom(err)
}

async fn register_handler(
    services: Services,
    request: RegisterRequest,
) -> Result<impl Reply, Rejection> {
    match services.accounts.register(request).await {
        Ok(user) => {
            info!("User registered successfully.");
            Ok(warp::reply::with_status(
                warp::reply::json(&user),
                StatusCode::CREATED,
            ))
        }
        Err(e) => Err(reject("Failed to register user", e)),
    }
}

async fn login_handler(services: Services, request: LoginRequest) -> Result<impl Reply, Rejection> {
    match services.accounts.login(request).await {
        Ok(user) => Ok(warp::reply::json(&user)),
        Err(e) => Err(reject("Failed to log in", e)),
    }
}

async fn profile_handler(user: AuthUser, services: Services) -> Result<impl Reply, Rejection> {
    match services.accounts.profile(&user.id).await {
        Ok(profile) => Ok(warp::reply::json(&profile)),
        Err(e) => Err(reject("Failed to retrieve profile", e)),
    }
}

async fn list_symbols_handler(
    user: AuthUser,
    services: Services,
) -> Result<impl Reply, Rejection> {
    match services.watchlist.list(&user.id).await {
        Ok(symbols) => Ok(warp::reply::json(&json!({ "symbols": symbols }))),
        Err(e) => Err(reject("Failed to retrieve symbols", e)),
    }
}

async fn add_symbol_handler(
    user: AuthUser,
    services: Services,
    request: AddSymbolRequest,
) -> Result<impl Reply, Rejection> {
    match services.watchlist.add(&user.id, request).await {
        Ok(symbols) => {
            info!("Symbol added to watchlist.");
            Ok(warp::reply::json(&json!({ "symbols": symbols })))
        }
        Err(e) => Err(reject("Failed to add symbol", e)),
    }
}

async fn remove_symbol_handler(
    symbol: String,
    user: AuthUser,
    services: Services,
) -> Result<impl Reply, Rejection> {
    match services.watchlist.remove(&user.id, &symbol).await {
        Ok(symbols) => {
            info!("Symbol {} removed from watchlist.", symbol);
            Ok(warp::reply::json(&json!({ "symbols": symbols })))
        }
        Err(e) => Err(reject("Failed to remove symbol", e)),
    }
}

async fn list_portfolio_handler(
    user: AuthUser,
    services: Services,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.list_positions(&user.id).await {
        Ok(positions) => {
            info!("Portfolio retrieved successfully.");
            let portfolio: Vec<Position> = positions.into_values().collect();
            Ok(warp::reply::json(&json!({ "portfolio": portfolio })))
        }
        Err(e) => Err(reject("Failed to retrieve portfolio", e)),
    }
}

async fn add_lot_handler(
    user: AuthUser,
    services: Services,
    request: AddLotRequest,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.add_lot(&user.id, request).await {
        Ok(lot) => {
            info!("Portfolio added successfully.");
            Ok(warp::reply::json(
                &json!({ "message": "Stock added to portfolio", "purchase": lot }),
            ))
        }
        Err(e) => Err(reject("Failed to add portfolio", e)),
    }
}

async fn get_position_handler(
    symbol: String,
    user: AuthUser,
    services: Services,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.position(&user.id, &symbol).await {
        Ok(position) => Ok(warp::reply::json(&PositionDetail {
            position,
            current_value: 0.0,
            profit_loss: 0.0,
            profit_loss_percentage: 0.0,
        })),
        Err(e) => Err(reject("Failed to retrieve position", e)),
    }
}

async fn update_lot_handler(
    symbol: String,
    user: AuthUser,
    services: Services,
    request: UpdateLotRequest,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.update_lot(&user.id, &symbol, request).await {
        Ok(lot) => {
            info!("Portfolio updated successfully.");
            Ok(warp::reply::json(
                &json!({ "message": "Portfolio updated", "purchase": lot }),
            ))
        }
        Err(e) => Err(reject("Failed to update portfolio", e)),
    }
}

async fn delete_symbol_handler(
    symbol: String,
    user: AuthUser,
    services: Services,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.delete_symbol(&user.id, &symbol).await {
        Ok(_) => {
            info!("Portfolio deleted successfully.");
            Ok(warp::reply::json(
                &json!({ "message": "Stock removed from portfolio" }),
            ))
        }
        Err(e) => Err(reject("Failed to delete portfolio", e)),
    }
}

async fn buy_handler(
    symbol: String,
    user: AuthUser,
    services: Services,
    request: TradeRequest,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.buy(&user.id, &symbol, request).await {
        Ok(lot) => Ok(warp::reply::json(
            &json!({ "message": "Purchase successful", "purchase": lot }),
        )),
        Err(e) => Err(reject("Failed to process purchase", e)),
    }
}

async fn sell_handler(
    symbol: String,
    user: AuthUser,
    services: Services,
    request: TradeRequest,
) -> Result<impl Reply, Rejection> {
    match services.portfolio.sell(&user.id, &symbol, request).await {
        Ok(lot) => Ok(warp::reply::json(
            &json!({ "message": "Sale successful", "sale": lot }),
        )),
        Err(e) => Err(reject("Failed to process sale", e)),
    }
}
