use portfolio_tracker::api::{self, Services};
use portfolio_tracker::auth::Credentials;
use portfolio_tracker::db::{self, MemoryStore};
use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::Filter;

const SECRET: &str = "integration-secret";

fn api() -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone + 'static {
    let (users, lots) = db::shared(MemoryStore::new());
    api::routes(Services::new(users, lots, Credentials::new(SECRET, 4)))
}

async fn call<F>(
    api: &F,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    let mut request = warp::test::request().method(method).path(path);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {}", token));
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.reply(api).await;
    let body = if response.body().is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(response.body()).expect("response is JSON")
    };
    (response.status(), body)
}

async fn register<F>(api: &F, email: &str) -> String
where
    F: Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    let (status, body) = call(
        api,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "correct horse",
            "firstName": "Ada",
            "lastName": "Lovelace"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

fn close_to(value: &Value, expected: f64) -> bool {
    (value.as_f64().unwrap() - expected).abs() < 1e-9
}

#[tokio::test]
async fn register_then_fetch_profile() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, profile) = call(&api, "GET", "/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "ada@example.com");
    assert_eq!(profile["firstName"], "Ada");
    assert!(profile.get("password").is_none());
    assert!(profile.get("passwordHash").is_none());
    assert!(profile["createdAt"].is_string());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(
        &api,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": "ada@example.com",
            "password": "another one",
            "firstName": "Imposter",
            "lastName": "Lovelace"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");

    // The original account is untouched and still logs in with its password.
    let (status, profile) = call(&api, "GET", "/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["firstName"], "Ada");
    let (status, _) = call(
        &api,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_requires_every_field() {
    let api = api();
    let (status, body) = call(
        &api,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "ada@example.com", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "All fields are required");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let api = api();
    register(&api, "ada@example.com").await;

    let wrong_password = call(
        &api,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong" })),
    )
    .await;
    let unknown_email = call(
        &api,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "wrong" })),
    )
    .await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.1["error"], "Invalid credentials");
}

#[tokio::test]
async fn login_returns_a_working_token() {
    let api = api();
    register(&api, "ada@example.com").await;

    let (status, body) = call(
        &api,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, _) = call(&api, "GET", "/portfolio", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let api = api();

    let (status, body) = call(&api, "GET", "/portfolio", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token provided");

    let (status, body) = call(&api, "GET", "/stock-symbols", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let forged = Credentials::new("someone-else", 4)
        .create_token("USER#1", "x@example.com")
        .unwrap();
    let (status, _) = call(&api, "GET", "/auth/profile", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_portfolio_is_not_an_error() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(&api, "GET", "/portfolio", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "portfolio": [] }));
}

#[tokio::test]
async fn positions_aggregate_their_lots() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    for (shares, price) in [(json!(10), json!(100)), (json!("5"), json!("120"))] {
        let (status, body) = call(
            &api,
            "POST",
            "/portfolio",
            Some(&token),
            Some(json!({
                "symbol": "AAPL",
                "shares": shares,
                "purchasePrice": price,
                "purchaseDate": "2024-01-15"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["message"], "Stock added to portfolio");
        assert_eq!(body["purchase"]["symbol"], "AAPL");
    }
    call(
        &api,
        "POST",
        "/portfolio",
        Some(&token),
        Some(json!({
            "symbol": "MSFT",
            "shares": 2,
            "purchasePrice": 300,
            "purchaseDate": "2024-01-16"
        })),
    )
    .await;

    let (status, body) = call(&api, "GET", "/portfolio", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let portfolio = body["portfolio"].as_array().unwrap();
    assert_eq!(portfolio.len(), 2);

    let aapl = &portfolio[0];
    assert_eq!(aapl["symbol"], "AAPL");
    assert!(close_to(&aapl["total_shares"], 15.0));
    assert!(close_to(&aapl["total_investment"], 1600.0));
    assert!(close_to(&aapl["average_cost"], 1600.0 / 15.0));
    assert_eq!(aapl["purchases"].as_array().unwrap().len(), 2);
    assert!(close_to(&aapl["purchases"][0]["total"], 1000.0));

    let (status, single) = call(&api, "GET", "/portfolio/AAPL", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(close_to(&single["total_investment"], 1600.0));
    assert!(close_to(&single["current_value"], 0.0));
    assert!(close_to(&single["profit_loss"], 0.0));
    assert!(close_to(&single["profit_loss_percentage"], 0.0));
}

#[tokio::test]
async fn unknown_symbol_yields_a_zero_position() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(&api, "GET", "/portfolio/TSLA", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "TSLA");
    assert!(close_to(&body["total_shares"], 0.0));
    assert!(close_to(&body["total_investment"], 0.0));
    assert!(body["average_cost"].is_null());
    assert_eq!(body["purchases"], json!([]));

    let (status, body) = call(&api, "DELETE", "/portfolio/TSLA", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No portfolio found for symbol");

    let (status, _) = call(
        &api,
        "PUT",
        "/portfolio/TSLA",
        Some(&token),
        Some(json!({ "shares": 1, "purchasePrice": 1, "purchaseDate": "2024-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_lots_are_rejected() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(
        &api,
        "POST",
        "/portfolio",
        Some(&token),
        Some(json!({ "symbol": "AAPL", "shares": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");

    let (status, body) = call(
        &api,
        "POST",
        "/portfolio",
        Some(&token),
        Some(json!({
            "symbol": "AAPL",
            "shares": "ten",
            "purchasePrice": 100,
            "purchaseDate": "2024-01-15"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid numeric values");

    let (status, body) = call(
        &api,
        "POST",
        "/portfolio/AAPL/buy",
        Some(&token),
        Some(json!({ "shares": true, "price": { "amount": 100 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid numeric values");

    let (_, body) = call(&api, "GET", "/portfolio", Some(&token), None).await;
    assert_eq!(body, json!({ "portfolio": [] }));
}

#[tokio::test]
async fn update_and_delete_act_on_the_symbol() {
    let api = api();
    let token = register(&api, "ada@example.com").await;
    call(
        &api,
        "POST",
        "/portfolio",
        Some(&token),
        Some(json!({
            "symbol": "AAPL",
            "shares": 10,
            "purchasePrice": 100,
            "purchaseDate": "2024-01-15"
        })),
    )
    .await;

    let (status, body) = call(
        &api,
        "PUT",
        "/portfolio/AAPL",
        Some(&token),
        Some(json!({ "shares": 12, "purchasePrice": 95, "purchaseDate": "2024-01-20" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Portfolio updated");

    let (_, position) = call(&api, "GET", "/portfolio/AAPL", Some(&token), None).await;
    assert!(close_to(&position["total_shares"], 12.0));
    assert!(close_to(&position["total_investment"], 1140.0));
    assert_eq!(position["purchases"][0]["date"], "2024-01-20");

    let (status, body) = call(&api, "DELETE", "/portfolio/AAPL", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Stock removed from portfolio");

    let (_, body) = call(&api, "GET", "/portfolio", Some(&token), None).await;
    assert_eq!(body, json!({ "portfolio": [] }));
}

#[tokio::test]
async fn cannot_sell_more_than_held() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(
        &api,
        "POST",
        "/portfolio/AAPL/buy",
        Some(&token),
        Some(json!({ "shares": 10, "price": 150 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Purchase successful");

    let (status, body) = call(
        &api,
        "POST",
        "/portfolio/AAPL/sell",
        Some(&token),
        Some(json!({ "shares": 15, "price": 160 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Not enough shares to sell");

    let (_, position) = call(&api, "GET", "/portfolio/AAPL", Some(&token), None).await;
    assert!(close_to(&position["total_shares"], 10.0));
    assert_eq!(position["purchases"].as_array().unwrap().len(), 1);

    let (status, body) = call(
        &api,
        "POST",
        "/portfolio/AAPL/sell",
        Some(&token),
        Some(json!({ "shares": 4, "price": 160 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Sale successful");
    assert!(close_to(&body["sale"]["shares"], -4.0));

    let (_, position) = call(&api, "GET", "/portfolio/AAPL", Some(&token), None).await;
    assert!(close_to(&position["total_shares"], 6.0));
}

#[tokio::test]
async fn fractional_position_sells_out_exactly() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    for (path, shares) in [
        ("/portfolio/AAPL/buy", 0.3),
        ("/portfolio/AAPL/sell", 0.1),
        ("/portfolio/AAPL/sell", 0.2),
    ] {
        let (status, body) = call(
            &api,
            "POST",
            path,
            Some(&token),
            Some(json!({ "shares": shares, "price": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{} {}", path, body);
    }

    let (_, position) = call(&api, "GET", "/portfolio/AAPL", Some(&token), None).await;
    assert!(close_to(&position["total_shares"], 0.0));
    assert!(position["average_cost"].is_null());
}

#[tokio::test]
async fn path_symbols_are_percent_decoded() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, _) = call(
        &api,
        "POST",
        "/portfolio/BRK%20B/buy",
        Some(&token),
        Some(json!({ "shares": 2, "price": 300 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, position) = call(&api, "GET", "/portfolio/BRK%20B", Some(&token), None).await;
    assert_eq!(position["symbol"], "BRK B");
    assert!(close_to(&position["total_shares"], 2.0));

    let (_, body) = call(&api, "GET", "/portfolio", Some(&token), None).await;
    assert_eq!(body["portfolio"][0]["symbol"], "BRK B");

    call(
        &api,
        "POST",
        "/stock-symbols",
        Some(&token),
        Some(json!({ "symbol": "^GSPC", "name": "S&P 500" })),
    )
    .await;
    let (status, body) = call(&api, "DELETE", "/stock-symbols/%5EGSPC", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "symbols": [] }));

    let (status, body) = call(&api, "GET", "/portfolio/%FF", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid symbol");
}

#[tokio::test]
async fn selling_an_unheld_symbol_is_not_found() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, _) = call(
        &api,
        "POST",
        "/portfolio/NVDA/sell",
        Some(&token),
        Some(json!({ "shares": 1, "price": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn watchlist_rejects_duplicates() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(&api, "GET", "/stock-symbols", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "symbols": [] }));

    let entry = json!({ "symbol": "AAPL", "name": "Apple Inc." });
    let (status, body) = call(&api, "POST", "/stock-symbols", Some(&token), Some(entry.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbols"][0]["sector"], "Unknown");

    let (status, body) = call(&api, "POST", "/stock-symbols", Some(&token), Some(entry)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Symbol already exists");

    let (_, body) = call(&api, "GET", "/stock-symbols", Some(&token), None).await;
    assert_eq!(body["symbols"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn watchlist_removal() {
    let api = api();
    let token = register(&api, "ada@example.com").await;
    call(
        &api,
        "POST",
        "/stock-symbols",
        Some(&token),
        Some(json!({ "symbol": "MSFT", "name": "Microsoft", "sector": "Technology" })),
    )
    .await;

    let (status, body) = call(&api, "DELETE", "/stock-symbols/AAPL", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Symbol not found");

    let (status, body) = call(&api, "DELETE", "/stock-symbols/MSFT", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "symbols": [] }));
}

#[tokio::test]
async fn watchlist_requires_symbol_and_name() {
    let api = api();
    let token = register(&api, "ada@example.com").await;

    let (status, body) = call(
        &api,
        "POST",
        "/stock-symbols",
        Some(&token),
        Some(json!({ "symbol": "AAPL" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Symbol and name are required");
}

#[tokio::test]
async fn unknown_routes_and_bad_bodies() {
    let api = api();

    let (status, body) = call(&api, "GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");

    let (status, body) = call(
        &api,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
}
