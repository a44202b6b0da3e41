// src/lib.rs
//! Portfolio tracker backend: accounts, watchlists and a lot ledger behind
//! a warp JSON API.

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod portfolio;
pub mod watchlist;
