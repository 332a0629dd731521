//! Nopal Admin library.
//!
//! Back-office shipping service: the order store and event log in Postgres,
//! the Skydropx client, SMTP notifications and the shipping write paths
//! built on `nopal_core::shipping`.
//!
//! # Security
//!
//! Admin action routes carry no authentication of their own. Only deploy
//! behind a private network; the webhook route is the only one meant to be
//! reachable by the provider.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod skydropx;
pub mod state;
