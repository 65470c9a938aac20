//! Poker-room waitlist and table occupancy: the transition engine, its store
//! of record, the live views built on the change feed, and the HTTP surface.

pub mod auth;
pub mod config;
pub mod context;
pub mod database;
pub mod demo;
pub mod engine;
pub mod entities;
pub mod error;
pub mod feed;
pub mod identity;
pub mod model;
pub mod occupancy;
pub mod projection;
pub mod router;
pub mod routes;
pub mod store;
pub mod validation;
