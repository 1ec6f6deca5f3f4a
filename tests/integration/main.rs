//! Integration tests
//!
//! `routes` drives the real router without a reachable database.
//! `catalog`, `loans` and `sessions` need PostgreSQL: run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

mod catalog;
mod common;
mod loans;
mod routes;
mod sessions;
