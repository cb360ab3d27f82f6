//! Thin HTTP ingestion and status-query layer. Request validation and routing
//! live in `courier-router`; this crate only translates HTTP to and from the
//! pipeline's types.

pub mod routes;
pub mod state;
