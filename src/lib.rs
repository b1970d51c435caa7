pub mod access;
pub mod aggregate;
pub mod codec;
pub mod coerce;
pub mod columns;
pub mod config;
pub mod db;
pub mod filter;
pub mod grid;
pub mod models;
pub mod report;
pub mod rules;
pub mod session;
