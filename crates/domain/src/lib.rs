//! # blegate-domain
//!
//! Pure domain model for the blegate BLE device gateway.
//!
//! ## Responsibilities
//! - Device configuration schema, defaults and validation
//! - Foundational value types: MAC addresses, GATT UUIDs, timestamps
//! - Characteristic- and advertisement-sourced items
//! - The per-device [`ConnectionState`](state::ConnectionState) and its legal transitions
//! - Ephemeral scan records and converted data points
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod address;
pub mod config;
pub mod converted;
pub mod device;
pub mod gatt;
pub mod item;
pub mod scan;
pub mod state;
