//! # blegate-app
//!
//! Application layer: the per-device connection and polling engine, and
//! the **port definitions** (traits) it drives hardware through.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `BleClient`: connect, read, write, subscribe, list services for one device
//!   - `Scanner`: advertisement scan passes
//!   - `BleBackend`: factory for clients and scanners of one BLE stack
//!   - `Converter` / `ConverterRegistry`: decode extensions resolved by name
//!   - `Dispatcher`: one-way sink for acquisition envelopes
//! - Run one **device worker** per configured device: connection state
//!   machine, retry policy, poll scheduler, notification registry and the
//!   advertisement fallback
//! - Start and stop workers through the **supervisor**
//!
//! ## Dependency rule
//! Depends on `blegate-domain` only (plus `tokio` for tasks, channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod advertisement;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod notification;
pub mod ports;
pub mod retry;
pub mod scheduler;
pub mod service_map;
pub mod session;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod fakes;
