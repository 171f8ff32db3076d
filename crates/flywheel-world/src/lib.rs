//! Authoritative world state for the Flywheel market simulation.
//!
//! The [`WorldStore`] is the only component that mutates product state. It
//! turns [`Command`](flywheel_types::Command)s into either journaled events
//! or structured rejections, serializing every submission through one lock.
//!
//! # Modules
//!
//! - [`config`] -- [`ArbitrationConfig`] limits (cost floor, price band,
//!   campaign bounds).
//! - [`world`] -- [`World`], the event reducer shared by live runs and replay.
//! - [`arbitration`] -- pure command rules.
//! - [`store`] -- [`WorldStore`], the locked arbitrate/journal/apply path.

pub mod arbitration;
pub mod config;
pub mod store;
pub mod world;

pub use arbitration::arbitrate;
pub use config::ArbitrationConfig;
pub use store::{TickTally, WorldStore, WorldStoreError};
pub use world::{ReduceError, World};
