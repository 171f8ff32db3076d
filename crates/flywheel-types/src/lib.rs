//! Shared type definitions for the Flywheel market simulation.
//!
//! This crate is the leaf of the workspace. It defines the identifiers,
//! the immutable [`Event`] record and its closed [`EventKind`] variant set,
//! the [`Command`] intents arbitrated by the world store, the per-product
//! [`ProductState`] record, and [`Review`] values produced by the ranking
//! engine.
//!
//! # Modules
//!
//! - [`ids`] -- UUID-backed and string-keyed identifier newtypes.
//! - [`event`] -- [`Event`], [`EventKind`], [`EventCategory`], and the
//!   deterministic [`EventFactory`].
//! - [`command`] -- [`Command`], [`CommandKind`], and the rejection taxonomy.
//! - [`product`] -- [`ProductState`] and [`Campaign`].
//! - [`review`] -- [`Review`] and [`Sentiment`].

pub mod command;
pub mod event;
pub mod ids;
pub mod product;
pub mod review;

pub use command::{
    ArbitrationRejected, Command, CommandKind, CommandOutcome, Rejection, ValidationError,
};
pub use event::{
    Event, EventCategory, EventFactory, EventKind, EventValidationError, TickStamp,
};
pub use ids::{AgentId, EventId, ProductId, ReviewId, SimulationId};
pub use product::{Campaign, ProductState};
pub use review::{Review, ReviewError, Sentiment};
