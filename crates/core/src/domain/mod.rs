//! Domain model: ledger events, actors, and the group projection folded from a ledger.

pub mod actor;
pub mod event;
pub mod group;
