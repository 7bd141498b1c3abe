//! Coordination Store client (§4.1): the single source of truth every node
//! consults for admission decisions. Realized here on Redis — sorted sets
//! scored by event timestamp plus Lua scripts evaluated via `EVAL` give the
//! atomic read-evict-check-write sequence the spec requires without a
//! separate locking protocol.

mod client;
mod script;

pub use client::{CoordinationClient, ScriptOutcome, UsageSnapshot};
