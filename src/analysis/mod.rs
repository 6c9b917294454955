//! Summaries computed from assembled series.
//!
//! Submodules:
//! - `yearly` - per-calendar-year mean/max/min/median and percentiles.
//!
//! These consume the output of collection; nothing in the retrieval core
//! depends on them.

pub mod yearly;
