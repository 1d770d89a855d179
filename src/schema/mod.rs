//! Recorded frame schema (poise.frame_record.v1)
//!
//! One record per sampled tick: what the estimators saw, whether the video
//! was ready, and which estimators failed. Used for offline replay.

mod adapter;
mod frame_record;

pub use adapter::*;
pub use frame_record::*;
