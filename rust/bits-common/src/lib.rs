#![warn(missing_docs)]

//! This crate constitutes a library of light weight helpers that are shared
//! across the other bits crates: the injectable [`Clock`] every time-bounded
//! operation reads from, and the SHA-256 [`Digest`] that names
//! content-addressed blobs.

pub mod time;
pub use time::{Clock, FixedClock, SystemClock};

mod digest;
pub use digest::*;
