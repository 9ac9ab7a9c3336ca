//! Pipeline stages for document conversion.
//!
//! ## Data Flow
//!
//! ```text
//! request ──▶ fallback ──▶ backend ──▶ validate ──┐
//!                 ▲        (process)   (magic,    │
//!                 └──── next backend ◀── size) ◀──┘ invalid / failed / timed out
//! ```
//!
//! 1. [`backend`]  — spawn one external converter with a hard timeout and
//!    normalise where it left its output
//! 2. [`validate`] — decide whether the produced file plausibly is the
//!    requested format
//! 3. [`fallback`] — walk the priority-ordered backends, recording every
//!    attempt, until one output validates

pub mod backend;
pub mod fallback;
pub mod validate;
