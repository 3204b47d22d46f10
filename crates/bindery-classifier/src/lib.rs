//! Code classifier for bindings.
//!
//! Decides, without running anything, whether a binding can be shown in the
//! simplified action selector or has to be edited as free-form code.

mod classify;
mod scan;

pub use classify::{Classification, classify, classify_binding};
