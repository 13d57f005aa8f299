//! Session admission.
//!
//! Only one shell session may run across the whole service. The gate is an
//! explicit object shared by `Arc` with every connection task.

mod admission;

pub use admission::{SessionGate, SessionPermit};
