//! Dead letter subsystem.
//!
//! Capture happens in the consumption path (see `pipeline`); this module
//! holds the administrative surface for inspecting, re-admitting, and
//! discarding captured entries.

mod admin;

pub use admin::DlqAdmin;
