//! Integration tests for the plugin protocol
//!
//! Tests are organized by the story they tell:
//!
//! - `bootstrap`: Stories about starting a plugin, the magic cookie and
//!   version negotiation
//!
//! - `lifecycle`: Stories about a host driving an insecure plugin through
//!   schema, plan and stop
//!
//! - `secure`: Stories about mutual TLS with pinned ephemeral certificates
//!   and the weaker security modes

mod bootstrap;
mod helpers;
mod lifecycle;
mod secure;
