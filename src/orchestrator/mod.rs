//! Session orchestration.
//!
//! Builds on the protocol plumbing in [`crate::dap`]: a [`session::Session`]
//! owns one adapter connection, the [`launcher`] drives it through the
//! handshake, the [`registrar`] registers breakpoints in phases, and
//! [`execution`] steps and inspects the stopped debuggee. The
//! [`session_manager::SessionManager`] holds the single active session.

pub mod execution;
pub mod launcher;
pub mod line_hints;
pub mod registrar;
pub mod session;
pub mod session_manager;
