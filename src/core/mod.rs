//! Session plumbing shared by local and remote runs.
//!
//! - **context**: rendering context (size, color profile) a program starts with
//! - **session**: event loop driving a program against an input queue and an
//!   output sink

pub mod context;
pub mod session;
