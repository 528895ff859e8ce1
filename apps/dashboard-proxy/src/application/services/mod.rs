//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamManager`: owns the shared upstream stream and routes bars
//! - `ClientSession`: translates one browser socket's messages into manager calls

mod client_session;
mod stream_manager;

pub use client_session::ClientSession;
pub use stream_manager::{ClientHandle, DEFAULT_EVENT_CAPACITY, StreamManager};
