//! Server session: lifecycle, transport pumping, and request dispatch

pub mod session;

pub use session::ServerSession;
