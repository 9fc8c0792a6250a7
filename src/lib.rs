//! Client bridge for OmniSharp-style analysis servers
//!
//! This crate starts an external language-analysis server process and talks
//! to it over a line-delimited JSON request/response/event protocol. All
//! traffic is mediated by a prioritized request scheduler that enforces
//! bounded concurrency per priority class, exactly-once dispatch and
//! completion per request, response correlation by sequence number, and
//! cancellation.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        ServerSession                              │
//! │                                                                   │
//! │  make_request ──► RequestQueueCollection                          │
//! │                   ┌──────────┐ ┌──────────┐ ┌──────────┐          │
//! │                   │ priority │ │  normal  │ │ deferred │          │
//! │                   │  cap 1   │ │  cap N   │ │ cap N/4  │          │
//! │                   └────┬─────┘ └────┬─────┘ └────┬─────┘          │
//! │                        └─────── drain ───────────┘                │
//! │                                  │                                │
//! │                           writer task ──► server stdin            │
//! │                                                                   │
//! │   server stdout ──► reader task ──┬─► responses ─► scheduler      │
//! │                                   ├─► events ────► broadcast bus  │
//! │                                   └─► plain text ► tracing sink   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Buffer and format mutations (the priority class) keep the server's view
//! of open-file text in sync, so they preempt all other traffic: while a
//! priority request is pending or in flight, nothing else is admitted.
//!
//! # Module Organization
//!
//! - `protocol`: wire packet codec, command names, prioritization policy
//! - `queue`: per-class request queues and the admission scheduler
//! - `session`: the transport session owning the process and its stdio
//! - `process`: child spawn and process-tree termination
//! - `error`: error types and the crate result alias
//! - `types`: server options, session state, event payloads

pub mod error;
pub mod process;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod types;

// Re-export public API
pub use error::{BridgeError, Result};
pub use process::{platform_killer, spawn_server, ProcessHandle, TreeKiller};
pub use protocol::{classify, CommandClass, EventPacket, RequestPacket, ResponsePacket};
pub use queue::{DispatchFn, PendingRequest, RequestQueue, RequestQueueCollection};
pub use session::ServerSession;
pub use types::{ServerEvent, ServerOptions, SessionState};
