//! Request queueing and admission across priority classes

pub mod collection;
pub mod request;
pub mod request_queue;

pub use collection::{DispatchFn, RequestQueueCollection};
pub use request::PendingRequest;
pub use request_queue::RequestQueue;
