//! Analysis server process management

pub mod kill;
pub mod spawn;

pub use kill::{platform_killer, TreeKiller};
pub use spawn::{spawn_server, ProcessHandle};
