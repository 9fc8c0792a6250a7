//! Command prioritization policy
//!
//! Buffer and format mutations keep the server's view of open-file text in
//! sync; letting them queue behind slow analysis requests would make every
//! other answer stale. They therefore form a small fixed Priority set.
//! Read-style commands form the Normal set. Everything else is Deferred.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::requests;

/// Scheduling class of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    /// Buffer/format mutations; must preempt everything else
    Priority,
    /// Read-style analysis commands
    Normal,
    /// The open-ended default for any other command
    Deferred,
}

static PRIORITY_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        requests::CHANGE_BUFFER,
        requests::FORMAT_AFTER_KEYSTROKE,
        requests::FORMAT_RANGE,
        requests::UPDATE_BUFFER,
    ]
    .into_iter()
    .collect()
});

static NORMAL_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        requests::AUTO_COMPLETE,
        requests::FILES_CHANGED,
        requests::FIND_SYMBOLS,
        requests::FIND_USAGES,
        requests::GET_CODE_ACTIONS,
        requests::GO_TO_DEFINITION,
        requests::RUN_CODE_ACTION,
        requests::SIGNATURE_HELP,
        requests::TYPE_LOOKUP,
    ]
    .into_iter()
    .collect()
});

// Lookup cache for the open-ended Deferred set; membership never changes a
// classification, it only skips the two set probes on repeat commands.
static DEFERRED_COMMANDS: Lazy<RwLock<HashSet<String>>> =
    Lazy::new(|| RwLock::new(HashSet::new()));

/// Whether a command belongs to the fixed Priority set
pub fn is_priority_command(command: &str) -> bool {
    PRIORITY_COMMANDS.contains(command)
}

/// Whether a command belongs to the fixed Normal set
pub fn is_normal_command(command: &str) -> bool {
    NORMAL_COMMANDS.contains(command)
}

/// Classify a command into its scheduling class
///
/// Pure with respect to the answer: the same command always yields the same
/// class for the life of the process.
pub fn classify(command: &str) -> CommandClass {
    if DEFERRED_COMMANDS.read().contains(command) {
        return CommandClass::Deferred;
    }

    if is_priority_command(command) {
        return CommandClass::Priority;
    }

    if is_normal_command(command) {
        return CommandClass::Normal;
    }

    DEFERRED_COMMANDS.write().insert(command.to_string());
    CommandClass::Deferred
}
