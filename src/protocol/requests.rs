//! Command names understood by the analysis server
//!
//! Casing is significant on the wire; these mirror the server's endpoint
//! routes exactly.

pub const ADD_TO_PROJECT: &str = "/addtoproject";
pub const AUTO_COMPLETE: &str = "/autocomplete";
pub const CODE_CHECK: &str = "/codecheck";
pub const CODE_FORMAT: &str = "/codeformat";
pub const CHANGE_BUFFER: &str = "/changebuffer";
pub const CURRENT_FILE_MEMBERS_AS_TREE: &str = "/currentfilemembersastree";
pub const FILES_CHANGED: &str = "/filesChanged";
pub const FIND_SYMBOLS: &str = "/findsymbols";
pub const FIND_USAGES: &str = "/findusages";
pub const FORMAT_AFTER_KEYSTROKE: &str = "/formatAfterKeystroke";
pub const FORMAT_RANGE: &str = "/formatRange";
pub const GET_CODE_ACTIONS: &str = "/getcodeactions";
pub const GO_TO_DEFINITION: &str = "/gotoDefinition";
pub const PROJECTS: &str = "/projects";
pub const REMOVE_FROM_PROJECT: &str = "/removefromproject";
pub const RENAME: &str = "/rename";
pub const RUN_CODE_ACTION: &str = "/runcodeaction";
pub const SIGNATURE_HELP: &str = "/signatureHelp";
pub const TYPE_LOOKUP: &str = "/typelookup";
pub const UPDATE_BUFFER: &str = "/updatebuffer";
