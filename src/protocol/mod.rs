//! Wire protocol handling and command classification

pub mod prioritization;
pub mod requests;
pub mod wire;

pub use prioritization::{classify, CommandClass};
pub use wire::{
    decode_line, encode_request, strip_bom, Decoded, DropReason, EventPacket, RequestPacket,
    ResponsePacket, LOG_EVENT, STARTED_EVENT,
};
