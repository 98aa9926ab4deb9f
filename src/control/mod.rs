//! Control channel protocol

pub mod protocol;

pub use protocol::{
    ClientCapabilities, IncomingMessage, OutgoingMessage, PendingRequests, RpcErrorBody,
};
