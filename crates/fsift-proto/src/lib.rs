//! Wire protocol, control protocol and transport seams.
//!
//! - [`wire`]: byte-accurate frame and keyframe-metadata messages with
//!   CRC-32 framing.
//! - [`command`]: the JSON request/reply envelope spoken on the control
//!   socket by both processes.
//! - [`control`]: a line-delimited TCP server for the command envelope.
//! - [`transport`]: the opaque message-bus seams (`MessageSource`,
//!   `MessageSink`) plus an in-process loopback pair used by tests.
//! - [`tcp`]: a minimal length-prefixed TCP reference transport.

pub mod command;
pub mod control;
pub mod error;
pub mod tcp;
pub mod transport;
pub mod wire;

pub use command::{CommandHandler, CommandRequest, CommandResponse, CommandType, ResponseCode};
pub use control::ControlServer;
pub use error::{ProtoError, ProtoResult};
pub use tcp::{TcpMessageListener, TcpMessageReceiver, TcpMessageSender};
pub use transport::{loopback, LoopbackReceiver, LoopbackSender, MessageSink, MessageSource};
pub use wire::{
    crc32, deserialize_frame, deserialize_metadata, serialize_frame, serialize_metadata,
    KeyframeMetadata, FRAME_HEADER_LEN, MAGIC, METADATA_LEN, MSG_TYPE_FRAME, MSG_TYPE_METADATA,
    PROTOCOL_VERSION,
};
