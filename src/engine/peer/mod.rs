// Keyhost Engine — Framed Peer Protocol
//
// Length-prefixed JSON messages with handler dispatch and correlated RPC,
// used for the browser-extension channel.
//
//   types   — message envelope + RPC options
//   framing — 4-byte LE length prefix encode/decode
//   channel — reader loop, writer, RPC correlation

pub mod channel;
pub mod framing;
pub mod types;

pub use channel::PeerChannel;
pub use framing::{encode_frame, FrameDecoder};
pub use types::{Message, RpcErrorBody, RpcOptions};
