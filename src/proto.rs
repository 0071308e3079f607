mod proto_identity;
mod proto_reply;
mod proto_request;
mod proto_wire;

pub use proto_identity::{Identity, read_facet_path, write_facet_path};
pub use proto_reply::{Reply, ReplyStatus, decode_reply};
pub use proto_request::{Context, RequestEnvelope};
pub use proto_wire::{WireError, WireReader, WireWriter};
