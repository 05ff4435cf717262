//! Wire-level request and response codecs.
//!
//! - Request side:
//!   - [`HeadFramer`]: reads raw head bytes up to the blank-line terminator
//!   - [`HeadParser`]: turns the framed bytes into a [`RequestHead`](crate::protocol::RequestHead)
//!
//! - Response side:
//!   - [`HeadEncoder`]: serializes the status line and header block
//!
//! Bodies are not framed here: request bodies are read through
//! [`BodyReader`](crate::protocol::BodyReader) and response bodies are copied
//! by the exchange.

mod head_encoder;
mod head_framer;
mod head_parser;

pub use head_encoder::HeadEncoder;
pub use head_encoder::ResponseHead;
pub use head_framer::DEFAULT_MAX_HEAD_SIZE;
pub use head_framer::HeadFramer;
pub use head_framer::HeadStatus;
pub use head_parser::HeadParser;
pub use head_parser::MAX_HEADER_NUM;
