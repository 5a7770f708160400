//! Transport layer.
//!
//! XML-RPC-over-HTTP framing on raw TCP: one connection per call,
//! `Connection: close`, read to EOF, independent connect/write/read
//! timeouts. No pooling at this layer; parallelism comes from issuing
//! concurrent calls, each on its own socket.

pub mod http;

pub use http::{HttpResponse, HttpTransport, TransportTimeouts};
