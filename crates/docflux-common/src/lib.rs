//! docflux common types, protocol and transport
//!
//! This crate provides the wire-level foundation for the docflux
//! conversion balancer: the XML-RPC protocol types and codec, the error
//! taxonomy, and the HTTP-over-TCP transport used to reach conversion
//! backends.
//!
//! # Overview
//!
//! docflux multiplexes document-conversion requests across a pool of
//! XML-RPC conversion servers. This crate contains the pieces shared by
//! the client and balancer layers:
//!
//! - **Protocol layer**: [`Value`] grammar, `methodCall`/`methodResponse`
//!   codec, [`ConvertError`] classification
//! - **Transport layer**: one-connection-per-call HTTP POST framing with
//!   per-phase timeouts
//!
//! # Example
//!
//! ```
//! use docflux_common::protocol::{encode_method_call, Value};
//!
//! let call = encode_method_call(
//!     "convert",
//!     &[Value::from("/in.odt"), Value::Nil, Value::from("/out.pdf")],
//! );
//! assert!(call.contains("<methodName>convert</methodName>"));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::{ConvertError, Result, Value};
