//! XML-RPC protocol layer.
//!
//! Pure encode/decode between domain [`Value`] trees and XML-RPC
//! documents, plus the error taxonomy shared by every docflux crate.
//!
//! - [`value`] - the value grammar (string, int/i4, double, boolean,
//!   base64, nil, array, struct)
//! - [`codec`] - `methodCall` / `methodResponse` encoding and decoding
//! - [`error`] - [`ConvertError`] with retryable classification

pub mod codec;
pub mod error;
pub mod value;

pub use codec::{decode_method_call, decode_method_response, encode_method_call};
pub use error::{ConvertError, Result};
pub use value::Value;
