//! docflux converter client
//!
//! This crate provides [`ConverterClient`], the XML-RPC client for a
//! single document-conversion backend.
//!
//! # Overview
//!
//! The client speaks XML-RPC-over-HTTP on a fresh TCP connection per
//! call. It exposes three operations:
//!
//! - [`ConverterClient::convert`] - run one conversion attempt. Stream
//!   jobs send the document inline (base64) and get the converted
//!   payload back inline; FilePath jobs name input/output paths on the
//!   backend's filesystem and get an acknowledgement.
//! - [`ConverterClient::ping`] - liveness probe; never propagates an
//!   error, just answers `true`/`false`.
//! - [`ConverterClient::supported_formats`] - format diagnostic.
//!
//! # Retry behavior
//!
//! None, on purpose. The client reports exactly one error kind per
//! attempt; retrying across backends is the balancer's job.

pub mod client;
pub mod job;

pub use client::ConverterClient;
pub use job::{ConvertJob, ConvertOutput, JobBody};
