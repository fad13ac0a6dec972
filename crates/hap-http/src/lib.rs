//! # hap-http
//!
//! HTTP/1.1 plumbing for HAP controller connections.
//!
//! This crate provides:
//! - Incremental request parsing (pipelined, frame-fragmented input)
//! - Response and `EVENT/1.0` serialization, plus parsing for the
//!   controller side
//! - HAP JSON request bodies and the `/characteristics` query string

pub mod body;
mod request;
mod response;

pub use body::{PrepareRequest, ReadQuery, WriteItem, WriteRequest};
pub use request::{parse_request, HttpRequest, Method, MAX_BODY_BYTES, MAX_HEADER_BYTES};
pub use response::{
    reason_phrase, HttpResponse, Protocol, CONTENT_TYPE_HAP_JSON, CONTENT_TYPE_PAIRING_TLV,
};
