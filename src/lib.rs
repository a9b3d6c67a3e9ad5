//! HTTP response compression.
//!
//! This crate compresses HTTP response bodies with Brotli, gzip or deflate,
//! chosen from the client's `Accept-Encoding` header. It can be used two ways:
//!
//! - as a Tower layer, wrapping any service that returns `http::Response`s;
//! - by intercepting a push-style response [`Transport`], where the handler
//!   writes headers and body chunks and reacts to `drain` backpressure events.
//!
//! # Example
//!
//! ```ignore
//! use response_compression::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new().threshold("1kb"))
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The decision is made once, when the response head is finalized. A response
//! is **not** compressed when:
//! - The filter rejects it (by default: missing or non-compressible `Content-Type`)
//! - `Cache-Control` contains `no-transform`
//! - Its known size is below the threshold (default: 1024 bytes)
//! - `Content-Encoding` is already set to something other than `identity`
//! - The request method is `HEAD`
//! - No supported encoding is acceptable to the client
//!
//! # Response Modifications
//!
//! Once the filter and `no-transform` checks pass, `Vary` includes
//! `Accept-Encoding`. When compression is applied:
//! - `Content-Encoding` is set to the codec used
//! - `Content-Length` is removed (compressed size is unknown)

#![deny(missing_docs)]

mod accept;
mod body;
mod codec;
mod compressible;
mod config;
mod future;
mod layer;
mod negotiate;
mod response;
mod service;
mod stream;
mod transport;

pub use accept::AcceptEncoding;
pub use body::CompressionBody;
pub use codec::{Codec, Encoder};
#[cfg(feature = "brotli")]
pub use compression_codecs::brotli::params::EncoderParams as BrotliParams;
pub use compressible::is_compressible;
pub use config::{
    BROTLI_AVAILABLE, Config, DEFAULT_BROTLI_QUALITY, DEFAULT_THRESHOLD, Filter, Threshold,
    parse_size,
};
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use negotiate::{
    is_compressible_type, is_transform_allowed, meets_threshold, select_encoding, should_compress,
};
pub use response::CompressedResponse;
pub use service::CompressionService;
pub use transport::{Event, Listener, Listeners, Transport};
