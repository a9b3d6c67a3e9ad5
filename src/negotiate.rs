//! Compression negotiation.
//!
//! Pure checks deciding whether a response may be compressed and with which
//! codec, plus [`negotiate`], which runs them in order and rewrites the
//! response headers once the response head is final.

use crate::accept::AcceptEncoding;
use crate::codec::Codec;
use crate::compressible::is_compressible;
use crate::config::{BROTLI_AVAILABLE, Config};
use http::{HeaderMap, Method, Request, header};

/// Default filter: compress only when the response declares a compressible
/// `Content-Type`.
pub fn should_compress(_request: &Request<()>, headers: &HeaderMap) -> bool {
    let compressible = is_compressible_type(headers);
    if !compressible {
        tracing::debug!(
            content_type = ?headers.get(header::CONTENT_TYPE),
            "content type not compressible"
        );
    }
    compressible
}

/// Checks that the response declares a compressible `Content-Type`.
pub fn is_compressible_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_compressible)
}

/// Checks that no `Cache-Control: no-transform` directive forbids altering
/// the body.
pub fn is_transform_allowed(headers: &HeaderMap) -> bool {
    !headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|directive| directive.trim() == "no-transform"))
}

/// Picks the first codec, in fixed server preference order, that the client
/// accepts.
///
/// Brotli is skipped unless it is both `available` and `enabled`. A missing
/// header accepts nothing but identity.
pub fn select_encoding(
    accept_encoding: Option<&str>,
    brotli_available: bool,
    brotli_enabled: bool,
) -> Option<Codec> {
    let accept = AcceptEncoding::parse(accept_encoding.unwrap_or(""));

    Codec::PREFERENCE
        .iter()
        .copied()
        .filter(|codec| !codec.is_brotli() || (brotli_available && brotli_enabled))
        .find(|codec| accept.accepts(codec.content_encoding()))
}

/// Checks the body size against the threshold. An unknown length passes.
pub fn meets_threshold(length: Option<u64>, threshold: u64) -> bool {
    length.is_none_or(|len| len >= threshold)
}

/// Returns the declared `Content-Length`, if present and numeric.
pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Checks if a non-identity Content-Encoding is already set.
fn is_already_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| !v.as_bytes().eq_ignore_ascii_case(b"identity"))
}

/// Adds Accept-Encoding to the Vary header if not already present.
pub(crate) fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    // Check all Vary headers to see if Accept-Encoding is already present
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let listed = vary_str.split(',').any(|v| {
                let v = v.trim();
                v == "*" || v.eq_ignore_ascii_case("accept-encoding")
            });
            if listed {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        header::HeaderValue::from_static("Accept-Encoding"),
    );
}

/// Decides whether and how to compress a response whose head is about to be
/// sent, rewriting `headers` accordingly.
///
/// `estimated_length` is consulted only when no `Content-Length` is declared.
/// Returns the codec to compress with, or `None` to send the body as is.
pub(crate) fn negotiate(
    request: &Request<()>,
    headers: &mut HeaderMap,
    estimated_length: Option<u64>,
    config: &Config,
) -> Option<Codec> {
    if !config.filter(request, headers) {
        tracing::debug!("no compression: filtered");
        return None;
    }

    if !is_transform_allowed(headers) {
        tracing::debug!("no compression: no transform");
        return None;
    }

    // The outcome now depends on Accept-Encoding, whatever it turns out to be.
    add_vary_accept_encoding(headers);

    let length = content_length(headers).or(estimated_length);
    if !meets_threshold(length, config.threshold()) {
        tracing::debug!(
            ?length,
            threshold = config.threshold(),
            "no compression: size below threshold"
        );
        return None;
    }

    if is_already_encoded(headers) {
        tracing::debug!("no compression: already encoded");
        return None;
    }

    if request.method() == Method::HEAD {
        tracing::debug!("no compression: HEAD request");
        return None;
    }

    let accept_encoding = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok());
    let Some(codec) = select_encoding(accept_encoding, BROTLI_AVAILABLE, config.brotli_enabled)
    else {
        tracing::debug!("no compression: not acceptable");
        return None;
    };

    tracing::debug!(%codec, "compressing response");

    headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static(codec.content_encoding()),
    );
    // Compressed size is unknown until the body has been produced.
    headers.remove(header::CONTENT_LENGTH);

    Some(codec)
}

/// Copies the parts of a request the decision needs, so it can outlive the
/// request itself.
pub(crate) fn request_head<B>(request: &Request<B>) -> Request<()> {
    let mut head = Request::new(());
    *head.method_mut() = request.method().clone();
    *head.uri_mut() = request.uri().clone();
    *head.version_mut() = request.version();
    *head.headers_mut() = request.headers().clone();
    head
}
