//! MIME type compressibility table.

use mime::Mime;

/// Media types (essence, lowercase) known to compress well that are not
/// covered by the `text/*` and structured-suffix rules.
const COMPRESSIBLE: &[&str] = &[
    "application/dart",
    "application/ecmascript",
    "application/graphql",
    "application/javascript",
    "application/json",
    "application/ld+json",
    "application/manifest+json",
    "application/postscript",
    "application/rtf",
    "application/tar",
    "application/toml",
    "application/vnd.api+json",
    "application/vnd.ms-fontobject",
    "application/wasm",
    "application/x-font-opentype",
    "application/x-font-truetype",
    "application/x-font-ttf",
    "application/x-httpd-php",
    "application/x-javascript",
    "application/x-ndjson",
    "application/x-sh",
    "application/x-tar",
    "application/x-web-app-manifest+json",
    "application/x-www-form-urlencoded",
    "application/xhtml+xml",
    "application/xml",
    "font/eot",
    "font/opentype",
    "font/otf",
    "font/ttf",
    "image/bmp",
    "image/svg+xml",
    "image/vnd.microsoft.icon",
    "image/x-icon",
    "image/x-ms-bmp",
];

/// Returns whether a `Content-Type` value names a compressible media type.
///
/// Parameters such as `charset` are ignored. Unknown or unparseable types are
/// treated as not compressible.
pub fn is_compressible(content_type: &str) -> bool {
    let Ok(mime) = content_type.trim().parse::<Mime>() else {
        return false;
    };

    let essence = mime.essence_str().to_ascii_lowercase();
    if essence.starts_with("text/") || COMPRESSIBLE.contains(&essence.as_str()) {
        return true;
    }

    matches!(
        mime.suffix().map(|s| s.as_str().to_ascii_lowercase()).as_deref(),
        Some("json" | "xml" | "text")
    )
}
