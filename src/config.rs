#[cfg(feature = "brotli")]
use compression_codecs::brotli::params::EncoderParams as BrotliParams;
use compression_core::Level;
use http::{HeaderMap, Request};
use std::fmt;
use std::sync::Arc;

/// Default minimum body size for compression.
pub const DEFAULT_THRESHOLD: u64 = 1024;

/// Default Brotli quality, tuned for streaming responses rather than ratio.
pub const DEFAULT_BROTLI_QUALITY: u32 = 4;

/// Whether Brotli support was compiled in.
pub const BROTLI_AVAILABLE: bool = cfg!(feature = "brotli");

/// Predicate deciding whether a response is eligible for compression.
///
/// Receives the request head and the response headers as they stand when the
/// response head is finalized.
pub type Filter = Arc<dyn Fn(&Request<()>, &HeaderMap) -> bool + Send + Sync>;

/// Minimum body size, in bytes, below which responses are not compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(u64);

impl Threshold {
    /// Returns the threshold in bytes.
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl From<u64> for Threshold {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl From<usize> for Threshold {
    fn from(bytes: usize) -> Self {
        Self(bytes as u64)
    }
}

impl From<&str> for Threshold {
    /// Parses a human readable size such as `"1kb"`; falls back to the
    /// default when the value cannot be parsed.
    fn from(s: &str) -> Self {
        parse_size(s).map(Self).unwrap_or_default()
    }
}

/// Parses a size string like `"512"`, `"100b"`, `"1kb"` or `"1.5 MB"`.
///
/// Units are powers of 1024 and case-insensitive. Fractional results are
/// floored and negative sizes clamp to zero. A bare number may be followed by
/// trailing garbage, which is ignored.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();

    const UNITS: [(&str, u64); 5] = [
        ("kb", 1 << 10),
        ("mb", 1 << 20),
        ("gb", 1 << 30),
        ("tb", 1 << 40),
        ("pb", 1 << 50),
    ];

    for (unit, factor) in UNITS {
        if let Some(number) = lower.strip_suffix(unit) {
            let number = number.trim_end();
            if is_decimal(number) {
                let value: f64 = number.parse().ok()?;
                return Some((value * factor as f64).floor().max(0.0) as u64);
            }
        }
    }

    // No recognized unit: take the leading integer, like a lenient atoi.
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: u64 = digits[..end].parse().ok()?;
    Some(if sign < 0 { 0 } else { value })
}

/// Matches `[+-]?\d+(\.\d+)?`.
fn is_decimal(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int, frac) = match s.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (s, None),
    };
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    all_digits(int) && frac.is_none_or(all_digits)
}

/// Compression settings shared by every response a layer handles.
#[derive(Clone)]
pub struct Config {
    pub(crate) threshold: Threshold,
    pub(crate) filter: Option<Filter>,
    pub(crate) brotli_enabled: bool,
    pub(crate) brotli_quality: u32,
    /// Window, block size and mode for Brotli; quality is overridden by
    /// `brotli_quality`.
    #[cfg(feature = "brotli")]
    pub(crate) brotli_params: BrotliParams,
    pub(crate) level: Level,
}

impl Config {
    /// Returns the configured size threshold in bytes.
    pub fn threshold(&self) -> u64 {
        self.threshold.bytes()
    }

    /// Returns whether Brotli may be negotiated, taking availability into account.
    pub fn brotli_enabled(&self) -> bool {
        BROTLI_AVAILABLE && self.brotli_enabled
    }

    /// Runs the configured filter, or [`should_compress`](crate::should_compress)
    /// if none was set.
    pub(crate) fn filter(&self, request: &Request<()>, headers: &HeaderMap) -> bool {
        match &self.filter {
            Some(filter) => filter(request, headers),
            None => crate::negotiate::should_compress(request, headers),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: Threshold::default(),
            filter: None,
            brotli_enabled: true,
            brotli_quality: DEFAULT_BROTLI_QUALITY,
            #[cfg(feature = "brotli")]
            brotli_params: BrotliParams::default(),
            level: Level::Default,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Config");
        debug
            .field("threshold", &self.threshold)
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .field("brotli_enabled", &self.brotli_enabled)
            .field("brotli_quality", &self.brotli_quality);
        #[cfg(feature = "brotli")]
        debug.field("brotli_params", &self.brotli_params);
        debug.field("level", &self.level).finish()
    }
}
