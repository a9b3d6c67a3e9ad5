//! `Accept-Encoding` parsing.

/// A parsed `Accept-Encoding` header.
///
/// Only answers one question: is a given content-coding acceptable to the
/// client? Preference between acceptable codings is the server's call.
#[derive(Debug, Clone, Default)]
pub struct AcceptEncoding<'a> {
    entries: Vec<(&'a str, f32)>,
}

impl<'a> AcceptEncoding<'a> {
    /// Parses a header value like `"gzip, br;q=1.0, *;q=0"`.
    ///
    /// Entries with a malformed quality value are ignored.
    pub fn parse(header: &'a str) -> Self {
        let entries = header
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(parse_encoding_with_quality)
            .collect();
        Self { entries }
    }

    /// Returns the quality the client assigned to `coding`, if any.
    ///
    /// An explicit entry for the coding wins over a `*` wildcard.
    pub fn quality(&self, coding: &str) -> Option<f32> {
        self.max_quality(|name| name.eq_ignore_ascii_case(coding))
            .or_else(|| self.max_quality(|name| name == "*"))
    }

    fn max_quality(&self, matches: impl Fn(&str) -> bool) -> Option<f32> {
        self.entries
            .iter()
            .filter(|(name, _)| matches(name))
            .map(|&(_, q)| q)
            .reduce(f32::max)
    }

    /// Returns whether `coding` is acceptable, i.e. listed (explicitly or via
    /// `*`) with a non-zero quality.
    pub fn accepts(&self, coding: &str) -> bool {
        self.quality(coding).is_some_and(|q| q > 0.0)
    }
}

/// Parses an encoding entry like "gzip" or "br;q=0.8" into (encoding, quality).
fn parse_encoding_with_quality(s: &str) -> Option<(&str, f32)> {
    let mut parts = s.split(';');
    let encoding = parts.next().unwrap_or("").trim();
    if encoding.is_empty() {
        return None;
    }

    let mut quality = 1.0;
    for param in parts {
        let param = param.trim();
        if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
            quality = q.trim().parse::<f32>().ok().filter(|q| (0.0..=1.0).contains(q))?;
        }
    }

    Some((encoding, quality))
}
