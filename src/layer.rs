use crate::config::{Config, Threshold};
use crate::negotiate::request_head;
use crate::response::CompressedResponse;
use crate::service::CompressionService;
use crate::transport::Transport;
use compression_core::Level;
use http::{HeaderMap, Request};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tower::Layer;

/// Configured response compression.
///
/// As a Tower layer it compresses the bodies of wrapped services' responses;
/// [`intercept`](Self::intercept) applies the same rules to a push-style
/// [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    config: Arc<Config>,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// Responses of at least 1024 bytes (or of unknown size) with a
    /// compressible content type are compressed with Brotli, gzip or deflate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Accepts a byte count or a size string such as `"1kb"`; strings that
    /// fail to parse leave the default of 1024 bytes in place. Responses whose
    /// known size is smaller are not compressed.
    pub fn threshold(mut self, threshold: impl Into<Threshold>) -> Self {
        Arc::make_mut(&mut self.config).threshold = threshold.into();
        self
    }

    /// Replaces the default content-type based [`should_compress`] filter.
    ///
    /// [`should_compress`]: crate::should_compress
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Request<()>, &HeaderMap) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.config).filter = Some(Arc::new(filter));
        self
    }

    /// Enables or disables Brotli negotiation.
    pub fn brotli(mut self, enabled: bool) -> Self {
        Arc::make_mut(&mut self.config).brotli_enabled = enabled;
        self
    }

    /// Sets the Brotli quality (0-11, default 4).
    pub fn brotli_quality(mut self, quality: u32) -> Self {
        Arc::make_mut(&mut self.config).brotli_quality = quality.min(11);
        self
    }

    /// Sets the Brotli encoder parameters (window size, block size, mode).
    ///
    /// The quality in `params` is ignored; use
    /// [`brotli_quality`](Self::brotli_quality) instead.
    #[cfg(feature = "brotli")]
    pub fn brotli_params(mut self, params: crate::BrotliParams) -> Self {
        Arc::make_mut(&mut self.config).brotli_params = params;
        self
    }

    /// Sets the compression level used for gzip and deflate.
    pub fn level(mut self, level: Level) -> Self {
        Arc::make_mut(&mut self.config).level = level;
        self
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wraps a response transport so its body is compressed when the
    /// request and response allow it.
    pub fn intercept<B, T>(&self, request: &Request<B>, transport: Rc<RefCell<T>>) -> CompressedResponse<T>
    where
        T: Transport + 'static,
    {
        CompressedResponse::new(request_head(request), transport, self.config.clone())
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.config.clone())
    }
}
