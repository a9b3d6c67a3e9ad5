use crate::config::Config;
use bytes::{Bytes, BytesMut};
#[cfg(feature = "brotli")]
use compression_codecs::brotli::BrotliEncoder;
use compression_codecs::{EncodeV2, gzip::GzipEncoder, zlib::ZlibEncoder};
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::fmt;
use std::io;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Supported compression codecs, in server preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Brotli compression.
    #[cfg(feature = "brotli")]
    Brotli,
    /// Gzip compression.
    Gzip,
    /// Zlib-wrapped deflate compression.
    Deflate,
}

impl Codec {
    /// Every compiled-in codec, most preferred first.
    pub const PREFERENCE: &'static [Codec] = &[
        #[cfg(feature = "brotli")]
        Codec::Brotli,
        Codec::Gzip,
        Codec::Deflate,
    ];

    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            #[cfg(feature = "brotli")]
            Codec::Brotli => "br",
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    /// Returns whether this is the Brotli codec.
    pub fn is_brotli(&self) -> bool {
        #[cfg(feature = "brotli")]
        {
            matches!(self, Codec::Brotli)
        }
        #[cfg(not(feature = "brotli"))]
        {
            false
        }
    }

    /// Creates a new encoder for this codec, configured from `config`.
    pub fn encoder(&self, config: &Config) -> Encoder {
        let inner: Box<dyn EncodeV2 + Send> = match self {
            #[cfg(feature = "brotli")]
            Codec::Brotli => {
                let quality = Level::Precise(config.brotli_quality.min(11) as i32);
                Box::new(BrotliEncoder::new(config.brotli_params.clone().quality(quality)))
            }
            Codec::Gzip => Box::new(GzipEncoder::new(config.level.into())),
            Codec::Deflate => Box::new(ZlibEncoder::new(config.level.into())),
        };

        Encoder {
            codec: *self,
            inner,
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

/// A streaming compressor: bytes in, compressed bytes out.
///
/// Output is returned as soon as the codec produces it; call
/// [`flush`](Self::flush) to force out everything accepted so far.
pub struct Encoder {
    codec: Codec,
    inner: Box<dyn EncodeV2 + Send>,
    output_buffer: Vec<u8>,
}

impl Encoder {
    /// Returns the codec this encoder produces.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Compresses `input`, returning whatever output the codec emitted.
    pub fn encode(&mut self, input: &[u8]) -> io::Result<Bytes> {
        let mut input_buf = PartialBuffer::new(input);
        let mut all_output = BytesMut::new();
        let mut consumed = 0;

        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            self.inner.encode(&mut input_buf, &mut output)?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }

            if input_buf.written_len() >= input.len() {
                break;
            }
            if written == 0 && input_buf.written_len() == consumed {
                return Err(io::Error::other(format!(
                    "{} encoder stalled with {} input bytes left",
                    self.codec,
                    input.len() - consumed
                )));
            }
            consumed = input_buf.written_len();
        }

        Ok(all_output.freeze())
    }

    /// Flushes the codec so every byte accepted so far can be decoded by the
    /// peer. The stream stays open.
    pub fn flush(&mut self) -> io::Result<Bytes> {
        self.drain_with(|inner, output| inner.flush(output))
    }

    /// Finishes the stream, returning the trailing compressed bytes.
    pub fn finish(&mut self) -> io::Result<Bytes> {
        self.drain_with(|inner, output| inner.finish(output))
    }

    fn drain_with(
        &mut self,
        mut step: impl FnMut(&mut dyn EncodeV2, &mut WriteBuffer<'_>) -> io::Result<bool>,
    ) -> io::Result<Bytes> {
        let mut all_output = BytesMut::new();
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = step(self.inner.as_mut(), &mut output)?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }
            if done {
                return Ok(all_output.freeze());
            }
        }
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder").field("codec", &self.codec).finish()
    }
}

/// A codec that never accepts input.
#[cfg(test)]
struct Stalled;

#[cfg(test)]
impl EncodeV2 for Stalled {
    fn encode(
        &mut self,
        _input: &mut PartialBuffer<&[u8]>,
        _output: &mut WriteBuffer<'_>,
    ) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self, _output: &mut WriteBuffer<'_>) -> io::Result<bool> {
        Ok(true)
    }

    fn finish(&mut self, _output: &mut WriteBuffer<'_>) -> io::Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
impl Encoder {
    pub(crate) fn stalled(codec: Codec) -> Self {
        Self {
            codec,
            inner: Box::new(Stalled),
            output_buffer: vec![0u8; 64],
        }
    }
}
