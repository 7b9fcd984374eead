//! Transparent compression for file sources and text sinks.
//!
//! A [`Codec`] is picked from the file extension, falling back to the stream's
//! magic bytes when reading. Each codec sits behind its own feature:
//!
//! - **Gzip** (`.gz`, `.gzip`) via `flate2`, feature `compression-gzip`
//! - **Zstd** (`.zst`, `.zstd`) via `zstd`, feature `compression-zstd`
//! - **Bzip2** (`.bz2`, `.bzip2`) via `bzip2`, feature `compression-bzip2`
//! - **Xz** (`.xz`) via `xz2`, feature `compression-xz`
//!
//! A path naming a codec whose feature is off is an error rather than a silent
//! pass-through, so compressed bytes are never parsed as text.
//!
//! Compressed output must be finished: [`CodecWriter::finish`] writes the
//! trailer and hands back the inner writer.
//!
//! ```no_run
//! use sluice::io::compression::{auto_detect_reader, auto_detect_writer};
//! use std::fs::File;
//! use std::io::Write;
//! # fn main() -> anyhow::Result<()> {
//! let mut out = auto_detect_writer(File::create("part-00000.csv.gz")?, "part-00000.csv.gz")?;
//! out.write_all(b"1,alice\n")?;
//! out.finish()?;
//!
//! let input = auto_detect_reader(File::open("part-00000.csv.gz")?, "part-00000.csv.gz")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A compression format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    None,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

const DETECTABLE: [Codec; 4] = [Codec::Gzip, Codec::Zstd, Codec::Bzip2, Codec::Xz];

impl Codec {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    /// Lowercase extensions, leading dot included.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Gzip => &[".gz", ".gzip"],
            Self::Zstd => &[".zst", ".zstd"],
            Self::Bzip2 => &[".bz2", ".bzip2"],
            Self::Xz => &[".xz"],
        }
    }

    #[must_use]
    pub const fn magic_bytes(self) -> &'static [u8] {
        match self {
            Self::None => &[],
            Self::Gzip => &[0x1f, 0x8b],
            Self::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
            Self::Bzip2 => b"BZh",
            Self::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
        }
    }

    /// Whether support for this codec was compiled in.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        match self {
            Self::None => true,
            Self::Gzip => cfg!(feature = "compression-gzip"),
            Self::Zstd => cfg!(feature = "compression-zstd"),
            Self::Bzip2 => cfg!(feature = "compression-bzip2"),
            Self::Xz => cfg!(feature = "compression-xz"),
        }
    }

    /// Codec named by the path's extension; [`Codec::None`] when none matches.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().to_lowercase();
        DETECTABLE
            .into_iter()
            .find(|c| c.extensions().iter().any(|ext| path.ends_with(ext)))
            .unwrap_or(Self::None)
    }

    /// Codec whose signature starts `header`, among the enabled ones.
    #[must_use]
    pub fn from_magic(header: &[u8]) -> Self {
        DETECTABLE
            .into_iter()
            .filter(|c| c.is_enabled())
            .find(|c| header.starts_with(c.magic_bytes()))
            .unwrap_or(Self::None)
    }

    fn ensure_enabled(self) -> Result<()> {
        if !self.is_enabled() {
            bail!("{} compression support is not enabled", self.name());
        }
        Ok(())
    }

    /// Wrap `reader` with this codec's decoder.
    ///
    /// # Errors
    /// A disabled codec, or a decoder that fails to initialize.
    pub fn wrap_reader<R: Read + Send + 'static>(self, reader: R) -> Result<Box<dyn Read + Send>> {
        self.ensure_enabled()?;
        let wrapped: Box<dyn Read + Send> = match self {
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => Box::new(
                zstd::stream::read::Decoder::new(reader).context("initialize zstd decoder")?,
            ),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            #[cfg(feature = "compression-xz")]
            Self::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
            _ => Box::new(reader),
        };
        Ok(wrapped)
    }

    /// Wrap `writer` with this codec's encoder.
    ///
    /// # Errors
    /// A disabled codec, or an encoder that fails to initialize.
    pub fn wrap_writer<W: Write + Send>(self, writer: W) -> Result<CodecWriter<W>> {
        self.ensure_enabled()?;
        let wrapped = match self {
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => CodecWriter::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => CodecWriter::Zstd(
                zstd::stream::write::Encoder::new(writer, 3).context("initialize zstd encoder")?,
            ),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => CodecWriter::Bzip2(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::default(),
            )),
            #[cfg(feature = "compression-xz")]
            Self::Xz => CodecWriter::Xz(xz2::write::XzEncoder::new(writer, 6)),
            _ => CodecWriter::Plain(BufWriter::new(writer)),
        };
        Ok(wrapped)
    }
}

/// A writer that may be compressing.
pub enum CodecWriter<W: Write> {
    Plain(BufWriter<W>),
    #[cfg(feature = "compression-gzip")]
    Gzip(flate2::write::GzEncoder<W>),
    #[cfg(feature = "compression-zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
    #[cfg(feature = "compression-bzip2")]
    Bzip2(bzip2::write::BzEncoder<W>),
    #[cfg(feature = "compression-xz")]
    Xz(xz2::write::XzEncoder<W>),
}

impl<W: Write> CodecWriter<W> {
    /// Flush buffered data, write any trailer, and return the inner writer.
    ///
    /// # Errors
    /// I/O errors from the encoder or the inner writer.
    pub fn finish(self) -> io::Result<W> {
        let mut inner = match self {
            Self::Plain(w) => w.into_inner().map_err(io::IntoInnerError::into_error)?,
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(w) => w.finish()?,
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(w) => w.finish()?,
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2(w) => w.finish()?,
            #[cfg(feature = "compression-xz")]
            Self::Xz(w) => w.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for CodecWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(w) => w.write(buf),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(w) => w.write(buf),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2(w) => w.write(buf),
            #[cfg(feature = "compression-xz")]
            Self::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(w) => w.flush(),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(w) => w.flush(),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2(w) => w.flush(),
            #[cfg(feature = "compression-xz")]
            Self::Xz(w) => w.flush(),
        }
    }
}

/// Wrap `reader` with the decoder its path (or, failing that, its first bytes)
/// calls for.
///
/// # Errors
/// The path names a disabled codec, or the stream cannot be peeked.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read + Send>> {
    let codec = Codec::from_path(&path_hint);
    if codec != Codec::None {
        return codec
            .wrap_reader(reader)
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buffered = BufReader::new(reader);
    let header = buffered.fill_buf().context("peek stream header")?;
    let codec = Codec::from_magic(header);
    codec
        .wrap_reader(buffered)
        .with_context(|| format!("wrap reader with {} codec", codec.name()))
}

/// Wrap `writer` with the encoder its path's extension calls for.
///
/// # Errors
/// The path names a disabled codec.
pub fn auto_detect_writer<W: Write + Send>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<CodecWriter<W>> {
    let codec = Codec::from_path(&path_hint);
    codec
        .wrap_writer(writer)
        .with_context(|| format!("wrap writer with {} codec", codec.name()))
}
