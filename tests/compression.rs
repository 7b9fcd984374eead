//! Codec selection by extension and magic bytes.

use anyhow::Result;
use sluice::io::compression::{Codec, auto_detect_reader, auto_detect_writer};
use std::io::{Cursor, Read, Write};

const PAYLOAD: &[u8] = b"id,name\n1,alice\n2,bob\n";

fn compress(name: &str) -> Result<Vec<u8>> {
    let mut out = auto_detect_writer(Vec::new(), name)?;
    out.write_all(PAYLOAD)?;
    Ok(out.finish()?)
}

fn decompress(bytes: Vec<u8>, name: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    auto_detect_reader(Cursor::new(bytes), name)?.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn test_codec_from_path() {
    assert_eq!(Codec::from_path("a/part-00000.csv.GZ"), Codec::Gzip);
    assert_eq!(Codec::from_path("x.zst"), Codec::Zstd);
    assert_eq!(Codec::from_path("x.bz2"), Codec::Bzip2);
    assert_eq!(Codec::from_path("x.xz"), Codec::Xz);
    assert_eq!(Codec::from_path("x.csv"), Codec::None);
}

#[test]
fn test_plain_passes_through() -> Result<()> {
    let bytes = compress("part.csv")?;
    assert_eq!(bytes, PAYLOAD);
    assert_eq!(decompress(bytes, "part.csv")?, PAYLOAD);
    Ok(())
}

#[test]
fn test_every_enabled_codec_round_trips_and_is_sniffed() -> Result<()> {
    let codecs = [
        (Codec::Gzip, "part.csv.gz"),
        (Codec::Zstd, "part.csv.zst"),
        (Codec::Bzip2, "part.csv.bz2"),
        (Codec::Xz, "part.csv.xz"),
    ];
    for (codec, name) in codecs.into_iter().filter(|(c, _)| c.is_enabled()) {
        let bytes = compress(name)?;
        assert!(bytes.starts_with(codec.magic_bytes()), "{name}");
        assert_eq!(Codec::from_magic(&bytes), codec);
        assert_eq!(decompress(bytes.clone(), name)?, PAYLOAD, "{name}");
        // no extension: detected from the header
        assert_eq!(decompress(bytes, "part.bin")?, PAYLOAD, "{name}");
    }
    Ok(())
}

#[test]
fn test_unknown_header_is_plain() {
    assert_eq!(Codec::from_magic(b"hello"), Codec::None);
    assert_eq!(Codec::from_magic(&[]), Codec::None);
}
