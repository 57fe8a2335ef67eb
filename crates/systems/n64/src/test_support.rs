//! Codecs used by the unit tests.

use romfs_core::{Codec, CodecError, CompressionTag, Decompressed, RawCodec};

/// Byte-oriented run-length codec standing in for every non-raw tag.
///
/// Stream: `(count, byte)` pairs with `count` in 1..=255, terminated by a
/// single zero byte.
pub struct ToyCodec;

impl Codec for ToyCodec {
    fn decompress(
        &self,
        tag: CompressionTag,
        src: &[u8],
        decompressed_len: usize,
    ) -> Result<Decompressed, CodecError> {
        if tag.is_raw() {
            return RawCodec.decompress(tag, src, decompressed_len);
        }
        let malformed = || CodecError::Malformed {
            tag,
            reason: "stream ends before terminator".to_string(),
        };
        let mut bytes = Vec::with_capacity(decompressed_len);
        let mut pos = 0;
        loop {
            let count = *src.get(pos).ok_or_else(malformed)?;
            if count == 0 {
                pos += 1;
                break;
            }
            let value = *src.get(pos + 1).ok_or_else(malformed)?;
            bytes.extend(std::iter::repeat(value).take(count as usize));
            pos += 2;
        }
        Ok(Decompressed {
            bytes,
            consumed: pos,
        })
    }

    fn compress(&self, tag: CompressionTag, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        if tag.is_raw() {
            return Ok(src.to_vec());
        }
        let mut out = Vec::new();
        let mut iter = src.iter().peekable();
        while let Some(&value) = iter.next() {
            let mut count = 1u8;
            while count < u8::MAX && iter.peek() == Some(&&value) {
                iter.next();
                count += 1;
            }
            out.push(count);
            out.push(value);
        }
        out.push(0);
        Ok(out)
    }
}

/// Decompresses like [`ToyCodec`] but always drops the last byte.
pub struct ShortCodec;

impl Codec for ShortCodec {
    fn decompress(
        &self,
        tag: CompressionTag,
        src: &[u8],
        decompressed_len: usize,
    ) -> Result<Decompressed, CodecError> {
        let mut out = ToyCodec.decompress(tag, src, decompressed_len)?;
        out.bytes.pop();
        Ok(out)
    }

    fn compress(&self, tag: CompressionTag, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        ToyCodec.compress(tag, src)
    }
}

#[test]
fn toy_codec_roundtrip() {
    let data = [0u8, 0, 0, 5, 5, 9];
    let packed = ToyCodec.compress(CompressionTag::RLE, &data).unwrap();
    assert_eq!(packed, vec![3, 0, 2, 5, 1, 9, 0]);

    // Trailing bytes after the terminator are not part of the stream
    let mut src = packed.clone();
    src.extend_from_slice(&[0xFF, 0xFF]);
    let out = ToyCodec.decompress(CompressionTag::RLE, &src, 6).unwrap();
    assert_eq!(out.bytes, data);
    assert_eq!(out.consumed, packed.len());
}
