//! Payload compression for component and resource entries

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Compression codec recorded in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Payloads are stored as-is
    None,
    /// Payloads are zlib-wrapped deflate streams
    Deflate,
}

/// Compression setting for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    pub codec: Codec,
    /// Level 1-9; ignored when the codec is `None`
    #[serde(default)]
    pub level: u32,
}

impl Compression {
    /// No compression
    pub fn none() -> Self {
        Self {
            codec: Codec::None,
            level: 0,
        }
    }

    /// Deflate at the given level, clamped to 1-9
    pub fn deflate(level: u32) -> Self {
        Self {
            codec: Codec::Deflate,
            level: level.clamp(1, 9),
        }
    }

    /// Whether payloads are compressed
    pub fn is_enabled(&self) -> bool {
        self.codec != Codec::None
    }

    /// Compress a payload
    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self.codec {
            Codec::None => Ok(data.to_vec()),
            Codec::Deflate => {
                let mut encoder =
                    ZlibEncoder::new(Vec::new(), flate2::Compression::new(self.level));
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }

    /// Decompress a payload
    pub fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self.codec {
            Codec::None => Ok(data.to_vec()),
            Codec::Deflate => {
                let mut decoded = Vec::with_capacity(data.len() * 2);
                ZlibDecoder::new(data).read_to_end(&mut decoded)?;
                Ok(decoded)
            }
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_none_is_passthrough() {
        let codec = Compression::none();
        assert!(!codec.is_enabled());
        assert_eq!(codec.compress(b"abc").unwrap(), b"abc");
        assert_eq!(codec.decompress(b"abc").unwrap(), b"abc");
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(6, 6)]
    #[case(9, 9)]
    #[case(12, 9)]
    fn test_deflate_level_clamped(#[case] requested: u32, #[case] expected: u32) {
        assert_eq!(Compression::deflate(requested).level, expected);
    }

    #[test]
    fn test_deflate_shrinks_repetitive_data() {
        let codec = Compression::deflate(9);
        let data = vec![b'a'; 4096];
        let packed = codec.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(codec.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_deflate_rejects_garbage() {
        let codec = Compression::deflate(6);
        assert!(codec.decompress(b"definitely not zlib").is_err());
    }
}
