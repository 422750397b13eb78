//! Request body decompression.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use flate2::read::{GzDecoder, ZlibDecoder};

/// Supported `Content-Encoding` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
    Zstd,
}

impl ContentEncoding {
    /// Parse an optional header value; absent means identity.
    pub fn from_header(value: Option<&str>) -> Result<Self, UnsupportedEncoding> {
        value.map_or(Ok(Self::Identity), str::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Zstd => "zstd",
        }
    }

    /// Wrap `reader` so that reads return decompressed bytes.
    pub fn wrap<'a, R>(self, reader: R) -> io::Result<Box<dyn Read + Send + 'a>>
    where
        R: Read + Send + 'a,
    {
        Ok(match self {
            Self::Identity => Box::new(reader),
            Self::Gzip => Box::new(GzDecoder::new(reader)),
            Self::Deflate => Box::new(ZlibDecoder::new(reader)),
            Self::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }
}

impl FromStr for ContentEncoding {
    type Err = UnsupportedEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            "zstd" => Ok(Self::Zstd),
            other => Err(UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported Content-Encoding {0:?}; supported: gzip, deflate, zstd, identity")]
pub struct UnsupportedEncoding(pub String);
