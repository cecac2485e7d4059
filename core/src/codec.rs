//! Postings compression.
//!
//! A codec turns a sorted doc id list and its parallel term-frequency list into
//! byte spans. Spans are self-delimiting given their recorded length, so the
//! index layer only stores offsets and byte lengths.

use crate::error::IndexError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub trait PostingsCodec: Send + Sync {
    /// Name recorded in index metadata.
    fn name(&self) -> &'static str;
    /// Encode an ascending doc id list.
    fn encode(&self, postings: &[u32]) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u32>>;
    fn encode_tf(&self, tfs: &[u32]) -> Vec<u8>;
    fn decode_tf(&self, bytes: &[u8]) -> Result<Vec<u32>>;
}

/// Fixed-width little-endian `u32`s, no gap transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPostings;

impl StandardPostings {
    fn write(values: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(values.len() * 4);
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn read(bytes: &[u8]) -> Result<Vec<u32>> {
        if bytes.len() % 4 != 0 {
            return Err(IndexError::Corrupt(format!("{} bytes is not a multiple of 4", bytes.len())).into());
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

impl PostingsCodec for StandardPostings {
    fn name(&self) -> &'static str { "standard" }
    fn encode(&self, postings: &[u32]) -> Vec<u8> { Self::write(postings) }
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u32>> { Self::read(bytes) }
    fn encode_tf(&self, tfs: &[u32]) -> Vec<u8> { Self::write(tfs) }
    fn decode_tf(&self, bytes: &[u8]) -> Result<Vec<u32>> { Self::read(bytes) }
}

/// Variable-byte encoding. Doc ids are gap-encoded first; term frequencies are not.
///
/// Each integer is emitted as 7-bit groups, least significant group first. Every
/// byte but the last of an integer has its high bit set.
#[derive(Debug, Clone, Copy, Default)]
pub struct VbePostings;

impl VbePostings {
    pub fn vb_encode_number(mut value: u32, out: &mut Vec<u8>) {
        while value >= 0x80 {
            out.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    pub fn vb_encode(values: impl IntoIterator<Item = u32>) -> Vec<u8> {
        let mut out = Vec::new();
        for v in values {
            Self::vb_encode_number(v, &mut out);
        }
        out
    }

    pub fn vb_decode(bytes: &[u8]) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        let mut value: u64 = 0;
        let mut shift = 0u32;
        for &b in bytes {
            value |= ((b & 0x7F) as u64) << shift;
            if b & 0x80 == 0 {
                let v = u32::try_from(value)
                    .map_err(|_| IndexError::Corrupt(format!("varint {value} overflows u32")))?;
                out.push(v);
                value = 0;
                shift = 0;
            } else {
                shift += 7;
                if shift > 28 {
                    return Err(IndexError::Corrupt("varint longer than 5 bytes".into()).into());
                }
            }
        }
        if shift != 0 {
            return Err(IndexError::Corrupt("truncated varint at end of span".into()).into());
        }
        Ok(out)
    }
}

impl PostingsCodec for VbePostings {
    fn name(&self) -> &'static str { "vbe" }

    fn encode(&self, postings: &[u32]) -> Vec<u8> {
        let mut prev = 0u32;
        Self::vb_encode(postings.iter().map(|&id| {
            let gap = id.wrapping_sub(prev);
            prev = id;
            gap
        }))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u32>> {
        let mut gaps = Self::vb_decode(bytes)?;
        let mut acc = 0u32;
        for g in gaps.iter_mut() {
            acc = acc
                .checked_add(*g)
                .ok_or_else(|| IndexError::Corrupt("doc id gap overflows u32".into()))?;
            *g = acc;
        }
        Ok(gaps)
    }

    fn encode_tf(&self, tfs: &[u32]) -> Vec<u8> { Self::vb_encode(tfs.iter().copied()) }

    fn decode_tf(&self, bytes: &[u8]) -> Result<Vec<u32>> { Self::vb_decode(bytes) }
}

/// Runtime codec choice, resolved from the name stored in index metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Vbe,
    Standard,
}

impl CodecKind {
    fn inner(&self) -> &'static dyn PostingsCodec {
        match self {
            CodecKind::Vbe => &VbePostings,
            CodecKind::Standard => &StandardPostings,
        }
    }
}

impl PostingsCodec for CodecKind {
    fn name(&self) -> &'static str { self.inner().name() }
    fn encode(&self, postings: &[u32]) -> Vec<u8> { self.inner().encode(postings) }
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u32>> { self.inner().decode(bytes) }
    fn encode_tf(&self, tfs: &[u32]) -> Vec<u8> { self.inner().encode_tf(tfs) }
    fn decode_tf(&self, bytes: &[u8]) -> Result<Vec<u32>> { self.inner().decode_tf(bytes) }
}

impl FromStr for CodecKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vbe" => Ok(CodecKind::Vbe),
            "standard" => Ok(CodecKind::Standard),
            other => Err(IndexError::UnknownCodec(other.to_string())),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
