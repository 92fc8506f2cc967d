//! Short channel id model
//!
//! A short channel id locates a channel's funding output on chain. It is
//! packed into 64 bits as `block_height << 40 | tx_index << 16 | output_index`
//! and written for humans as `HxTxO`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const SEPARATOR: char = 'x';
const BLOCK_HEIGHT_MAX: u32 = (1 << 24) - 1;
const TX_INDEX_MAX: u32 = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortChannelId {
    block_height: u32,
    tx_index: u32,
    output_index: u16,
}

impl ShortChannelId {
    /// Build a short channel id, rejecting components wider than their field
    pub fn new(block_height: u32, tx_index: u32, output_index: u16) -> Result<Self> {
        if block_height > BLOCK_HEIGHT_MAX {
            return Err(Error::ShortChannelId(format!(
                "block height {} does not fit in 24 bits",
                block_height
            )));
        }
        if tx_index > TX_INDEX_MAX {
            return Err(Error::ShortChannelId(format!(
                "transaction index {} does not fit in 24 bits",
                tx_index
            )));
        }

        Ok(Self {
            block_height,
            tx_index,
            output_index,
        })
    }

    /// Unpack a 64-bit short channel id. Every u64 is a valid packing.
    pub fn from_u64(packed: u64) -> Self {
        Self {
            block_height: (packed >> 40) as u32,
            tx_index: ((packed >> 16) & 0xFF_FFFF) as u32,
            output_index: (packed & 0xFFFF) as u16,
        }
    }

    pub fn to_u64(self) -> u64 {
        (u64::from(self.block_height) << 40)
            | (u64::from(self.tx_index) << 16)
            | u64::from(self.output_index)
    }

    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn tx_index(&self) -> u32 {
        self.tx_index
    }

    pub fn output_index(&self) -> u16 {
        self.output_index
    }
}

impl FromStr for ShortChannelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(Error::ShortChannelId(format!(
                "expected 3 parts in {:?}, got {}",
                s,
                parts.len()
            )));
        }

        let component = |part: &str, name: &str| -> Result<u64> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::ShortChannelId(format!(
                    "{} {:?} is not numeric",
                    name, part
                )));
            }
            part.parse::<u64>()
                .map_err(|e| Error::ShortChannelId(format!("{} {:?}: {}", name, part, e)))
        };

        let block_height = component(parts[0], "block height")?;
        let tx_index = component(parts[1], "transaction index")?;
        let output_index = component(parts[2], "output index")?;

        let output_index = u16::try_from(output_index).map_err(|_| {
            Error::ShortChannelId(format!(
                "output index {} does not fit in 16 bits",
                output_index
            ))
        })?;
        let block_height = u32::try_from(block_height).unwrap_or(u32::MAX);
        let tx_index = u32::try_from(tx_index).unwrap_or(u32::MAX);

        Self::new(block_height, tx_index, output_index)
    }
}

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.block_height,
            self.tx_index,
            self.output_index,
            sep = SEPARATOR
        )
    }
}

impl From<ShortChannelId> for u64 {
    fn from(scid: ShortChannelId) -> Self {
        scid.to_u64()
    }
}

impl From<u64> for ShortChannelId {
    fn from(packed: u64) -> Self {
        Self::from_u64(packed)
    }
}

impl TryFrom<String> for ShortChannelId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ShortChannelId> for String {
    fn from(scid: ShortChannelId) -> Self {
        scid.to_string()
    }
}
