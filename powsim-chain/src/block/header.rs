use std::io;

use serde::{Deserialize, Serialize};

use crate::serialization::{SerializationError, TextDeserialize, TextSerialize, Tokens};

use super::Hash;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (`parent_hash`)
/// present in the header. Each block points backwards to its parent, all the
/// way back to the genesis block, whose parent is the null sentinel.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Header {
    /// This block's hash.
    pub hash: Hash,

    /// The hash of the parent block. `Hash::NULL` for the genesis block.
    pub parent_hash: Hash,

    /// Number of transactions confirmed by the block, coinbase included.
    pub num_tx: usize,

    /// Simulation time, in seconds, at which the block was mined.
    pub creation_time: u64,
}

impl TextSerialize for Header {
    fn text_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.hash.text_serialize(&mut target)?;
        self.parent_hash.text_serialize(&mut target)?;
        (self.num_tx as u64).text_serialize(&mut target)?;
        self.creation_time.text_serialize(&mut target)
    }
}

impl TextDeserialize for Header {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError> {
        Ok(Header {
            hash: Hash::text_deserialize(tokens)?,
            parent_hash: Hash::text_deserialize(tokens)?,
            num_tx: u64::text_deserialize(tokens)? as usize,
            creation_time: u64::text_deserialize(tokens)?,
        })
    }
}
