use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::serialization::{SerializationError, TextDeserialize, TextSerialize, Tokens};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// A hash of a block, used to identify blocks and link them into a chain.
///
/// The simulator does no real hashing: block hashes are small integers handed
/// out sequentially at creation time. Zero is reserved as the null sentinel.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub i64);

impl Hash {
    /// The sentinel marking "no block": the parent of the genesis block, and
    /// the locator meaning "send everything".
    pub const NULL: Hash = Hash(0);

    /// True for the null sentinel.
    pub fn is_null(self) -> bool {
        self == Hash::NULL
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TextSerialize for Hash {
    fn text_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.text_serialize(target)
    }
}

impl TextDeserialize for Hash {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError> {
        Ok(Hash(i64::text_deserialize(tokens)?))
    }
}
