//! Transactions, modeled after Bitcoin's Pay-to-PubKey type with integer
//! "crypto": an output names a public key, and a spending input proves
//! ownership with `signature == public_key + 1`.

use std::io;

use serde::{Deserialize, Serialize};

use crate::serialization::{SerializationError, TextDeserialize, TextSerialize, Tokens};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// Sentinel `prev_tx_hash` identifying a coinbase input.
pub const COINBASE_HASH: i64 = 0;

/// Sentinel `prev_tx_n` identifying a coinbase input.
pub const COINBASE_N: u32 = u32::MAX;

/// A reference to an output of a previous transaction, plus the "signature"
/// authorizing the spend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Input {
    /// Hash of the transaction containing the output being spent.
    pub prev_tx_hash: i64,

    /// Index of the output within that transaction.
    pub prev_tx_n: u32,

    /// `public_key + 1` of the output's owner; `0` for coinbase inputs.
    pub signature: i64,
}

impl Input {
    /// Coinbase inputs create new coins and reference no predecessor.
    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_hash == COINBASE_HASH && self.prev_tx_n == COINBASE_N
    }

    /// The sentinel input placed in every coinbase transaction.
    pub fn coinbase() -> Input {
        Input {
            prev_tx_hash: COINBASE_HASH,
            prev_tx_n: COINBASE_N,
            signature: 0,
        }
    }
}

/// A transaction output: an amount payable to the holder of `public_key`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Output {
    /// Amount, in whole "cents" of the simulated currency.
    pub value: i64,

    /// Public key of the owner; node `i` owns key `2 * i`.
    pub public_key: i64,
}

/// A transaction: inputs funding it, outputs paying out of it.
#[derive(Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Transaction {
    /// Hash, assigned by the sender as `max_tx_hash() + 1`. Coinbase
    /// transactions keep hash `0`.
    pub hash: i64,

    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl Transaction {
    /// True when this is a block's coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }
}

impl TextSerialize for Input {
    fn text_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.prev_tx_hash.text_serialize(&mut target)?;
        self.prev_tx_n.text_serialize(&mut target)?;
        self.signature.text_serialize(&mut target)
    }
}

impl TextDeserialize for Input {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError> {
        Ok(Input {
            prev_tx_hash: i64::text_deserialize(tokens)?,
            prev_tx_n: u32::text_deserialize(tokens)?,
            signature: i64::text_deserialize(tokens)?,
        })
    }
}

impl TextSerialize for Output {
    fn text_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.value.text_serialize(&mut target)?;
        self.public_key.text_serialize(&mut target)
    }
}

impl TextDeserialize for Output {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError> {
        Ok(Output {
            value: i64::text_deserialize(tokens)?,
            public_key: i64::text_deserialize(tokens)?,
        })
    }
}

// The checkpoint format carries input and output counts but no transaction
// hash; transactions read back from disk have hash 0.
impl TextSerialize for Transaction {
    fn text_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.inputs.len().text_serialize(&mut target)?;
        for input in &self.inputs {
            input.text_serialize(&mut target)?;
        }
        self.outputs.len().text_serialize(&mut target)?;
        for output in &self.outputs {
            output.text_serialize(&mut target)?;
        }
        Ok(())
    }
}

impl TextDeserialize for Transaction {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError> {
        let input_count = usize::text_deserialize(tokens)?;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            inputs.push(Input::text_deserialize(tokens)?);
        }
        let output_count = usize::text_deserialize(tokens)?;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(Output::text_deserialize(tokens)?);
        }
        Ok(Transaction {
            hash: 0,
            inputs,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_input_uses_sentinels() {
        let input = Input::coinbase();
        assert!(input.is_coinbase());
        assert_eq!(input.prev_tx_hash, COINBASE_HASH);
        assert_eq!(input.prev_tx_n, COINBASE_N);
    }

    #[test]
    fn spending_input_is_not_coinbase() {
        let input = Input {
            prev_tx_hash: 0,
            prev_tx_n: 0,
            signature: 5,
        };
        assert!(!input.is_coinbase());
    }
}
