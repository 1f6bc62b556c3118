//! Blocks and block-related structures (headers, hashes).

mod hash;
mod header;


use std::io;

use serde::{Deserialize, Serialize};

use crate::serialization::{SerializationError, TextDeserialize, TextSerialize, Tokens};
use crate::transaction::{Input, Output, Transaction};

pub use hash::Hash;
pub use header::Header;

/// A simulated block: a header plus the transactions it confirms.
///
/// Transactions keep their broadcast order (coinbase first) and are looked up
/// by hash through [`Block::transaction`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions, coinbase first.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block mined by node `miner` on top of `parent_hash`.
    ///
    /// The block hash is `parent_hash + 1` (there is no real proof of work),
    /// and a coinbase paying `reward` to the miner's key is prepended to
    /// `transactions`.
    pub fn create(
        miner: u32,
        reward: i64,
        parent_hash: Hash,
        creation_time: u64,
        transactions: Vec<Transaction>,
    ) -> Block {
        let coinbase = Transaction {
            hash: 0,
            inputs: vec![Input::coinbase()],
            outputs: vec![Output {
                value: reward,
                public_key: i64::from(miner) * 2,
            }],
        };
        let mut confirmed = Vec::with_capacity(transactions.len() + 1);
        confirmed.push(coinbase);
        confirmed.extend(transactions);
        Block {
            header: Header {
                hash: Hash(parent_hash.0 + 1),
                parent_hash,
                num_tx: confirmed.len(),
                creation_time,
            },
            transactions: confirmed,
        }
    }

    /// This block's hash.
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Look up a confirmed transaction by hash.
    pub fn transaction(&self, hash: i64) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash == hash)
    }

    /// The largest transaction hash confirmed by this block.
    ///
    /// Coinbase transactions keep hash 0, so an all-coinbase block reports 0.
    pub fn max_tx_hash(&self) -> i64 {
        self.transactions
            .iter()
            .map(|tx| tx.hash)
            .max()
            .unwrap_or(0)
    }
}

impl TextSerialize for Block {
    fn text_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.header.text_serialize(&mut target)?;
        for tx in &self.transactions {
            tx.text_serialize(&mut target)?;
        }
        Ok(())
    }
}

impl TextDeserialize for Block {
    fn text_deserialize<R: io::BufRead>(tokens: &mut Tokens<R>) -> Result<Self, SerializationError> {
        let header = Header::text_deserialize(tokens)?;
        // Sanity bound so a corrupt count cannot balloon the allocation.
        let mut transactions = Vec::with_capacity(header.num_tx.min(1024));
        for _ in 0..header.num_tx {
            transactions.push(Transaction::text_deserialize(tokens)?);
        }
        Ok(Block {
            header,
            transactions,
        })
    }
}
