use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace, warn};

use powsim_chain::block::{Block, Hash};
use powsim_chain::serialization::{SerializationError, TextDeserialize, TextSerialize, Tokens};

/// An error while writing chain checkpoints.
///
/// Read-side problems are deliberately not represented: unreadable or
/// corrupt checkpoint files degrade to an empty (or shorter) chain.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

/// The append-only chain of one simulated node.
///
/// Invariants: every block after the first links to its predecessor by
/// `parent_hash`, and no block carries the null hash.
pub struct ChainStore {
    blocks: Vec<Block>,
    blocks_per_file: usize,
}

impl ChainStore {
    /// A chain with no blocks, checkpointing `blocks_per_file` blocks per
    /// segment file.
    pub fn empty(blocks_per_file: usize) -> ChainStore {
        ChainStore {
            blocks: Vec::new(),
            blocks_per_file: blocks_per_file.max(1),
        }
    }

    /// Load a chain from the segment files in `directory`.
    ///
    /// Returns `None` if the directory does not exist. Unreadable or corrupt
    /// segment files are skipped; blocks are re-linked into parent order by
    /// hash afterwards, so file iteration order never matters.
    pub fn read_from_directory(
        directory: impl AsRef<Path>,
        blocks_per_file: usize,
    ) -> Option<ChainStore> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return None;
        }
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(?directory, %error, "block directory unreadable, starting empty");
                return Some(ChainStore::empty(blocks_per_file));
            }
        };

        let mut loose = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            match read_segment(&path) {
                Ok(blocks) => loose.extend(blocks),
                Err(error) => warn!(?path, %error, "skipping unreadable block file"),
            }
        }

        let blocks = relink(loose);
        trace!(height = blocks.len(), "loaded chain");
        Some(ChainStore {
            blocks,
            blocks_per_file: blocks_per_file.max(1),
        })
    }

    /// Checkpoint the chain into `directory`, `blocks_per_file` blocks per
    /// segment. Each segment holds a count followed by that many blocks.
    pub fn write_to_directory(&self, directory: impl AsRef<Path>) -> Result<(), StoreError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        for (index, segment) in self.blocks.chunks(self.blocks_per_file).enumerate() {
            let path = directory.join(format!("blocks{}", index));
            let mut writer = BufWriter::new(File::create(path)?);
            segment.len().text_serialize(&mut writer)?;
            for block in segment {
                block.text_serialize(&mut writer)?;
            }
        }
        Ok(())
    }

    /// Append `block` if it extends the tip.
    ///
    /// The first block is accepted unconditionally; afterwards the block must
    /// link to the tip and carry a non-null hash. Returns whether the block
    /// was appended; rejects are silent no-ops.
    pub fn add_block(&mut self, block: Block) -> bool {
        let accepted = match self.tip() {
            None => true,
            Some(tip) => block.header.parent_hash == tip.hash() && !block.hash().is_null(),
        };
        if accepted {
            trace!(hash = %block.hash(), height = self.blocks.len() + 1, "appending block");
            self.blocks.push(block);
        } else {
            debug!(hash = %block.hash(), "dropping block that does not extend the tip");
        }
        accepted
    }

    /// Look up a block by hash. The null hash never matches.
    pub fn find_by_hash(&self, hash: Hash) -> Option<&Block> {
        if hash.is_null() {
            return None;
        }
        self.blocks.iter().find(|block| block.hash() == hash)
    }

    /// The chain suffix starting at the block with the given hash, inclusive.
    ///
    /// The null hash selects the entire chain; an unknown hash selects
    /// nothing.
    pub fn blocks_after(&self, hash: Hash) -> &[Block] {
        if hash.is_null() {
            return &self.blocks;
        }
        match self.blocks.iter().position(|block| block.hash() == hash) {
            Some(index) => &self.blocks[index..],
            None => &[],
        }
    }

    /// The most recently appended block, if any.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Number of blocks in the chain.
    pub fn chain_height(&self) -> usize {
        self.blocks.len()
    }

    /// The largest transaction hash confirmed by the tip, or 0 on an empty
    /// chain.
    pub fn max_tx_hash(&self) -> i64 {
        self.tip().map(Block::max_tx_hash).unwrap_or(0)
    }
}

fn read_segment(path: &Path) -> Result<Vec<Block>, SerializationError> {
    let mut tokens = Tokens::new(BufReader::new(File::open(path)?));
    let count = usize::text_deserialize(&mut tokens)?;
    let mut blocks = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        blocks.push(Block::text_deserialize(&mut tokens)?);
    }
    Ok(blocks)
}

/// Orders loose blocks into a chain by walking parent links from the genesis
/// sentinel. Blocks that never link in are dropped.
fn relink(mut loose: Vec<Block>) -> Vec<Block> {
    let mut chain = Vec::with_capacity(loose.len());
    let mut cursor = Hash::NULL;
    while let Some(index) = loose
        .iter()
        .position(|block| block.header.parent_hash == cursor && !block.hash().is_null())
    {
        let block = loose.swap_remove(index);
        cursor = block.hash();
        chain.push(block);
    }
    if !loose.is_empty() {
        warn!(
            dropped = loose.len(),
            "discarding checkpointed blocks that do not link into the chain"
        );
    }
    chain
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    fn chain_of(length: usize) -> ChainStore {
        let mut store = ChainStore::empty(2);
        for _ in 0..length {
            let parent = store.tip().map(Block::hash).unwrap_or(Hash::NULL);
            assert!(store.add_block(Block::create(0, 50, parent, 5, vec![])));
        }
        store
    }

    #[test]
    fn add_block_links_to_tip() {
        powsim_test::init();

        let mut store = chain_of(2);
        assert_eq!(store.chain_height(), 2);

        // parent mismatch
        assert!(!store.add_block(Block::create(0, 50, Hash(9), 5, vec![])));
        assert_eq!(store.chain_height(), 2);

        // re-adding the tip's successor twice is a no-op after the first
        let next = Block::create(0, 50, store.tip().unwrap().hash(), 6, vec![]);
        assert!(store.add_block(next.clone()));
        assert!(!store.add_block(next));
        assert_eq!(store.chain_height(), 3);
    }

    #[test]
    fn add_block_rejects_null_hash_after_genesis() {
        powsim_test::init();

        let mut store = chain_of(1);
        let mut bad = Block::create(0, 50, store.tip().unwrap().hash(), 5, vec![]);
        bad.header.hash = Hash::NULL;
        assert!(!store.add_block(bad));
    }

    #[test]
    fn blocks_after_boundaries() {
        powsim_test::init();

        let empty = ChainStore::empty(2);
        assert!(empty.blocks_after(Hash::NULL).is_empty());

        let store = chain_of(3);
        assert_eq!(store.blocks_after(Hash::NULL).len(), 3);
        assert_eq!(store.blocks_after(Hash(1)).len(), 3);
        assert_eq!(store.blocks_after(Hash(3)).len(), 1);
        assert!(store.blocks_after(Hash(17)).is_empty());
    }

    #[test]
    fn find_by_hash_never_matches_null() {
        powsim_test::init();

        let store = chain_of(2);
        assert!(store.find_by_hash(Hash::NULL).is_none());
        assert_eq!(store.find_by_hash(Hash(2)).map(Block::hash), Some(Hash(2)));
    }

    #[test]
    fn missing_directory_reads_as_none() {
        powsim_test::init();

        let dir = TempDir::new("powsim-store").unwrap();
        let missing = dir.path().join("not-there");
        assert!(ChainStore::read_from_directory(&missing, 2).is_none());
    }

    #[test]
    fn directory_roundtrip_preserves_tip_and_height() {
        powsim_test::init();

        let dir = TempDir::new("powsim-store").unwrap();
        let store = chain_of(5);
        store.write_to_directory(dir.path()).unwrap();

        // 5 blocks at 2 per file -> 3 segments
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);

        let restored = ChainStore::read_from_directory(dir.path(), 2).unwrap();
        assert_eq!(restored.chain_height(), store.chain_height());
        assert_eq!(
            restored.tip().map(Block::hash),
            store.tip().map(Block::hash)
        );
    }

    #[test]
    fn unlinked_blocks_are_dropped_on_read() {
        powsim_test::init();

        let dir = TempDir::new("powsim-store").unwrap();
        let mut store = chain_of(2);
        // a straggler that links to nothing on disk
        store.blocks.push(Block::create(0, 50, Hash(40), 5, vec![]));
        store.write_to_directory(dir.path()).unwrap();

        let restored = ChainStore::read_from_directory(dir.path(), 2).unwrap();
        assert_eq!(restored.chain_height(), 2);
        assert_eq!(restored.tip().map(Block::hash), Some(Hash(2)));
    }
}
