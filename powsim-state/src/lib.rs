//! Chain state for simulated nodes: an append-only block chain with
//! segmented checkpoint files.
//!
//! There is no reorganization support. A node's chain only ever grows from
//! its tip, and blocks that do not extend the tip are silently dropped, so
//! the store never holds a fork.

mod store;

pub use store::{ChainStore, StoreError};
