//! Shared-memory identifiers and metadata snapshots

use serde::{Deserialize, Serialize};

use super::NodeId;

/// A memory block identifier; a local-monotonic counter, never reused for
/// fresh allocations within the minting node's lifetime
pub type BlockId = u64;

/// A point-in-time snapshot of a block's registry metadata
///
/// Handed to the data-channel collaborator when servicing block metadata
/// requests; the buffer itself is read through the registry's guarded paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// The block's id
    pub block_id: BlockId,
    /// The node that allocated and owns the block
    pub owner_node: NodeId,
    /// The fixed size of the block's buffer in bytes
    pub size: usize,
    /// The block's version counter at snapshot time
    pub version: u64,
    /// The block's reference count at snapshot time
    pub ref_count: u32,
    /// The peers recorded as intended replica holders
    pub replica_nodes: Vec<NodeId>,
}

impl BlockMetadata {
    /// Whether any replica placement has been recorded for the block
    pub fn is_replicated(&self) -> bool {
        !self.replica_nodes.is_empty()
    }
}
