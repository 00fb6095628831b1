//! The interface for interacting with the shared-memory registry
//!
//! The table guard covers allocation, release, reference counts, and replica
//! metadata; each block's buffer and version sit behind a per-block
//! reader/writer lock that is only acquired after the table guard has been
//! released

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::types::{BlockId, BlockMetadata, NodeId};
use tracing::{debug, warn};

use crate::{error::StateError, StateInner};

/// The registry of locally owned memory blocks
pub struct BlockTable {
    /// The next block id to mint; released ids are never reused
    next_id: BlockId,
    /// The live blocks
    slots: HashMap<BlockId, BlockSlot>,
}

impl BlockTable {
    /// Constructor
    pub fn new() -> Self {
        Self { next_id: 1, slots: HashMap::new() }
    }
}

impl Default for BlockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A table slot: the shared block plus the metadata guarded at table level
struct BlockSlot {
    /// The block itself, shared with in-flight readers and writers
    entry: Arc<BlockEntry>,
    /// The block's reference count; the slot is removed when it reaches zero
    ref_count: u32,
    /// The peers recorded as intended replica holders, capped at the
    /// configured replica limit, no duplicates
    replica_nodes: Vec<NodeId>,
}

/// A single allocated block
struct BlockEntry {
    /// The block's id
    block_id: BlockId,
    /// The node that allocated the block
    owner_node: NodeId,
    /// The buffer's fixed size in bytes
    size: usize,
    /// The buffer and its version, guarded together so a version bump is
    /// never observable apart from its write
    contents: RwLock<BlockContents>,
}

/// The writer-guarded portion of a block
struct BlockContents {
    /// The buffer
    data: Vec<u8>,
    /// Incremented on every writer-guarded mutation; strictly monotonic for
    /// the block's lifetime
    version: u64,
}

impl StateInner {
    /// Allocate a zero-initialized block of the given size
    ///
    /// The new block starts at version 1 with a single reference held by the
    /// caller
    pub fn allocate_block(&self, size: usize) -> Result<BlockId, StateError> {
        if size == 0 {
            return Err(StateError::OutOfBounds { offset: 0, len: 0, size: 0 });
        }

        let mut table = self.memory.lock().expect("block table poisoned");
        if table.slots.len() >= self.capacities().max_memory_blocks {
            warn!("block table full, refusing allocation");
            return Err(StateError::Capacity {
                table: "memory block",
                capacity: self.capacities().max_memory_blocks,
            });
        }

        let block_id = table.next_id;
        table.next_id += 1;
        table.slots.insert(
            block_id,
            BlockSlot {
                entry: Arc::new(BlockEntry {
                    block_id,
                    owner_node: self.local_node_id(),
                    size,
                    contents: RwLock::new(BlockContents { data: vec![0; size], version: 1 }),
                }),
                ref_count: 1,
                replica_nodes: Vec::new(),
            },
        );

        debug!("allocated block {block_id} ({size} bytes)");
        Ok(block_id)
    }

    /// Copy `data` into the block at `offset` under the writer lock,
    /// bumping the version
    pub fn write_block(
        &self,
        block_id: BlockId,
        data: &[u8],
        offset: usize,
    ) -> Result<(), StateError> {
        let entry = self.get_block_entry(block_id)?;

        let mut contents = entry.contents.write().expect("block lock poisoned");
        check_bounds(offset, data.len(), entry.size)?;
        contents.data[offset..offset + data.len()].copy_from_slice(data);
        contents.version += 1;

        Ok(())
    }

    /// Copy from the block at `offset` into `buf` under the reader lock
    pub fn read_block(
        &self,
        block_id: BlockId,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<(), StateError> {
        let entry = self.get_block_entry(block_id)?;

        let contents = entry.contents.read().expect("block lock poisoned");
        check_bounds(offset, buf.len(), entry.size)?;
        buf.copy_from_slice(&contents.data[offset..offset + buf.len()]);

        Ok(())
    }

    /// Take an additional reference on a block
    pub fn retain_block(&self, block_id: BlockId) -> Result<(), StateError> {
        let mut table = self.memory.lock().expect("block table poisoned");
        let slot = table.slots.get_mut(&block_id).ok_or(StateError::NotFound(block_id))?;
        slot.ref_count += 1;
        Ok(())
    }

    /// Drop a reference on a block, freeing it when the count reaches zero
    ///
    /// Once freed the id is gone for good; subsequent operations on it
    /// return NotFound and fresh allocations never reuse it
    pub fn release_block(&self, block_id: BlockId) -> Result<u32, StateError> {
        let mut table = self.memory.lock().expect("block table poisoned");
        let slot = table.slots.get_mut(&block_id).ok_or(StateError::NotFound(block_id))?;

        slot.ref_count -= 1;
        let remaining = slot.ref_count;
        if remaining == 0 {
            table.slots.remove(&block_id);
            debug!("released block {block_id}");
        }

        Ok(remaining)
    }

    /// Record that `target` is intended to hold a replica of the block
    ///
    /// Placement intent only; the byte transport to the target is the data
    /// channel collaborator's responsibility. Idempotent per (block, target).
    pub fn record_replica(&self, block_id: BlockId, target: NodeId) -> Result<(), StateError> {
        let replica_limit = self.capacities().replica_limit;
        let mut table = self.memory.lock().expect("block table poisoned");
        let slot = table.slots.get_mut(&block_id).ok_or(StateError::NotFound(block_id))?;

        if slot.replica_nodes.contains(&target) {
            return Ok(());
        }
        if slot.replica_nodes.len() >= replica_limit {
            warn!("block {block_id} replica set full, refusing placement on {target}");
            return Err(StateError::Capacity { table: "replica set", capacity: replica_limit });
        }

        slot.replica_nodes.push(target);
        Ok(())
    }

    /// Produce a metadata snapshot for a block
    pub fn block_meta(&self, block_id: BlockId) -> Result<BlockMetadata, StateError> {
        let (entry, ref_count, replica_nodes) = {
            let table = self.memory.lock().expect("block table poisoned");
            let slot = table.slots.get(&block_id).ok_or(StateError::NotFound(block_id))?;
            (Arc::clone(&slot.entry), slot.ref_count, slot.replica_nodes.clone())
        };

        let version = entry.contents.read().expect("block lock poisoned").version;
        Ok(BlockMetadata {
            block_id,
            owner_node: entry.owner_node,
            size: entry.size,
            version,
            ref_count,
            replica_nodes,
        })
    }

    /// The number of live blocks
    pub fn n_blocks(&self) -> usize {
        self.memory.lock().expect("block table poisoned").slots.len()
    }

    /// Look up a block and clone its shared entry out of the table so the
    /// per-block lock is taken only after the table guard is dropped
    fn get_block_entry(&self, block_id: BlockId) -> Result<Arc<BlockEntry>, StateError> {
        let table = self.memory.lock().expect("block table poisoned");
        let slot = table.slots.get(&block_id).ok_or(StateError::NotFound(block_id))?;
        Ok(Arc::clone(&slot.entry))
    }
}

/// Check that `offset + len` fits within a buffer of `size` bytes
fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), StateError> {
    if offset.checked_add(len).is_none_or(|end| end > size) {
        return Err(StateError::OutOfBounds { offset, len, size });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::thread;

    use common::types::NodeId;

    use crate::{error::StateError, test_helpers::*, TableCapacities};

    /// Tests allocation defaults: zeroed buffer, version 1, single reference
    #[test]
    fn test_allocate() {
        let state = mock_state();
        let block_id = state.allocate_block(64).unwrap();
        assert_eq!(block_id, 1);

        let meta = state.block_meta(block_id).unwrap();
        assert_eq!(meta.size, 64);
        assert_eq!(meta.version, 1);
        assert_eq!(meta.ref_count, 1);
        assert_eq!(meta.owner_node, LOCAL_ID);
        assert!(!meta.is_replicated());

        let mut buf = vec![0xff; 64];
        state.read_block(block_id, &mut buf, 0).unwrap();
        assert_eq!(buf, vec![0; 64]);
    }

    /// Tests that zero-size allocations are refused
    #[test]
    fn test_zero_size_refused() {
        let state = mock_state();
        assert!(matches!(state.allocate_block(0), Err(StateError::OutOfBounds { .. })));
    }

    /// Tests the write/read round trip at an interior offset
    #[test]
    fn test_write_read_round_trip() {
        let state = mock_state();
        let block_id = state.allocate_block(32).unwrap();

        state.write_block(block_id, b"fabric", 8).unwrap();

        let mut buf = [0u8; 6];
        state.read_block(block_id, &mut buf, 8).unwrap();
        assert_eq!(&buf, b"fabric");
    }

    /// Tests that every successful write strictly bumps the version
    #[test]
    fn test_version_monotonic() {
        let state = mock_state();
        let block_id = state.allocate_block(16).unwrap();

        for expected in 2..=12u64 {
            state.write_block(block_id, &[1, 2, 3], 0).unwrap();
            assert_eq!(state.block_meta(block_id).unwrap().version, expected);
        }
    }

    /// Tests that a failed bounds check leaves the version untouched
    #[test]
    fn test_out_of_bounds_write() {
        let state = mock_state();
        let block_id = state.allocate_block(8).unwrap();

        let res = state.write_block(block_id, &[0; 4], 6);
        assert!(matches!(res, Err(StateError::OutOfBounds { .. })));
        assert_eq!(state.block_meta(block_id).unwrap().version, 1);

        let mut buf = [0u8; 4];
        assert!(matches!(
            state.read_block(block_id, &mut buf, 6),
            Err(StateError::OutOfBounds { .. })
        ));
    }

    /// Tests concurrent writers: every write lands and the version counts
    /// them all exactly
    #[test]
    fn test_concurrent_writes() {
        const THREADS: usize = 8;
        const WRITES_PER_THREAD: usize = 25;

        let state = mock_state();
        let block_id = state.allocate_block(1024).unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|thread_idx| {
                let state = state.clone();
                thread::spawn(move || {
                    for i in 0..WRITES_PER_THREAD {
                        let offset = (thread_idx * 100 + i) % 1000;
                        state.write_block(block_id, &[thread_idx as u8; 8], offset).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let meta = state.block_meta(block_id).unwrap();
        assert_eq!(meta.version, 1 + (THREADS * WRITES_PER_THREAD) as u64);
    }

    /// Tests release semantics: the id disappears at refcount zero and is
    /// never reused
    #[test]
    fn test_release() {
        let state = mock_state();
        let first = state.allocate_block(8).unwrap();

        state.retain_block(first).unwrap();
        assert_eq!(state.release_block(first).unwrap(), 1);
        assert_eq!(state.release_block(first).unwrap(), 0);

        assert!(matches!(state.release_block(first), Err(StateError::NotFound(_))));
        assert!(matches!(
            state.write_block(first, &[1], 0),
            Err(StateError::NotFound(_))
        ));
        assert_eq!(state.n_blocks(), 0);

        // Fresh allocations continue the id sequence past the released id
        let second = state.allocate_block(8).unwrap();
        assert_ne!(second, first);
    }

    /// Tests replica placement idempotence and the capacity cap
    #[test]
    fn test_record_replica() {
        let state = mock_state();
        let block_id = state.allocate_block(8).unwrap();

        state.record_replica(block_id, NodeId(2)).unwrap();
        state.record_replica(block_id, NodeId(2)).unwrap();

        let meta = state.block_meta(block_id).unwrap();
        assert_eq!(meta.replica_nodes, vec![NodeId(2)]);
        assert!(meta.is_replicated());

        state.record_replica(block_id, NodeId(3)).unwrap();
        state.record_replica(block_id, NodeId(4)).unwrap();
        assert!(matches!(
            state.record_replica(block_id, NodeId(5)),
            Err(StateError::Capacity { .. })
        ));

        // Re-recording an existing member still succeeds at capacity
        state.record_replica(block_id, NodeId(3)).unwrap();
        assert_eq!(state.block_meta(block_id).unwrap().replica_nodes.len(), 3);
    }

    /// Tests the block table capacity refusal
    #[test]
    fn test_block_capacity() {
        let capacities = TableCapacities { max_memory_blocks: 2, ..Default::default() };
        let state = mock_state_with_capacities(capacities);

        state.allocate_block(8).unwrap();
        state.allocate_block(8).unwrap();
        assert!(matches!(state.allocate_block(8), Err(StateError::Capacity { .. })));
    }
}
