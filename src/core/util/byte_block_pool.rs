//! Slab-based byte storage for per-term postings streams (§4.3, §9
//! "byte-block pool of 32 KiB slabs... streams are linked by forward
//! pointers across slabs to avoid copying on growth").
//!
//! Each stream (one per term per postings channel) is a chain of slices.
//! Every slice but the last reserves its final 4 bytes for a forward
//! pointer (the absolute pool offset of the next slice); the owning
//! `TermsHashPerField` tracks each stream's current `(offset, level)` so it
//! knows when a write is about to cross into those reserved bytes and must
//! allocate the next, larger slice first.

use crate::core::util::Counter;

pub const BYTE_BLOCK_SHIFT: usize = 15;
pub const BYTE_BLOCK_SIZE: usize = 1 << BYTE_BLOCK_SHIFT; // 32 KiB
pub const BYTE_BLOCK_MASK: usize = BYTE_BLOCK_SIZE - 1;
const FORWARD_PTR_BYTES: usize = 4;

/// Slice sizes by level; a stream starts at level 0 (tiny — most terms
/// appear in only a handful of docs) and grows one level each time it
/// outgrows its current slice, capping out at the last entry.
pub const LEVEL_SIZE_ARRAY: [usize; 10] = [5, 14, 20, 30, 40, 40, 80, 80, 120, 200];

pub fn next_level(level: usize) -> usize {
    (level + 1).min(LEVEL_SIZE_ARRAY.len() - 1)
}

pub trait ByteAllocator: Send {
    fn byte_block(&mut self) -> Vec<u8>;
    fn recycle_byte_blocks(&mut self, blocks: &mut Vec<Vec<u8>>);
}

pub struct DirectTrackingAllocator {
    bytes_used: Counter,
}

impl DirectTrackingAllocator {
    pub fn new(bytes_used: Counter) -> Self {
        DirectTrackingAllocator { bytes_used }
    }
}

impl ByteAllocator for DirectTrackingAllocator {
    fn byte_block(&mut self) -> Vec<u8> {
        self.bytes_used.add_get(BYTE_BLOCK_SIZE as i64);
        vec![0u8; BYTE_BLOCK_SIZE]
    }

    fn recycle_byte_blocks(&mut self, blocks: &mut Vec<Vec<u8>>) {
        self.bytes_used
            .add_get(-((blocks.len() * BYTE_BLOCK_SIZE) as i64));
        blocks.clear();
    }
}

pub struct ByteBlockPool {
    buffers: Vec<Vec<u8>>,
    buffer_upto: i32,
    byte_upto: usize,
    allocator: Box<dyn ByteAllocator>,
}

impl ByteBlockPool {
    pub fn new(allocator: Box<dyn ByteAllocator>) -> Self {
        ByteBlockPool {
            buffers: Vec::new(),
            buffer_upto: -1,
            byte_upto: BYTE_BLOCK_SIZE,
            allocator,
        }
    }

    fn next_buffer(&mut self) {
        self.buffers.push(self.allocator.byte_block());
        self.buffer_upto += 1;
        self.byte_upto = 0;
    }

    fn pool_offset(&self) -> usize {
        (self.buffer_upto as usize) * BYTE_BLOCK_SIZE + self.byte_upto
    }

    /// Allocates `size` contiguous bytes that never chain across slices —
    /// used for fixed-length records (term-byte entries) rather than the
    /// growable per-term streams `new_slice`/`alloc_next_slice` manage.
    /// Never splits a record across two buffers.
    pub fn allocate(&mut self, size: usize) -> usize {
        if self.buffer_upto < 0 || self.byte_upto > BYTE_BLOCK_SIZE - size {
            self.next_buffer();
        }
        let offset = self.pool_offset();
        self.byte_upto += size;
        offset
    }

    /// Allocates a brand-new stream at `level`, returning its global offset
    /// and usable length (size minus the reserved forward-pointer tail).
    pub fn new_slice(&mut self, level: usize) -> (usize, usize) {
        let size = LEVEL_SIZE_ARRAY[level];
        if self.buffer_upto < 0 || self.byte_upto > BYTE_BLOCK_SIZE - size {
            self.next_buffer();
        }
        let offset = self.pool_offset();
        self.byte_upto += size;
        (offset, size - FORWARD_PTR_BYTES)
    }

    /// Allocates the next, larger slice for a stream whose current one just
    /// filled up, writes the forward pointer into the old slice's reserved
    /// tail, and returns the new slice's offset and usable length.
    pub fn alloc_next_slice(&mut self, old_offset: usize, old_size: usize, level: usize) -> (usize, usize) {
        let new_level = next_level(level);
        let new_size = LEVEL_SIZE_ARRAY[new_level];
        if self.byte_upto > BYTE_BLOCK_SIZE - new_size {
            self.next_buffer();
        }
        let new_offset = self.pool_offset();
        self.byte_upto += new_size;

        let forward = new_offset as u32;
        let tail = old_offset + old_size;
        self.write_bytes(tail, &forward.to_be_bytes());

        (new_offset, new_size - FORWARD_PTR_BYTES)
    }

    pub fn read_forward_pointer(&self, slice_offset: usize, slice_usable_size: usize) -> usize {
        let tail = slice_offset + slice_usable_size;
        let bytes = self.read_bytes(tail, FORWARD_PTR_BYTES);
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
    }

    fn buffer_for(&self, global_offset: usize) -> (usize, usize) {
        (
            global_offset >> BYTE_BLOCK_SHIFT,
            global_offset & BYTE_BLOCK_MASK,
        )
    }

    pub fn write_byte(&mut self, global_offset: usize, b: u8) {
        let (buf, off) = self.buffer_for(global_offset);
        self.buffers[buf][off] = b;
    }

    pub fn read_byte(&self, global_offset: usize) -> u8 {
        let (buf, off) = self.buffer_for(global_offset);
        self.buffers[buf][off]
    }

    pub fn read_bytes(&self, global_offset: usize, len: usize) -> Vec<u8> {
        let (buf, off) = self.buffer_for(global_offset);
        self.buffers[buf][off..off + len].to_vec()
    }

    pub fn write_bytes(&mut self, global_offset: usize, bytes: &[u8]) {
        let (buf, off) = self.buffer_for(global_offset);
        self.buffers[buf][off..off + bytes.len()].copy_from_slice(bytes);
    }

    pub fn reset(&mut self) {
        let mut freed = std::mem::take(&mut self.buffers);
        self.allocator.recycle_byte_blocks(&mut freed);
        self.buffer_upto = -1;
        self.byte_upto = BYTE_BLOCK_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::util::Counter;

    #[test]
    fn slice_chain_write_read() {
        let mut pool = ByteBlockPool::new(Box::new(DirectTrackingAllocator::new(Counter::new(
            false,
        ))));
        let (start, size) = pool.new_slice(0);
        assert_eq!(size, LEVEL_SIZE_ARRAY[0] - 4);
        pool.write_byte(start, 0xAB);
        assert_eq!(pool.read_byte(start), 0xAB);

        let (next, next_size) = pool.alloc_next_slice(start, size, 0);
        pool.write_byte(next, 0xCD);
        let fwd = pool.read_forward_pointer(start, size);
        assert_eq!(fwd, next);
        assert_eq!(pool.read_byte(next), 0xCD);
        assert!(next_size > 0);
    }
}
