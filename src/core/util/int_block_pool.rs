//! Slab-based int storage backing the per-term docID/position pointer
//! chains (§4.3, §9: "int-block pool of 8 KiB slabs").

use crate::core::util::Counter;

pub const INT_BLOCK_SHIFT: usize = 13;
pub const INT_BLOCK_SIZE: usize = 1 << INT_BLOCK_SHIFT; // 8192 ints == 32 KiB

pub trait IntAllocator {
    fn block_size(&self) -> usize;
    fn int_block(&mut self) -> Vec<i32>;
    fn recycle_int_blocks(&mut self, blocks: &mut [Vec<i32>], start: usize, end: usize);
    fn shallow_copy(&mut self) -> Box<dyn IntAllocator>;
}

pub struct DirectIntAllocator {
    block_size: usize,
    bytes_used: Counter,
}

impl DirectIntAllocator {
    pub fn new(bytes_used: Counter) -> Self {
        DirectIntAllocator {
            block_size: INT_BLOCK_SIZE,
            bytes_used,
        }
    }
}

impl IntAllocator for DirectIntAllocator {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn recycle_int_blocks(&mut self, _blocks: &mut [Vec<i32>], _start: usize, end: usize) {
        self.bytes_used
            .add_get(-((end * self.block_size * 4) as i64));
    }

    fn int_block(&mut self) -> Vec<i32> {
        self.bytes_used.add_get((self.block_size * 4) as i64);
        vec![0; self.block_size]
    }

    fn shallow_copy(&mut self) -> Box<dyn IntAllocator> {
        Box::new(DirectIntAllocator::new(self.bytes_used.shallow_copy()))
    }
}

pub struct IntBlockPool {
    buffers: Vec<Vec<i32>>,
    pub buffer_upto: i32,
    pub int_upto: usize,
    allocator: Box<dyn IntAllocator>,
}

impl IntBlockPool {
    pub fn new(allocator: Box<dyn IntAllocator>) -> Self {
        IntBlockPool {
            buffers: Vec::new(),
            buffer_upto: -1,
            int_upto: INT_BLOCK_SIZE,
            allocator,
        }
    }

    fn next_buffer(&mut self) {
        self.buffers.push(self.allocator.int_block());
        self.buffer_upto += 1;
        self.int_upto = 0;
    }

    pub fn new_slot(&mut self) -> usize {
        if self.int_upto >= self.allocator.block_size() {
            self.next_buffer();
        }
        let offset = (self.buffer_upto as usize) * self.allocator.block_size() + self.int_upto;
        self.int_upto += 1;
        offset
    }

    pub fn set(&mut self, global_offset: usize, value: i32) {
        let block_size = self.allocator.block_size();
        let (buf, off) = (global_offset / block_size, global_offset % block_size);
        self.buffers[buf][off] = value;
    }

    pub fn get(&self, global_offset: usize) -> i32 {
        let block_size = self.allocator.block_size();
        let (buf, off) = (global_offset / block_size, global_offset % block_size);
        self.buffers[buf][off]
    }

    pub fn reset(&mut self) {
        let len = self.buffers.len();
        self.allocator.recycle_int_blocks(&mut self.buffers, 0, len);
        self.buffers.clear();
        self.buffer_upto = -1;
        self.int_upto = INT_BLOCK_SIZE;
    }
}
