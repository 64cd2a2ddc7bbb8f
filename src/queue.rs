//! Per-client output queue: a chain of fixed-size blocks drained from the
//! head. Content is never inspected, only appended and drained.

use std::collections::VecDeque;

pub const BLOCK_SIZE: usize = 4096;

/// How much output may be queued before the connection is dropped.
pub const DROP_AT: usize = 16384;

struct Block {
    data: Box<[u8; BLOCK_SIZE]>,
    len: usize,
}

impl Block {
    fn new() -> Self {
        Block {
            data: Box::new([0; BLOCK_SIZE]),
            len: 0,
        }
    }
}

#[derive(Default)]
pub struct OutputQueue {
    blocks: VecDeque<Block>,
    // Bytes of the head block already handed to the socket.
    head_off: usize,
    len: usize,
}

impl OutputQueue {
    pub fn new() -> Self {
        OutputQueue::default()
    }

    /// Total unsent bytes held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append bytes, filling the trailing block before allocating new ones.
    pub fn push(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let need_block = match self.blocks.back() {
                Some(b) => b.len == BLOCK_SIZE,
                None => true,
            };
            if need_block {
                self.blocks.push_back(Block::new());
            }
            let tail = self.blocks.back_mut().unwrap();
            let take = data.len().min(BLOCK_SIZE - tail.len);
            tail.data[tail.len..tail.len + take].copy_from_slice(&data[..take]);
            tail.len += take;
            self.len += take;
            data = &data[take..];
        }
    }

    /// Unsent bytes of the head block, or None when the queue is empty.
    pub fn head(&self) -> Option<&[u8]> {
        self.blocks
            .front()
            .map(|b| &b.data[self.head_off..b.len])
    }

    /// Record that `n` bytes of the head block left the socket. A fully
    /// consumed head block is released.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.head().map_or(0, <[u8]>::len) >= n);
        self.head_off += n;
        self.len -= n;
        let done = match self.blocks.front() {
            Some(b) => self.head_off == b.len,
            None => false,
        };
        if done {
            self.blocks.pop_front();
            self.head_off = 0;
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.head_off = 0;
        self.len = 0;
    }
}
