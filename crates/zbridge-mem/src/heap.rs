//! Emulated linear memory with a first-fit allocator.
//!
//! Layout mirrors a wasm32 instance: a flat byte space that grows in 64 KiB
//! pages up to a cap, addressed by 32-bit offsets. The first `ALIGN` bytes are
//! never handed out so offset `0` keeps meaning null.

use std::collections::BTreeMap;
use std::ops::Range;

pub const PAGE_SIZE: usize = 64 * 1024;

const ALIGN: u32 = 16;
const HEAP_BASE: u32 = ALIGN;

pub struct LinearHeap {
    bytes: Vec<u8>,
    max_pages: u32,
    /// End of the highest carved block; everything above is untouched.
    top: u32,
    /// Free blocks below `top`, keyed by offset. Never adjacent to each other.
    free: BTreeMap<u32, u32>,
    live: BTreeMap<u32, u32>,
}

impl LinearHeap {
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let max_pages = max_pages.max(1);
        let initial = initial_pages.clamp(1, max_pages);
        Self {
            bytes: vec![0u8; initial as usize * PAGE_SIZE],
            max_pages,
            top: HEAP_BASE,
            free: BTreeMap::new(),
            live: BTreeMap::new(),
        }
    }

    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Carve `size` bytes. Returns `0` when the page cap would be exceeded.
    pub fn malloc(&mut self, size: u32) -> u32 {
        let Some(need) = round_up(size.max(1)) else {
            return 0;
        };

        let hit = self
            .free
            .iter()
            .find(|(_, &len)| len >= need)
            .map(|(&off, &len)| (off, len));
        if let Some((off, len)) = hit {
            self.free.remove(&off);
            if len > need {
                self.free.insert(off + need, len - need);
            }
            self.live.insert(off, need);
            return off;
        }

        let off = self.top;
        let Some(end) = off.checked_add(need) else {
            return 0;
        };
        if !self.ensure_capacity(end) {
            return 0;
        }
        self.top = end;
        self.live.insert(off, need);
        off
    }

    /// Return a block to the allocator. `false` if `ptr` is not live.
    pub fn free(&mut self, ptr: u32) -> bool {
        let Some(mut len) = self.live.remove(&ptr) else {
            return false;
        };
        let mut start = ptr;

        if let Some((&prev_off, &prev_len)) = self.free.range(..start).next_back() {
            if prev_off + prev_len == start {
                self.free.remove(&prev_off);
                start = prev_off;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }

        if start + len == self.top {
            self.top = start;
        } else {
            self.free.insert(start, len);
        }
        true
    }

    pub fn slice(&self, ptr: u32, len: u32) -> Option<&[u8]> {
        let r = self.range(ptr, len)?;
        Some(&self.bytes[r])
    }

    pub fn slice_mut(&mut self, ptr: u32, len: u32) -> Option<&mut [u8]> {
        let r = self.range(ptr, len)?;
        Some(&mut self.bytes[r])
    }

    /// Borrow a source region and a disjoint destination region at once.
    /// `None` if either is out of bounds or they overlap.
    pub fn split_mut(&mut self, src: (u32, u32), dst: (u32, u32)) -> Option<(&[u8], &mut [u8])> {
        let s = self.range(src.0, src.1)?;
        let d = self.range(dst.0, dst.1)?;

        if s.end <= d.start {
            let (lo, hi) = self.bytes.split_at_mut(d.start);
            Some((&lo[s], &mut hi[..d.end - d.start]))
        } else if d.end <= s.start {
            let (lo, hi) = self.bytes.split_at_mut(s.start);
            Some((&hi[..s.end - s.start], &mut lo[d]))
        } else {
            None
        }
    }

    fn range(&self, ptr: u32, len: u32) -> Option<Range<usize>> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    fn ensure_capacity(&mut self, end: u32) -> bool {
        let end = end as usize;
        if end <= self.bytes.len() {
            return true;
        }
        let pages = end.div_ceil(PAGE_SIZE);
        if pages > self.max_pages as usize {
            return false;
        }
        self.bytes.resize(pages * PAGE_SIZE, 0);
        true
    }
}

fn round_up(size: u32) -> Option<u32> {
    size.checked_add(ALIGN - 1).map(|n| n & !(ALIGN - 1))
}
