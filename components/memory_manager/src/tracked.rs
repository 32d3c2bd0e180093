//! Tracked allocations.
//!
//! A [`TrackedCell`] is exactly one machine word: the address of its
//! buffer with the mark flag packed into bit 0, which is always free
//! because buffers are 8-byte aligned. The cell's own address is the
//! handle that programs store on the operand stack and in memory.

use std::alloc::{alloc_zeroed, dealloc, Layout};

use core_types::{VmError, VmResult};

const MARK_BIT: usize = 1;

/// Buffer alignment; also the granularity of conservative scanning.
pub const WORD: usize = std::mem::size_of::<i64>();

/// One-word GC cell: buffer address plus mark flag.
#[derive(Debug)]
#[repr(transparent)]
pub struct TrackedCell {
    tagged: usize,
}

impl TrackedCell {
    /// Address of the backing buffer.
    pub fn buffer(&self) -> *mut u8 {
        (self.tagged & !MARK_BIT) as *mut u8
    }

    /// Whether the last mark phase found this cell reachable.
    pub fn is_marked(&self) -> bool {
        self.tagged & MARK_BIT != 0
    }

    /// Set or clear the mark flag.
    pub fn set_marked(&mut self, marked: bool) {
        if marked {
            self.tagged |= MARK_BIT;
        } else {
            self.tagged &= !MARK_BIT;
        }
    }
}

/// A tracked cell together with the size and layout of its buffer.
///
/// Dropping an `Allocation` frees the buffer.
#[derive(Debug)]
pub struct Allocation {
    cell: Box<TrackedCell>,
    size: usize,
    layout: Layout,
}

impl Allocation {
    /// Allocate a zeroed buffer of `size` bytes.
    pub fn new(size: usize) -> VmResult<Self> {
        let padded = size.max(1).div_ceil(WORD) * WORD;
        let layout = Layout::from_size_align(padded, WORD)
            .map_err(|_| VmError::memory(format!("cannot allocate {} bytes", size)))?;
        // SAFETY: the layout has a non-zero size.
        let buffer = unsafe { alloc_zeroed(layout) };
        if buffer.is_null() {
            return Err(VmError::memory(format!("out of memory allocating {} bytes", size)));
        }
        Ok(Self {
            cell: Box::new(TrackedCell {
                tagged: buffer as usize,
            }),
            size,
            layout,
        })
    }

    /// Handle under which this allocation is known: the cell address.
    pub fn handle(&self) -> usize {
        &*self.cell as *const TrackedCell as usize
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The tracked cell.
    pub fn cell(&self) -> &TrackedCell {
        &self.cell
    }

    /// The tracked cell, mutably.
    pub fn cell_mut(&mut self) -> &mut TrackedCell {
        &mut self.cell
    }

    /// Whole words of the buffer, for conservative scanning.
    pub fn words(&self) -> &[i64] {
        // SAFETY: the buffer is WORD aligned, zero-initialised and at least
        // `size` bytes long; it lives until `self` is dropped.
        unsafe { std::slice::from_raw_parts(self.cell.buffer() as *const i64, self.size / WORD) }
    }

    /// Read `width` bytes at `offset`, zero-extending.
    pub fn read(&self, offset: usize, width: usize) -> VmResult<i64> {
        self.check_range(offset, width)?;
        // SAFETY: range checked against the buffer size above.
        unsafe {
            let at = self.cell.buffer().add(offset);
            Ok(match width {
                1 => *at as i64,
                _ => std::ptr::read_unaligned(at as *const i64),
            })
        }
    }

    /// Write the low `width` bytes of `value` at `offset`.
    pub fn write(&mut self, offset: usize, width: usize, value: i64) -> VmResult<()> {
        self.check_range(offset, width)?;
        // SAFETY: range checked against the buffer size above.
        unsafe {
            let at = self.cell.buffer().add(offset);
            match width {
                1 => *at = value as u8,
                _ => std::ptr::write_unaligned(at as *mut i64, value),
            }
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, width: usize) -> VmResult<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(VmError::bounds(format!(
                "access of {} bytes at offset {} exceeds allocation of {} bytes",
                width, offset, self.size
            ))),
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        // SAFETY: the buffer was allocated in `new` with this layout and is
        // freed exactly once.
        unsafe { dealloc(self.cell.buffer(), self.layout) }
    }
}
