//! # Calibration memory test
//!
//! A short pattern test which is run for every candidate delay tap. Every pattern is written to
//! the start of each enabled bank and read back.
use crate::board::MAX_BANKS;

/// Word access to the DRAM window.
pub trait MemoryBus {
    fn write_word(&mut self, addr: u64, value: u32);
    fn read_word(&mut self, addr: u64) -> u32;
    /// Flush the cache line containing `addr` to memory.
    fn flush(&mut self, addr: u64);
}

/// Direct volatile access to a DRAM window which is mapped cache inhibited.
pub struct PhysicalMemory {
    base: usize,
}

impl PhysicalMemory {
    /// # Safety
    ///
    /// `base` must be the virtual address of the DRAM window and the window must be mapped
    /// cache inhibited and guarded for the complete installed size.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    fn ptr(&self, addr: u64) -> *mut u32 {
        (self.base + addr as usize) as *mut u32
    }
}

impl MemoryBus for PhysicalMemory {
    #[inline]
    fn write_word(&mut self, addr: u64, value: u32) {
        // Safety: The constructor guarantees that the DRAM window is mapped.
        unsafe { core::ptr::write_volatile(self.ptr(addr), value) }
    }

    #[inline]
    fn read_word(&mut self, addr: u64) -> u32 {
        // Safety: The constructor guarantees that the DRAM window is mapped.
        unsafe { core::ptr::read_volatile(self.ptr(addr)) }
    }

    #[inline]
    fn flush(&mut self, _addr: u64) {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

pub const PATTERN_WORDS: usize = 8;
pub const NUM_PATTERNS: usize = 8;

pub const PATTERNS: [[u32; PATTERN_WORDS]; NUM_PATTERNS] = [
    [
        0x0000_0000,
        0x0000_0000,
        0xFFFF_FFFF,
        0xFFFF_FFFF,
        0x0000_0000,
        0x0000_0000,
        0xFFFF_FFFF,
        0xFFFF_FFFF,
    ],
    [
        0xFFFF_FFFF,
        0xFFFF_FFFF,
        0x0000_0000,
        0x0000_0000,
        0xFFFF_FFFF,
        0xFFFF_FFFF,
        0x0000_0000,
        0x0000_0000,
    ],
    [
        0xAAAA_AAAA,
        0xAAAA_AAAA,
        0x5555_5555,
        0x5555_5555,
        0xAAAA_AAAA,
        0xAAAA_AAAA,
        0x5555_5555,
        0x5555_5555,
    ],
    [
        0x5555_5555,
        0x5555_5555,
        0xAAAA_AAAA,
        0xAAAA_AAAA,
        0x5555_5555,
        0x5555_5555,
        0xAAAA_AAAA,
        0xAAAA_AAAA,
    ],
    [
        0xA5A5_A5A5,
        0xA5A5_A5A5,
        0x5A5A_5A5A,
        0x5A5A_5A5A,
        0xA5A5_A5A5,
        0xA5A5_A5A5,
        0x5A5A_5A5A,
        0x5A5A_5A5A,
    ],
    [
        0x5A5A_5A5A,
        0x5A5A_5A5A,
        0xA5A5_A5A5,
        0xA5A5_A5A5,
        0x5A5A_5A5A,
        0x5A5A_5A5A,
        0xA5A5_A5A5,
        0xA5A5_A5A5,
    ],
    [
        0xAA55_AA55,
        0xAA55_AA55,
        0x55AA_55AA,
        0x55AA_55AA,
        0xAA55_AA55,
        0xAA55_AA55,
        0x55AA_55AA,
        0x55AA_55AA,
    ],
    [
        0x55AA_55AA,
        0x55AA_55AA,
        0xAA55_AA55,
        0xAA55_AA55,
        0x55AA_55AA,
        0x55AA_55AA,
        0xAA55_AA55,
        0xAA55_AA55,
    ],
];

/// Run the pattern test against all banks.
///
/// Each word is read `reread_loops` times. Returns false on the first mismatch.
pub fn short_test<M: MemoryBus>(mem: &mut M, banks: &[u64], reread_loops: u32) -> bool {
    for &base in banks {
        for pattern in PATTERNS.iter() {
            for (i, &word) in pattern.iter().enumerate() {
                let addr = base + (i * 4) as u64;
                mem.write_word(addr, word);
                mem.flush(addr);
            }
            for _ in 0..reread_loops.max(1) {
                for (i, &word) in pattern.iter().enumerate() {
                    if mem.read_word(base + (i * 4) as u64) != word {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Collect the bank base addresses which lie below `limit`.
pub fn banks_below(bases: &[u64], limit: u64) -> heapless::Vec<u64, MAX_BANKS> {
    bases.iter().copied().filter(|&b| b < limit).collect()
}
