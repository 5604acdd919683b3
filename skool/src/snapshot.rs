use core::fmt;

use crate::{Addr, MEMORY_SIZE};

/// A 64 KiB memory image.
///
/// The buffer's length never changes; pokes overwrite bytes in place and
/// reads beyond 65535 are a caller bug, not a wrap.  All the analyses in
/// the workspace share one `Snapshot` per run.
#[derive(Clone)]
pub struct Snapshot {
    /// The flat 65536-byte address space
    mem: Box<[u8]>,
}

impl Snapshot {
    /// A snapshot of 65536 zero bytes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mem: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    /// Build a snapshot by loading `data` at `org`.  Bytes that would land
    /// beyond 65535 are dropped.  A 49152-byte RAM image loads at 16384; a
    /// full 65536-byte image loads at 0.
    #[must_use]
    pub fn from_data(data: &[u8], org: Addr) -> Self {
        let mut snapshot = Self::new();
        snapshot.poke(org, data);
        snapshot
    }

    /// The byte at `address`.
    #[must_use]
    pub fn byte(&self, address: Addr) -> u8 {
        self.mem[address as usize]
    }

    /// Overwrite bytes starting at `address`.  Bytes that would land
    /// beyond 65535 are dropped.
    pub fn poke(&mut self, address: Addr, data: &[u8]) {
        let start = (address as usize).min(MEMORY_SIZE);
        let end = (start + data.len()).min(MEMORY_SIZE);
        self.mem[start..end].copy_from_slice(&data[..end - start]);
    }

    /// The bytes in `[start, end)`, both bounds clamped to the buffer.
    #[must_use]
    pub fn slice(&self, start: Addr, end: Addr) -> &[u8] {
        let start = (start as usize).min(MEMORY_SIZE);
        let end = (end as usize).clamp(start, MEMORY_SIZE);
        &self.mem[start..end]
    }

    /// The sum of the bytes in `[start, end)`.  Zero means the region is
    /// entirely zero-filled.
    #[must_use]
    pub fn sum(&self, start: Addr, end: Addr) -> u32 {
        self.slice(start, end).iter().map(|b| u32::from(*b)).sum()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 64 KiB of hex is useless in assertion output
        write!(f, "Snapshot {{ 65536 bytes }}")
    }
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    #[test]
    fn new_snapshot_is_zero_filled() {
        let snapshot = Snapshot::new();
        assert_eq!(snapshot.sum(0, 65536), 0);
        assert_eq!(snapshot.slice(0, 65536).len(), 65536);
    }

    #[test]
    fn poke_and_read_back() {
        let mut snapshot = Snapshot::new();
        snapshot.poke(32768, &[0x3E, 0x00, 0xC9]);
        assert_eq!(snapshot.byte(32768), 0x3E);
        assert_eq!(snapshot.slice(32768, 32771), &[0x3E, 0x00, 0xC9]);
        assert_eq!(snapshot.byte(32771), 0, "bytes after the poke untouched");
    }

    #[test]
    fn poke_at_the_top_of_memory_is_clipped() {
        let mut snapshot = Snapshot::new();
        snapshot.poke(65534, &[1, 2, 3, 4]);
        assert_eq!(
            snapshot.slice(65534, 65536),
            &[1, 2],
            "bytes beyond 65535 are dropped, not wrapped"
        );
    }

    #[test]
    fn ram_image_loads_at_16384() {
        let ram = vec![0xAA; 49152];
        let snapshot = Snapshot::from_data(&ram, 16384);
        assert_eq!(snapshot.byte(16383), 0);
        assert_eq!(snapshot.byte(16384), 0xAA);
        assert_eq!(snapshot.byte(65535), 0xAA);
    }
}
