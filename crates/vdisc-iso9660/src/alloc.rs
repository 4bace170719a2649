use crate::consts::sectors_for;
use crate::error::{IsoError, IsoResult};

/// Hands out logical block addresses in increasing order.
#[derive(Debug, Default, Clone)]
pub struct SectorAllocator {
    next: u32,
}

impl SectorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve enough whole sectors for `bytes` and return the first LBA.
    /// Zero bytes still reserve one sector.
    pub fn alloc(&mut self, bytes: u64) -> IsoResult<u32> {
        let lba = self.next;
        let count = u32::try_from(sectors_for(bytes))
            .map_err(|_| IsoError::overflow(format!("allocation of {bytes} bytes")))?;
        self.next = lba
            .checked_add(count)
            .ok_or_else(|| IsoError::overflow("volume exceeds 2^32 sectors"))?;
        Ok(lba)
    }

    /// The next LBA to be handed out, which is also the sector count so far.
    pub fn next_lba(&self) -> u32 {
        self.next
    }
}
