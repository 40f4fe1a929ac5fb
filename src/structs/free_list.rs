use super::*;

impl FreeExtent {
    /// First block past the extent
    pub(crate) fn end(&self) -> u64 {
        self.start + self.count
    }
}

impl FreeList {
    /// Free list of a fresh pool: every block except the reserved block 0
    pub(crate) fn full(total_blocks: u64) -> Self {
        let mut list = Self::default();
        if total_blocks > 1 {
            list.extents.push(FreeExtent {
                start: 1,
                count: total_blocks - 1,
            });
        }
        list
    }

    /// Rebuild from the block array by scanning maximal runs of free blocks,
    /// skipping the reserved block 0
    pub(crate) fn rebuild(blocks: &[Block]) -> Self {
        let mut list = Self::default();
        let mut run_start: Option<u64> = None;
        for (index, block) in blocks.iter().enumerate().skip(1) {
            if !block.in_use {
                run_start.get_or_insert(index as u64);
            } else if let Some(start) = run_start.take() {
                list.add_extent(start, index as u64 - start);
            }
        }
        if let Some(start) = run_start {
            list.add_extent(start, blocks.len() as u64 - start);
        }
        list
    }

    /// Take one block from the extent with the least surplus (best fit)
    pub(crate) fn allocate_one(&mut self) -> Option<u64> {
        let best = self
            .extents
            .iter()
            .enumerate()
            .min_by_key(|(_, extent)| extent.count)
            .map(|(index, _)| index)?;
        let extent = &mut self.extents[best];
        let block = extent.start;
        extent.start += 1;
        extent.count -= 1;
        if extent.count == 0 {
            self.extents.remove(best);
        }
        Some(block)
    }

    /// Return a single block to the list
    pub(crate) fn free_one(&mut self, index: u64) {
        self.add_extent(index, 1);
    }

    /// Insert an extent at its sorted position and merge neighbors
    pub(crate) fn add_extent(&mut self, start: u64, count: u64) {
        if count == 0 {
            return;
        }
        let position = self
            .extents
            .partition_point(|extent| extent.start < start);
        self.extents.insert(position, FreeExtent { start, count });
        self.merge();
    }

    /// Coalesce adjacent extents in a single pass; idempotent
    pub(crate) fn merge(&mut self) {
        let mut merged: Vec<FreeExtent> = Vec::with_capacity(self.extents.len());
        for extent in self.extents.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == extent.start => last.count += extent.count,
                _ => merged.push(extent),
            }
        }
        self.extents = merged;
    }

    /// Total count of free blocks
    pub(crate) fn free_blocks(&self) -> u64 {
        self.extents.iter().map(|extent| extent.count).sum()
    }

    /// Sorted, non-overlapping and fully merged
    #[cfg(test)]
    pub(crate) fn is_well_formed(&self) -> bool {
        self.extents.windows(2).all(|pair| pair[0].end() < pair[1].start)
            && self.extents.iter().all(|extent| extent.count > 0)
            && self.extents.first().map_or(true, |extent| extent.start > 0)
    }
}
