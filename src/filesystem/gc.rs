use log::{debug, info};

use super::CowFs;
use crate::structs::{FreeList, SENTINEL_BLOCK};

impl CowFs {
    /// Mark-and-sweep over the block array.
    ///
    /// Every block reachable from any version of any in-use inode survives
    /// with its reference count untouched. Everything else, including blocks
    /// kept alive only by a stale count, is zeroed and released, and the
    /// free-extent list is rebuilt from scratch. Running it twice in a row
    /// changes nothing.
    pub fn garbage_collect(&mut self) {
        info!("Collecting garbage over {} blocks", self.total_blocks);
        let mut marked = vec![false; self.total_blocks as usize];
        for inode in self.inodes.iter().filter(|inode| inode.in_use) {
            for version in &inode.history {
                let mut current = version.head_block;
                while current != SENTINEL_BLOCK && !marked[current as usize] {
                    marked[current as usize] = true;
                    current = self.blocks[current as usize].next;
                }
            }
        }
        let mut reclaimed = 0u64;
        for index in 1..self.total_blocks as usize {
            if marked[index] {
                continue;
            }
            let block = &mut self.blocks[index];
            if block.in_use {
                reclaimed += 1;
            }
            block.data.fill(0);
            block.clear();
        }
        self.free_list = FreeList::rebuild(&self.blocks);
        debug!(
            "Reclaimed {reclaimed} unreferenced blocks, {} free",
            self.free_list.free_blocks()
        );
    }
}
