use log::{debug, info};

use super::{CowFs, Fd};
use crate::delta::{self, Delta};
use crate::structs::*;
use crate::Error;

impl CowFs {
    /// Record `content` as the next version of the inode at `inode_index`.
    ///
    /// `previous` must be the materialized content of the current version.
    /// Every version's head names a chain carrying the complete content, so
    /// the recorded delta is a statistic and never drives reads. A failed
    /// allocation frees everything this call obtained and leaves the inode
    /// and the free list untouched.
    pub(crate) fn append_version(
        &mut self,
        inode_index: usize,
        previous: &[u8],
        content: &[u8],
    ) -> Result<(), Error> {
        let (previous_head, previous_number) = {
            let inode = &self.inodes[inode_index];
            (inode.head_block, inode.version_count)
        };
        let delta = delta::compute(previous, content);
        let head = if content.is_empty() {
            if previous_head != SENTINEL_BLOCK {
                // The superseded version keeps referencing its blocks
                self.increment_chain(previous_head);
            }
            SENTINEL_BLOCK
        } else if delta.size == 0 {
            // Identical content or pure truncation shares the whole chain;
            // reads stop at the recorded size. One increment covers both the
            // share and the retained history reference.
            if previous_head != SENTINEL_BLOCK {
                self.increment_chain(previous_head);
            }
            previous_head
        } else {
            // Reference accounting for the previous chain happens inside,
            // after the allocations that can still fail
            self.build_version_chain(previous, content, previous_head, delta)?
        };
        let version = VersionInfo {
            version_number: previous_number + 1,
            head_block: head,
            size: content.len() as u64,
            timestamp: timestamp_now(),
            delta_start: delta.start,
            delta_size: delta.size,
            prev_version: previous_number,
        };
        debug!("Appending {version}");
        let inode = &mut self.inodes[inode_index];
        inode.history.push(version);
        inode.head_block = head;
        inode.size = content.len() as u64;
        inode.version_count += 1;
        Ok(())
    }

    /// Build the chain for a changed, non-empty content.
    ///
    /// A pure append shares the whole unchanged prefix: the new version keeps
    /// the previous head and only blocks past the old chain's capacity are
    /// fresh, chained onto the old tail block. Readers of the older versions
    /// stop at their recorded size and never dereference that tail block's
    /// successor, so relinking it is invisible to them; a mid-block fill is
    /// taken only when no other chain holds the tail block. When the tail
    /// block cannot take the extension, or the change starts before the end
    /// of the old content, fresh blocks cover the content through the end of
    /// the changed region, splicing in the unchanged whole-block tail of the
    /// previous chain when old and new sizes match. A prefix behind a
    /// diverging successor can never be shared: the boundary block would
    /// have to point at two different continuations.
    fn build_version_chain(
        &mut self,
        previous: &[u8],
        content: &[u8],
        previous_head: u64,
        delta: Delta,
    ) -> Result<u64, Error> {
        let block_size = BLOCK_SIZE as u64;
        let total_blocks = (content.len() as u64).div_ceil(block_size);
        if delta.start == previous.len() as u64 && previous_head != SENTINEL_BLOCK {
            let old_blocks = (previous.len() as u64).div_ceil(block_size);
            let last = self.nth_chain_block(previous_head, old_blocks - 1);
            let tail = &self.blocks[last as usize];
            let aligned = previous.len() % BLOCK_SIZE == 0;
            if tail.next == SENTINEL_BLOCK && (aligned || tail.ref_count == 1) {
                return self.extend_chain(previous_head, last, previous.len(), content);
            }
        }
        let delta_end = delta.start + delta.size;
        let shared_from = if previous.len() == content.len() {
            delta_end.div_ceil(block_size).min(total_blocks)
        } else {
            total_blocks
        };
        let mut fresh: Vec<u64> = Vec::with_capacity(shared_from as usize);
        for _ in 0..shared_from {
            match self.allocate_block() {
                Ok(index) => {
                    if let Some(&last) = fresh.last() {
                        self.blocks[last as usize].next = index;
                    }
                    fresh.push(index);
                }
                Err(e) => {
                    if let Some(&head) = fresh.first() {
                        self.decrement_chain(head);
                    }
                    return Err(e);
                }
            }
        }
        for (position, &index) in fresh.iter().enumerate() {
            let offset = position * BLOCK_SIZE;
            let end = (offset + BLOCK_SIZE).min(content.len());
            let block = &mut self.blocks[index as usize];
            block.data.fill(0);
            block.data[..end - offset].copy_from_slice(&content[offset..end]);
        }
        if shared_from < total_blocks {
            let chain = self.chain_blocks(previous_head);
            let tail = chain[shared_from as usize];
            self.blocks[*fresh.last().unwrap() as usize].next = tail;
            self.increment_chain(tail);
            debug!("Spliced unchanged tail at block {tail}");
        }
        if previous_head != SENTINEL_BLOCK {
            // The superseded version keeps referencing its blocks
            self.increment_chain(previous_head);
        }
        Ok(fresh[0])
    }

    /// Append in place: share the previous chain whole and chain
    /// `ceil((new_size - old_capacity) / BLOCK_SIZE)` fresh blocks onto its
    /// tail block. The single increment covers the prefix joining the new
    /// chain as well as the retained history reference; it runs before the
    /// tail block is relinked so the walk covers the old chain only.
    fn extend_chain(
        &mut self,
        previous_head: u64,
        last: u64,
        previous_len: usize,
        content: &[u8],
    ) -> Result<u64, Error> {
        let capacity = previous_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        let fresh_count = content.len().saturating_sub(capacity).div_ceil(BLOCK_SIZE);
        let mut fresh: Vec<u64> = Vec::with_capacity(fresh_count);
        for _ in 0..fresh_count {
            match self.allocate_block() {
                Ok(index) => {
                    if let Some(&previous) = fresh.last() {
                        self.blocks[previous as usize].next = index;
                    }
                    fresh.push(index);
                }
                Err(e) => {
                    if let Some(&head) = fresh.first() {
                        self.decrement_chain(head);
                    }
                    return Err(e);
                }
            }
        }
        // Fill the tail block's spare bytes; they sit past every sharing
        // version's recorded size
        let boundary = content.len().min(capacity);
        if boundary > previous_len {
            let offset = previous_len % BLOCK_SIZE;
            self.blocks[last as usize].data[offset..offset + boundary - previous_len]
                .copy_from_slice(&content[previous_len..boundary]);
        }
        for (position, &index) in fresh.iter().enumerate() {
            let offset = capacity + position * BLOCK_SIZE;
            let end = (offset + BLOCK_SIZE).min(content.len());
            let block = &mut self.blocks[index as usize];
            block.data.fill(0);
            block.data[..end - offset].copy_from_slice(&content[offset..end]);
        }
        self.increment_chain(previous_head);
        if let Some(&first) = fresh.first() {
            self.blocks[last as usize].next = first;
        }
        debug!("Extended chain {previous_head} in place with {fresh_count} fresh blocks");
        Ok(previous_head)
    }

    /// Promote `target_version` by appending a new version that shares its
    /// whole chain. History is preserved, nothing is decremented.
    pub fn rollback_to_version(&mut self, fd: Fd, target_version: u64) -> Result<(), Error> {
        info!("Rolling back fd {fd} to version {target_version}");
        let descriptor = self.descriptor(fd)?;
        let inode_index = descriptor.inode;
        let count = self.inodes[inode_index].version_count;
        if target_version == 0 || target_version > count {
            return Err(Error::VersionNotFound);
        }
        let entry = self.inodes[inode_index]
            .history
            .iter()
            .find(|version| version.version_number == target_version)
            .cloned()
            .ok_or(Error::VersionNotFound)?;
        if entry.head_block != SENTINEL_BLOCK {
            self.increment_chain(entry.head_block);
        }
        let version = VersionInfo {
            version_number: count + 1,
            head_block: entry.head_block,
            size: entry.size,
            timestamp: timestamp_now(),
            delta_start: 0,
            delta_size: entry.size,
            prev_version: target_version,
        };
        let inode = &mut self.inodes[inode_index];
        inode.history.push(version);
        inode.head_block = entry.head_block;
        inode.size = entry.size;
        inode.version_count += 1;
        debug!("File is now at version {} with size {}", count + 1, entry.size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::engine;
    use crate::structs::{FileMode, SENTINEL_BLOCK};
    use crate::{Error, BLOCK_SIZE};

    const MIB: u64 = 1024 * 1024;

    fn content_of(fs: &mut crate::CowFs, name: &str) -> Vec<u8> {
        let fd = fs.open(name, FileMode::Read).unwrap();
        let size = fs.get_file_size(fd).unwrap() as usize;
        let mut buffer = vec![0u8; size];
        let read = fs.read(fd, &mut buffer).unwrap();
        assert_eq!(read, size);
        fs.close(fd).unwrap();
        buffer
    }

    #[test]
    fn every_write_is_one_version() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        for round in 1..=5u64 {
            fs.write(fd, b"x").unwrap();
            assert_eq!(fs.get_version_count(fd).unwrap(), round);
        }
    }

    #[test]
    fn rollback_restores_content() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.close(fd).unwrap();
        let fd = fs.open("a.txt", FileMode::Write).unwrap();
        fs.write(fd, b"!").unwrap();
        assert_eq!(content_of(&mut fs, "a.txt"), b"hello!");

        fs.rollback_to_version(fd, 1).unwrap();
        assert_eq!(fs.get_version_count(fd).unwrap(), 3);
        let history = fs.get_version_history(fd).unwrap();
        assert_eq!(history[2].head_block, history[0].head_block);
        assert_eq!(history[2].size, 5);
        assert_eq!(history[2].prev_version, 1);
        assert_eq!(content_of(&mut fs, "a.txt"), b"hello");
    }

    #[test]
    fn rollback_rejects_unknown_versions() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        assert!(matches!(
            fs.rollback_to_version(fd, 0),
            Err(Error::VersionNotFound)
        ));
        assert!(matches!(
            fs.rollback_to_version(fd, 2),
            Err(Error::VersionNotFound)
        ));
        fs.close(fd).unwrap();
        assert!(matches!(
            fs.rollback_to_version(fd, 1),
            Err(Error::BadDescriptor)
        ));
    }

    #[test]
    fn rollback_after_rollback() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"one").unwrap();
        fs.write(fd, b" two").unwrap();
        fs.rollback_to_version(fd, 1).unwrap();
        fs.rollback_to_version(fd, 2).unwrap();
        assert_eq!(fs.get_version_count(fd).unwrap(), 4);
        assert_eq!(content_of(&mut fs, "a.txt"), b"one two");
    }

    #[test]
    fn truncating_write_shares_the_chain() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        let early = fs.open("a.txt", FileMode::Write).unwrap();
        fs.write(fd, b" world").unwrap();
        let usage = fs.total_memory_usage();

        // Replacing from position 5 with nothing truncates back to "hello"
        fs.write(early, b"").unwrap();
        assert_eq!(fs.get_file_size(early).unwrap(), 5);
        let history = fs.get_version_history(early).unwrap();
        assert_eq!(history[2].delta_size, 0);
        assert_eq!(history[2].head_block, history[1].head_block);
        assert_eq!(fs.total_memory_usage(), usage);
        assert_eq!(content_of(&mut fs, "a.txt"), b"hello");
    }

    #[test]
    fn identical_write_allocates_nothing() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"stable").unwrap();
        fs.close(fd).unwrap();
        let usage = fs.total_memory_usage();
        let fd = fs.open("a.txt", FileMode::Write).unwrap();
        // Appending zero bytes re-records the same content
        fs.write(fd, b"").unwrap();
        assert_eq!(fs.get_version_count(fd).unwrap(), 2);
        assert_eq!(fs.total_memory_usage(), usage);
        let history = fs.get_version_history(fd).unwrap();
        assert_eq!(history[1].head_block, history[0].head_block);
        assert_eq!(history[1].delta_size, 0);
    }

    #[test]
    fn aligned_append_shares_the_prefix() {
        // 6 blocks total, 5 usable
        let mut fs = engine(6 * BLOCK_SIZE as u64);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, &vec![b'x'; 3 * BLOCK_SIZE]).unwrap();
        assert_eq!(fs.total_memory_usage(), 3 * BLOCK_SIZE as u64);

        // Growing by one block needs one fresh block, not a fresh chain,
        // so this succeeds with only two blocks left
        fs.write(fd, &vec![b'y'; BLOCK_SIZE]).unwrap();
        assert_eq!(fs.get_version_count(fd).unwrap(), 2);
        assert_eq!(fs.total_memory_usage(), 4 * BLOCK_SIZE as u64);
        let history = fs.get_version_history(fd).unwrap();
        assert_eq!(history[1].head_block, history[0].head_block);
        assert_eq!(history[1].delta_start, 3 * BLOCK_SIZE as u64);
        assert_eq!(history[1].delta_size, BLOCK_SIZE as u64);
        // The shared prefix is referenced by both versions
        let chain = fs.chain_blocks(history[1].head_block);
        assert_eq!(chain.len(), 4);
        assert_eq!(fs.blocks[chain[0] as usize].ref_count, 2);
        assert_eq!(fs.blocks[chain[3] as usize].ref_count, 1);
        let content = content_of(&mut fs, "a.txt");
        assert_eq!(&content[..3 * BLOCK_SIZE], &vec![b'x'; 3 * BLOCK_SIZE][..]);
        assert_eq!(&content[3 * BLOCK_SIZE..], &vec![b'y'; BLOCK_SIZE][..]);
    }

    #[test]
    fn small_append_reuses_the_tail_block() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.write(fd, b" world").unwrap();
        assert_eq!(fs.total_memory_usage(), BLOCK_SIZE as u64);
        let history = fs.get_version_history(fd).unwrap();
        assert_eq!(history[1].head_block, history[0].head_block);
        assert_eq!(content_of(&mut fs, "a.txt"), b"hello world");
    }

    #[test]
    fn unaligned_append_copies_a_shared_tail_block() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, b"hello").unwrap();
        fs.rollback_to_version(fd, 1).unwrap();

        // The tail block now backs two versions, so the append must not
        // touch its bytes
        fs.write(fd, b"!").unwrap();
        let history = fs.get_version_history(fd).unwrap();
        assert_ne!(history[2].head_block, history[0].head_block);
        assert_eq!(content_of(&mut fs, "a.txt"), b"hello!");
        fs.rollback_to_version(fd, 1).unwrap();
        assert_eq!(content_of(&mut fs, "a.txt"), b"hello");
    }

    #[test]
    fn same_size_change_shares_the_tail() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        let writer = fs.open("a.txt", FileMode::Write).unwrap();
        let mut payload = vec![b'A'; 3 * BLOCK_SIZE];
        fs.write(writer, &payload).unwrap();
        assert_eq!(fs.total_memory_usage(), 3 * BLOCK_SIZE as u64);

        // Same length, first byte changed, written by the still-at-zero
        // creating descriptor: only the first block is fresh
        payload[0] = b'B';
        fs.write(fd, &payload).unwrap();
        assert_eq!(fs.total_memory_usage(), 4 * BLOCK_SIZE as u64);
        assert_eq!(content_of(&mut fs, "a.txt"), payload);
        let history = fs.get_version_history(fd).unwrap();
        let old_chain = fs.chain_blocks(history[0].head_block);
        let new_chain = fs.chain_blocks(history[1].head_block);
        assert_ne!(old_chain[0], new_chain[0]);
        assert_eq!(old_chain[1..], new_chain[1..]);
    }

    #[test]
    fn failed_write_leaves_no_trace() {
        // 8 blocks total, 7 allocatable
        let mut fs = engine(8 * BLOCK_SIZE as u64);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, &vec![b'x'; 2 * BLOCK_SIZE]).unwrap();
        let usage = fs.total_memory_usage();
        let free = fs.free_list.clone();

        // Growing past the shared prefix needs 6 fresh blocks, only 5 remain
        let huge = vec![b'y'; 6 * BLOCK_SIZE];
        assert!(matches!(fs.write(fd, &huge), Err(Error::OutOfSpace)));
        assert_eq!(fs.get_version_count(fd).unwrap(), 1);
        assert_eq!(fs.get_file_size(fd).unwrap(), 2 * BLOCK_SIZE as u64);
        assert_eq!(fs.total_memory_usage(), usage);
        assert_eq!(fs.free_list, free);
        // The engine still works afterwards
        fs.write(fd, b"!").unwrap();
        assert_eq!(fs.get_version_count(fd).unwrap(), 2);
    }

    #[test]
    fn chains_stay_walkable_for_all_versions() {
        let mut fs = engine(MIB);
        let fd = fs.create("a.txt").unwrap();
        fs.write(fd, &vec![b'a'; BLOCK_SIZE + 17]).unwrap();
        fs.write(fd, b"tail").unwrap();
        fs.rollback_to_version(fd, 1).unwrap();
        for version in fs.get_version_history(fd).unwrap() {
            let bytes = fs.read_chain(version.head_block, version.size);
            assert_eq!(bytes.len() as u64, version.size);
            assert!(!fs
                .chain_blocks(version.head_block)
                .contains(&SENTINEL_BLOCK));
        }
    }
}
