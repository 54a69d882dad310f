//! Shard Manager
//!
//! Owns every shard file of a store and funnels all cursor/counter
//! mutation through `allocate`.
//!
//! ## Responsibilities
//! - Create or reopen `<id>.sf` files on startup
//! - Reserve block space (`allocate`) and persist the shard header
//! - Positional block reads and writes
//! - Hand out the per-shard chain locks used by the engine

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace, warn};

use crate::block::{self, Block, SizeClass};
use crate::config::SyncStrategy;
use crate::error::{PackError, Result};
use crate::record::{Record, RecordCodec};

use super::io::{read_exact_at, write_all_at};
use super::{ShardBlocks, ShardHeader, ShardId, HEADER_SIZE, SHARD_FILE_EXTENSION};

/// One open shard file with its in-memory header
struct Shard {
    id: ShardId,
    path: PathBuf,
    file: File,
    /// Serializes allocation and header flushes
    header: Mutex<ShardHeader>,
    /// Chain writers take this exclusively, readers shared
    chains: RwLock<()>,
}

/// Manages the shard files of one store directory
///
/// ## Concurrency:
/// - `header`: one Mutex per shard, held only for allocation
/// - `chains`: one RwLock per shard, taken by the engine around chain
///   mutation (exclusive) and block reads (shared)
/// - Block I/O is positional, so readers never contend on a file cursor
/// - All methods use `&self`
pub struct ShardManager {
    /// Directory holding the shard files
    data_dir: PathBuf,

    /// Shards indexed by id
    shards: Vec<Shard>,

    /// When to fsync after writes
    sync_strategy: SyncStrategy,
}

impl ShardManager {
    /// Open or create `shard_count` shards in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Open (or create) `<id>.sf` for every id
    /// 3. Initialize empty files with a zeroed header
    /// 4. Load and validate the header of existing files
    pub fn open_or_init(path: &Path, shard_count: u32) -> Result<Self> {
        Self::open_with(path, shard_count, SyncStrategy::OnClose)
    }

    /// Like [`open_or_init`](Self::open_or_init) with an explicit sync strategy
    pub fn open_with(path: &Path, shard_count: u32, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut shards = Vec::with_capacity(shard_count as usize);
        for id in 0..shard_count {
            let shard_path = Self::shard_path_with_dir(path, id);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&shard_path)?;

            let file_len = file.metadata()?.len();
            let header = if file_len == 0 {
                let header = ShardHeader::default();
                write_all_at(&file, &header.encode(), 0)?;
                if sync_strategy == SyncStrategy::EveryWrite {
                    file.sync_data()?;
                }
                debug!(shard = id, path = %shard_path.display(), "initialized shard");
                header
            } else {
                Self::load_header(&file, file_len, &shard_path)?
            };

            shards.push(Shard {
                id,
                path: shard_path,
                file,
                header: Mutex::new(header),
                chains: RwLock::new(()),
            });
        }

        info!(
            dir = %path.display(),
            shards = shard_count,
            "opened shard files"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            shards,
            sync_strategy,
        })
    }

    /// Open the shard files already present in a directory, read-only
    ///
    /// Nothing is created or written: ids missing from the directory stay
    /// unknown (a store may have gaps), and any block write or allocation
    /// fails with an I/O error. Fails with `Config` if the directory holds
    /// no shard files.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let ids = Self::discover(path)?;
        if ids.is_empty() {
            return Err(PackError::Config(format!(
                "no shard files in {}",
                path.display()
            )));
        }

        let mut shards = Vec::with_capacity(ids.len());
        for id in ids {
            let shard_path = Self::shard_path_with_dir(path, id);
            let file = OpenOptions::new().read(true).open(&shard_path)?;
            let file_len = file.metadata()?.len();
            let header = Self::load_header(&file, file_len, &shard_path)?;

            shards.push(Shard {
                id,
                path: shard_path,
                file,
                header: Mutex::new(header),
                chains: RwLock::new(()),
            });
        }

        info!(
            dir = %path.display(),
            shards = shards.len(),
            "opened shard files read-only"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            shards,
            sync_strategy: SyncStrategy::OnClose,
        })
    }

    /// List the shard ids present in a directory, ascending
    ///
    /// Files that are not named `<id>.sf` are ignored.
    pub fn discover(path: &Path) -> Result<Vec<ShardId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();

            if file_path.is_file() {
                if let Some(id) = Self::parse_shard_id(&file_path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Number of shards
    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    /// Ids of the open shards, ascending
    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.shards.iter().map(|s| s.id)
    }

    /// Current header of a shard
    pub fn header(&self, shard: ShardId) -> Result<ShardHeader> {
        Ok(*self.shard(shard)?.header.lock())
    }

    /// Next allocation offset of a shard (0 before the first allocation)
    pub fn cursor(&self, shard: ShardId) -> Result<u64> {
        Ok(self.header(shard)?.cursor)
    }

    /// Blocks ever allocated in a shard
    pub fn block_count(&self, shard: ShardId) -> Result<u32> {
        Ok(self.header(shard)?.block_count)
    }

    /// Blocks ever allocated across all shards
    pub fn total_blocks(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.header.lock().block_count as u64)
            .sum()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a shard file
    pub fn shard_path(&self, shard: ShardId) -> Result<&Path> {
        Ok(&self.shard(shard)?.path)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Reserve one block of `class` at the shard's cursor
    ///
    /// Advances the cursor by the class capacity, bumps the block count and
    /// persists the header. This is the only way new block space is
    /// created. The reservation is stamped as an empty block of its class,
    /// so a scan stays aligned even if the block is never written. Returns
    /// the reserved offset.
    pub fn allocate(&self, shard: ShardId, class: SizeClass) -> Result<u64> {
        let shard = self.shard(shard)?;
        let mut header = shard.header.lock();
        let capacity = class.capacity();

        let offset = header.next_offset();
        let cursor = offset.checked_add(capacity as u64).ok_or_else(|| {
            PackError::CorruptMetadata(format!("cursor overflow at offset {}", offset))
        })?;
        let block_count = header.block_count.checked_add(1).ok_or_else(|| {
            PackError::CorruptMetadata(format!("block count overflow in shard {}", shard.id))
        })?;
        let updated = ShardHeader {
            cursor,
            block_count,
        };

        if shard.file.metadata()?.len() < cursor {
            shard.file.set_len(cursor)?;
        }
        let mut stamp = [0u8; block::HEADER_SIZE];
        stamp[0] = class.tag();
        write_all_at(&shard.file, &stamp, offset)?;
        write_all_at(&shard.file, &[0u8; block::TRAILER_SIZE], cursor - block::TRAILER_SIZE as u64)?;
        self.persist_header(shard, &updated)?;
        *header = updated;

        debug!(
            shard = shard.id,
            offset,
            capacity,
            block_count,
            "allocated block"
        );
        Ok(offset)
    }

    // =========================================================================
    // Block I/O
    // =========================================================================

    /// Read and decode the block at `offset`
    ///
    /// Reads the block header first to learn its class, then the full
    /// capacity window. Callers coordinate with writers through
    /// [`share_chains`](Self::share_chains).
    pub fn read_block<C: RecordCodec>(
        &self,
        shard: ShardId,
        offset: u64,
        codec: &C,
    ) -> Result<Block<C::Record>> {
        let (shard, class) = self.locate(shard, offset)?;

        let mut buf = vec![0u8; class.capacity()];
        read_exact_at(&shard.file, &mut buf, offset)?;
        trace!(shard = shard.id, offset, %class, "read block");

        Block::<C::Record>::decode(&buf, codec).map_err(|e| {
            warn!(shard = shard.id, offset, error = %e, "failed to decode block");
            e
        })
    }

    /// Class and next pointer of the block at `offset`, without decoding
    /// its records
    pub fn read_block_meta(&self, shard: ShardId, offset: u64) -> Result<(SizeClass, u64)> {
        let (shard, class) = self.locate(shard, offset)?;

        let mut trailer = [0u8; block::TRAILER_SIZE];
        let trailer_offset = offset + (class.capacity() - block::TRAILER_SIZE) as u64;
        read_exact_at(&shard.file, &mut trailer, trailer_offset)?;

        Ok((class, u64::from_be_bytes(trailer)))
    }

    /// Write a block's encoded bytes at `offset`
    ///
    /// The block must lie inside the allocated region; the cursor is never
    /// moved here.
    pub fn write_block<R: Record>(&self, shard: ShardId, offset: u64, block: &Block<R>) -> Result<()> {
        let shard = self.shard(shard)?;
        let cursor = shard.header.lock().cursor;

        let end = offset.saturating_add(block.capacity() as u64);
        if offset < HEADER_SIZE || end > cursor {
            return Err(PackError::OutOfRange {
                shard: shard.id,
                offset,
                cursor,
            });
        }

        let bytes = block.encode()?;
        write_all_at(&shard.file, &bytes, offset)?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            shard.file.sync_data()?;
        }

        trace!(
            shard = shard.id,
            offset,
            records = block.len(),
            next = block.next_pointer(),
            "wrote block"
        );
        Ok(())
    }

    /// Iterate every block of a shard in file order
    pub fn blocks<'a, C: RecordCodec>(
        &'a self,
        shard: ShardId,
        codec: &'a C,
    ) -> Result<ShardBlocks<'a, C>> {
        let end = self.cursor(shard)?;
        Ok(ShardBlocks::new(self, codec, shard, end))
    }

    /// fsync every shard file
    pub fn sync_all(&self) -> Result<()> {
        for shard in &self.shards {
            shard.file.sync_all()?;
        }
        Ok(())
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Exclusive chain lock of a shard (fill/append/refill)
    pub fn lock_chains(&self, shard: ShardId) -> Result<RwLockWriteGuard<'_, ()>> {
        Ok(self.shard(shard)?.chains.write())
    }

    /// Shared chain lock of a shard (block reads)
    pub fn share_chains(&self, shard: ShardId) -> Result<RwLockReadGuard<'_, ()>> {
        Ok(self.shard(shard)?.chains.read())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Shards are sorted by id; ids are dense unless opened with
    /// `open_existing`
    fn shard(&self, shard: ShardId) -> Result<&Shard> {
        self.shards
            .binary_search_by_key(&shard, |s| s.id)
            .ok()
            .and_then(|index| self.shards.get(index))
            .ok_or(PackError::UnknownShard {
                shard,
                shard_count: self.shard_count(),
            })
    }

    /// Validate `offset` and read the class tag of the block there
    fn locate(&self, shard: ShardId, offset: u64) -> Result<(&Shard, SizeClass)> {
        let shard = self.shard(shard)?;
        let cursor = shard.header.lock().cursor;

        if offset < HEADER_SIZE || offset >= cursor {
            return Err(PackError::OutOfRange {
                shard: shard.id,
                offset,
                cursor,
            });
        }

        let mut head = [0u8; block::HEADER_SIZE];
        read_exact_at(&shard.file, &mut head, offset)?;
        let class = block::peek_class(&head)?;

        if offset + class.capacity() as u64 > cursor {
            return Err(PackError::CorruptBlock(format!(
                "{} at offset {} runs past cursor {}",
                class, offset, cursor
            )));
        }
        Ok((shard, class))
    }

    fn persist_header(&self, shard: &Shard, header: &ShardHeader) -> Result<()> {
        write_all_at(&shard.file, &header.encode(), 0)?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            shard.file.sync_data()?;
        }
        Ok(())
    }

    fn load_header(file: &File, file_len: u64, path: &Path) -> Result<ShardHeader> {
        if file_len < HEADER_SIZE {
            return Err(PackError::CorruptMetadata(format!(
                "{} is {} bytes, shorter than the {}-byte header",
                path.display(),
                file_len,
                HEADER_SIZE
            )));
        }

        let mut bytes = [0u8; HEADER_SIZE as usize];
        read_exact_at(file, &mut bytes, 0)?;
        let header = ShardHeader::decode(&bytes)?;

        if header.cursor > file_len {
            return Err(PackError::CorruptMetadata(format!(
                "{}: cursor {} is past end of file ({} bytes)",
                path.display(),
                header.cursor,
                file_len
            )));
        }
        Ok(header)
    }

    /// Generate shard path given a directory and ID
    fn shard_path_with_dir(dir: &Path, id: ShardId) -> PathBuf {
        dir.join(format!("{}.{}", id, SHARD_FILE_EXTENSION))
    }

    /// Parse shard ID from filename
    /// "42.sf" → Some(42)
    fn parse_shard_id(path: &Path) -> Option<ShardId> {
        if path.extension()? != SHARD_FILE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }
}
