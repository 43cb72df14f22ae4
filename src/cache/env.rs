//! Page I/O & memory map: owns the memory-mapped cache file, the meta-page
//! selection, and the writer lock (spec.md §4.5, "Open/close").

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use memmap2::Mmap;

use crate::cache::meta::{select_live, Meta};
use crate::cache::page::{PageView, Pgno, PAGE_SIZE};
use crate::error::{EngineError, EngineResult};

/// Default reservation for the memory map. The file is preallocated
/// (sparse) to this size on creation so that page allocation never has to
/// re-`mmap`; `last_pgno` tracks how much of it is actually in use, exactly
/// as a real LMDB-family store does.
pub const DEFAULT_MAPSIZE: u64 = 1 << 30; // 1 GiB

#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
    pub create: bool,
    /// Use an intra-process mutex for the writer lock instead of an
    /// inter-process advisory file lock (spec.md §4.5, "Open/close").
    pub intraprocess_lock: bool,
    pub mapsize: u64,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self { create: true, intraprocess_lock: true, mapsize: DEFAULT_MAPSIZE }
    }
}

enum WriterLock {
    Intraprocess(Mutex<()>),
    #[cfg(unix)]
    Interprocess(File),
}

pub enum WriterGuard<'a> {
    Intraprocess(MutexGuard<'a, ()>),
    #[cfg(unix)]
    Interprocess(&'a File),
}

#[cfg(unix)]
impl<'a> Drop for WriterGuard<'a> {
    fn drop(&mut self) {
        if let WriterGuard::Interprocess(file) = self {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

pub struct Env {
    path: PathBuf,
    file: Mutex<File>,
    map: Mmap,
    mapsize: u64,
    writer_lock: WriterLock,
    live: RwLock<(usize, Meta)>,
    next_txnid: AtomicU64,
}

impl Env {
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();
        if !exists && !flags.create {
            return Err(EngineError::NotFound(path));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(flags.create)
            .open(&path)
            .map_err(|e| EngineError::io(&path, e))?;

        let len = file.metadata().map_err(|e| EngineError::io(&path, e))?.len();
        if len < flags.mapsize {
            file.set_len(flags.mapsize).map_err(|e| EngineError::io(&path, e))?;
        }
        let mapsize = flags.mapsize.max(len);

        if len == 0 {
            Self::init_fresh(&file, &path)?;
        }

        let map = unsafe { Mmap::map(&file).map_err(|e| EngineError::io(&path, e))? };

        let meta0 = Meta::from_bytes(&map[0..PAGE_SIZE]);
        let meta1 = Meta::from_bytes(&map[PAGE_SIZE..2 * PAGE_SIZE]);
        let live = select_live(meta0, meta1)?;

        let writer_lock = if flags.intraprocess_lock {
            WriterLock::Intraprocess(Mutex::new(()))
        } else {
            #[cfg(unix)]
            {
                let lock_file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .map_err(|e| EngineError::io(&path, e))?;
                WriterLock::Interprocess(lock_file)
            }
            #[cfg(not(unix))]
            {
                WriterLock::Intraprocess(Mutex::new(()))
            }
        };

        Ok(Self {
            path,
            file: Mutex::new(file),
            map,
            mapsize,
            writer_lock,
            live: RwLock::new(live),
            next_txnid: AtomicU64::new(live.1.txnid + 1),
        })
    }

    fn init_fresh(file: &File, path: &Path) -> EngineResult<()> {
        let meta0 = Meta::fresh(0).to_bytes();
        let meta1 = Meta::fresh(1).to_bytes();
        use std::io::{Seek, SeekFrom, Write};
        let mut f = file.try_clone().map_err(|e| EngineError::io(path, e))?;
        f.seek(SeekFrom::Start(0)).map_err(|e| EngineError::io(path, e))?;
        f.write_all(&meta0).map_err(|e| EngineError::io(path, e))?;
        f.write_all(&meta1).map_err(|e| EngineError::io(path, e))?;
        f.sync_all().map_err(|e| EngineError::io(path, e))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn live_meta(&self) -> Meta {
        self.live.read().unwrap().1
    }

    fn live_index(&self) -> usize {
        self.live.read().unwrap().0
    }

    pub fn next_txnid(&self) -> u64 {
        self.next_txnid.load(Ordering::SeqCst)
    }

    /// Borrows the page at `pgno` directly from the memory map. Valid for
    /// the lifetime of the `Env` (callers must not outlive the transaction
    /// that produced the pgno, per spec.md's page-pointer lifetime rules).
    pub fn page_at(&self, pgno: Pgno) -> PageView<'_> {
        let off = pgno as usize * PAGE_SIZE;
        PageView::new(&self.map[off..off + PAGE_SIZE])
    }

    pub fn mapsize(&self) -> u64 {
        self.mapsize
    }

    pub fn acquire_writer(&self) -> WriterGuard<'_> {
        match &self.writer_lock {
            WriterLock::Intraprocess(m) => WriterGuard::Intraprocess(m.lock().unwrap()),
            #[cfg(unix)]
            WriterLock::Interprocess(file) => {
                use std::os::unix::io::AsRawFd;
                unsafe {
                    libc::flock(file.as_raw_fd(), libc::LOCK_EX);
                }
                WriterGuard::Interprocess(file)
            }
        }
    }

    /// Writes `pages` (new_pgno -> page bytes) to their file offsets, then
    /// writes the new meta page and atomically flips `live` to it (spec.md
    /// §4.5, "Commit").
    pub fn commit(
        &self,
        pages: impl Iterator<Item = (Pgno, [u8; PAGE_SIZE])>,
        new_meta: Meta,
    ) -> EngineResult<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = self.file.lock().unwrap();

        for (pgno, bytes) in pages {
            let off = pgno as u64 * PAGE_SIZE as u64;
            file.seek(SeekFrom::Start(off)).map_err(|e| EngineError::io(&self.path, e))?;
            file.write_all(&bytes).map_err(|e| EngineError::io(&self.path, e))?;
        }
        file.sync_data().map_err(|e| EngineError::io(&self.path, e))?;

        let next_index = 1 - self.live_index();
        let meta_off = next_index as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(meta_off)).map_err(|e| EngineError::io(&self.path, e))?;
        file.write_all(&new_meta.to_bytes()).map_err(|e| EngineError::io(&self.path, e))?;
        file.sync_data().map_err(|e| EngineError::io(&self.path, e))?;

        *self.live.write().unwrap() = (next_index, new_meta);
        self.next_txnid.store(new_meta.txnid + 1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_env() -> (NamedTempFile, Env) {
        let file = NamedTempFile::new().unwrap();
        let flags = OpenFlags { mapsize: 4 * 1024 * 1024, ..OpenFlags::default() };
        let env = Env::open(file.path(), flags).unwrap();
        (file, env)
    }

    #[test]
    fn fresh_file_has_empty_tree_and_live_meta1() {
        let (_f, env) = temp_env();
        let meta = env.live_meta();
        assert_eq!(meta.root_pgno, 0);
        assert_eq!(meta.txnid, 1);
    }

    #[test]
    fn reopen_sees_committed_state() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let flags = OpenFlags { mapsize: 4 * 1024 * 1024, ..OpenFlags::default() };
        {
            let env = Env::open(&path, flags).unwrap();
            let mut page = [0u8; PAGE_SIZE];
            crate::cache::page::PageViewMut::new(&mut page)
                .init_empty(crate::cache::page::PageKind::Leaf);
            let new_meta = Meta {
                txnid: env.live_meta().txnid + 1,
                root_pgno: 2,
                last_pgno: 2,
                ..env.live_meta()
            };
            env.commit(std::iter::once((2u64, page)), new_meta).unwrap();
        }
        let env = Env::open(&path, flags).unwrap();
        assert_eq!(env.live_meta().root_pgno, 2);
        assert_eq!(env.live_meta().txnid, 2);
    }
}
