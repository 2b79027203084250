//! Exclusive lock over the shared rootfs cache directory.
//!
//! All architectures of one run share a single cache directory. The lock
//! keeps a second run against the same working directory from writing to it
//! at the same time. It is an OS advisory lock (`flock` on Unix,
//! `LockFileEx` on Windows) on the `.lock` file, so it is released when the
//! [`CacheLock`] is dropped or the process dies. The file itself stays in
//! place; its JSON contents only name the current holder for the
//! contention message.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
    pub pid: u32,
    pub started_at_unix: u64,
    pub cache: PathBuf,
}

#[derive(Debug)]
pub struct CacheLock {
    file: File,
    lock_path: PathBuf,
}

impl CacheLock {
    /// Acquire the lock for `cache_dir`, creating the directory if needed.
    ///
    /// Fails with [`Error::CacheLocked`] if another handle holds it. A lock
    /// file left behind by a dead process does not block.
    pub fn acquire(cache_dir: &Path) -> Result<Self> {
        fs::create_dir_all(cache_dir)?;
        let lock_path = cache_dir.join(LOCK_FILENAME);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if let Err(e) = try_lock_exclusive(&file) {
            if e.kind() == io::ErrorKind::WouldBlock {
                let pid = read_metadata(&lock_path).map(|m| m.pid).unwrap_or(0);
                return Err(Error::CacheLocked {
                    path: lock_path,
                    pid,
                });
            }
            return Err(Error::Io(e));
        }

        write_metadata(&file, cache_dir)?;

        debug!("Acquired rootfs cache lock {}", lock_path.display());
        Ok(Self { file, lock_path })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Metadata as written by this holder, read through the held handle.
    pub fn metadata(&self) -> Result<LockMetadata> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        // Closing the handle releases the OS lock.
        debug!("Released rootfs cache lock {}", self.lock_path.display());
    }
}

fn write_metadata(file: &File, cache_dir: &Path) -> Result<()> {
    let metadata = LockMetadata {
        pid: std::process::id(),
        started_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        cache: cache_dir.to_path_buf(),
    };

    file.set_len(0)?;
    let mut writer = io::BufWriter::new(file);
    writer.seek(SeekFrom::Start(0))?;
    serde_json::to_writer_pretty(&mut writer, &metadata)?;
    writer.flush()?;
    Ok(())
}

/// Read the metadata of an existing lock file.
pub fn read_metadata(lock_path: &Path) -> Result<LockMetadata> {
    let contents = fs::read_to_string(lock_path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use rustix::fs::{flock, FlockOperation};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };

    let handle = file.as_raw_handle() as HANDLE;

    // SAFETY: OVERLAPPED is plain data and valid when zeroed; the handle is
    // owned by `file` and open for the duration of the call.
    let result = unsafe {
        let mut overlapped = std::mem::zeroed();
        LockFileEx(
            handle,
            LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
            0,
            1,
            0,
            &mut overlapped,
        )
    };

    if result != 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
        return Err(io::Error::from(io::ErrorKind::WouldBlock));
    }
    Err(err)
}
