//! Minimal writer for the SVR4 `newc` cpio format used by Linux-style
//! initramfs loaders.
//!
//! Every record is a 110 byte ASCII header followed by the NUL-terminated
//! name and the file data, each padded to a 4 byte boundary. The archive is
//! terminated by a `TRAILER!!!` record and padded to a 512 byte block.

use std::io::{self, Read, Write};

const MAGIC: &str = "070701";
const TRAILER: &str = "TRAILER!!!";
const BLOCK: u64 = 512;

/// File type bits as used in `st_mode`.
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;

/// Header fields of one archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u32,
}

impl Header {
    pub fn new(mode: u32, mtime: u32) -> Self {
        Self {
            mode,
            uid: 0,
            gid: 0,
            mtime,
        }
    }
}

pub struct CpioWriter<W: Write> {
    inner: W,
    next_ino: u32,
    offset: u64,
}

impl<W: Write> CpioWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            next_ino: 1,
            offset: 0,
        }
    }

    pub fn append_dir(&mut self, name: &str, header: Header) -> io::Result<()> {
        let mode = S_IFDIR | (header.mode & 0o7777);
        self.write_header(name, Header { mode, ..header }, 2, 0)
    }

    pub fn append_file<R: Read>(
        &mut self,
        name: &str,
        header: Header,
        size: u64,
        data: &mut R,
    ) -> io::Result<()> {
        let mode = S_IFREG | (header.mode & 0o7777);
        self.write_header(name, Header { mode, ..header }, 1, size)?;

        let copied = io::copy(&mut data.take(size), &mut self.inner)?;
        if copied != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank while archiving ({} of {} bytes)", name, copied, size),
            ));
        }
        self.offset += size;
        self.pad(4)
    }

    pub fn append_symlink(&mut self, name: &str, target: &str, header: Header) -> io::Result<()> {
        let mode = S_IFLNK | 0o777;
        let size = target.len() as u64;
        self.write_header(name, Header { mode, ..header }, 1, size)?;
        self.inner.write_all(target.as_bytes())?;
        self.offset += size;
        self.pad(4)
    }

    /// Write the trailer record and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.next_ino = 0;
        self.write_header(TRAILER, Header::new(0, 0), 1, 0)?;
        self.pad(BLOCK)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_header(&mut self, name: &str, header: Header, nlink: u32, size: u64) -> io::Result<()> {
        let size = u32::try_from(size).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is too large for a newc archive", name),
            )
        })?;
        let name_size = name.len() as u32 + 1;
        let ino = self.next_ino;
        if ino != 0 {
            self.next_ino += 1;
        }

        let fields = [
            ino,
            header.mode,
            header.uid,
            header.gid,
            nlink,
            header.mtime,
            size,
            0, // devmajor
            0, // devminor
            0, // rdevmajor
            0, // rdevminor
            name_size,
            0, // check
        ];
        let mut record = String::with_capacity(110);
        record.push_str(MAGIC);
        for field in fields {
            record.push_str(&format!("{:08X}", field));
        }

        self.inner.write_all(record.as_bytes())?;
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(&[0])?;
        self.offset += record.len() as u64 + u64::from(name_size);
        self.pad(4)
    }

    fn pad(&mut self, align: u64) -> io::Result<()> {
        let rem = self.offset % align;
        if rem != 0 {
            let padding = (align - rem) as usize;
            self.inner.write_all(&vec![0u8; padding])?;
            self.offset += padding as u64;
        }
        Ok(())
    }
}
