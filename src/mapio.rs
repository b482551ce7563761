//! Thin facade over the OS-facing I/O primitives used by the scanner:
//! positioned reads, page-aligned memory maps, and kernel access-pattern
//! advice.
//!
//! All advice calls (`posix_fadvise`, `madvise`, `mlock`) are best-effort:
//! failures never affect correctness, only paging behavior, so they are
//! reported to the caller at most as a boolean. Non-Unix builds compile the
//! advice away entirely.

use std::fs::File;
use std::io;

use memmap2::{Mmap, MmapOptions};

/// System page size in bytes.
pub fn page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no memory-safety preconditions.
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            return sz as u64;
        }
    }
    4096
}

/// Maps `len` bytes of `file` starting at `offset` for reading.
///
/// `offset` must be a multiple of the system page size.
pub fn map_window(file: &File, offset: u64, len: usize) -> io::Result<Mmap> {
    // SAFETY: the query file is opened read-only and treated as immutable
    // for the lifetime of the run; the mapping is never outlived by slices
    // taken from it (the scanner drops all borrows before unmapping).
    unsafe { MmapOptions::new().offset(offset).len(len).map(file) }
}

/// Advises the kernel that `map` will be read sequentially and soon.
#[cfg(unix)]
pub fn advise_map(map: &Mmap) {
    // SAFETY: pointer and length describe the live mapping; madvise is
    // advisory only.
    unsafe {
        let _ = libc::madvise(
            map.as_ptr() as *mut libc::c_void,
            map.len(),
            libc::MADV_SEQUENTIAL,
        );
        let _ = libc::madvise(
            map.as_ptr() as *mut libc::c_void,
            map.len(),
            libc::MADV_WILLNEED,
        );
    }
}

#[cfg(not(unix))]
pub fn advise_map(_map: &Mmap) {}

/// Advises the kernel of an imminent sequential read of a file range, with
/// no intent to revisit the pages.
#[cfg(target_os = "linux")]
pub fn advise_file_range(file: &File, offset: u64, len: u64) {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the fd is valid for the duration of the call; fadvise is
    // advisory only.
    unsafe {
        let fd = file.as_raw_fd();
        let off = offset as libc::off_t;
        let len = len as libc::off_t;
        let _ = libc::posix_fadvise(fd, off, len, libc::POSIX_FADV_SEQUENTIAL);
        let _ = libc::posix_fadvise(fd, off, len, libc::POSIX_FADV_WILLNEED);
        let _ = libc::posix_fadvise(fd, off, len, libc::POSIX_FADV_NOREUSE);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn advise_file_range(_file: &File, _offset: u64, _len: u64) {}

/// Attempts to pin the mapping in memory. Returns whether the lock was
/// granted; refusal (e.g. RLIMIT_MEMLOCK) is not an error.
#[cfg(unix)]
pub fn lock_map(map: &Mmap) -> bool {
    // SAFETY: pointer and length describe the live mapping.
    unsafe { libc::mlock(map.as_ptr() as *const libc::c_void, map.len()) == 0 }
}

#[cfg(not(unix))]
pub fn lock_map(_map: &Mmap) -> bool {
    true
}

/// Reads exactly `buf.len()` bytes at `offset` without moving any cursor.
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(buf, offset)
    }
    #[cfg(not(unix))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut f = file;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)
    }
}
