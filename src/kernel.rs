//! Platform arenas. On unix the heap lives where it always did, right after
//! the data segment, and grows by moving the program break:
//!
//! ```text
//! +-------------------------+
//! |   Kernel virtual memory |  | -> invisible to the user code
//! +-------------------------+
//! |          Stack          |  | grows down
//! +-------------------------+
//! |                         |
//! |                         |
//! +-------------------------+ <- program break, sbrk(0)
//! |          Heap           |  | grows up, sbrk(n)
//! +-------------------------+
//! |   Data / BSS / Text     |
//! +-------------------------+
//! ```
//!
//! Windows has no program break, so we reserve a large range of address space
//! once and commit it page by page as the arena grows.

#[cfg(unix)]
pub use self::unix::Sbrk;

#[cfg(windows)]
pub use self::windows::{DEFAULT_RESERVE, VirtualArena};

/// The arena used by the process-wide allocator on this platform.
#[cfg(unix)]
pub type SystemRegion = Sbrk;

/// The arena used by the process-wide allocator on this platform.
#[cfg(windows)]
pub type SystemRegion = VirtualArena;

#[cfg(unix)]
mod unix {
    use std::ptr::NonNull;

    use libc::{c_void, intptr_t, sbrk};

    use crate::region::{GrowError, HeapRegion};

    /// The process heap, grown with `sbrk(2)`.
    ///
    /// The program break is a process-wide resource: every `Sbrk` value talks
    /// to the same break, and so does anything else in the process that calls
    /// `brk`/`sbrk`. Blocks never assume two growths are contiguous for that
    /// reason.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Sbrk;

    impl Sbrk {
        pub const fn new() -> Self {
            Self
        }
    }

    /// `sbrk` reports failure as `(void*) -1`.
    fn check(addr: *mut c_void, requested: usize) -> Result<NonNull<u8>, GrowError> {
        if addr == usize::MAX as *mut c_void {
            return Err(GrowError::Exhausted { requested });
        }

        NonNull::new(addr.cast()).ok_or(GrowError::Exhausted { requested })
    }

    unsafe impl HeapRegion for Sbrk {
        fn boundary(&mut self) -> Result<NonNull<u8>, GrowError> {
            check(unsafe { sbrk(0) }, 0)
        }

        fn grow_by(&mut self, len: usize) -> Result<NonNull<u8>, GrowError> {
            let increment =
                intptr_t::try_from(len).map_err(|_| GrowError::TooLarge { requested: len })?;

            check(unsafe { sbrk(increment) }, len)
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{
        mem::MaybeUninit,
        os::raw::c_void,
        ptr::{self, NonNull},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use log::debug;
    use ::windows::Win32::System::{Memory, SystemInformation};

    use crate::{
        region::{GrowError, HeapRegion},
        utils::align,
    };

    /// Address space reserved by [`VirtualArena::new`].
    #[cfg(target_pointer_width = "64")]
    pub const DEFAULT_RESERVE: usize = 1 << 34;

    /// Address space reserved by [`VirtualArena::new`].
    #[cfg(not(target_pointer_width = "64"))]
    pub const DEFAULT_RESERVE: usize = 1 << 28;

    /// Cached virtual memory page size, usually 4096. Zero until first queried.
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    fn page_size() -> usize {
        match PAGE_SIZE.load(Ordering::Relaxed) {
            0 => {
                let size = unsafe {
                    let mut system_info = MaybeUninit::uninit();
                    SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                    system_info.assume_init().dwPageSize as usize
                };
                PAGE_SIZE.store(size, Ordering::Relaxed);
                size
            }
            size => size,
        }
    }

    /// A contiguous arena made of one reserved range of address space whose
    /// pages are committed on demand, the closest windows gets to `sbrk`.
    ///
    /// Nothing is reserved until the arena is first used, which lets the value
    /// be built in a `static`.
    pub struct VirtualArena {
        base: *mut u8,
        reserved: usize,
        committed: usize,
        len: usize,
    }

    // The arena exclusively owns its reservation.
    unsafe impl Send for VirtualArena {}

    impl VirtualArena {
        pub const fn new() -> Self {
            Self::with_reserve(DEFAULT_RESERVE)
        }

        /// Arena that can grow up to `reserved` bytes.
        pub const fn with_reserve(reserved: usize) -> Self {
            Self {
                base: ptr::null_mut(),
                reserved,
                committed: 0,
                len: 0,
            }
        }

        fn base(&mut self) -> Result<NonNull<u8>, GrowError> {
            if let Some(base) = NonNull::new(self.base) {
                return Ok(base);
            }

            let base = unsafe {
                Memory::VirtualAlloc(None, self.reserved, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS)
            };
            let base = NonNull::new(base.cast::<u8>()).ok_or(GrowError::Reserve)?;

            debug!("reserved {} bytes of address space at {base:p}", self.reserved);
            self.base = base.as_ptr();

            Ok(base)
        }

        fn commit(&mut self, base: NonNull<u8>, end: usize) -> Result<(), GrowError> {
            if end <= self.committed {
                return Ok(());
            }

            let target = align(end, page_size()).min(self.reserved);
            let len = target - self.committed;

            let addr = unsafe {
                Memory::VirtualAlloc(
                    Some(base.add(self.committed).as_ptr().cast::<c_void>().cast_const()),
                    len,
                    Memory::MEM_COMMIT,
                    Memory::PAGE_READWRITE,
                )
            };

            if addr.is_null() {
                return Err(GrowError::Exhausted { requested: len });
            }

            self.committed = target;

            Ok(())
        }
    }

    impl Default for VirtualArena {
        fn default() -> Self {
            Self::new()
        }
    }

    unsafe impl HeapRegion for VirtualArena {
        fn boundary(&mut self) -> Result<NonNull<u8>, GrowError> {
            let base = self.base()?;

            Ok(unsafe { base.add(self.len) })
        }

        fn grow_by(&mut self, len: usize) -> Result<NonNull<u8>, GrowError> {
            let base = self.base()?;

            if len > self.reserved - self.len {
                return Err(GrowError::Exhausted { requested: len });
            }

            let end = self.len + len;
            self.commit(base, end)?;

            let start = unsafe { base.add(self.len) };
            self.len = end;

            Ok(start)
        }
    }

    impl Drop for VirtualArena {
        fn drop(&mut self) {
            if !self.base.is_null() {
                unsafe {
                    let _ = Memory::VirtualFree(self.base.cast(), 0, Memory::MEM_RELEASE);
                }
            }
        }
    }
}
