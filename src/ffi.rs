//! C entry points, so the crate can stand in for the platform `malloc` family
//! when linked into a C program (cargo feature `c-abi`).

use libc::{c_void, size_t};

use crate::BrkAlloc;

static HEAP: BrkAlloc = BrkAlloc::new();

#[unsafe(no_mangle)]
pub extern "C" fn malloc(size: size_t) -> *mut c_void {
    HEAP.allocate(size).cast()
}

#[unsafe(no_mangle)]
pub extern "C" fn calloc(num: size_t, size: size_t) -> *mut c_void {
    HEAP.zero_allocate(num, size).cast()
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void {
    unsafe { HEAP.resize(ptr.cast(), size).cast() }
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    unsafe { HEAP.release(ptr.cast()) }
}
