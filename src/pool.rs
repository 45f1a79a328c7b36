//! Process-wide pool of relay buffers
//!
//! A bounded free-list of fixed-size byte buffers shared by every relay
//! pump. `get` hands out a recycled buffer or allocates a fresh one; `put`
//! returns it, discarding buffers beyond the cap. Callers must not retain a
//! buffer after returning it.

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// Size of every pooled buffer in bytes
pub const BUFFER_SIZE: usize = 4096;

/// Maximum number of idle buffers kept for reuse
const MAX_POOLED: usize = 2048;

lazy_static! {
    static ref FREE_LIST: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
}

/// Take a `BUFFER_SIZE`-byte buffer from the pool, allocating if empty.
pub fn get() -> Vec<u8> {
    FREE_LIST
        .lock()
        .pop()
        .unwrap_or_else(|| vec![0u8; BUFFER_SIZE])
}

/// Return a buffer to the pool. Buffers beyond the cap are dropped.
pub fn put(buf: Vec<u8>) {
    debug_assert_eq!(buf.len(), BUFFER_SIZE);
    let mut free = FREE_LIST.lock();
    if free.len() < MAX_POOLED {
        free.push(buf);
    }
}
