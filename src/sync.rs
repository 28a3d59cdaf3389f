use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, taking the data even if another thread panicked with it held.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
