#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::sync::{
        Condvar, Mutex, MutexGuard, RwLock,
        atomic::{AtomicBool, Ordering},
    };
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::sync::{
        Condvar, Mutex, MutexGuard, RwLock,
        atomic::{AtomicBool, Ordering},
    };
}

pub(crate) use imp::*;
