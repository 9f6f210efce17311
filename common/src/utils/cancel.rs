use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Externally owned cancellation handle. Long operations check it at
/// their natural boundaries (between ring member fetches, before each
/// proof verification, every hash batch).
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
