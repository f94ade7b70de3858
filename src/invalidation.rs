//! Invalidation flags
//!
//! The presenter keeps its own `Invalidations` set. Producers raise bits in a
//! `SharedInvalidations` word; the presenter takes that word exactly once per
//! frame and merges it, so a raised bit survives until its refresh step runs.

use std::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Invalidations: u8 {
        /// The cursor tile in atlas slot 0 is stale
        const CURSOR = 1 << 0;
        /// The constant buffer is stale
        const CONST_BUFFER = 1 << 1;
    }
}

/// Single machine word shared between the producer and the presenter.
#[derive(Debug, Default)]
pub struct SharedInvalidations(AtomicU8);

impl SharedInvalidations {
    pub fn raise(&self, flags: Invalidations) {
        self.0.fetch_or(flags.bits(), Ordering::Release);
    }

    /// Take every raised bit, leaving the word empty.
    pub fn take(&self) -> Invalidations {
        Invalidations::from_bits_truncate(self.0.swap(0, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_clears() {
        let shared = SharedInvalidations::default();
        shared.raise(Invalidations::CURSOR);
        shared.raise(Invalidations::CONST_BUFFER);
        assert_eq!(
            shared.take(),
            Invalidations::CURSOR | Invalidations::CONST_BUFFER
        );
        assert!(shared.take().is_empty());
    }

    #[test]
    fn test_concurrent_raise_is_never_lost() {
        let shared = Arc::new(SharedInvalidations::default());
        let mut seen = Invalidations::empty();
        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 0..1000 {
                    let flag = if i % 2 == 0 {
                        Invalidations::CURSOR
                    } else {
                        Invalidations::CONST_BUFFER
                    };
                    shared.raise(flag);
                }
            })
        };
        for _ in 0..100 {
            seen |= shared.take();
        }
        producer.join().unwrap();
        seen |= shared.take();
        assert_eq!(seen, Invalidations::CURSOR | Invalidations::CONST_BUFFER);
    }
}
