//! Exponent Bookkeeper (§4.2): a per-bag atomic max of `ilogb(value)` over
//! every positive value written during a launch, used to derive the
//! correction factor `2^exponent` applied at the next level up.

use portable_atomic::{AtomicI64, Ordering};

/// `ilogb` for positive, finite `f64`: the unbiased IEEE-754 exponent.
/// Matches C's `ilogb` for normal numbers, which is all this engine ever
/// observes (values are sums of positive weight products, never subnormal
/// in practice at the magnitudes this domain produces).
fn ilogb(value: f64) -> i64 {
    let bits = value.to_bits();
    ((bits >> 52) & 0x7ff) as i64 - 1023
}

pub struct ExponentBookkeeper(AtomicI64);

impl ExponentBookkeeper {
    /// `i64::MIN` is the "nothing observed yet" sentinel; `correction()`
    /// treats it as exponent 0 so an empty bag doesn't scale its (empty)
    /// table by some enormous factor.
    pub fn new() -> Self {
        Self(AtomicI64::new(i64::MIN))
    }

    pub fn observe(&self, value: f64) {
        if value <= 0.0 {
            return;
        }
        let e = ilogb(value);
        let mut current = self.0.load(Ordering::Acquire);
        while e > current {
            match self.0.compare_exchange_weak(current, e, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn exponent(&self) -> i64 {
        let e = self.0.load(Ordering::Acquire);
        if e == i64::MIN {
            0
        } else {
            e
        }
    }

    /// The scale factor the next level up should divide its raw sums by.
    pub fn correction(&self) -> f64 {
        2f64.powi(self.exponent() as i32)
    }
}

impl Default for ExponentBookkeeper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bookkeeper_has_zero_correction() {
        let book = ExponentBookkeeper::new();
        assert_eq!(book.correction(), 1.0);
    }

    #[test]
    fn observe_tracks_the_maximum_exponent() {
        let book = ExponentBookkeeper::new();
        book.observe(3.0); // exponent 1
        book.observe(1024.0); // exponent 10
        book.observe(2.0); // exponent 1, should not lower the max
        assert_eq!(book.exponent(), 10);
        assert_eq!(book.correction(), 1024.0);
    }

    #[test]
    fn non_positive_values_are_ignored() {
        let book = ExponentBookkeeper::new();
        book.observe(0.0);
        book.observe(-5.0);
        assert_eq!(book.correction(), 1.0);
    }
}
