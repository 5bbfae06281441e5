use std::time::Instant;

#[inline]
pub fn now_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// Logistic function, written to stay finite for large |x|.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
