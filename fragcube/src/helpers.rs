use std::fmt::Debug;

use num_traits::{one, zero, Num, PrimInt};

/// Returns m / n rounded up to the nearest integer
///
pub fn div_ceil<T>(m: T, n: T) -> T
where
    T: PrimInt,
{
    let a = m / n;
    if m % n > zero() {
        a + one()
    } else {
        a
    }
}

/// Make sure bounds are ordered correctly, eg upper is actually above lower.
///
pub fn rearrange<N>(lower: N, upper: N) -> (N, N)
where
    N: Num + Debug + PartialOrd,
{
    if lower > upper {
        (upper, lower)
    } else {
        (lower, upper)
    }
}
