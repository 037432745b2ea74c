use crate::scalar::Scalar;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

// Binary fixed point: the raw integer holds value * 2^K. N is the nominal
// bit width of the type tag; the backing integer is chosen per family.
// Products are formed in the backing integer without widening, so
// callers pick N large enough that intermediates fit. Overflow wraps.
macro_rules! define_fixed {
    ($name:ident, $int:ty) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name<const N: usize, const K: usize> {
            raw: $int,
        }

        impl<const N: usize, const K: usize> $name<N, K> {
            pub const fn from_raw(raw: $int) -> Self {
                Self { raw }
            }

            pub const fn raw(self) -> $int {
                self.raw
            }
        }

        impl<const N: usize, const K: usize> Add for $name<N, K> {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self::from_raw(self.raw.wrapping_add(rhs.raw))
            }
        }

        impl<const N: usize, const K: usize> Sub for $name<N, K> {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self::from_raw(self.raw.wrapping_sub(rhs.raw))
            }
        }

        impl<const N: usize, const K: usize> Mul for $name<N, K> {
            type Output = Self;

            fn mul(self, rhs: Self) -> Self {
                Self::from_raw(self.raw.wrapping_mul(rhs.raw) >> K)
            }
        }

        impl<const N: usize, const K: usize> Div for $name<N, K> {
            type Output = Self;

            fn div(self, rhs: Self) -> Self {
                Self::from_raw(self.raw.wrapping_shl(K as u32) / rhs.raw)
            }
        }

        impl<const N: usize, const K: usize> Neg for $name<N, K> {
            type Output = Self;

            fn neg(self) -> Self {
                Self::from_raw(self.raw.wrapping_neg())
            }
        }

        impl<const N: usize, const K: usize> fmt::Display for $name<N, K> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_f64())
            }
        }

        impl<const N: usize, const K: usize> FromStr for $name<N, K> {
            type Err = std::num::ParseFloatError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::from_f64(s.parse::<f64>()?))
            }
        }

        impl<const N: usize, const K: usize> Scalar for $name<N, K> {
            const ZERO: Self = Self { raw: 0 };
            const ONE: Self = Self { raw: (1 as $int) << K };

            fn from_f64(value: f64) -> Self {
                Self::from_raw((value * (1u64 << K) as f64) as $int)
            }

            fn to_f64(self) -> f64 {
                self.raw as f64 / (1u64 << K) as f64
            }
        }
    };
}

define_fixed!(Fixed, i64);
define_fixed!(FastFixed, i32);
