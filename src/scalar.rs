use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

pub trait Scalar:
    Copy
    + PartialOrd
    + PartialEq
    + Debug
    + Display
    + FromStr
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;

    fn from_i32(value: i32) -> Self {
        Self::from_f64(value as f64)
    }

    fn abs(self) -> Self {
        if self < Self::ZERO {
            -self
        } else {
            self
        }
    }

    fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    // Mixed arithmetic with a float factor: convert out, multiply, truncate back.
    fn scale(self, factor: f64) -> Self {
        Self::from_f64(self.to_f64() * factor)
    }
}

// Converts between the pressure, velocity and velocity-flow roles at the
// arithmetic seams where the engine mixes them.
pub fn cvt<A: Scalar, B: Scalar>(value: A) -> B {
    B::from_f64(value.to_f64())
}

impl Scalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn abs(self) -> Self {
        f32::abs(self)
    }
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }
}
