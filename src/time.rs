use std::ops::{Add, AddAssign, Sub};

const NANOS_PER_SEC: f64 = 1e9;

macro_rules! time_unit {
    ($name: ident) => {
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            Hash,
            derive_more::Add,
            derive_more::Display,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u128);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);

            pub const fn new(value: u128) -> Self {
                Self(value)
            }

            pub const fn into_u128(self) -> u128 {
                self.0
            }

            pub const fn into_f64(self) -> f64 {
                self.0 as f64
            }

            /// Converts a (non-negative) number of seconds, rounding to the nearest nanosecond.
            /// Negative inputs saturate to zero.
            pub fn from_secs_f64(secs: f64) -> Self {
                Self((secs * NANOS_PER_SEC).round().max(0.0) as u128)
            }

            pub fn into_secs_f64(self) -> f64 {
                self.0 as f64 / NANOS_PER_SEC
            }
        }
    };
}

time_unit!(Time);

impl Time {
    pub const fn into_delta(self) -> Delta {
        Delta::new(self.0)
    }

    pub fn saturating_sub(self, rhs: Time) -> Delta {
        Delta::new(self.0.saturating_sub(rhs.0))
    }
}

time_unit!(Delta);

impl Delta {
    pub const fn into_time(self) -> Time {
        Time::new(self.0)
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self::new(nanos as u128)
    }

    /// Multiplies the delta by an integer factor, e.g. to compute the `k`-th tick of a cadence.
    pub const fn times(self, k: u128) -> Self {
        Self::new(self.0 * k)
    }
}

impl From<u128> for Time {
    fn from(val: u128) -> Self {
        Self(val)
    }
}

impl Add<Delta> for Time {
    type Output = Time;

    fn add(self, rhs: Delta) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub<Time> for Time {
    type Output = Delta;

    fn sub(self, rhs: Time) -> Self::Output {
        Delta::new(self.0 - rhs.0)
    }
}

impl Sub<Delta> for Delta {
    type Output = Delta;

    fn sub(self, rhs: Delta) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign<Delta> for Time {
    fn add_assign(&mut self, rhs: Delta) {
        *self = Self(self.0 + rhs.0)
    }
}
