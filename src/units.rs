use std::{fmt, str::FromStr};

use crate::time::Delta;

macro_rules! unit {
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
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::Display,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn into_u64(self) -> u64 {
                self.0
            }

            pub const fn into_f64(self) -> f64 {
                self.0 as f64
            }

            pub const fn into_usize(self) -> usize {
                self.0 as usize
            }

            pub const fn saturating_sub(self, rhs: Self) -> Self {
                Self::new(self.0.saturating_sub(rhs.0))
            }
        }
    };
}

unit!(Bits);
unit!(Bytes);

impl Bytes {
    pub fn into_bits(self) -> Bits {
        Bits::new(self.0 * 8)
    }
}

impl From<Bytes> for Bits {
    fn from(val: Bytes) -> Self {
        val.into_bits()
    }
}

unit!(BitsPerSec);

impl BitsPerSec {
    /// Converts a fractional rate, rounding to the nearest bit per second. The result is never
    /// below one bit per second, since a zero rate has no finite serialization time.
    pub fn from_f64(bps: f64) -> Self {
        Self(bps.round().max(1.0) as u64)
    }

    /// The time needed to push `size` bytes at this rate.
    pub fn length(&self, size: Bytes) -> Delta {
        assert!(*self != BitsPerSec::ZERO);
        if size == Bytes::ZERO {
            return Delta::ZERO;
        }
        let bits = size.into_bits().into_f64();
        let bps = self.into_f64();
        let delta = (bits * 1e9) / bps;
        Delta::new(delta.round() as u128)
    }
}

/// The unit in which capacities, demand volumes and path rates are expressed before they are
/// turned into device and generator rates.
///
/// Suffixes follow the ns-3 `DataRate` conventions: lowercase `b` counts bits, uppercase `B`
/// counts bytes, and prefixes are decimal.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, derivative::Derivative, serde::Serialize, serde::Deserialize,
)]
#[derivative(Default)]
pub enum FlowUnit {
    #[derivative(Default)]
    Bps,
    Kbps,
    Mbps,
    Gbps,
    BytesPerSec,
    KBytesPerSec,
    MBytesPerSec,
    GBytesPerSec,
}

impl FlowUnit {
    pub const fn bits_per_sec(self) -> f64 {
        match self {
            FlowUnit::Bps => 1.0,
            FlowUnit::Kbps => 1e3,
            FlowUnit::Mbps => 1e6,
            FlowUnit::Gbps => 1e9,
            FlowUnit::BytesPerSec => 8.0,
            FlowUnit::KBytesPerSec => 8e3,
            FlowUnit::MBytesPerSec => 8e6,
            FlowUnit::GBytesPerSec => 8e9,
        }
    }

    /// Converts `value`, expressed in this unit, to a device or generator rate.
    pub fn to_rate(self, value: f64) -> BitsPerSec {
        BitsPerSec::from_f64(value * self.bits_per_sec())
    }

    fn suffix(self) -> &'static str {
        match self {
            FlowUnit::Bps => "bps",
            FlowUnit::Kbps => "kbps",
            FlowUnit::Mbps => "Mbps",
            FlowUnit::Gbps => "Gbps",
            FlowUnit::BytesPerSec => "Bps",
            FlowUnit::KBytesPerSec => "KBps",
            FlowUnit::MBytesPerSec => "MBps",
            FlowUnit::GBytesPerSec => "GBps",
        }
    }
}

impl fmt::Display for FlowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown flow unit `{0}`")]
pub struct UnknownFlowUnit(pub String);

impl FromStr for FlowUnit {
    type Err = UnknownFlowUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s {
            "bps" | "b/s" => FlowUnit::Bps,
            "kbps" | "Kbps" | "kb/s" | "Kb/s" => FlowUnit::Kbps,
            "Mbps" | "mbps" | "Mb/s" => FlowUnit::Mbps,
            "Gbps" | "gbps" | "Gb/s" => FlowUnit::Gbps,
            "Bps" | "B/s" => FlowUnit::BytesPerSec,
            "KBps" | "kBps" | "KB/s" => FlowUnit::KBytesPerSec,
            "MBps" | "MB/s" => FlowUnit::MBytesPerSec,
            "GBps" | "GB/s" => FlowUnit::GBytesPerSec,
            other => return Err(UnknownFlowUnit(other.to_owned())),
        };
        Ok(unit)
    }
}
