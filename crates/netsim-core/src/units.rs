//! Units of simulated time, size and rate.

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
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);
            pub const MAX: $name = Self::new(u64::MAX);

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn into_u64(self) -> u64 {
                self.0
            }

            pub fn into_f64(self) -> f64 {
                self.0 as f64
            }
        }
    };
}

// Converts `$from` into `$to` by multiplying by `$factor`.
macro_rules! scaled_conversion {
    ($from: ty, $to: ty, $factor: expr) => {
        impl From<$from> for $to {
            fn from(val: $from) -> Self {
                <$to>::new(val.into_u64() * $factor)
            }
        }
    };
}

unit!(Nanosecs);

impl Nanosecs {
    /// Converts fractional seconds into nanoseconds, rounding to the nearest nanosecond.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e9).round() as u64)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Addition that saturates at [`Nanosecs::MAX`].
    pub fn saturating_add(self, other: Nanosecs) -> Nanosecs {
        Self(self.0.saturating_add(other.0))
    }
}

impl std::fmt::Display for Nanosecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

unit!(Microsecs);

impl std::fmt::Display for Microsecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}us", self.0)
    }
}

unit!(Millisecs);

impl std::fmt::Display for Millisecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

unit!(Secs);

impl std::fmt::Display for Secs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

scaled_conversion!(Microsecs, Nanosecs, 1_000);
scaled_conversion!(Millisecs, Nanosecs, 1_000_000);
scaled_conversion!(Secs, Nanosecs, 1_000_000_000);

unit!(Bytes);

impl std::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}B", self.0)
    }
}

unit!(BitsPerSec);

impl BitsPerSec {
    /// The time it takes to serialize `size` bytes at this rate.
    pub fn length(&self, size: Bytes) -> Nanosecs {
        if self.0 == 0 {
            return Nanosecs::ZERO;
        }
        let bits = size.into_f64() * 8.0;
        Nanosecs::new((bits * 1e9 / self.into_f64()).round() as u64)
    }
}

impl std::fmt::Display for BitsPerSec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

unit!(Kbps);

impl std::fmt::Display for Kbps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Kbps", self.0)
    }
}

unit!(Mbps);

impl std::fmt::Display for Mbps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Mbps", self.0)
    }
}

scaled_conversion!(Kbps, BitsPerSec, 1_000);
scaled_conversion!(Mbps, BitsPerSec, 1_000_000);
