use std::ops::{Add, AddAssign, Sub, SubAssign};

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
            pub const MAX: $name = Self::new(u128::MAX);

            pub const fn new(value: u128) -> Self {
                Self(value)
            }

            pub const fn into_u128(self) -> u128 {
                self.0
            }

            /// Converts a duration in seconds to nanosecond resolution.
            pub fn from_secs_f64(secs: f64) -> Self {
                assert!(secs.is_finite() && secs >= 0.0, "invalid time: {secs}");
                Self((secs * 1e9).round() as u128)
            }

            pub fn as_secs_f64(self) -> f64 {
                self.0 as f64 / 1e9
            }
        }
    };
}

time_unit!(Time);

impl Time {
    pub const fn into_delta(self) -> Delta {
        Delta::new(self.0)
    }
}

time_unit!(Delta);

impl Delta {
    pub const fn into_time(self) -> Time {
        Time::new(self.0)
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

impl Sub<Delta> for Time {
    type Output = Time;

    fn sub(self, rhs: Delta) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Sub<Time> for Time {
    type Output = Delta;

    fn sub(self, rhs: Time) -> Self::Output {
        Delta::new(self.0 - rhs.0)
    }
}

impl AddAssign<Delta> for Time {
    fn add_assign(&mut self, rhs: Delta) {
        *self = Self(self.0 + rhs.0)
    }
}

impl SubAssign<Delta> for Time {
    fn sub_assign(&mut self, rhs: Delta) {
        *self = Self(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_round_trip() {
        let t = Time::from_secs_f64(0.04);
        assert_eq!(t, Time::new(40_000_000));
        assert!((t.as_secs_f64() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn add_delta() {
        let t = Time::from_secs_f64(1.0) + Delta::from_secs_f64(0.5);
        assert_eq!(t, Time::from_secs_f64(1.5));
    }
}
