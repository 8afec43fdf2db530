//! Cheap copyable identifiers used across the dispatch layer.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(
    /// A trip request. Unique for the lifetime of a run.
    RequestId,
    u64,
    "req"
);
define_id!(RiderId, u64, "rider");
define_id!(
    /// A vehicle agent. Drivers subscribe to one or more controllers under this id.
    DriverId,
    u32,
    "driver"
);
define_id!(ControllerId, u32, "ctrl");
define_id!(ParkingId, u32, "parking");
