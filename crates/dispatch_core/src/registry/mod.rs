//! Controller-side bookkeeping: the pending request queue and the partition of
//! subscribed drivers into available and busy.

mod drivers;
mod requests;

pub use drivers::{DriverInfo, DriverRecord, DriverRegistry};
pub use requests::RequestQueue;
