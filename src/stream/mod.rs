//! Stream combinators for fix subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
