//! Stream combinators for telemetry subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
