//! Core value types shared across the pipeline.
//!
//! - [`Fix`] is the validated output of the decoder, built through [`FixBuilder`]
//! - [`LineSettings`] describes the serial framing a session configures
//! - [`UpdateRate`] controls how often subscribers see fixes
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use gpsrelay::types::{Fix, FixQuality, FixSource};
//!
//! let when = Utc.with_ymd_and_hms(2024, 3, 23, 12, 35, 19).unwrap();
//! let fix = Fix::builder(48.1173, 11.5167, when, FixQuality::Gps, FixSource::Gga)
//!     .altitude(Some(545.4))
//!     .build()
//!     .expect("coordinates in range");
//! assert_eq!(fix.altitude(), Some(545.4));
//!
//! assert!(Fix::builder(91.0, 0.0, when, FixQuality::Gps, FixSource::Gga).build().is_err());
//! ```

mod fix;
mod line;
mod update_rate;

pub use fix::{Fix, FixBuilder, FixError, FixQuality, FixSource, LATITUDE_RANGE, LONGITUDE_RANGE};
pub use line::{DataBits, LineSettings, Parity, StopBits};
pub use update_rate::UpdateRate;
