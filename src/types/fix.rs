//! Validated position fix

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Valid latitude range in degrees.
pub const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;
/// Valid longitude range in degrees.
pub const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// Reasons a [`Fix`] cannot be constructed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("speed over ground {0} m/s is not a finite non-negative value")]
    InvalidSpeed(f64),

    #[error("course {0} outside [0, 360]")]
    InvalidCourse(f64),
}

/// Position solution quality reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FixQuality {
    /// Autonomous GNSS fix
    Gps,
    /// Differential GNSS fix
    DGps,
    /// Precise positioning service
    Pps,
    /// Real-time kinematic, fixed integers
    Rtk,
    /// Real-time kinematic, float integers
    FloatRtk,
    /// Dead reckoning
    Estimated,
    /// Manually entered position
    Manual,
    /// Simulator output
    Simulation,
}

impl FixQuality {
    /// Map the GGA quality indicator. `0` means no fix and yields `None`.
    pub fn from_gga_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FixQuality::Gps),
            2 => Some(FixQuality::DGps),
            3 => Some(FixQuality::Pps),
            4 => Some(FixQuality::Rtk),
            5 => Some(FixQuality::FloatRtk),
            6 => Some(FixQuality::Estimated),
            7 => Some(FixQuality::Manual),
            8 => Some(FixQuality::Simulation),
            _ => None,
        }
    }

    /// Map the NMEA 2.3+ mode indicator used by RMC and GLL. `N` means no fix.
    pub fn from_mode_indicator(mode: char) -> Option<Self> {
        match mode {
            'A' => Some(FixQuality::Gps),
            'D' => Some(FixQuality::DGps),
            'P' => Some(FixQuality::Pps),
            'R' => Some(FixQuality::Rtk),
            'F' => Some(FixQuality::FloatRtk),
            'E' => Some(FixQuality::Estimated),
            'M' => Some(FixQuality::Manual),
            'S' => Some(FixQuality::Simulation),
            _ => None,
        }
    }
}

/// Sentence type a fix was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FixSource {
    Gga,
    Rmc,
    Gll,
}

/// A decoded geographic position at a point in time.
///
/// Fixes can only be obtained through [`FixBuilder::build`], which checks the
/// coordinate invariants, so every `Fix` in the system has latitude in
/// [-90, 90] and longitude in [-180, 180].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    latitude: f64,
    longitude: f64,
    timestamp: DateTime<Utc>,
    quality: FixQuality,
    source: FixSource,
    speed: Option<f64>,
    course: Option<f64>,
    altitude: Option<f64>,
    satellites: Option<u8>,
    hdop: Option<f64>,
}

impl Fix {
    /// Start building a fix from its required fields.
    pub fn builder(
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
        quality: FixQuality,
        source: FixSource,
    ) -> FixBuilder {
        FixBuilder {
            fix: Fix {
                latitude,
                longitude,
                timestamp,
                quality,
                source,
                speed: None,
                course: None,
                altitude: None,
                satellites: None,
                hdop: None,
            },
        }
    }

    /// Latitude in signed decimal degrees (north positive).
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in signed decimal degrees (east positive).
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// UTC instant of the fix.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn quality(&self) -> FixQuality {
        self.quality
    }

    pub fn source(&self) -> FixSource {
        self.source
    }

    /// Speed over ground in metres per second.
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// Course over ground in degrees true.
    pub fn course(&self) -> Option<f64> {
        self.course
    }

    /// Altitude above mean sea level in metres.
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// Satellites used in the solution.
    pub fn satellites(&self) -> Option<u8> {
        self.satellites
    }

    /// Horizontal dilution of precision.
    pub fn hdop(&self) -> Option<f64> {
        self.hdop
    }
}

/// Builder that validates a [`Fix`] before handing it out.
#[derive(Debug, Clone)]
pub struct FixBuilder {
    fix: Fix,
}

impl FixBuilder {
    pub fn speed(mut self, metres_per_second: Option<f64>) -> Self {
        self.fix.speed = metres_per_second;
        self
    }

    pub fn course(mut self, degrees: Option<f64>) -> Self {
        self.fix.course = degrees;
        self
    }

    pub fn altitude(mut self, metres: Option<f64>) -> Self {
        self.fix.altitude = metres;
        self
    }

    pub fn satellites(mut self, count: Option<u8>) -> Self {
        self.fix.satellites = count;
        self
    }

    pub fn hdop(mut self, hdop: Option<f64>) -> Self {
        self.fix.hdop = hdop;
        self
    }

    /// Check the invariants and produce the fix.
    ///
    /// NaN coordinates fail the range checks like any other out-of-range value.
    pub fn build(self) -> Result<Fix, FixError> {
        let fix = self.fix;

        if !LATITUDE_RANGE.contains(&fix.latitude) {
            return Err(FixError::LatitudeOutOfRange(fix.latitude));
        }
        if !LONGITUDE_RANGE.contains(&fix.longitude) {
            return Err(FixError::LongitudeOutOfRange(fix.longitude));
        }
        if let Some(speed) = fix.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(FixError::InvalidSpeed(speed));
            }
        }
        if let Some(course) = fix.course {
            if !(0.0..=360.0).contains(&course) {
                return Err(FixError::InvalidCourse(course));
            }
        }

        Ok(fix)
    }
}
