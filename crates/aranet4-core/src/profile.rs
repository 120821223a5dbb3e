//! Characteristic registry.
//!
//! The Aranet4 firmware changed its GATT surface over time: the custom
//! service UUID moved in v1.2.0 and the earliest releases only expose the
//! simple current-reading characteristic. A [`CapabilityProfile`] is resolved
//! once per session from the software revision string and pins down every
//! characteristic UUID and byte layout the session may use.
//!
//! Resolution never guesses: a revision that maps to no known layout is
//! rejected with [`Error::UnsupportedFirmware`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use aranet4_types::CurrentLayout;
use aranet4_types::uuid::{
    BATTERY_LEVEL, CURRENT_READING_FULL, CURRENT_READING_SIMPLE, DEVICE_NAME, HARDWARE_REVISION,
    HISTORY_COMMAND, HISTORY_DATA, MANUFACTURER_NAME, MODEL_NUMBER, SAF_TEHNIKA_SERVICE_NEW,
    SAF_TEHNIKA_SERVICE_OLD, SECONDS_SINCE_UPDATE, SERIAL_NUMBER, SOFTWARE_REVISION,
    STORED_READINGS, UPDATE_INTERVAL,
};

use crate::error::{Error, Result};

/// A parsed firmware version such as `v1.4.19`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl FirmwareVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for FirmwareVersion {
    type Err = Error;

    /// Accepts an optional `v` prefix, trailing NUL padding, and two or three
    /// dot-separated numeric components.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_end_matches('\0').trim();
        let digits = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parts = digits
            .split('.')
            .map(|p| p.parse::<u16>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::unsupported_firmware(s, "unparseable revision"))?;

        match parts.as_slice() {
            [major, minor] => Ok(Self::new(*major, *minor, 0)),
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(Error::unsupported_firmware(s, "unparseable revision")),
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Known GATT layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileKind {
    /// Before v0.4.0: simple current reading only, original service UUID.
    Legacy,
    /// v0.4.0 up to v1.2.0: full and simple readings, original service UUID.
    Classic,
    /// v1.2.0 up to v2.0.0: full and simple readings, new service UUID.
    Modern,
}

impl ProfileKind {
    /// Map a firmware version to its layout, if one is known.
    pub fn for_version(version: FirmwareVersion) -> Option<Self> {
        const CLASSIC: FirmwareVersion = FirmwareVersion::new(0, 4, 0);
        const MODERN: FirmwareVersion = FirmwareVersion::new(1, 2, 0);
        const NEXT_MAJOR: FirmwareVersion = FirmwareVersion::new(2, 0, 0);

        match version {
            v if v < CLASSIC => Some(ProfileKind::Legacy),
            v if v < MODERN => Some(ProfileKind::Classic),
            v if v < NEXT_MAJOR => Some(ProfileKind::Modern),
            _ => None,
        }
    }
}

/// Device information characteristics read once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityCharacteristics {
    pub manufacturer: Uuid,
    pub model: Uuid,
    pub name: Uuid,
    pub serial: Uuid,
    pub hardware_revision: Uuid,
    pub software_revision: Uuid,
}

impl Default for IdentityCharacteristics {
    fn default() -> Self {
        Self {
            manufacturer: MANUFACTURER_NAME,
            model: MODEL_NUMBER,
            name: DEVICE_NAME,
            serial: SERIAL_NUMBER,
            hardware_revision: HARDWARE_REVISION,
            software_revision: SOFTWARE_REVISION,
        }
    }
}

/// The characteristic set and layouts valid for one firmware revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityProfile {
    pub kind: ProfileKind,
    /// Revision string as reported by the device.
    pub revision: String,
    pub version: FirmwareVersion,
    /// Custom service carrying the Aranet characteristics.
    pub service: Uuid,
    /// Full current-reading characteristic, absent on [`ProfileKind::Legacy`].
    pub current_reading: Option<Uuid>,
    pub current_reading_simple: Uuid,
    pub history_command: Uuid,
    pub history_data: Uuid,
    pub stored_readings: Uuid,
    pub interval: Uuid,
    pub elapsed: Uuid,
    pub battery: Uuid,
    pub identity: IdentityCharacteristics,
}

impl CapabilityProfile {
    /// Resolve the profile for a software revision string.
    ///
    /// ```
    /// use aranet4_core::{CapabilityProfile, ProfileKind};
    ///
    /// let profile = CapabilityProfile::resolve("v1.4.19").unwrap();
    /// assert_eq!(profile.kind, ProfileKind::Modern);
    /// assert!(CapabilityProfile::resolve("v2.1.0").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFirmware`] if the revision cannot be parsed
    /// or maps to no known layout.
    pub fn resolve(revision: &str) -> Result<Self> {
        let version: FirmwareVersion = revision.parse()?;
        let kind = ProfileKind::for_version(version)
            .ok_or_else(|| Error::unsupported_firmware(revision, "no known layout"))?;

        let service = match kind {
            ProfileKind::Legacy | ProfileKind::Classic => SAF_TEHNIKA_SERVICE_OLD,
            ProfileKind::Modern => SAF_TEHNIKA_SERVICE_NEW,
        };
        let current_reading = match kind {
            ProfileKind::Legacy => None,
            ProfileKind::Classic | ProfileKind::Modern => Some(CURRENT_READING_FULL),
        };

        Ok(Self {
            kind,
            revision: revision.trim_end_matches('\0').trim().to_string(),
            version,
            service,
            current_reading,
            current_reading_simple: CURRENT_READING_SIMPLE,
            history_command: HISTORY_COMMAND,
            history_data: HISTORY_DATA,
            stored_readings: STORED_READINGS,
            interval: UPDATE_INTERVAL,
            elapsed: SECONDS_SINCE_UPDATE,
            battery: BATTERY_LEVEL,
            identity: IdentityCharacteristics::default(),
        })
    }

    /// Characteristic and layout for a current-reading read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFirmware`] when the profile lacks the
    /// requested layout.
    pub fn current_characteristic(&self, layout: CurrentLayout) -> Result<Uuid> {
        match layout {
            CurrentLayout::Simple => Ok(self.current_reading_simple),
            CurrentLayout::Full => self.current_reading.ok_or_else(|| {
                Error::unsupported_firmware(
                    &self.revision,
                    "full current reading characteristic not available",
                )
            }),
        }
    }

    /// Whether the full current-reading layout is available.
    pub fn has_full_reading(&self) -> bool {
        self.current_reading.is_some()
    }
}
