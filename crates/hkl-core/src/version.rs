use std::fmt;

use crate::error::{HklError, HklResult};

/// Marker stored in the `CLASS` attribute of every dump root.
pub const FORMAT_CLASS: &str = "hkl";

/// Format version written by this crate.
pub const FORMAT_VERSION: FormatVersion = FormatVersion { major: 1, minor: 0 };

/// `<major>.<minor>` version of the stored layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

/// How a file's version relates to [`FORMAT_VERSION`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compatibility {
    /// Same major version; read as-is.
    Current,
    /// Older major version; read with compatibility shims.
    Legacy,
}

impl FormatVersion {
    /// Parse `"<major>.<minor>"`. A bare major (`"1"`) means minor 0.
    pub fn parse(raw: &str) -> HklResult<Self> {
        let invalid = || HklError::Configuration(format!("invalid format version {raw:?}"));
        let mut parts = raw.trim().splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }

    /// Decide whether a file written at `self` can be read.
    pub fn check(self) -> HklResult<Compatibility> {
        if self.major > FORMAT_VERSION.major {
            Err(HklError::Version {
                found: self.to_string(),
                supported: FORMAT_VERSION.to_string(),
            })
        } else if self.major < FORMAT_VERSION.major {
            Ok(Compatibility::Legacy)
        } else {
            Ok(Compatibility::Current)
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(FormatVersion::parse("1.0").unwrap(), FORMAT_VERSION);
        assert_eq!(
            FormatVersion::parse("2").unwrap(),
            FormatVersion { major: 2, minor: 0 }
        );
        assert!(FormatVersion::parse("x.1").is_err());
        assert!(FormatVersion::parse("1.y").is_err());
    }

    #[test]
    fn newer_major_rejected() {
        let err = FormatVersion::parse("2.0").unwrap().check().unwrap_err();
        assert!(matches!(err, HklError::Version { .. }));
    }

    #[test]
    fn newer_minor_and_older_major_accepted() {
        assert_eq!(
            FormatVersion::parse("1.7").unwrap().check().unwrap(),
            Compatibility::Current
        );
        assert_eq!(
            FormatVersion::parse("0.4").unwrap().check().unwrap(),
            Compatibility::Legacy
        );
    }

    #[test]
    fn display_roundtrip() {
        assert_eq!(FORMAT_VERSION.to_string(), "1.0");
    }
}
