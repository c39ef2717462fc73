use serde::Serialize;
use std::fmt;

/// Creation-version stamp recorded on each `SegmentInfo` (§3). Only used for
/// diagnostics/compatibility checks here, not for format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub bugfix: i32,
}

impl Version {
    pub const fn new(major: i32, minor: i32, bugfix: i32) -> Self {
        Version {
            major,
            minor,
            bugfix,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.bugfix)
    }
}

pub const VERSION_LATEST: Version = Version::new(1, 0, 0);
