use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Monotonic version number of an object. The first committed version is `v1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNum(u32);

impl VersionNum {
    /// The version created by a successful first commit.
    pub const fn first() -> Self {
        Self(1)
    }

    pub fn new(n: u32) -> Result<Self, TypeError> {
        if n == 0 {
            return Err(TypeError::InvalidVersion("version numbers start at 1".into()));
        }
        Ok(Self(n))
    }

    /// The version a successful commit on top of this one produces.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for VersionNum {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        let n: u32 = digits
            .parse()
            .map_err(|_| TypeError::InvalidVersion(s.to_string()))?;
        Self::new(n)
    }
}

/// Free-text metadata attached verbatim to a committed version.
///
/// Absent fields stay `None`; they are never defaulted to placeholder text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub message: Option<String>,
    pub user_name: Option<String>,
    pub user_address: Option<String>,
}

impl VersionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_user(
        mut self,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        self.user_name = Some(name.into());
        self.user_address = Some(address.into());
        self
    }
}
