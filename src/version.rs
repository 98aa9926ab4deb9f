//! Agent CLI version gate
//!
//! Runs `<binary> --version`, finds the first `major.minor.patch` token in the
//! combined output and compares it numerically against a configured minimum.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::process::Command;

use crate::error::{BridgeError, Result};

/// Numeric `major.minor.patch` triple, ordered field by field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    /// Major version
    pub major: u64,
    /// Minor version
    pub minor: u64,
    /// Patch version
    pub patch: u64,
}

impl SemVer {
    /// Create a version from its components
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a bare version string such as `"1.3.0"` or `"v1.3.0"`
    ///
    /// Unlike [`find_version_token`], the whole string must be the version.
    ///
    /// # Examples
    /// ```
    /// use kodegen_codex_bridge::SemVer;
    ///
    /// assert_eq!(SemVer::parse("1.10.0"), Some(SemVer::new(1, 10, 0)));
    /// assert_eq!(SemVer::parse("1.10"), None);
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('v').unwrap_or(text);
        let (version, end) = parse_triplet_at(text.as_bytes(), 0)?;
        (end == text.len()).then_some(version)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            BridgeError::invalid_config(format!("expected a major.minor.patch version, got {s:?}"))
        })
    }
}

impl Serialize for SemVer {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Find the first `major.minor.patch` token anywhere in `text`
///
/// A token must not be glued onto a preceding digit or dot, so
/// `"build 10.1 / codex-cli 0.104.0"` yields `0.104.0`.
#[must_use]
pub fn find_version_token(text: &str) -> Option<SemVer> {
    let bytes = text.as_bytes();
    (0..bytes.len())
        .filter(|&start| {
            bytes[start].is_ascii_digit()
                && (start == 0 || !(bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.'))
        })
        .find_map(|start| parse_triplet_at(bytes, start).map(|(version, _)| version))
}

/// Parse `d+.d+.d+` at `pos`, returning the version and the index after it
fn parse_triplet_at(bytes: &[u8], mut pos: usize) -> Option<(SemVer, usize)> {
    let mut parts = [0u64; 3];
    for (index, part) in parts.iter_mut().enumerate() {
        if index > 0 {
            if bytes.get(pos) != Some(&b'.') {
                return None;
            }
            pos += 1;
        }
        let digits_start = pos;
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        if pos == digits_start {
            return None;
        }
        *part = std::str::from_utf8(&bytes[digits_start..pos])
            .ok()?
            .parse()
            .ok()?;
    }
    Some((SemVer::new(parts[0], parts[1], parts[2]), pos))
}

/// Check a reported version against a minimum
///
/// # Errors
/// Returns [`BridgeError::VersionTooOld`] if `found` is strictly below `minimum`
pub fn ensure_minimum(found: SemVer, minimum: SemVer) -> Result<()> {
    if found < minimum {
        return Err(BridgeError::VersionTooOld {
            found,
            required: minimum,
        });
    }
    Ok(())
}

/// Run `<binary> --version` and require at least `minimum`
///
/// # Arguments
/// * `binary` - Agent CLI executable
/// * `minimum` - Lowest accepted version
/// * `timeout` - Upper bound on the probe; the probe process is killed on expiry
///
/// # Errors
/// Returns error if the binary cannot start, exits non-zero, prints no version
/// token, reports a version below `minimum`, or exceeds `timeout`
pub async fn check_cli_version(
    binary: &Path,
    minimum: SemVer,
    timeout: Duration,
) -> Result<SemVer> {
    let mut cmd = Command::new(binary);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        BridgeError::launch(format!("failed to run `{} --version`: {e}", binary.display()))
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            BridgeError::timeout(format!(
                "`{} --version` did not finish within {timeout:?}",
                binary.display()
            ))
        })??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(BridgeError::process(
            format!("`{} --version` exited with {}", binary.display(), output.status),
            output.status.code(),
            Some(stderr.trim().to_string()),
        ));
    }

    let combined = format!("{stdout}\n{stderr}");
    let found = find_version_token(&combined)
        .ok_or_else(|| BridgeError::VersionUnparseable(combined.trim().to_string()))?;

    ensure_minimum(found, minimum)?;
    log::debug!("agent CLI {} reports version {found}", binary.display());
    Ok(found)
}
