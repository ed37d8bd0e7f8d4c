//! Version-token extraction and classification.
//!
//! The install script and every deployed routine carry a release marker of
//! the form `--// Version: 2023-01-29 18:52:10`. Comparing the script's
//! token against the deployed tokens is the single fork point for the
//! install gate. A broken marker is a configuration-integrity error and is
//! never silently miscompared.

use chrono::NaiveDateTime;
use tracing::warn;

use crate::error::{EngineError, Result};
use drydock_core::types::RoutineMeta;

/// Marker prefix shared by the script and the deployed definitions.
pub const VERSION_MARKER: &str = "--// Version: ";
/// Token layout following the marker.
pub const VERSION_TOKEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Token length in characters, used for server-side extraction too.
pub const VERSION_TOKEN_LEN: usize = 19;

/// Relationship of the deployed version to the script version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    /// Nothing is deployed.
    Absent,
    Equal,
    /// Deployed is strictly earlier than the script.
    Older,
    /// Deployed is strictly later than the script.
    Newer,
}

/// Classify `installed` against `file`. Exact equality is `Equal`; there is
/// no tolerance window.
pub fn classify(installed: Option<NaiveDateTime>, file: NaiveDateTime) -> VersionRelation {
    match installed {
        None => VersionRelation::Absent,
        Some(installed) => match installed.cmp(&file) {
            std::cmp::Ordering::Less => VersionRelation::Older,
            std::cmp::Ordering::Equal => VersionRelation::Equal,
            std::cmp::Ordering::Greater => VersionRelation::Newer,
        },
    }
}

/// Find the first marker line and return its raw token.
pub fn find_token(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        line.find(VERSION_MARKER).map(|at| {
            line[at + VERSION_MARKER.len()..]
                .chars()
                .take(VERSION_TOKEN_LEN)
                .collect::<String>()
        })
    })
}

/// Parse a raw token. `what` names the token's origin for error messages.
pub fn parse_token(token: &str, what: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(token.trim(), VERSION_TOKEN_FORMAT).map_err(|_| {
        EngineError::VersionTokenInvalid {
            token: token.trim().to_string(),
            what: what.to_string(),
        }
    })
}

/// Extract and parse the version of a script given as lines.
pub fn extract_version(lines: &[String], what: &str) -> Result<NaiveDateTime> {
    let token =
        find_token(lines).ok_or_else(|| EngineError::VersionMarkerMissing(what.to_string()))?;
    parse_token(&token, what)
}

/// Summary of the deployed-routine inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstalledVersion {
    NotInstalled,
    /// Every routine reports the same token.
    Uniform(NaiveDateTime),
    /// Routines disagree on their tokens; carries the earliest one. A
    /// half-upgraded deployment is converged rather than trusted.
    Drifted(NaiveDateTime),
}

impl InstalledVersion {
    pub fn version(&self) -> Option<NaiveDateTime> {
        match self {
            InstalledVersion::NotInstalled => None,
            InstalledVersion::Uniform(v) | InstalledVersion::Drifted(v) => Some(*v),
        }
    }

    pub fn drifted(&self) -> bool {
        matches!(self, InstalledVersion::Drifted(_))
    }
}

/// Fold the per-routine metadata into one installed version. A deployed
/// routine without a parseable marker is fatal.
pub fn summarize_inventory(routines: &[RoutineMeta]) -> Result<InstalledVersion> {
    if routines.is_empty() {
        return Ok(InstalledVersion::NotInstalled);
    }

    let mut versions = Vec::with_capacity(routines.len());
    for routine in routines {
        let token = routine
            .version_token
            .as_deref()
            .ok_or_else(|| EngineError::VersionMarkerMissing(format!("routine `{}`", routine.name)))?;
        versions.push(parse_token(token, &format!("routine `{}`", routine.name))?);
    }

    let earliest = *versions.iter().min().unwrap_or(&versions[0]);
    let latest = *versions.iter().max().unwrap_or(&versions[0]);

    if earliest != latest {
        for (routine, version) in routines.iter().zip(&versions) {
            warn!(
                routine = %routine.name,
                version = %version,
                checksum = routine.checksum,
                "deployed routines disagree on their version"
            );
        }
        return Ok(InstalledVersion::Drifted(earliest));
    }
    Ok(InstalledVersion::Uniform(earliest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, VERSION_TOKEN_FORMAT).unwrap()
    }

    fn lines(script: &str) -> Vec<String> {
        script.lines().map(str::to_string).collect()
    }

    fn routine(name: &str, checksum: i64, token: Option<&str>) -> RoutineMeta {
        RoutineMeta {
            name: name.to_string(),
            checksum,
            version_token: token.map(str::to_string),
        }
    }

    #[test]
    fn classify_absent() {
        assert_eq!(
            classify(None, dt("2021-01-01 00:00:00")),
            VersionRelation::Absent
        );
    }

    #[test]
    fn classify_ordering() {
        let file = dt("2023-01-29 18:52:10");
        assert_eq!(
            classify(Some(dt("2022-12-03 17:23:44")), file),
            VersionRelation::Older
        );
        assert_eq!(classify(Some(file), file), VersionRelation::Equal);
        assert_eq!(
            classify(Some(dt("2024-06-01 09:00:00")), file),
            VersionRelation::Newer
        );
    }

    #[test]
    fn extracts_first_marker() {
        let script = lines(
            "SET NOCOUNT ON\n--// Source: https://example.invalid\n--// Version: 2023-01-29 18:52:10\n--// Version: 1999-01-01 00:00:00\nGO",
        );
        assert_eq!(
            extract_version(&script, "install script").unwrap(),
            dt("2023-01-29 18:52:10")
        );
    }

    #[test]
    fn missing_marker_is_fatal() {
        let script = lines("SELECT 1\nGO");
        let err = extract_version(&script, "install script").unwrap_err();
        assert!(matches!(err, EngineError::VersionMarkerMissing(_)));
    }

    #[test]
    fn malformed_token_is_fatal() {
        let script = lines("--// Version: not-a-timestamp!!");
        let err = extract_version(&script, "install script").unwrap_err();
        assert!(matches!(err, EngineError::VersionTokenInvalid { .. }));
    }

    #[test]
    fn inventory_empty_is_not_installed() {
        assert_eq!(
            summarize_inventory(&[]).unwrap(),
            InstalledVersion::NotInstalled
        );
    }

    #[test]
    fn inventory_uniform() {
        let routines = [
            routine("CommandExecute", 11, Some("2022-12-03 17:23:44")),
            routine("IndexOptimize", 22, Some("2022-12-03 17:23:44")),
        ];
        assert_eq!(
            summarize_inventory(&routines).unwrap(),
            InstalledVersion::Uniform(dt("2022-12-03 17:23:44"))
        );
    }

    #[test]
    fn inventory_drift_carries_earliest() {
        let routines = [
            routine("CommandExecute", 11, Some("2022-12-03 17:23:44")),
            routine("IndexOptimize", 22, Some("2023-01-29 18:52:10")),
        ];
        assert_eq!(
            summarize_inventory(&routines).unwrap(),
            InstalledVersion::Drifted(dt("2022-12-03 17:23:44"))
        );
    }

    #[test]
    fn inventory_marker_missing_is_fatal() {
        let routines = [routine("DatabaseBackup", 33, None)];
        assert!(matches!(
            summarize_inventory(&routines).unwrap_err(),
            EngineError::VersionMarkerMissing(_)
        ));
    }
}
