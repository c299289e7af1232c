//! Utility functions for minidfs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fully-qualified file name: `<department>/<filename>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FullName {
    department: String,
    name: String,
}

impl FullName {
    pub fn new(department: &str, name: &str) -> crate::Result<Self> {
        validate_component(department, "department")?;
        validate_component(name, "file name")?;
        Ok(Self {
            department: department.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse `dep/name`
    pub fn parse(full: &str) -> crate::Result<Self> {
        match full.split_once('/') {
            Some((dep, name)) => Self::new(dep, name),
            None => Err(crate::Error::InvalidName(format!(
                "expected <department>/<name>, got {:?}",
                full
            ))),
        }
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.department, self.name)
    }
}

impl std::str::FromStr for FullName {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FullName {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<FullName> for String {
    fn from(n: FullName) -> Self {
        n.to_string()
    }
}

/// A single path component: non-empty, no separators, no traversal
fn validate_component(part: &str, what: &str) -> crate::Result<()> {
    let bad = part.is_empty()
        || part == "."
        || part == ".."
        || part.contains('/')
        || part.contains('\\')
        || part.contains('\0')
        || part.starts_with('.');
    if bad {
        return Err(crate::Error::InvalidName(format!(
            "invalid {}: {:?}",
            what, part
        )));
    }
    Ok(())
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Parse duration string (e.g., "30s", "5m", "1h", "7d")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        s.split_at(s.len() - s.chars().last().map_or(0, char::len_utf8))
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(std::time::Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };
    let secs = num
        .checked_mul(secs_per_unit)
        .ok_or_else(|| crate::Error::InvalidConfig(format!("duration too large: {}", s)))?;

    Ok(std::time::Duration::from_secs(secs))
}

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
