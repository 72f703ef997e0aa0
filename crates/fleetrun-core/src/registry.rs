//! Host registry: the ordered, deduplicated host set of a run

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::error::CoreError;

/// A normalized hostname or address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Host(String);

impl Host {
    /// Validate a single host name
    ///
    /// The name becomes the stem of its result file, so path separators and
    /// NUL bytes are refused.
    ///
    /// # Errors
    /// Returns `CoreError::Input` for an empty name or one that could not
    /// be used as a file name inside the output directory
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();

        if name.is_empty() || name == "." || name == ".." {
            return Err(CoreError::Input(format!("invalid host name: {name:?}")));
        }
        if name.contains(['/', '\0']) {
            return Err(CoreError::Input(format!(
                "host name {name:?} contains a path separator or NUL byte"
            )));
        }

        Ok(Self(name))
    }

    /// Normalize one host-list line
    ///
    /// Returns `Ok(None)` for blank and comment lines.
    ///
    /// # Errors
    /// Returns `CoreError::Input` if the line names an invalid host
    pub fn parse(line: &str) -> Result<Option<Self>, CoreError> {
        let cleaned: String = line.chars().filter(|c| *c != '\t').collect();
        let cleaned = cleaned.trim();

        if cleaned.is_empty() || cleaned.starts_with('#') {
            return Ok(None);
        }

        Self::new(cleaned).map(Some)
    }

    /// Host name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Result file name for this host
    #[must_use]
    pub fn result_file_name(&self) -> String {
        format!("{}.txt", self.0)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Host {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hosts of a run in deterministic lexical order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRegistry {
    hosts: Vec<Host>,
}

impl HostRegistry {
    /// Build a registry from host-list text
    ///
    /// # Errors
    /// Returns `CoreError::Input` if a line names an invalid host or no host
    /// remains after filtering
    pub fn parse(content: &str) -> Result<Self, CoreError> {
        let mut hosts = BTreeSet::new();
        for line in content.lines() {
            if let Some(host) = Host::parse(line)? {
                hosts.insert(host);
            }
        }

        if hosts.is_empty() {
            return Err(CoreError::Input("host list contains no hosts".to_string()));
        }

        Ok(Self {
            hosts: hosts.into_iter().collect(),
        })
    }

    /// Load and normalize a host-list file
    ///
    /// # Errors
    /// Returns `CoreError::Input` if the file cannot be read or holds no hosts
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Input(format!("cannot read host list {}: {e}", path.display()))
        })?;

        let registry = Self::parse(&content).map_err(|e| match e {
            CoreError::Input(reason) => {
                CoreError::Input(format!("host list {}: {reason}", path.display()))
            }
            other => other,
        })?;

        debug!(path = %path.display(), hosts = registry.len(), "loaded host list");
        Ok(registry)
    }

    /// Hosts in registry order
    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Iterate hosts in registry order
    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    /// Number of hosts
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Always false for a constructed registry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<'a> IntoIterator for &'a HostRegistry {
    type Item = &'a Host;
    type IntoIter = std::slice::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}
