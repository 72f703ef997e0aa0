//! Extra transport options
//!
//! Accepts the same option string a user would hand to `ssh`, e.g.
//! `-p 2222 -o ConnectTimeout=5 -o StrictHostKeyChecking=no`, and keeps the
//! parts the russh transport can honor. Words are split with POSIX shell
//! quoting rules, so quoted values may contain spaces.

use std::time::Duration;

use tracing::warn;

use crate::error::ExecError;
use crate::result::ConnectionInfo;

/// Parsed extra transport options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshOptions {
    /// Port override
    pub port: Option<u16>,
    /// TCP connect timeout
    pub connect_timeout: Option<Duration>,
    /// `-o` options accepted but without effect on this transport
    pub ignored: Vec<String>,
}

impl SshOptions {
    /// Parse an option string
    ///
    /// # Errors
    /// Returns `ExecError::ConfigError` for a flag without value, a
    /// non-numeric port or timeout, an unsupported flag, or a `User` override
    /// (the user always comes from the run's credential).
    pub fn parse(extra: &str) -> Result<Self, ExecError> {
        let words = shell_words::split(extra)
            .map_err(|e| ExecError::ConfigError(format!("transport options: {e}")))?;

        let mut opts = Self::default();
        let mut words = words.into_iter();

        while let Some(word) = words.next() {
            match word.as_str() {
                "-p" => {
                    let value = next_value(&mut words, "-p")?;
                    opts.port = Some(parse_port(&value)?);
                }
                "-o" => {
                    let value = next_value(&mut words, "-o")?;
                    opts.apply_option(&value)?;
                }
                w if w.starts_with("-p") => opts.port = Some(parse_port(&w[2..])?),
                w if w.starts_with("-o") => opts.apply_option(&w[2..])?,
                other => {
                    return Err(ExecError::ConfigError(format!(
                        "unsupported transport option: {other}"
                    )));
                }
            }
        }

        Ok(opts)
    }

    fn apply_option(&mut self, option: &str) -> Result<(), ExecError> {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| ExecError::ConfigError(format!("expected Key=Value, got {option}")))?;

        match key.to_ascii_lowercase().as_str() {
            "port" => self.port = Some(parse_port(value)?),
            "connecttimeout" => {
                let secs: u64 = value.parse().map_err(|_| {
                    ExecError::ConfigError(format!("invalid ConnectTimeout: {value}"))
                })?;
                self.connect_timeout = Some(Duration::from_secs(secs));
            }
            "user" => {
                return Err(ExecError::ConfigError(
                    "User cannot be overridden through transport options".to_string(),
                ));
            }
            _ => {
                warn!(option = %option, "transport option has no effect");
                self.ignored.push(option.to_string());
            }
        }

        Ok(())
    }

    /// Apply parsed overrides to connection info
    #[must_use]
    pub fn apply(&self, mut info: ConnectionInfo) -> ConnectionInfo {
        if let Some(port) = self.port {
            info = info.with_port(port);
        }
        if let Some(timeout) = self.connect_timeout {
            info = info.with_connect_timeout(timeout);
        }
        info
    }
}

fn next_value(words: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ExecError> {
    words
        .next()
        .ok_or_else(|| ExecError::ConfigError(format!("{flag} requires a value")))
}

fn parse_port(value: &str) -> Result<u16, ExecError> {
    value
        .parse()
        .map_err(|_| ExecError::ConfigError(format!("invalid port: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(SshOptions::parse("").unwrap(), SshOptions::default());
        assert_eq!(SshOptions::parse("   ").unwrap(), SshOptions::default());
    }

    #[test]
    fn test_port_forms() {
        assert_eq!(SshOptions::parse("-p 2222").unwrap().port, Some(2222));
        assert_eq!(SshOptions::parse("-p2222").unwrap().port, Some(2222));
        assert_eq!(SshOptions::parse("-o Port=2200").unwrap().port, Some(2200));
    }

    #[test]
    fn test_connect_timeout_and_ignored() {
        let opts =
            SshOptions::parse("-o ConnectTimeout=5 -oStrictHostKeyChecking=no").unwrap();
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.ignored, vec!["StrictHostKeyChecking=no".to_string()]);
    }

    #[test]
    fn test_rejections() {
        assert!(SshOptions::parse("-p").is_err());
        assert!(SshOptions::parse("-p abc").is_err());
        assert!(SshOptions::parse("-o User=admin").is_err());
        assert!(SshOptions::parse("-o Compression").is_err());
        assert!(SshOptions::parse("-A").is_err());
        assert!(SshOptions::parse("-o 'ConnectTimeout=5").is_err());
    }

    #[test]
    fn test_quoted_values() {
        let opts = SshOptions::parse(r#"-o "ConnectTimeout=5" -o 'Port=2201'"#).unwrap();
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.port, Some(2201));
        assert!(opts.ignored.is_empty());
    }

    #[test]
    fn test_quoted_option_with_spaces_is_one_word() {
        let opts = SshOptions::parse(r#"-p 2222 -o "ProxyCommand=ssh -W %h:%p bastion""#).unwrap();
        assert_eq!(opts.port, Some(2222));
        assert_eq!(opts.ignored, vec!["ProxyCommand=ssh -W %h:%p bastion".to_string()]);
    }

    #[test]
    fn test_apply() {
        let opts = SshOptions::parse("-p 2022 -o ConnectTimeout=3").unwrap();
        let info = opts.apply(ConnectionInfo::new("db-01", "ops"));
        assert_eq!(info.port, 2022);
        assert_eq!(info.connect_timeout, Some(Duration::from_secs(3)));
    }
}
