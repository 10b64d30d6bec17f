// Copyright (C) 2026 tracing-scribe developers
//
// This file is part of tracing-scribe.
//
// tracing-scribe is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// tracing-scribe is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with tracing-scribe.  If
// not, see <http://www.gnu.org/licenses/>.

//! Category template formatting.
//!
//! Scribe files every entry under a *category*; this module renders the handler's category
//! template against a fixed set of named attributes drawn from the [`Record`]:
//! `%(module)s`, `%(levelname)s`, `%(loggername)s`, `%(processName)s` & `%(hostname)s`.
//! `%%` produces a literal percent sign. Referencing any other key, or a malformed
//! directive, is a [`Format`](crate::error::Error::Format) error; the record is never silently
//! dropped.
//!
//! The local hostname is an injected dependency ([`HostnameSource`]) rather than ambient global
//! state, so the formatter can be exercised without a real network environment.

use crate::{
    error::{Error, Result},
    record::{LogEntry, Record},
};

use backtrace::Backtrace;

/// The category template used when the handler is configured with none.
pub const DEFAULT_TEMPLATE: &str = "%(hostname)s-%(loggername)s";

/// Substituted for `%(processName)s` when the record does not carry a process name.
pub const PROCESS_NAME_PLACEHOLDER: &str = "Unknown";

/// Where the `%(hostname)s` substitution gets its value.
///
/// Resolution happens at format time, so a host that is renamed mid-run will be reflected in
/// subsequent categories.
pub enum HostnameSource {
    /// Ask the operating system; fall back to the local IP address, then to `"localhost"`
    System,
    /// A fixed name, chiefly for tests
    Fixed(String),
}

impl HostnameSource {
    pub fn resolve(&self) -> String {
        match self {
            HostnameSource::Fixed(name) => name.clone(),
            HostnameSource::System => match hostname::get() {
                Ok(name) => name.to_string_lossy().into_owned(),
                // No hostname? An IP address is still a usable category component.
                Err(_) => match local_ip_address::local_ip() {
                    Ok(ip) => ip.to_string(),
                    Err(_) => String::from("localhost"),
                },
            },
        }
    }
}

/// Renders category strings & wire entries from [`Record`]s.
pub struct CategoryFormatter {
    template: String,
    hostname: HostnameSource,
}

impl CategoryFormatter {
    /// `template` of `None` selects [`DEFAULT_TEMPLATE`].
    pub fn new(template: Option<String>, hostname: HostnameSource) -> CategoryFormatter {
        CategoryFormatter {
            template: template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            hostname,
        }
    }

    /// Resolve the category template against `record`.
    pub fn format(&self, record: &Record) -> Result<String> {
        let hostname = self.hostname.resolve();
        let mut out = String::with_capacity(self.template.len());
        let mut chars = self.template.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some('(') => {
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some(')') => break,
                            Some(k) => key.push(k),
                            None => {
                                return Err(Error::Format {
                                    detail: format!(
                                        "unterminated substitution in template {:?}",
                                        self.template
                                    ),
                                    back: Backtrace::new(),
                                })
                            }
                        }
                    }
                    if chars.next() != Some('s') {
                        return Err(Error::Format {
                            detail: format!(
                                "substitution {:?} lacks the 's' conversion in template {:?}",
                                key, self.template
                            ),
                            back: Backtrace::new(),
                        });
                    }
                    let value = match key.as_str() {
                        "module" => record.module.as_str(),
                        "levelname" => record.levelname.as_str(),
                        "loggername" => record.loggername.as_str(),
                        "processName" => record
                            .process_name
                            .as_deref()
                            .unwrap_or(PROCESS_NAME_PLACEHOLDER),
                        "hostname" => hostname.as_str(),
                        _ => {
                            return Err(Error::Format {
                                detail: format!("unknown substitution key {:?}", key),
                                back: Backtrace::new(),
                            })
                        }
                    };
                    out.push_str(value);
                }
                _ => {
                    return Err(Error::Format {
                        detail: format!("stray '%' in template {:?}", self.template),
                        back: Backtrace::new(),
                    })
                }
            }
        }
        Ok(out)
    }

    /// Produce the wire-ready entry for `record`: resolved category plus newline-terminated
    /// message.
    pub fn entry(&self, record: &Record) -> Result<LogEntry> {
        Ok(LogEntry::new(self.format(record)?, &record.message))
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use chrono::prelude::*;

    fn record() -> Record {
        Record {
            message: String::from("hello"),
            module: String::from("app::api"),
            levelname: String::from("INFO"),
            loggername: String::from("svc"),
            process_name: Some(String::from("svcd")),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_default_template() {
        let f = CategoryFormatter::new(None, HostnameSource::Fixed(String::from("h1")));
        assert_eq!(f.format(&record()).unwrap(), "h1-svc");
    }

    #[test]
    fn test_all_keys() {
        let f = CategoryFormatter::new(
            Some(String::from(
                "%(module)s/%(levelname)s/%(loggername)s/%(processName)s/%(hostname)s",
            )),
            HostnameSource::Fixed(String::from("h1")),
        );
        assert_eq!(f.format(&record()).unwrap(), "app::api/INFO/svc/svcd/h1");
    }

    #[test]
    fn test_process_name_placeholder() {
        let f = CategoryFormatter::new(
            Some(String::from("%(processName)s")),
            HostnameSource::Fixed(String::from("h1")),
        );
        let mut r = record();
        r.process_name = None;
        assert_eq!(f.format(&r).unwrap(), "Unknown");
    }

    #[test]
    fn test_percent_escape() {
        let f = CategoryFormatter::new(
            Some(String::from("100%%-%(loggername)s")),
            HostnameSource::Fixed(String::from("h1")),
        );
        assert_eq!(f.format(&record()).unwrap(), "100%-svc");
    }

    #[test]
    fn test_unknown_key() {
        let f = CategoryFormatter::new(
            Some(String::from("%(nope)s")),
            HostnameSource::Fixed(String::from("h1")),
        );
        assert!(matches!(
            f.format(&record()),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn test_malformed_templates() {
        for template in ["%(loggername", "%(loggername)d", "%x", "tail%"] {
            let f = CategoryFormatter::new(
                Some(String::from(template)),
                HostnameSource::Fixed(String::from("h1")),
            );
            assert!(
                matches!(f.format(&record()), Err(Error::Format { .. })),
                "template {:?} should not format",
                template
            );
        }
    }

    #[test]
    fn test_entry_appends_newline() {
        let f = CategoryFormatter::new(None, HostnameSource::Fixed(String::from("h1")));
        let entry = f.entry(&record()).unwrap();
        assert_eq!(entry.category(), "h1-svc");
        assert_eq!(entry.message(), "hello\n");
    }

    #[test]
    fn test_system_hostname_resolves_to_something() {
        // Can't assert the value, but resolution must never come back empty.
        assert!(!HostnameSource::System.resolve().is_empty());
    }
}
