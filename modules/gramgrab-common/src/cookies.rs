//! Netscape cookie-jar reader.
//!
//! The jar is the standard tab-separated flat file (domain, flag, path,
//! secure, expiry, name, value) consumed by the extractor tool. The core only
//! reads it; refreshing it is an out-of-scope credential routine.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Cookie {
    pub domain: String,
    pub path: String,
    pub secure: bool,
    /// Unix expiry timestamp; `None` for session cookies.
    pub expires: Option<i64>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct CookieJar {
    pub path: PathBuf,
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// Load a jar from disk. Returns `None` when the file is missing,
    /// unreadable, or contains no cookies — callers treat all three as
    /// "no session available".
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cookie jar");
                return None;
            }
        };

        let cookies = parse(&content);
        if cookies.is_empty() {
            return None;
        }

        Some(Self {
            path: path.to_path_buf(),
            cookies,
        })
    }

    /// True when the jar holds a non-expired `sessionid` cookie. Gates
    /// whether the extractor tool is invoked with `--cookies`.
    pub fn has_active_session(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.has_active_session_at(now)
    }

    fn has_active_session_at(&self, now_unix: i64) -> bool {
        self.cookies.iter().any(|c| {
            c.name == "sessionid"
                && !c.value.is_empty()
                && c.expires.map_or(true, |exp| exp > now_unix)
        })
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }
}

fn parse(content: &str) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for line in content.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 7 {
            continue;
        }
        cookies.push(Cookie {
            domain: parts[0].to_string(),
            path: parts[2].to_string(),
            secure: parts[3] == "TRUE",
            expires: parts[4].parse::<i64>().ok().filter(|e| *e != 0),
            name: parts[5].to_string(),
            value: parts[6].trim().to_string(),
        });
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAR: &str = "# Netscape HTTP Cookie File\n\
# This is a generated file!  Do not edit.\n\
\n\
.instagram.com\tTRUE\t/\tTRUE\t9999999999\tsessionid\tabc123\n\
.instagram.com\tTRUE\t/\tTRUE\t9999999999\tcsrftoken\ttok\n\
malformed line without tabs\n";

    #[test]
    fn parses_netscape_lines_and_skips_noise() {
        let cookies = parse(JAR);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "sessionid");
        assert_eq!(cookies[0].value, "abc123");
        assert_eq!(cookies[0].domain, ".instagram.com");
        assert!(cookies[0].secure);
    }

    #[test]
    fn session_check_respects_expiry() {
        let jar = CookieJar {
            path: PathBuf::from("cookies.txt"),
            cookies: parse(JAR),
        };
        assert!(jar.has_active_session_at(1_700_000_000));
        assert!(!jar.has_active_session_at(10_000_000_000));
    }

    #[test]
    fn jar_without_session_cookie_is_not_a_session() {
        let jar = CookieJar {
            path: PathBuf::from("cookies.txt"),
            cookies: parse(".instagram.com\tTRUE\t/\tTRUE\t9999999999\tcsrftoken\ttok\n"),
        };
        assert!(!jar.has_active_session_at(1_700_000_000));
    }
}
