//! SSO cookie jar handling.
//!
//! The jar is a Netscape-format file (as written by curl and the CERN SSO
//! helper) stored at `~/private/{dev,prod}-cookie.txt` unless overridden.
//! When the file is missing an external helper is asked to create it once.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::Config;
use crate::error::{McmError, Result};

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Default jar location for the configured environment
pub fn default_cookie_path(config: &Config) -> Result<PathBuf> {
    let mut path = dirs::home_dir().ok_or(McmError::NoHomeDirectory)?;
    path.push("private");
    path.push(config.environment.cookie_file_name());
    Ok(path)
}

/// Locate the cookie jar for `config`, invoking `config.cookie_helper` if it is absent.
pub fn resolve_cookie_file(config: &Config) -> Result<PathBuf> {
    let path = match &config.cookie_path {
        Some(path) => path.clone(),
        None => default_cookie_path(config)?,
    };
    ensure_cookie_file(&path, &config.base_url(), &config.cookie_helper)?;
    Ok(path)
}

/// Make sure `path` exists, running `helper` to create it for `target_url` otherwise.
///
/// A helper that exits with an error and a helper that succeeds without writing
/// the file are reported as different errors.
pub fn ensure_cookie_file(path: &Path, target_url: &str, helper: &str) -> Result<()> {
    if path.is_file() {
        info!(
            path = %path.display(),
            "found a cookie file, make sure it is not expired"
        );
        return Ok(());
    }

    info!(
        path = %path.display(),
        helper,
        "the SSO cookie file is absent, trying to make one"
    );
    let status = Command::new(helper)
        .arg("-u")
        .arg(target_url)
        .arg("-o")
        .arg(path)
        .arg("--krb")
        .status()
        .map_err(|source| McmError::CookieHelperSpawn {
            program: helper.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(McmError::CookieHelperFailed {
            program: helper.to_string(),
            status,
        });
    }

    if !path.is_file() {
        return Err(McmError::CredentialUnavailable {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), "created SSO cookie file");
    Ok(())
}

/// One line of a Netscape cookie jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Unix timestamp, 0 for session cookies
    pub expires: i64,
    pub name: String,
    pub value: String,
}

impl CookieEntry {
    /// Parse a single jar line. Returns `Ok(None)` for blanks and comments.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None => (line, false),
        };
        if line.trim().is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 || fields.len() > 7 {
            return Err(format!("expected 7 tab-separated fields, got {}", fields.len()));
        }

        let expires = fields[4]
            .parse::<i64>()
            .map_err(|e| format!("invalid expiry {:?}: {}", fields[4], e))?;

        let entry = CookieEntry {
            domain: fields[0].to_string(),
            include_subdomains: parse_flag(fields[1])?,
            path: fields[2].to_string(),
            secure: parse_flag(fields[3])?,
            http_only,
            expires,
            name: fields[5].to_string(),
            value: fields.get(6).copied().unwrap_or_default().to_string(),
        };
        entry
            .origin()
            .map_err(|e| format!("invalid domain {:?}: {}", entry.domain, e))?;
        Ok(Some(entry))
    }

    /// Host the cookie belongs to, without the leading dot
    pub fn host(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires != 0 && self.expires < now
    }

    /// URL the cookie is registered against in the jar
    pub fn origin(&self) -> std::result::Result<Url, url::ParseError> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{}://{}{}", scheme, self.host(), self.path))
    }

    /// Render as a `Set-Cookie` header value
    pub fn to_set_cookie(&self) -> String {
        let mut cookie = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            cookie.push_str("; Domain=");
            cookie.push_str(self.host());
        }
        if self.expires != 0 {
            if let Some(expires) = DateTime::<Utc>::from_timestamp(self.expires, 0) {
                cookie.push_str("; Expires=");
                cookie.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
            }
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie
    }
}

fn parse_flag(field: &str) -> std::result::Result<bool, String> {
    match field {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        other => Err(format!("expected TRUE or FALSE, got {:?}", other)),
    }
}

/// Read every cookie from a Netscape jar file
pub fn read_cookie_file(path: &Path) -> Result<Vec<CookieEntry>> {
    let contents = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        match CookieEntry::parse(line) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(reason) => {
                return Err(McmError::InvalidCookieFile {
                    path: path.to_path_buf(),
                    line: index + 1,
                    reason,
                })
            }
        }
    }
    Ok(entries)
}

/// Load a Netscape jar file into a cookie store presented on every request
pub fn load_jar(path: &Path) -> Result<Arc<Jar>> {
    let entries = read_cookie_file(path)?;
    let now = Utc::now().timestamp();

    if entries.is_empty() {
        warn!(path = %path.display(), "cookie file holds no cookies");
    } else if entries.iter().all(|entry| entry.is_expired(now)) {
        warn!(path = %path.display(), "every cookie in the file has expired");
    }

    let jar = Jar::default();
    for entry in &entries {
        match entry.origin() {
            Ok(origin) => jar.add_cookie_str(&entry.to_set_cookie(), &origin),
            Err(e) => warn!(name = %entry.name, error = %e, "skipping cookie"),
        }
    }
    debug!(path = %path.display(), count = entries.len(), "loaded cookie jar");

    Ok(Arc::new(jar))
}
