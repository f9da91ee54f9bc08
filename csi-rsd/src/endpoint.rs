//! Endpoint resolution.
//!
//! Turns an address such as `unix:///var/lib/csi/csi.sock` into the socket
//! path the plugin listens on.  CSI plugins talk only over Unix domain
//! sockets, so any other scheme is rejected.

use std::fmt;
use std::path::PathBuf;

use crate::error::DriverError;

/// The only transport the CSI contract allows.
pub const UNIX_SCHEME: &str = "unix";

/// A parsed listening address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Transport scheme, lower-cased.
    pub scheme: String,
    /// Filesystem path of the socket.
    pub path: PathBuf,
}

impl Endpoint {
    /// Parse and validate `addr`.
    ///
    /// `scheme://host/path` yields `host/path`, `scheme:///path` and
    /// `scheme:/path` yield `/path`.  Percent escapes in the path are decoded.
    pub fn parse(addr: &str) -> Result<Self, DriverError> {
        let (scheme, host, path) = split_uri(addr).map_err(|reason| {
            DriverError::config(format!("unable to parse address {addr:?}: {reason}"))
        })?;

        let path = if host.is_empty() {
            native_path(&path)
        } else {
            let mut joined = native_path(&host);
            joined.push(native_path(path.trim_start_matches('/')));
            joined
        };

        if scheme != UNIX_SCHEME {
            return Err(DriverError::config(format!(
                "currently only unix domain sockets are supported, have: {scheme}"
            )));
        }
        if path.as_os_str().is_empty() {
            return Err(DriverError::config(format!(
                "address {addr:?} does not name a socket path"
            )));
        }

        Ok(Self { scheme, path })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path.display())
    }
}

/// Split an address into `(scheme, host, decoded path)`.
fn split_uri(addr: &str) -> Result<(String, String, String), &'static str> {
    if addr.chars().any(|c| c.is_ascii_control()) {
        return Err("invalid control character in URL");
    }

    let (scheme, rest) = addr.split_once(':').ok_or("missing protocol scheme")?;
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err("missing protocol scheme"),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return Err("invalid character in scheme");
    }

    // Fragment and query carry no meaning for a socket path.
    let rest = rest.split_once('#').map_or(rest, |(r, _)| r);
    let rest = rest.split_once('?').map_or(rest, |(r, _)| r);

    let (host, raw_path) = match rest.strip_prefix("//") {
        Some(authority) => match authority.find('/') {
            Some(idx) => (&authority[..idx], &authority[idx..]),
            None => (authority, ""),
        },
        None => ("", rest),
    };
    if host.contains('@') || host.contains('%') {
        return Err("invalid host");
    }

    Ok((
        scheme.to_ascii_lowercase(),
        host.to_owned(),
        percent_decode(raw_path)?,
    ))
}

fn percent_decode(s: &str) -> Result<String, &'static str> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or("invalid URL escape")?;
            let hex = std::str::from_utf8(hex).map_err(|_| "invalid URL escape")?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| "invalid URL escape")?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| "path is not valid UTF-8")
}

/// Build a native path from `/`-separated components.
fn native_path(slash_path: &str) -> PathBuf {
    let mut path = PathBuf::new();
    if slash_path.starts_with('/') {
        path.push(std::path::MAIN_SEPARATOR_STR);
    }
    for part in slash_path.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_message(addr: &str) -> String {
        match Endpoint::parse(addr) {
            Err(DriverError::Configuration(msg)) => msg,
            other => panic!("expected configuration error for {addr:?}, got {other:?}"),
        }
    }

    #[test]
    fn absolute_path_without_host() {
        let ep = Endpoint::parse("unix:///tmp/test.sock").unwrap();
        assert_eq!(ep.scheme, "unix");
        assert_eq!(ep.path, PathBuf::from("/tmp/test.sock"));
        assert_eq!(ep.to_string(), "unix:///tmp/test.sock");
    }

    #[test]
    fn host_is_joined_with_path() {
        let ep = Endpoint::parse("unix://var/lib/csi.sock").unwrap();
        assert_eq!(ep.path, PathBuf::from("var/lib/csi.sock"));
    }

    #[test]
    fn opaque_form_and_escapes() {
        let ep = Endpoint::parse("unix:/run/csi%20rsd/csi.sock").unwrap();
        assert_eq!(ep.path, PathBuf::from("/run/csi rsd/csi.sock"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let ep = Endpoint::parse("UNIX:///tmp/a.sock").unwrap();
        assert_eq!(ep.scheme, "unix");
    }

    #[test]
    fn other_schemes_are_rejected_by_name() {
        let msg = config_message("tcp://localhost:1234");
        assert!(msg.contains("only unix domain sockets"), "{msg}");
        assert!(msg.ends_with("have: tcp"), "{msg}");
    }

    #[test]
    fn malformed_addresses_are_configuration_errors() {
        for addr in ["/tmp/no-scheme.sock", "://x", "1unix:///a", "unix:///a%zz", "unix:///a\n"] {
            let msg = config_message(addr);
            assert!(msg.starts_with("unable to parse address"), "{addr}: {msg}");
        }
    }

    #[test]
    fn missing_path_is_rejected() {
        let msg = config_message("unix://");
        assert!(msg.contains("does not name a socket path"), "{msg}");
    }
}
