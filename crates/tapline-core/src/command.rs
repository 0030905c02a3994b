//! Control-line protocol: greeting constants, replies and command decoding.

use crate::error::{Error, Result};

/// Greeting the client must send, byte for byte.
pub const CLIENT_HELLO: &[u8] = b"PROXY_SERVER_CLIENT_HELLO\n";
/// Greeting sent back once the client hello matched.
pub const SERVER_HELLO: &[u8] = b"PROXY_SERVER_SERVER_HELLO\n";

pub const CONNECT_OK: &[u8] = b"CONNECT 100 OK\n\n";
pub const TAP_OK: &[u8] = b"TAP 100 OK\n\n";

/// Upper bound of a single control read.
pub const CONTROL_BUFFER_SIZE: usize = 1024;

const CONNECT_PREFIX: &str = "CONNECT ";
const TAP_PREFIX: &str = "TAP ";
const CURL_PREFIX: &str = "CURL ";

/// Shortest TAP line accepted, terminator included.
const MIN_TAP_LINE_LEN: usize = 11;

/// Which command a line names, before its arguments are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Connect,
    Tap,
    Curl,
    Bad,
}

impl CommandKind {
    /// Classify by substring search; CONNECT wins over TAP, TAP over CURL.
    pub fn classify(line: &str) -> Self {
        if line.contains(CONNECT_PREFIX) {
            CommandKind::Connect
        } else if line.contains(TAP_PREFIX) {
            CommandKind::Tap
        } else if line.contains(CURL_PREFIX) {
            CommandKind::Curl
        } else {
            CommandKind::Bad
        }
    }
}

/// A decoded control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a relay to `host:port`.
    Connect { host: String, port: u16 },
    /// Probe whether `host` is reachable.
    Tap { host: String },
    /// Fetch `website` with `method`.
    Curl { website: String, method: String },
    /// Anything unrecognized.
    BadCommand,
}

impl Command {
    /// Classify and decode one control line.
    ///
    /// Unrecognized lines become [`Command::BadCommand`]; a recognized
    /// keyword with malformed arguments is an error.
    pub fn parse(line: &str) -> Result<Self> {
        match CommandKind::classify(line) {
            CommandKind::Connect => parse_connect(line),
            CommandKind::Tap => parse_tap(line),
            CommandKind::Curl => parse_curl(line),
            CommandKind::Bad => Ok(Command::BadCommand),
        }
    }

    /// Name used in replies and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "CONNECT",
            Command::Tap { .. } => "TAP",
            Command::Curl { .. } => "CURL",
            Command::BadCommand => "BAD",
        }
    }
}

/// Split the first line off a control read.
///
/// Returns the line (terminator included) and whatever followed it.
pub fn split_line(data: &[u8]) -> (&[u8], &[u8]) {
    match data.iter().position(|&b| b == b'\n') {
        Some(pos) => (&data[..pos + 1], &data[pos + 1..]),
        None => (data, &[]),
    }
}

fn strip_terminator(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

/// Text following `prefix`, measured from where the prefix was found.
fn after_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.find(prefix).map(|pos| &line[pos + prefix.len()..])
}

fn parse_connect(line: &str) -> Result<Command> {
    let rest = after_prefix(line, CONNECT_PREFIX)
        .ok_or_else(|| Error::InvalidConnect("missing CONNECT keyword".into()))?;
    let (host, port) = rest
        .split_once(':')
        .ok_or_else(|| Error::InvalidConnect("missing ':' between host and port".into()))?;

    if host.is_empty() {
        return Err(Error::InvalidConnect("empty host".into()));
    }

    let port = strip_terminator(port);
    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidConnect(format!("invalid port '{}'", port)))?;
    if port == 0 {
        return Err(Error::InvalidConnect("port 0 is not connectable".into()));
    }

    Ok(Command::Connect {
        host: host.to_string(),
        port,
    })
}

fn parse_tap(line: &str) -> Result<Command> {
    if line.len() < MIN_TAP_LINE_LEN {
        return Err(Error::InvalidTap("line too short".into()));
    }

    let host = after_prefix(line, TAP_PREFIX)
        .map(strip_terminator)
        .ok_or_else(|| Error::InvalidTap("missing TAP keyword".into()))?;

    if host.is_empty() {
        return Err(Error::InvalidTap("empty host".into()));
    }

    Ok(Command::Tap {
        host: host.to_string(),
    })
}

fn parse_curl(line: &str) -> Result<Command> {
    let rest = after_prefix(line, CURL_PREFIX)
        .map(strip_terminator)
        .ok_or_else(|| Error::InvalidCurl("missing CURL keyword".into()))?;

    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(website), Some(method), None) => Ok(Command::Curl {
            website: website.to_string(),
            method: method.to_string(),
        }),
        _ => Err(Error::InvalidCurl("expected website and method".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priority() {
        assert_eq!(CommandKind::classify("CONNECT a:1\n"), CommandKind::Connect);
        assert_eq!(CommandKind::classify("TAP 8.8.8.8\n"), CommandKind::Tap);
        assert_eq!(CommandKind::classify("CURL x GET\n"), CommandKind::Curl);
        assert_eq!(CommandKind::classify("DELETE /x\n"), CommandKind::Bad);
        // CONNECT outranks TAP wherever they appear.
        assert_eq!(
            CommandKind::classify("TAP CONNECT x:1\n"),
            CommandKind::Connect
        );
    }

    #[test]
    fn test_classify_is_substring_and_case_sensitive() {
        assert_eq!(
            CommandKind::classify("please CONNECT a:1\n"),
            CommandKind::Connect
        );
        assert_eq!(CommandKind::classify("connect a:1\n"), CommandKind::Bad);
        assert_eq!(CommandKind::classify("CONNECT\n"), CommandKind::Bad);
    }

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            Command::parse("CONNECT 93.184.216.34:80\n").unwrap(),
            Command::Connect {
                host: "93.184.216.34".into(),
                port: 80
            }
        );
        assert_eq!(
            Command::parse("CONNECT example.com:443\r\n").unwrap(),
            Command::Connect {
                host: "example.com".into(),
                port: 443
            }
        );
    }

    #[test]
    fn test_parse_connect_after_leading_text() {
        assert_eq!(
            Command::parse("xx CONNECT localhost:8080\n").unwrap(),
            Command::Connect {
                host: "localhost".into(),
                port: 8080
            }
        );
    }

    #[test]
    fn test_parse_connect_malformed() {
        for line in [
            "CONNECT badformat\n",
            "CONNECT :80\n",
            "CONNECT host:http\n",
            "CONNECT host:\n",
            "CONNECT host:0\n",
            "CONNECT host:70000\n",
        ] {
            assert!(
                matches!(Command::parse(line), Err(Error::InvalidConnect(_))),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_parse_tap() {
        assert_eq!(
            Command::parse("TAP 8.8.8.8\n").unwrap(),
            Command::Tap {
                host: "8.8.8.8".into()
            }
        );
        assert!(matches!(
            Command::parse("TAP a.io\n"),
            Err(Error::InvalidTap(_))
        ));
    }

    #[test]
    fn test_parse_curl() {
        assert_eq!(
            Command::parse("CURL example.com GET\n").unwrap(),
            Command::Curl {
                website: "example.com".into(),
                method: "GET".into()
            }
        );
        assert!(matches!(
            Command::parse("CURL example.com\n"),
            Err(Error::InvalidCurl(_))
        ));
    }

    #[test]
    fn test_parse_bad_command() {
        assert_eq!(Command::parse("DELETE /x\n").unwrap(), Command::BadCommand);
        assert_eq!(Command::parse("").unwrap(), Command::BadCommand);
    }

    #[test]
    fn test_split_line() {
        let (line, rest) = split_line(b"CONNECT a:1\nGET / HTTP/1.0\r\n");
        assert_eq!(line, b"CONNECT a:1\n");
        assert_eq!(rest, b"GET / HTTP/1.0\r\n");

        let (line, rest) = split_line(b"TAP 1.2.3.4");
        assert_eq!(line, b"TAP 1.2.3.4");
        assert!(rest.is_empty());
    }
}
