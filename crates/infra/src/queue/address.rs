//! Broker address parsing.

use super::QueueError;

pub const DEFAULT_PORT: u16 = 6379;

/// Where the queue broker lives and how to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct QueueAddress {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl QueueAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            db: 0,
            username: None,
            password: None,
        }
    }

    /// Parse `redis://[user[:password]@]host[:port][/db]`.
    ///
    /// The scheme is optional. `password_override` (typically from a separate
    /// secret) wins over a password embedded in the URL.
    pub fn parse(url: &str, password_override: Option<String>) -> Result<Self, QueueError> {
        let invalid = |why: &str| QueueError::InvalidAddress(format!("{why}: {}", redact(url)));

        let rest = match url.trim().split_once("://") {
            Some(("redis", rest)) => rest,
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme '{scheme}'"))),
            None => url.trim(),
        };

        let (userinfo, hostpart) = match rest.rsplit_once('@') {
            Some((userinfo, hostpart)) => (Some(userinfo), hostpart),
            None => (None, rest),
        };

        let (hostport, db) = match hostpart.split_once('/') {
            Some((hostport, "")) => (hostport, 0),
            Some((hostport, db)) => (
                hostport,
                db.parse::<i64>().map_err(|_| invalid("database index is not a number"))?,
            ),
            None => (hostpart, 0),
        };

        let (host, port) = split_host_port(hostport).ok_or_else(|| invalid("bad host or port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let (username, password) = match userinfo {
            None => (None, None),
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (non_empty(user), non_empty(pass)),
                None => (non_empty(info), None),
            },
        };

        Ok(Self {
            host: host.to_string(),
            port,
            db,
            username,
            password: password_override.filter(|p| !p.is_empty()).or(password),
        })
    }
}

fn split_host_port(hostport: &str) -> Option<(&str, u16)> {
    // Bracketed IPv6: [::1]:6379
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        return match after.strip_prefix(':') {
            Some(port) => Some((host, port.parse().ok()?)),
            None if after.is_empty() => Some((host, DEFAULT_PORT)),
            None => None,
        };
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) => Some((host, port.parse().ok()?)),
        None => Some((hostport, DEFAULT_PORT)),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn redact(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((_, host)) => format!("***@{host}"),
        None => url.to_string(),
    }
}

impl std::fmt::Display for QueueAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for QueueAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueAddress")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
