use std::{env, fmt, io, net, path::Path, time::Duration};

use derive_more::{Display, From};
use serde::Deserialize;
use tokio::fs;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: Http,
    pub pool: Pool,
    pub relay: Relay,
}

impl Config {
    /// Reads `path` when it exists, falling back to defaults otherwise.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        match fs::read_to_string(path).await {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            server: Server::default(),
            cors: Cors::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            addr: ([0, 0, 0, 0], 8080).into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pool {
    pub max_size: u32,
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Relay {
    pub server: Server,
    pub downstream_url: String,
    pub allowed_from: String,
    pub allowed_to: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            server: Server {
                addr: ([0, 0, 0, 0], 8081).into(),
            },
            downstream_url: "https://example.com/forward".into(),
            allowed_from: "lt-mail@l-tike.com".into(),
            allowed_to: "tickets@example.com".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Database credentials, always taken from the environment.
#[derive(Clone)]
pub struct Db {
    pub user: String,
    pub password: String,
    pub host: String,
    pub name: String,
    pub charset: String,
}

impl Db {
    pub const USER: &'static str = "POSTGRES_USER";
    pub const PASSWORD: &'static str = "POSTGRES_PASSWORD";
    pub const HOST: &'static str = "POSTGRES_HOST";
    pub const NAME: &'static str = "POSTGRES_DB";
    pub const CHARSET: &'static str = "POSTGRES_CHARSET";

    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Empty values count as missing.
    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, Error> {
        let var = |key| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(Error::MissingVar(key))
        };
        Ok(Self {
            user: var(Self::USER)?,
            password: var(Self::PASSWORD)?,
            host: var(Self::HOST)?,
            name: var(Self::NAME)?,
            charset: var(Self::CHARSET)?,
        })
    }

    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let (host, port) = split_host_port(&self.host);

        let mut config = tokio_postgres::Config::new();
        config
            .user(self.user.as_str())
            .password(self.password.as_str())
            .host(host)
            .dbname(self.name.as_str())
            .options(format!("-c client_encoding={}", self.charset).as_str());
        if let Some(port) = port {
            config.port(port);
        }
        config
    }
}

/// Splits `host`, `host:port`, `[addr]` or `[addr]:port`. A bare IPv6
/// address such as `::1` is taken as a host without port.
fn split_host_port(addr: &str) -> (&str, Option<u16>) {
    if let Some((host, rest)) =
        addr.strip_prefix('[').and_then(|a| a.split_once(']'))
    {
        return (host, rest.strip_prefix(':').and_then(|p| p.parse().ok()));
    }
    match addr.split_once(':') {
        Some((host, port)) if !port.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (addr, None),
        },
        _ => (addr, None),
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("charset", &self.charset)
            .finish()
    }
}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("missing required environment variable {_0}")]
    MissingVar(&'static str),
    #[display("failed to read config file: {_0}")]
    #[from]
    Read(io::Error),
    #[display("invalid config file: {_0}")]
    #[from]
    Parse(toml::de::Error),
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, (*v).to_owned())).collect()
    }

    fn complete() -> HashMap<&'static str, String> {
        vars(&[
            (Db::USER, "app"),
            (Db::PASSWORD, "secret"),
            (Db::HOST, "db.internal:6432"),
            (Db::NAME, "tickets"),
            (Db::CHARSET, "UTF8"),
        ])
    }

    #[test]
    fn reads_all_database_variables() {
        let env = complete();
        let db = Db::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(db.user, "app");
        assert_eq!(db.host, "db.internal:6432");
        assert_eq!(db.charset, "UTF8");

        let pg = db.to_pg_config();
        assert_eq!(pg.get_ports(), &[6432]);
        assert_eq!(pg.get_dbname(), Some("tickets"));
    }

    #[test]
    fn fails_on_missing_or_empty_variable() {
        let mut env = complete();
        env.remove(Db::HOST);
        let err = Db::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Error::MissingVar(Db::HOST)));

        let mut env = complete();
        env.insert(Db::CHARSET, String::new());
        let err = Db::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Error::MissingVar(Db::CHARSET)));
    }

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("db.internal"), ("db.internal", None));
        assert_eq!(split_host_port("db:6432"), ("db", Some(6432)));
        assert_eq!(split_host_port("::1"), ("::1", None));
        assert_eq!(split_host_port("fe80::2:5432"), ("fe80::2:5432", None));
        assert_eq!(split_host_port("[::1]:6432"), ("::1", Some(6432)));
        assert_eq!(split_host_port("[::1]"), ("::1", None));
    }

    #[test]
    fn reads_bare_ipv6_host() {
        let mut env = complete();
        env.insert(Db::HOST, "::1".to_owned());
        let db = Db::from_lookup(|k| env.get(k).cloned()).unwrap();

        let pg = db.to_pg_config();
        assert_eq!(
            pg.get_hosts(),
            &[tokio_postgres::config::Host::Tcp("::1".to_owned())],
        );
        assert_eq!(pg.get_ports(), &[] as &[u16]);
    }

    #[test]
    fn redacts_password() {
        let env = complete();
        let db = Db::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert!(!format!("{db:?}").contains("secret"));
    }

    #[test]
    fn parses_partial_file() {
        let config = toml::from_str::<Config>(
            r#"
            [http]
            request_timeout = "5s"

            [relay]
            allowed_to = "me@example.org"
            "#,
        )
        .unwrap();
        assert_eq!(config.http.request_timeout, Duration::from_secs(5));
        assert_eq!(config.http.server.addr.port(), 8080);
        assert_eq!(config.relay.allowed_to, "me@example.org");
        assert_eq!(config.relay.allowed_from, "lt-mail@l-tike.com");
        assert_eq!(config.pool.max_size, 10);
    }
}
