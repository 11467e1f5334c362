use std::{net, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    #[serde(default)]
    pub db: Db,
    pub http: Http,
    pub auth: Auth,
    #[serde(default)]
    pub password: Password,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Db {
    #[serde(default = "Db::default_host")]
    pub host: String,
    #[serde(default = "Db::default_port")]
    pub port: u16,
    #[serde(default = "Db::default_dbname")]
    pub dbname: String,
    #[serde(default = "Db::default_user")]
    pub user: String,
    pub password: Option<String>,
}

impl Db {
    fn default_host() -> String {
        "localhost".into()
    }

    fn default_port() -> u16 {
        5432
    }

    fn default_dbname() -> String {
        "employee_db".into()
    }

    fn default_user() -> String {
        "postgres".into()
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

impl Default for Db {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            dbname: Self::default_dbname(),
            user: Self::default_user(),
            password: None,
        }
    }
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    #[serde(default)]
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Default, Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

/// How signed-in identities are carried between requests.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode")]
pub enum Auth {
    /// Self-contained signed token, nothing is kept on the server.
    Token {
        secret: String,
        #[serde(
            default = "default_expiration_time",
            with = "humantime_serde"
        )]
        expiration_time: time::Duration,
    },

    /// Opaque session id, the identity lives in server memory.
    Session {
        #[serde(
            default = "default_expiration_time",
            with = "humantime_serde"
        )]
        expiration_time: time::Duration,
    },
}

impl Auth {
    pub fn expiration_time(&self) -> time::Duration {
        match self {
            Self::Token {
                expiration_time, ..
            }
            | Self::Session { expiration_time } => *expiration_time,
        }
    }
}

fn default_expiration_time() -> time::Duration {
    time::Duration::from_secs(60 * 60)
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Password {
    /// bcrypt work factor for newly stored passwords.
    pub cost: u32,
}

impl Default for Password {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}
