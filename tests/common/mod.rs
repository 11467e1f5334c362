//! Helpers for end-to-end tests.
//!
//! They drive a server already listening on [`BASE_URL`] and seed users
//! directly into the database named by the same configuration file the
//! server reads (`ROSTER_CONFIG`, or `config.toml`).

use std::{env, fs};

use reqwest::{header, redirect, StatusCode};
use roster::{
    auth,
    db::{self, user},
    Config,
};
use uuid::Uuid;

pub const BASE_URL: &str = "http://localhost:3000";

pub fn config() -> Config {
    let path =
        env::var("ROSTER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = fs::read_to_string(path).expect("failed to read config");
    toml::from_str(&config).expect("failed to parse config")
}

/// Cookie the server hands assertions out in.
pub fn cookie_name() -> &'static str {
    auth::from_config(&config().auth).cookie_name()
}

pub fn is_session_mode() -> bool {
    matches!(config().auth, roster::config::Auth::Session { .. })
}

/// Name that no other test run uses.
pub fn unique(name: &str) -> String {
    format!("{name}-{}", Uuid::new_v4().simple())
}

/// Inserts a user without going through the admin pages.
pub async fn seed_user(
    username: &str,
    password: &str,
    role: &str,
) -> user::Id {
    let mut db = db::Database::new(config().db.pg_config());
    let id = db
        .insert_user(&user::NewUser {
            username: username.to_string(),
            password_hash: user::PasswordHash::new(password, 4)
                .expect("failed to hash password"),
            role: user::Role::from(role.to_string()),
        })
        .await
        .expect("failed to insert user")
        .expect("no id returned");
    db.disconnect();
    id
}

#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub location: Option<String>,
    pub set_cookie: Option<String>,
    pub body: String,
}

impl Reply {
    pub fn redirects_to(&self, path: &str) -> bool {
        self.status.is_redirection() && self.location.as_deref() == Some(path)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("response is not JSON")
    }
}

/// Row of the admin dashboard table.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: user::Id,
    pub username: String,
    pub role: String,
}

pub fn rows(html: &str) -> Vec<Row> {
    html.split("<tr data-id=\"")
        .skip(1)
        .map(|chunk| {
            let (id, rest) = chunk.split_once('"').expect("unterminated id");
            let rest = rest
                .strip_prefix(" data-username=\"")
                .expect("missing username");
            let (username, rest) =
                rest.split_once('"').expect("unterminated username");
            let rest =
                rest.strip_prefix(" data-role=\"").expect("missing role");
            let (role, _) = rest.split_once('"').expect("unterminated role");
            Row {
                id: user::Id::from(id.parse::<i32>().expect("invalid id")),
                username: username.to_string(),
                role: role.to_string(),
            }
        })
        .collect()
}

/// Sends its assertion as a Bearer header, and `cookie` verbatim as the
/// `Cookie` header.
pub struct Client {
    inner: reqwest::Client,
    pub assertion: Option<String>,
    pub cookie: Option<String>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::builder()
                .redirect(redirect::Policy::none())
                .build()
                .expect("failed to build a client"),
            assertion: None,
            cookie: None,
        }
    }

    /// Carries the assertion in its cookie instead of the header.
    pub fn via_cookie(mut self) -> Self {
        self.cookie = self
            .assertion
            .take()
            .map(|assertion| format!("{}={assertion}", cookie_name()));
        self
    }

    /// Signs in, panicking when the credentials are refused.
    pub async fn login(mut self, username: &str, password: &str) -> Self {
        let reply = self.try_login(username, password).await;
        assert!(reply.status.is_redirection(), "login refused: {reply:?}");
        self.assertion = Some(
            reply
                .set_cookie
                .as_deref()
                .and_then(|cookie| cookie.split(';').next())
                .and_then(|pair| pair.split_once('='))
                .map(|(_, value)| value.to_string())
                .expect("no assertion cookie"),
        );
        self
    }

    pub async fn try_login(&self, username: &str, password: &str) -> Reply {
        self.post(
            "/login",
            &[("username", username), ("password", password)],
        )
        .await
    }

    pub async fn get(&self, path: &str) -> Reply {
        self.send(self.inner.get(format!("{BASE_URL}{path}"))).await
    }

    pub async fn post(&self, path: &str, form: &[(&str, &str)]) -> Reply {
        self.send(self.inner.post(format!("{BASE_URL}{path}")).form(form))
            .await
    }

    async fn send(&self, mut req: reqwest::RequestBuilder) -> Reply {
        if let Some(assertion) = &self.assertion {
            req = req.bearer_auth(assertion);
        }
        if let Some(cookie) = &self.cookie {
            req = req.header(header::COOKIE, cookie);
        }
        reply(req.send().await.expect("failed to send a request")).await
    }

    pub async fn admin_rows(&self) -> Vec<Row> {
        let reply = self.get("/admin/dashboard").await;
        assert_eq!(reply.status, StatusCode::OK, "{reply:?}");
        rows(&reply.body)
    }

    pub async fn add_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> Reply {
        self.post(
            "/admin/add_user",
            &[
                ("username", username),
                ("password", password),
                ("role", role),
            ],
        )
        .await
    }

    pub async fn edit_user(
        &self,
        id: user::Id,
        username: &str,
        password: &str,
        role: &str,
    ) -> Reply {
        self.post(
            &format!("/admin/edit_user/{id}"),
            &[
                ("username", username),
                ("password", password),
                ("role", role),
            ],
        )
        .await
    }

    pub async fn delete_user(&self, id: user::Id) -> Reply {
        self.get(&format!("/admin/delete_user/{id}")).await
    }
}

async fn reply(res: reqwest::Response) -> Reply {
    let get_header = |name: header::HeaderName| {
        res.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let location = get_header(header::LOCATION);
    let set_cookie = get_header(header::SET_COOKIE);
    Reply {
        status: res.status(),
        location,
        set_cookie,
        body: res.text().await.expect("failed to get a response"),
    }
}
