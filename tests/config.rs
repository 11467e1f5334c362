use std::time::Duration;

use roster::{config, Config};
use tokio_postgres::config::Host;

const MINIMAL: &str = r#"
[http.server]
addr = "127.0.0.1:3000"

[auth]
mode = "token"
secret = "s3cret"
"#;

#[test]
fn fills_in_defaults() {
    let config = toml::from_str::<Config>(MINIMAL).unwrap();

    assert_eq!(config.db.host, "localhost");
    assert_eq!(config.db.port, 5432);
    assert_eq!(config.db.dbname, "employee_db");
    assert_eq!(config.db.user, "postgres");
    assert_eq!(config.db.password, None);
    assert!(config.http.cors.allowed_origins.is_empty());
    assert_eq!(config.auth.expiration_time(), Duration::from_secs(60 * 60));
    assert_eq!(config.password.cost, bcrypt::DEFAULT_COST);
    match config.auth {
        config::Auth::Token { secret, .. } => assert_eq!(secret, "s3cret"),
        config::Auth::Session { .. } => panic!("expected token mode"),
    }
}

#[test]
fn reads_session_mode() {
    let config = toml::from_str::<Config>(
        r#"
        [http.server]
        addr = "0.0.0.0:8080"

        [auth]
        mode = "session"
        expiration_time = "30m"

        [password]
        cost = 4
        "#,
    )
    .unwrap();

    assert!(matches!(config.auth, config::Auth::Session { .. }));
    assert_eq!(config.auth.expiration_time(), Duration::from_secs(30 * 60));
    assert_eq!(config.password.cost, 4);
    assert_eq!(config.http.server.addr.port(), 8080);
}

#[test]
fn token_mode_requires_secret() {
    let res = toml::from_str::<Config>(
        r#"
        [http.server]
        addr = "127.0.0.1:3000"

        [auth]
        mode = "token"
        "#,
    );

    assert!(res.is_err());
}

#[test]
fn rejects_unknown_mode() {
    let res = toml::from_str::<Config>(
        r#"
        [http.server]
        addr = "127.0.0.1:3000"

        [auth]
        mode = "basic"
        "#,
    );

    assert!(res.is_err());
}

#[test]
fn builds_connection_parameters() {
    let config = toml::from_str::<Config>(
        r#"
        [db]
        host = "db.internal"
        port = 6543
        dbname = "staff"
        user = "roster"
        password = "hunter2"

        [http.server]
        addr = "127.0.0.1:3000"

        [auth]
        mode = "session"
        "#,
    )
    .unwrap();

    let pg = config.db.pg_config();
    assert_eq!(pg.get_hosts(), [Host::Tcp("db.internal".into())]);
    assert_eq!(pg.get_ports(), [6543]);
    assert_eq!(pg.get_dbname(), Some("staff"));
    assert_eq!(pg.get_user(), Some("roster"));
    assert_eq!(pg.get_password(), Some(&b"hunter2"[..]));
}
