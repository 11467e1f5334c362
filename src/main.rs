use std::{env, error::Error, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    extract::cookie::{Cookie, CookieJar, SameSite},
    TypedHeader,
};
use derive_more::From;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::json;
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use roster::{
    auth::{self, Assertions},
    db::{self, user},
    views, Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        env::var("ROSTER_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = fs::read_to_string(&config_path).await?;
    let config = toml::from_str::<Config>(&config)?;

    // Only proves the credentials work, requests open their own connection.
    let db_config = config.db.pg_config();
    let mut db = db::Database::new(db_config.clone());
    db.connect().await?;
    db.disconnect();
    info!(
        "database {} at {}:{} is reachable",
        config.db.dbname, config.db.host, config.db.port
    );

    let allowed_origins = config
        .http
        .cors
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_origin(allowed_origins);

    let app = Router::new()
        .route("/", get(home))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/customer/dashboard", get(customer_dashboard))
        .route("/admin/dashboard", get(admin_dashboard))
        .route("/admin/add_user", get(add_user_form).post(add_user))
        .route("/admin/edit_user/:id", get(edit_user_form).post(edit_user))
        .route("/admin/delete_user/:id", get(delete_user))
        .route("/protected", get(protected))
        .layer(cors)
        .with_state(Arc::new(AppState {
            db_config,
            assertions: auth::from_config(&config.auth),
            password_cost: config.password.cost,
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    info!("listening on {}", config.http.server.addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn home(caller: Option<Caller>) -> Redirect {
    match caller {
        Some(Caller(identity)) => Redirect::to(dashboard_for(&identity.role)),
        None => Redirect::to("/login"),
    }
}

fn dashboard_for(role: &user::Role) -> &'static str {
    match role {
        user::Role::Admin => "/admin/dashboard",
        _ => "/customer/dashboard",
    }
}

async fn login_form() -> Html<String> {
    Html(views::login(None))
}

#[derive(Deserialize)]
struct LoginInput {
    username: String,
    password: String,
}

async fn login(
    State(state): State<SharedAppState>,
    jar: CookieJar,
    Form(LoginInput { username, password }): Form<LoginInput>,
) -> Result<Response, LoginError> {
    let mut db = state.database();
    let candidates = db.get_users_by_username(&username).await?;
    db.disconnect();

    let user = task::spawn_blocking(move || {
        user::find_verified(candidates, &password)
    })
    .await?;
    let Some(user) = user else {
        info!(%username, "login failed");
        let page = views::login(Some("Invalid username or password"));
        return Ok(Html(page).into_response());
    };

    let assertion = state
        .assertions
        .issue(auth::Identity {
            username: user.username.clone(),
            role: user.role.clone(),
        })
        .await?;
    info!(username = %user.username, role = %user.role, "signed in");

    let cookie = Cookie::build((state.assertions.cookie_name(), assertion))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok((jar.add(cookie), Redirect::to(dashboard_for(&user.role)))
        .into_response())
}

#[derive(Debug, From)]
pub enum LoginError {
    #[from]
    DbError(db::Error),
    #[from]
    Assertion(auth::Error),
    #[from]
    Blocking(task::JoinError),
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        error!("login failed: {self:?}");
        match self {
            Self::DbError(_) | Self::Assertion(_) | Self::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

async fn logout(
    State(state): State<SharedAppState>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let name = state.assertions.cookie_name();
    if let Some(cookie) = jar.get(name) {
        state.assertions.revoke(cookie.value()).await;
    }
    (jar.remove(Cookie::build(name).path("/")), Redirect::to("/login"))
}

async fn customer_dashboard(
    State(state): State<SharedAppState>,
    caller: Caller,
) -> Result<Html<String>, CustomerDashboardError> {
    use CustomerDashboardError as E;

    let me = caller.require(user::Role::Customer)?;

    let mut db = state.database();
    let user = db
        .get_user_by_username(&me.username)
        .await?
        .ok_or(E::UserNotFound)?;
    db.disconnect();

    Ok(Html(views::customer_dashboard(&user)))
}

#[derive(Debug, From)]
pub enum CustomerDashboardError {
    #[from]
    Auth(AuthError),
    #[from]
    DbError(db::Error),
    UserNotFound,
}

impl IntoResponse for CustomerDashboardError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            // The record behind a still valid assertion is gone.
            Self::UserNotFound => Redirect::to("/login").into_response(),
            Self::DbError(e) => {
                error!("customer dashboard failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

async fn admin_dashboard(
    State(state): State<SharedAppState>,
    caller: Caller,
) -> Result<Html<String>, AdminError> {
    caller.require(user::Role::Admin)?;

    let mut db = state.database();
    let users = db.list_users().await?;
    db.disconnect();

    Ok(Html(views::admin_dashboard(&users)))
}

async fn add_user_form(caller: Caller) -> Result<Html<String>, AdminError> {
    caller.require(user::Role::Admin)?;

    Ok(Html(views::add_user()))
}

#[derive(Deserialize)]
struct UserInput {
    username: String,
    password: String,
    role: user::Role,
}

impl UserInput {
    async fn into_new_user(
        self,
        cost: u32,
    ) -> Result<user::NewUser, AdminError> {
        let Self {
            username,
            password,
            role,
        } = self;
        let password_hash = task::spawn_blocking(move || {
            user::PasswordHash::new(&password, cost)
        })
        .await??;
        Ok(user::NewUser {
            username,
            password_hash,
            role,
        })
    }
}

async fn add_user(
    State(state): State<SharedAppState>,
    caller: Caller,
    Form(input): Form<UserInput>,
) -> Result<Redirect, AdminError> {
    let me = caller.require(user::Role::Admin)?;

    let user = input.into_new_user(state.password_cost).await?;

    let mut db = state.database();
    let id = db.insert_user(&user).await?;
    db.disconnect();

    info!(
        admin = %me.username,
        ?id,
        username = %user.username,
        role = %user.role,
        "user added"
    );

    Ok(Redirect::to("/admin/dashboard"))
}

async fn edit_user_form(
    State(state): State<SharedAppState>,
    caller: Caller,
    Path(id): Path<user::Id>,
) -> Result<Html<String>, AdminError> {
    use AdminError as E;

    caller.require(user::Role::Admin)?;

    let mut db = state.database();
    let user = db.get_user_by_id(id).await?.ok_or(E::UserNotFound)?;
    db.disconnect();

    Ok(Html(views::edit_user(&user)))
}

async fn edit_user(
    State(state): State<SharedAppState>,
    caller: Caller,
    Path(id): Path<user::Id>,
    Form(input): Form<UserInput>,
) -> Result<Redirect, AdminError> {
    let me = caller.require(user::Role::Admin)?;

    let user = input.into_new_user(state.password_cost).await?;

    let mut db = state.database();
    let updated = db.update_user(id, &user).await?;
    db.disconnect();

    info!(
        admin = %me.username,
        %id,
        username = %user.username,
        role = %user.role,
        updated,
        "user edited"
    );

    Ok(Redirect::to("/admin/dashboard"))
}

async fn delete_user(
    State(state): State<SharedAppState>,
    caller: Caller,
    Path(id): Path<user::Id>,
) -> Result<Redirect, AdminError> {
    let me = caller.require(user::Role::Admin)?;

    let mut db = state.database();
    let deleted = db.delete_user(id).await?;
    db.disconnect();

    info!(admin = %me.username, %id, deleted, "user deleted");

    Ok(Redirect::to("/admin/dashboard"))
}

#[derive(Debug, From)]
pub enum AdminError {
    #[from]
    Auth(AuthError),
    #[from]
    Blocking(task::JoinError),
    #[from]
    DbError(db::Error),
    #[from]
    PasswordHash(bcrypt::BcryptError),
    UserNotFound,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::UserNotFound => StatusCode::NOT_FOUND.into_response(),
            e @ (Self::Blocking(_)
            | Self::DbError(_)
            | Self::PasswordHash(_)) => {
                error!("admin request failed: {e:?}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

async fn protected(
    BearerClaims(claims): BearerClaims,
) -> Json<serde_json::Value> {
    info!(
        username = %claims.username,
        role = %claims.role,
        exp = claims.exp,
        "token decoded"
    );

    Json(json!({
        "message": "Access granted",
        "decoded": claims,
    }))
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_config: tokio_postgres::Config,

    assertions: Arc<dyn Assertions>,

    password_cost: u32,
}

impl AppState {
    fn database(&self) -> db::Database {
        db::Database::new(self.db_config.clone())
    }
}

/// Verified identity of whoever sent the request.
///
/// The assertion is taken from a Bearer `Authorization` header, falling back
/// to the assertion cookie.
struct Caller(auth::Identity);

impl Caller {
    fn require(self, role: user::Role) -> Result<auth::Identity, AuthError> {
        if self.0.role == role {
            Ok(self.0)
        } else {
            Err(AuthError::WrongRole)
        }
    }
}

#[async_trait]
impl FromRequestParts<SharedAppState> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let assertion = match parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
        {
            Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_owned(),
            Err(_) => CookieJar::from_headers(&parts.headers)
                .get(state.assertions.cookie_name())
                .map(|cookie| cookie.value().to_owned())
                .ok_or(AuthError::MissingAssertion)?,
        };
        let claims = state.assertions.recover(&assertion).await?;

        Ok(Self(claims.identity()))
    }
}

#[derive(Debug, From)]
pub enum AuthError {
    MissingAssertion,
    #[from]
    Rejected(auth::Error),
    WrongRole,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        debug!("redirecting to login: {self:?}");
        Redirect::to("/login").into_response()
    }
}

/// Claims of the Bearer token in the `Authorization` header; cookies are
/// not consulted.
struct BearerClaims(auth::Claims);

#[async_trait]
impl FromRequestParts<SharedAppState> for BearerClaims {
    type Rejection = ProtectedError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(ProtectedError::MissingToken)?
            .to_str()
            .map_err(|_| auth::Error::Invalid)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        let claims = state.assertions.recover(token).await?;

        Ok(Self(claims))
    }
}

#[derive(Debug, From)]
pub enum ProtectedError {
    MissingToken,
    #[from]
    Rejected(auth::Error),
}

impl IntoResponse for ProtectedError {
    fn into_response(self) -> Response {
        let error = match self {
            Self::MissingToken => "Missing token".to_string(),
            Self::Rejected(e) => e.to_string(),
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": error })))
            .into_response()
    }
}
