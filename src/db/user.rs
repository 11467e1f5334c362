use std::{error::Error as StdError, fmt};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};
use tracing::warn;

use super::Database;

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub password_hash: PasswordHash,
    pub role: Role,
}

impl TryFrom<&Row> for User {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password")?,
            role: row.try_get("role")?,
        })
    }
}

/// First of `candidates` whose password is `secret`.
///
/// Usernames are not guaranteed unique, so every record sharing a name is
/// tried in turn.
pub fn find_verified(candidates: Vec<User>, secret: &str) -> Option<User> {
    candidates
        .into_iter()
        .find(|user| user.password_hash.verify(secret))
}

/// Fields an admin submits when adding or overwriting a user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub password_hash: PasswordHash,
    pub role: Role,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Id(i32);

impl From<i32> for Id {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT4);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i32::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT4);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

/// Role column. Anything other than `admin` or `customer` is kept verbatim
/// and grants neither dashboard.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Customer,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Customer => "customer",
            Self::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "admin" => Self::Admin,
            "customer" => Self::Customer,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        match value {
            Role::Other(role) => role,
            role => role.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql<'_> for Role {
    accepts!(TEXT, VARCHAR, BPCHAR);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        // Fixed-width columns come back space padded.
        let role = <&str>::from_sql(ty, raw)?;
        Ok(Self::from(role.trim_end().to_string()))
    }

    /// A missing role grants nothing.
    fn from_sql_null(
        _: &Type,
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(Self::Other(String::new()))
    }
}

impl ToSql for Role {
    accepts!(TEXT, VARCHAR, BPCHAR);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.as_str().to_sql(ty, out)
    }
}

/// bcrypt hash kept in the `password` column.
#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(secret: &str, cost: u32) -> Result<Self, bcrypt::BcryptError> {
        bcrypt::hash(secret, cost).map(Self)
    }

    pub fn verify(&self, secret: &str) -> bool {
        bcrypt::verify(secret, &self.0).unwrap_or_else(|e| {
            warn!("stored password is not a valid bcrypt hash: {e}");
            false
        })
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT, VARCHAR, BPCHAR);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let hash = <&str>::from_sql(ty, raw)?;
        Ok(Self(hash.trim_end().to_string()))
    }

    /// A missing password never verifies.
    fn from_sql_null(
        _: &Type,
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(Self(String::new()))
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT, VARCHAR, BPCHAR);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

impl Database {
    pub async fn get_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, username, password, role \
                           FROM users \
                           WHERE username = $1 \
                           ORDER BY id \
                           LIMIT 1";
        self.query(SQL, &[&username])
            .await?
            .first()
            .map(User::try_from)
            .transpose()
    }

    /// Every record named `username`, oldest first.
    pub async fn get_users_by_username(
        &mut self,
        username: &str,
    ) -> Result<Vec<User>, Error> {
        const SQL: &str = "SELECT id, username, password, role \
                           FROM users \
                           WHERE username = $1 \
                           ORDER BY id ASC";
        self.query(SQL, &[&username])
            .await?
            .iter()
            .map(User::try_from)
            .collect()
    }

    pub async fn get_user_by_id(
        &mut self,
        id: Id,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, username, password, role \
                           FROM users \
                           WHERE id = $1 \
                           LIMIT 1";
        self.query(SQL, &[&id])
            .await?
            .first()
            .map(User::try_from)
            .transpose()
    }

    pub async fn list_users(&mut self) -> Result<Vec<User>, Error> {
        const SQL: &str = "SELECT id, username, password, role \
                           FROM users \
                           ORDER BY id ASC";
        self.query(SQL, &[])
            .await?
            .iter()
            .map(User::try_from)
            .collect()
    }

    /// Returns the generated id.
    pub async fn insert_user(
        &mut self,
        user: &NewUser,
    ) -> Result<Option<Id>, Error> {
        const SQL: &str = "\
            INSERT INTO users (username, password, role) \
            VALUES ($1, $2, $3) \
            RETURNING id";
        self.query(SQL, &[&user.username, &user.password_hash, &user.role])
            .await?
            .first()
            .map(|row| row.try_get("id"))
            .transpose()
    }

    pub async fn update_user(
        &mut self,
        id: Id,
        user: &NewUser,
    ) -> Result<u64, Error> {
        const SQL: &str = "\
            UPDATE users \
            SET username = $1, \
                password = $2, \
                role = $3 \
            WHERE id = $4";
        self.execute(
            SQL,
            &[&user.username, &user.password_hash, &user.role, &id],
        )
        .await
    }

    pub async fn delete_user(&mut self, id: Id) -> Result<u64, Error> {
        const SQL: &str = "DELETE FROM users WHERE id = $1";
        self.execute(SQL, &[&id]).await
    }
}
