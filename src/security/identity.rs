//! Caller identity resolution.
//!
//! # Responsibilities
//! - Turn request credentials into an `Identity` (role + assigned team)
//! - Fail closed: a credential that is present but unverifiable is a 401
//!
//! # Design Decisions
//! - Resolution sits behind `IdentityResolver` so the dispatcher never
//!   depends on a credential format
//! - No credential at all resolves to the PUBLIC identity; route access
//!   policy decides whether that is enough

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// Caller role, ordered from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Admin,
    Teacher,
    Team,
    Student,
    Public,
}

impl Role {
    /// Parse an authority string such as `ROLE_TEAM` or `admin`.
    pub fn from_authority(raw: &str) -> Option<Self> {
        let name = raw.trim();
        let name = name.strip_prefix("ROLE_").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "TEACHER" => Some(Role::Teacher),
            "TEAM" => Some(Role::Team),
            "STUDENT" => Some(Role::Student),
            _ => None,
        }
    }

    /// Admin and teacher may address any team.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Team => "TEAM",
            Role::Student => "STUDENT",
            Role::Public => "PUBLIC",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub role: Role,
    team_id: Option<String>,
}

impl Identity {
    pub fn new(role: Role, team_id: Option<String>) -> Self {
        Self {
            username: None,
            user_id: None,
            role,
            team_id: normalize_team(team_id),
        }
    }

    /// An unauthenticated caller.
    pub fn public() -> Self {
        Self::new(Role::Public, None)
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// The assigned team; `None` when unassigned.
    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn is_public(&self) -> bool {
        self.role == Role::Public
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }

    /// Label for logs.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }
}

/// `"0"` and empty strings mean "no team".
fn normalize_team(team_id: Option<String>) -> Option<String> {
    team_id
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "0")
}

/// Resolves the caller of a request from its headers.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> GatewayResult<Identity>;
}

/// Claims minted by the credential issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(rename = "teamId", default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Value>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: u64,
}

impl Claims {
    /// Most privileged recognised role across `roles` and `role`.
    pub fn effective_role(&self) -> Option<Role> {
        self.roles
            .iter()
            .map(String::as_str)
            .chain(self.role.as_deref())
            .filter_map(Role::from_authority)
            .min()
    }
}

/// Scalar claim as text (`5` and `"5"` both become `"5"`).
fn claim_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Verifies HS256 bearer tokens with a shared secret.
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    fn verify(&self, token: &str) -> GatewayResult<Identity> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            GatewayError::unauthenticated("Invalid or expired token")
        })?;
        let claims = data.claims;

        let role = claims
            .effective_role()
            .ok_or_else(|| GatewayError::unauthenticated("Token carries no recognized role"))?;

        let mut identity = Identity::new(role, claim_text(claims.team_id.as_ref()))
            .with_username(claims.sub);
        identity.user_id = claim_text(claims.user_id.as_ref());
        Ok(identity)
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> GatewayResult<Identity> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(Identity::public());
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::unauthenticated("Malformed Authorization header"))?;
        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-test-secret-test-secret";

    fn now() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    fn token(claims: Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn missing_header_is_public() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let identity = resolver.resolve(&HeaderMap::new()).unwrap();
        assert!(identity.is_public());
        assert_eq!(identity.team_id(), None);
    }

    #[test]
    fn valid_token_yields_role_and_team() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let jwt = token(
            json!({"sub": "team7", "userId": 12, "teamId": 7, "roles": ["ROLE_TEAM"], "exp": now() + 600}),
            SECRET,
        );
        let identity = resolver.resolve(&bearer(&jwt)).unwrap();
        assert_eq!(identity.role, Role::Team);
        assert_eq!(identity.team_id(), Some("7"));
        assert_eq!(identity.user_id.as_deref(), Some("12"));
        assert_eq!(identity.display_name(), "team7");
    }

    #[test]
    fn most_privileged_role_wins() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let jwt = token(
            json!({"sub": "t", "roles": ["ROLE_STUDENT", "ROLE_TEACHER"], "exp": now() + 600}),
            SECRET,
        );
        let identity = resolver.resolve(&bearer(&jwt)).unwrap();
        assert_eq!(identity.role, Role::Teacher);
        assert!(identity.is_privileged());
    }

    #[test]
    fn team_zero_means_unassigned() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let jwt = token(
            json!({"sub": "s", "teamId": "0", "role": "STUDENT", "exp": now() + 600}),
            SECRET,
        );
        let identity = resolver.resolve(&bearer(&jwt)).unwrap();
        assert_eq!(identity.role, Role::Student);
        assert_eq!(identity.team_id(), None);
    }

    #[test]
    fn bad_signature_fails_closed() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let jwt = token(
            json!({"sub": "x", "roles": ["ROLE_ADMIN"], "exp": now() + 600}),
            "some-other-secret-some-other-secret",
        );
        let err = resolver.resolve(&bearer(&jwt)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn expired_token_fails_closed() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let jwt = token(
            json!({"sub": "x", "roles": ["ROLE_ADMIN"], "exp": now() - 3600}),
            SECRET,
        );
        assert!(resolver.resolve(&bearer(&jwt)).is_err());
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        let err = resolver.resolve(&headers).unwrap_err();
        assert_eq!(err.message(), "Malformed Authorization header");
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let resolver = JwtIdentityResolver::new(SECRET);
        let jwt = token(
            json!({"sub": "x", "roles": ["ROLE_GUEST"], "exp": now() + 600}),
            SECRET,
        );
        assert!(resolver.resolve(&bearer(&jwt)).is_err());
    }

    #[test]
    fn authority_parsing() {
        assert_eq!(Role::from_authority("ROLE_ADMIN"), Some(Role::Admin));
        assert_eq!(Role::from_authority("teacher"), Some(Role::Teacher));
        assert_eq!(Role::from_authority("ROLE_PUBLIC"), None);
        assert!(!Role::Team.is_privileged());
    }
}
