//! Team isolation for team-scoped callers.
//!
//! A TEAM or STUDENT caller may only act on its own team. Whatever carries
//! the team (JSON body, query string, response document) implements
//! `TeamScoped`, and `enforce` applies one rule to all of them.

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::{GatewayError, GatewayResult};
use crate::security::identity::Identity;

/// Something with a named team field that can be read and overwritten.
pub trait TeamScoped {
    /// The field's value as text; `None` when absent or null.
    fn team_field(&self, field: &str) -> Option<String>;

    fn set_team_field(&mut self, field: &str, team: &str);
}

impl TeamScoped for Map<String, Value> {
    fn team_field(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn set_team_field(&mut self, field: &str, team: &str) {
        self.insert(field.to_string(), Value::String(team.to_string()));
    }
}

/// Ordered, decoded query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let pairs = query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self(pairs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Re-encode; `None` when there are no parameters.
    pub fn to_query_string(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.0 {
            serializer.append_pair(k, v);
        }
        Some(serializer.finish())
    }
}

impl TeamScoped for QueryParams {
    fn team_field(&self, field: &str) -> Option<String> {
        self.get(field).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// Replaces every occurrence so a repeated parameter cannot smuggle a second team.
    fn set_team_field(&mut self, field: &str, team: &str) {
        self.0.retain(|(k, _)| k != field);
        self.0.push((field.to_string(), team.to_string()));
    }
}

/// Apply team isolation to `target`.
///
/// Privileged callers pass untouched. Otherwise the caller must have a team,
/// any team already in `field` must be the caller's, and `field` is then
/// set to the caller's team.
pub fn enforce<T: TeamScoped + ?Sized>(
    identity: &Identity,
    target: &mut T,
    field: &str,
) -> GatewayResult<()> {
    if identity.is_privileged() {
        return Ok(());
    }

    let team = require_team(identity)?;
    if let Some(requested) = target.team_field(field) {
        if requested != team {
            tracing::warn!(
                user = identity.display_name(),
                team,
                requested = %requested,
                "Cross-team access attempt rejected"
            );
            return Err(GatewayError::forbidden("Cannot act on behalf of other teams"));
        }
    }

    target.set_team_field(field, team);
    Ok(())
}

/// Check a value that cannot be rewritten, such as a path segment.
pub fn enforce_value(identity: &Identity, requested: &str) -> GatewayResult<()> {
    if identity.is_privileged() {
        return Ok(());
    }
    let team = require_team(identity)?;
    if requested != team {
        tracing::warn!(
            user = identity.display_name(),
            team,
            requested,
            "Cross-team access attempt rejected"
        );
        return Err(GatewayError::forbidden("Cannot act on behalf of other teams"));
    }
    Ok(())
}

/// Check that a fetched document belongs to the caller's team.
///
/// A document without the field is not proven to be the caller's and is refused.
pub fn enforce_owner<T: TeamScoped + ?Sized>(
    identity: &Identity,
    document: &T,
    field: &str,
) -> GatewayResult<()> {
    if identity.is_privileged() {
        return Ok(());
    }
    let team = require_team(identity)?;
    match document.team_field(field) {
        Some(owner) if owner == team => Ok(()),
        _ => {
            tracing::warn!(
                user = identity.display_name(),
                team,
                "Read of another team's resource rejected"
            );
            Err(GatewayError::forbidden("Cannot access resources of other teams"))
        }
    }
}

fn require_team(identity: &Identity) -> GatewayResult<&str> {
    identity.team_id().ok_or_else(|| {
        tracing::warn!(
            user = identity.display_name(),
            "Caller is not assigned to any team"
        );
        GatewayError::forbidden("You are not assigned to any team")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::security::identity::Role;
    use serde_json::json;

    fn team(id: &str) -> Identity {
        Identity::new(Role::Team, Some(id.to_string()))
    }

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn matching_team_passes_unchanged() {
        let mut payload = body(json!({"team_id": "5", "flag": "FLAG{x}"}));
        enforce(&team("5"), &mut payload, "team_id").unwrap();
        assert_eq!(payload["team_id"], json!("5"));
        assert_eq!(payload["flag"], json!("FLAG{x}"));
    }

    #[test]
    fn numeric_team_compares_textually() {
        let mut payload = body(json!({"team_id": 5}));
        enforce(&team("5"), &mut payload, "team_id").unwrap();
        assert_eq!(payload["team_id"], json!("5"));
    }

    #[test]
    fn mismatched_team_is_forbidden() {
        let mut payload = body(json!({"team_id": "9"}));
        let err = enforce(&team("5"), &mut payload, "team_id").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(payload["team_id"], json!("9"));
    }

    #[test]
    fn absent_team_is_filled() {
        let mut payload = body(json!({"flag": "FLAG{x}"}));
        enforce(&team("5"), &mut payload, "team_id").unwrap();
        assert_eq!(payload["team_id"], json!("5"));
    }

    #[test]
    fn unassigned_caller_is_forbidden() {
        let student = Identity::new(Role::Student, Some("0".to_string()));
        let mut payload = body(json!({}));
        let err = enforce(&student, &mut payload, "team_id").unwrap_err();
        assert_eq!(err.message(), "You are not assigned to any team");
    }

    #[test]
    fn privileged_caller_may_address_any_team() {
        let admin = Identity::new(Role::Admin, None);
        let mut payload = body(json!({"team_id": "9"}));
        enforce(&admin, &mut payload, "team_id").unwrap();
        assert_eq!(payload["team_id"], json!("9"));

        let mut empty = body(json!({}));
        enforce(&Identity::new(Role::Teacher, None), &mut empty, "team_id").unwrap();
        assert!(empty.get("team_id").is_none());
    }

    #[test]
    fn query_team_is_overridden_once() {
        let mut query = QueryParams::parse(Some("game_id=g1&team_id=5&team_id=5"));
        enforce(&team("5"), &mut query, "team_id").unwrap();
        assert_eq!(
            query.to_query_string().as_deref(),
            Some("game_id=g1&team_id=5")
        );

        let mut foreign = QueryParams::parse(Some("team_id=6"));
        assert!(enforce(&team("5"), &mut foreign, "team_id").is_err());

        let mut none = QueryParams::parse(None);
        enforce(&team("5"), &mut none, "team_id").unwrap();
        assert_eq!(none.to_query_string().as_deref(), Some("team_id=5"));
    }

    #[test]
    fn path_value_must_match() {
        assert!(enforce_value(&team("5"), "5").is_ok());
        assert!(enforce_value(&team("5"), "6").is_err());
        assert!(enforce_value(&Identity::new(Role::Admin, None), "6").is_ok());
    }

    #[test]
    fn owner_check_requires_matching_field() {
        let own = body(json!({"id": 1, "team_id": 5}));
        let other = body(json!({"id": 2, "team_id": "6"}));
        let unowned = body(json!({"id": 3}));

        assert!(enforce_owner(&team("5"), &own, "team_id").is_ok());
        assert!(enforce_owner(&team("5"), &other, "team_id").is_err());
        assert!(enforce_owner(&team("5"), &unowned, "team_id").is_err());
        assert!(enforce_owner(&Identity::new(Role::Teacher, None), &other, "team_id").is_ok());
    }
}
