//! Operations on the most recently created game.
//!
//! The engine has no notion of a "current" game; the latest one is the
//! entry with the greatest `created_at` in `GET /games?limit=100`.

use axum::http::{header, HeaderMap, Method, StatusCode};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::routing::GameAction;
use crate::upstream::client::{OutboundRequest, UpstreamClient, UpstreamReply};

const LATEST_GAME_SCAN: &str = "limit=100";

/// Pick the game with the greatest `created_at`; entries without one are ignored.
pub fn latest_game(listing: &Value) -> Option<&Value> {
    listing
        .get("games")?
        .as_array()?
        .iter()
        .filter_map(|game| {
            let created = match game.get("created_at")? {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((created, game))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, game)| game)
}

fn game_id(game: &Value) -> GatewayResult<String> {
    match game.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(GatewayError::internal("latest game has no id")),
    }
}

impl UpstreamClient {
    /// Fetch the latest game, if any.
    pub async fn find_latest_game(&self, headers: &HeaderMap) -> GatewayResult<Option<Value>> {
        let reply = self
            .forward(
                OutboundRequest::new(Method::GET, "/games")
                    .with_query(Some(LATEST_GAME_SCAN.to_string()))
                    .with_headers(headers.clone()),
            )
            .await?;

        let latest = reply.as_json().and_then(latest_game).cloned();
        if latest.is_none() {
            tracing::info!("No game found in upstream listing");
        }
        Ok(latest)
    }

    /// Run `action` against the latest game.
    ///
    /// `headers` are the already-filtered forwarded headers of the inbound request.
    pub async fn current_game(
        &self,
        action: GameAction,
        headers: &HeaderMap,
    ) -> GatewayResult<UpstreamReply> {
        let mut headers = headers.clone();
        headers.remove(header::CONTENT_TYPE);

        let game = self.find_latest_game(&headers).await?;

        match (action, game) {
            (GameAction::Start, None) => {
                Err(GatewayError::conflict("No active game found to start"))
            }
            (GameAction::Stop, None) => Err(GatewayError::conflict("No active game found to stop")),
            (GameAction::Status | GameAction::Scoreboard, None) => {
                Err(GatewayError::not_found("No active game"))
            }
            (GameAction::Status, Some(game)) => Ok(UpstreamReply::json(StatusCode::OK, game)),
            (GameAction::Start, Some(game)) | (GameAction::Stop, Some(game)) => {
                let verb = if action == GameAction::Start { "start" } else { "stop" };
                let id = game_id(&game)?;
                tracing::info!(game_id = %id, action = verb, "Controlling current game");
                self.forward(
                    OutboundRequest::new(Method::POST, format!("/games/{}/{}", id, verb))
                        .with_headers(headers),
                )
                .await
            }
            (GameAction::Scoreboard, Some(game)) => {
                let id = game_id(&game)?;
                self.forward(
                    OutboundRequest::new(Method::GET, format!("/scoreboard/{}", id))
                        .with_headers(headers),
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn latest_is_greatest_created_at() {
        let listing = json!({"games": [
            {"id": "a", "created_at": "2026-01-01T10:00:00"},
            {"id": "c", "created_at": "2026-03-01T10:00:00"},
            {"id": "b", "created_at": "2026-02-01T10:00:00"},
            {"id": "z"}
        ]});
        assert_eq!(latest_game(&listing).unwrap()["id"], json!("c"));
    }

    #[test]
    fn empty_or_malformed_listing_has_no_latest() {
        assert!(latest_game(&json!({"games": []})).is_none());
        assert!(latest_game(&json!({"games": "nope"})).is_none());
        assert!(latest_game(&json!({})).is_none());
        assert!(latest_game(&json!({"games": [{"id": "x", "created_at": null}]})).is_none());
    }

    #[test]
    fn numeric_game_ids_are_accepted() {
        assert_eq!(game_id(&json!({"id": 7})).unwrap(), "7");
        assert!(game_id(&json!({"name": "x"})).is_err());
    }
}
