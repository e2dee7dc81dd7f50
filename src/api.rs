//! HTTP surface: JSON routes over `DecisionService` and `OutcomeRules`.
//!
//! Identity comes from an upstream gateway as the `X-User-Id` header; this
//! service neither issues nor verifies tokens.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{
    Alternative, AlternativeId, AlternativeInput, Criterion, CriterionId, CriterionInput,
    Decision, DecisionId, DecisionInput, DecisionPatch, OutcomeRule, OutcomeRuleInput, Rating,
    RatingInput,
};
use crate::outcome::OutcomeRules;
use crate::service::{DecisionService, ScoreSummary};
use crate::store::{MemoryStore, Upsert};

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub decisions: DecisionService,
    pub outcomes: OutcomeRules,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// State backed by a fresh `MemoryStore`.
    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            decisions: DecisionService::new(store.clone(), store.clone(), config.rating_scale),
            outcomes: OutcomeRules::new(store),
            config: Arc::new(config),
        }
    }
}

/// `axum::Json` whose rejections answer as `Error::InvalidInput`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Path` whose rejections answer as `Error::InvalidInput`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct Params<T>(pub T);

/// Caller identity taken from `X-User-Id`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(v.to_string()))
            .ok_or(Error::Unauthorized)
    }
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/decisions", get(list_decisions).post(create_decision))
        .route(
            "/api/decisions/{id}",
            get(get_decision).put(update_decision).delete(delete_decision),
        )
        .route("/api/decisions/{id}/alternatives", post(add_alternative))
        .route(
            "/api/decisions/{id}/alternatives/{alternative_id}",
            put(update_alternative).delete(delete_alternative),
        )
        .route("/api/decisions/{id}/criteria", post(add_criterion))
        .route(
            "/api/decisions/{id}/criteria/{criterion_id}",
            put(update_criterion).delete(delete_criterion),
        )
        .route(
            "/api/decisions/{id}/ratings",
            get(list_ratings).post(save_ratings),
        )
        .route("/api/decisions/{id}/calculate-scores", post(calculate_scores))
        .route(
            "/api/outcome-rules",
            get(list_outcome_rules).post(create_outcome_rule),
        )
        .route(
            "/api/outcome-rules/{tag}",
            put(update_outcome_rule).delete(delete_outcome_rule),
        )
        .route("/api/outcome-rules/{tag}/suggestions", get(outcome_suggestions));

    if state.config.metrics_routes {
        match metrics::install() {
            Ok(handle) => app = app.merge(metrics::router(handle)),
            Err(e) => warn!(target: "api", error = %e, "metrics recorder unavailable; /metrics disabled"),
        }
    }

    let cors = cors_layer(&state.config);
    app.layer(cors).with_state(state)
}

/// Only the configured frontend origin (with credentials) when set; permissive otherwise.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let Some(url) = config.frontend_url.as_deref() else {
        return CorsLayer::very_permissive();
    };
    match HeaderValue::from_str(url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(USER_HEADER),
            ]),
        Err(_) => {
            warn!(target: "api", origin = url, "invalid frontend origin; using permissive CORS");
            CorsLayer::very_permissive()
        }
    }
}

fn removed(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "message": message }))
}

/* ----------------------------
Decisions
---------------------------- */

async fn list_decisions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Decision>>> {
    Ok(Json(state.decisions.list_decisions(&user).await?))
}

async fn create_decision(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(body): JsonBody<DecisionInput>,
) -> Result<(StatusCode, Json<Decision>)> {
    let d = state.decisions.create_decision(&user, body).await?;
    Ok((StatusCode::CREATED, Json(d)))
}

async fn get_decision(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
) -> Result<Json<Decision>> {
    Ok(Json(state.decisions.get_decision(&user, id).await?))
}

async fn update_decision(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
    JsonBody(body): JsonBody<DecisionPatch>,
) -> Result<Json<Decision>> {
    Ok(Json(state.decisions.update_decision(&user, id, body).await?))
}

async fn delete_decision(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
) -> Result<Json<serde_json::Value>> {
    state.decisions.delete_decision(&user, id).await?;
    Ok(removed("Decision removed"))
}

/* ----------------------------
Alternatives & criteria
---------------------------- */

async fn add_alternative(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
    JsonBody(body): JsonBody<AlternativeInput>,
) -> Result<(StatusCode, Json<Alternative>)> {
    let a = state.decisions.add_alternative(&user, id, body).await?;
    Ok((StatusCode::CREATED, Json(a)))
}

async fn update_alternative(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params((id, alternative_id)): Params<(DecisionId, AlternativeId)>,
    JsonBody(body): JsonBody<AlternativeInput>,
) -> Result<Json<Alternative>> {
    Ok(Json(
        state
            .decisions
            .update_alternative(&user, id, alternative_id, body)
            .await?,
    ))
}

async fn delete_alternative(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params((id, alternative_id)): Params<(DecisionId, AlternativeId)>,
) -> Result<Json<serde_json::Value>> {
    state
        .decisions
        .delete_alternative(&user, id, alternative_id)
        .await?;
    Ok(removed("Alternative removed successfully."))
}

async fn add_criterion(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
    JsonBody(body): JsonBody<CriterionInput>,
) -> Result<(StatusCode, Json<Criterion>)> {
    let c = state.decisions.add_criterion(&user, id, body).await?;
    Ok((StatusCode::CREATED, Json(c)))
}

async fn update_criterion(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params((id, criterion_id)): Params<(DecisionId, CriterionId)>,
    JsonBody(body): JsonBody<CriterionInput>,
) -> Result<Json<Criterion>> {
    Ok(Json(
        state
            .decisions
            .update_criterion(&user, id, criterion_id, body)
            .await?,
    ))
}

async fn delete_criterion(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params((id, criterion_id)): Params<(DecisionId, CriterionId)>,
) -> Result<Json<serde_json::Value>> {
    state
        .decisions
        .delete_criterion(&user, id, criterion_id)
        .await?;
    Ok(removed("Criterion removed successfully."))
}

/* ----------------------------
Ratings & scores
---------------------------- */

/// `{"ratings": [...]}` for a batch, a bare rating object otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum RatingsBody {
    Batch { ratings: Vec<RatingInput> },
    Single(RatingInput),
}

async fn save_ratings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
    JsonBody(body): JsonBody<RatingsBody>,
) -> Result<Response> {
    match body {
        RatingsBody::Single(input) => {
            let (rating, outcome): (Rating, Upsert) =
                state.decisions.upsert_rating(&user, id, input).await?;
            let status = match outcome {
                Upsert::Created => StatusCode::CREATED,
                Upsert::Updated => StatusCode::OK,
            };
            Ok((status, Json(rating)).into_response())
        }
        RatingsBody::Batch { ratings } => {
            let summary = state.decisions.upsert_ratings(&user, id, ratings).await?;
            Ok(Json(json!({
                "message": "Ratings saved successfully",
                "upserted": summary.upserted,
                "modified": summary.modified,
            }))
            .into_response())
        }
    }
}

async fn list_ratings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
) -> Result<Json<Vec<Rating>>> {
    Ok(Json(state.decisions.ratings(&user, id).await?))
}

async fn calculate_scores(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Params(id): Params<DecisionId>,
) -> Result<Json<ScoreSummary>> {
    Ok(Json(state.decisions.calculate_scores(&user, id).await?))
}

/* ----------------------------
Outcome rules
---------------------------- */

#[derive(Deserialize)]
struct SuggestionsBody {
    #[serde(default)]
    suggestions: Vec<String>,
}

async fn create_outcome_rule(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    JsonBody(body): JsonBody<OutcomeRuleInput>,
) -> Result<(StatusCode, Json<OutcomeRule>)> {
    let rule = state.outcomes.create(body).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_outcome_rules(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<OutcomeRule>>> {
    Ok(Json(state.outcomes.all().await?))
}

async fn update_outcome_rule(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Params(tag): Params<String>,
    JsonBody(body): JsonBody<SuggestionsBody>,
) -> Result<Json<OutcomeRule>> {
    Ok(Json(state.outcomes.update(&tag, body.suggestions).await?))
}

async fn delete_outcome_rule(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Params(tag): Params<String>,
) -> Result<Json<serde_json::Value>> {
    state.outcomes.delete(&tag).await?;
    Ok(removed("Outcome rule removed."))
}

async fn outcome_suggestions(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Params(tag): Params<String>,
) -> Result<Json<serde_json::Value>> {
    let rule = state.outcomes.suggestions(&tag).await?;
    Ok(Json(json!({ "tag": rule.tag, "suggestions": rule.suggestions })))
}
