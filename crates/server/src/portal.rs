//! JSON API behind the client portal's quote wizard.
//!
//! - `GET   /api/v1/catalog`           tiers, features and maintenance plans
//! - `POST  /api/v1/quotes/totals`     price a selection without persisting anything
//! - `POST  /api/v1/drafts`            ensure a draft for the cookie or body token
//! - `GET   /api/v1/drafts/{token}`    fetch a draft
//! - `PATCH /api/v1/drafts/{token}`    shallow-merge a wizard snapshot into a draft

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use quoteflow_core::config::DraftConfig;
use quoteflow_core::cpq::{selection_report, PricingTrace, SelectionReport};
use quoteflow_core::{
    ApplicationError, Catalog, DomainError, DraftRecord, DraftToken, FeatureId, InterfaceError,
    MaintenancePlanId, PricingEngine, QuoteSelection, TierId, Totals,
};
use quoteflow_db::DraftSyncService;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct PortalState {
    catalog: Arc<Catalog>,
    pricing: Arc<dyn PricingEngine>,
    drafts: DraftSyncService,
    cookie: DraftCookie,
}

impl PortalState {
    pub fn new(
        catalog: Arc<Catalog>,
        pricing: Arc<dyn PricingEngine>,
        drafts: DraftSyncService,
        cookie: DraftCookie,
    ) -> Self {
        Self { catalog, pricing, drafts, cookie }
    }
}

/// Name and lifetime of the cookie carrying the draft token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftCookie {
    name: String,
    max_age_secs: u64,
}

impl DraftCookie {
    pub fn new(name: impl Into<String>, max_age_days: u32) -> Self {
        Self { name: name.into(), max_age_secs: u64::from(max_age_days) * 24 * 60 * 60 }
    }

    pub fn from_config(config: &DraftConfig) -> Self {
        Self::new(config.cookie_name.clone(), config.cookie_max_age_days)
    }

    fn read(&self, headers: &HeaderMap) -> Option<DraftToken> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .and_then(|(_, value)| DraftToken::parse(value))
    }

    fn set_cookie(&self, token: &DraftToken) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.name, token, self.max_age_secs
        )
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    #[serde(flatten)]
    pub catalog: Catalog,
    pub default_maintenance_plan: MaintenancePlanId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsRequest {
    pub tier: String,
    #[serde(default)]
    pub selected_feature_ids: Vec<String>,
    #[serde(default)]
    pub rush_requested: bool,
    #[serde(default)]
    pub maintenance_plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    pub totals: Totals,
    pub trace: PricingTrace,
    pub selection: SelectionReport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureDraftRequest {
    pub draft_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    #[serde(flatten)]
    pub draft: DraftRecord,
    pub created: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

/// An [`InterfaceError`] rendered as `{error, kind, detail?, correlationId}`.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, Some(message.clone()))
            }
            InterfaceError::NotFound { message, .. } => {
                (StatusCode::NOT_FOUND, Some(message.clone()))
            }
            InterfaceError::Unprocessable { message, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, Some(message.clone()))
            }
            InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            kind: self.0.kind(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: PortalState) -> Router {
    Router::new()
        .route("/api/v1/catalog", get(get_catalog))
        .route("/api/v1/quotes/totals", post(compute_totals))
        .route("/api/v1/drafts", post(ensure_draft))
        .route("/api/v1/drafts/{token}", get(get_draft).patch(merge_draft))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_catalog(State(state): State<PortalState>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        catalog: state.catalog.as_ref().clone(),
        default_maintenance_plan: state.catalog.default_maintenance_plan().id.clone(),
    })
}

async fn compute_totals(
    State(state): State<PortalState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TotalsResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let rejected = |error: DomainError| reject(error.into(), &correlation_id);

    let request: TotalsRequest = parse_body(&body).map_err(rejected)?;
    let tier = request.tier.parse::<TierId>().map_err(rejected)?;
    let selected: BTreeSet<FeatureId> =
        request.selected_feature_ids.into_iter().map(FeatureId::new).collect();
    let maintenance_plan = request
        .maintenance_plan
        .map(MaintenancePlanId::new)
        .unwrap_or_else(|| state.catalog.default_maintenance_plan().id.clone());

    let selection = QuoteSelection {
        tier,
        selected_feature_ids: selected,
        rush_requested: request.rush_requested,
        maintenance_plan,
    };
    let priced = state.pricing.price(&state.catalog, &selection).map_err(rejected)?;
    let report = selection_report(&state.catalog, tier, &selection.selected_feature_ids)
        .map_err(rejected)?;

    info!(
        event_name = "portal.totals.computed",
        correlation_id = %correlation_id,
        tier = tier.as_str(),
        total_cents = priced.totals.total,
        deposit_cents = priced.totals.deposit,
        "quote totals computed"
    );

    Ok(Json(TotalsResponse { totals: priced.totals, trace: priced.trace, selection: report }))
}

/// The cookie token is tried first, then the body's `draftToken`; a fresh draft is created only
/// when neither resolves.
async fn ensure_draft(
    State(state): State<PortalState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);

    let request: EnsureDraftRequest = if body.iter().all(u8::is_ascii_whitespace) {
        EnsureDraftRequest::default()
    } else {
        parse_body(&body).map_err(|error| reject(error.into(), &correlation_id))?
    };
    let candidates: Vec<DraftToken> = state
        .cookie
        .read(&headers)
        .into_iter()
        .chain(request.draft_token.as_deref().and_then(DraftToken::parse))
        .collect();

    let draft = state
        .drafts
        .ensure_draft_from(&candidates)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    let created = !candidates.contains(&draft.token);

    let cookie = HeaderValue::from_str(&state.cookie.set_cookie(&draft.token)).map_err(|error| {
        reject(
            ApplicationError::Configuration(format!("draft cookie is not a valid header: {error}")),
            &correlation_id,
        )
    })?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, [(SET_COOKIE, cookie)], Json(DraftResponse { draft, created })).into_response())
}

async fn get_draft(
    Path(token): Path<String>,
    State(state): State<PortalState>,
    headers: HeaderMap,
) -> Result<Json<DraftRecord>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let token = path_token(&token).map_err(|error| reject(error.into(), &correlation_id))?;

    state.drafts.get_draft(&token).await.map(Json).map_err(|error| reject(error, &correlation_id))
}

async fn merge_draft(
    Path(token): Path<String>,
    State(state): State<PortalState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DraftRecord>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let token = path_token(&token).map_err(|error| reject(error.into(), &correlation_id))?;
    let partial: Value = parse_body(&body).map_err(|error| reject(error.into(), &correlation_id))?;

    state
        .drafts
        .merge_draft(&token, &partial)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, DomainError> {
    serde_json::from_slice(body)
        .map_err(|error| DomainError::InvalidPayload(format!("request body is not valid: {error}")))
}

/// Malformed tokens can never have been issued, so they read as missing drafts.
fn path_token(raw: &str) -> Result<DraftToken, DomainError> {
    DraftToken::parse(raw).ok_or_else(|| DomainError::DraftNotFound(DraftToken::new(raw)))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

fn reject(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    match &interface {
        InterfaceError::ServiceUnavailable { message, .. }
        | InterfaceError::Internal { message, .. } => error!(
            event_name = "portal.request.failed",
            correlation_id = %correlation_id,
            kind = interface.kind(),
            error = %message,
            "portal request failed"
        ),
        _ => warn!(
            event_name = "portal.request.rejected",
            correlation_id = %correlation_id,
            kind = interface.kind(),
            error = %interface,
            "portal request rejected"
        ),
    }
    ApiError(interface)
}
