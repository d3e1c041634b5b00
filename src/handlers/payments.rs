use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::domain::amount::{parse_amount, to_minor_units};
use crate::domain::{PayerContact, Platform, TransactionStatus};
use crate::error::AppError;
use crate::services::orchestrator::InitiatePayment;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-verify";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub amount: serde_json::Value,
    pub user_id: String,
    pub platform: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub id: Option<String>,
    pub platform: Option<String>,
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let amount = parse_amount(&payload.amount).map_err(|e| AppError::Validation(e.to_string()))?;
    let amount_minor_units =
        to_minor_units(&amount).map_err(|e| AppError::Validation(e.to_string()))?;

    let platform = match payload.platform.as_deref() {
        None | Some("") => Platform::default(),
        Some(raw) => raw.parse::<Platform>().map_err(AppError::Validation)?,
    };

    let initiated = state
        .orchestrator
        .initiate(InitiatePayment {
            subject_id: payload.user_id,
            amount_minor_units,
            platform,
            contact: PayerContact {
                name: payload.name,
                mobile_number: payload.mobile_number.filter(|m| !m.trim().is_empty()),
                email: payload.email,
            },
        })
        .await?;

    Ok(Json(json!({
        "msg": "OK",
        "url": initiated.checkout_url,
    })))
}

/// Where the provider returns the user (GET or POST). Always answers with a redirect.
pub async fn payment_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Redirect {
    let platform = params
        .platform
        .as_deref()
        .and_then(|p| p.parse::<Platform>().ok());

    let redirect = match params.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => state.orchestrator.handle_status_query(id, platform).await,
        _ => {
            tracing::warn!("Status query without a transaction id");
            state
                .orchestrator
                .redirect(TransactionStatus::Failed, platform.unwrap_or_default())
        }
    };

    Redirect::to(&redirect.location)
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    state.orchestrator.handle_callback(&body, signature).await?;

    Ok(Json(json!({ "status": "OK" })))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.orchestrator.transaction(&id).await?;
    Ok(Json(tx))
}
