//! Withdrawal notification endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::require_scalar;
use crate::db::{WithdrawRequest, WithdrawResponse};
use crate::AppState;

/// Forward a withdrawal request to the operators' Telegram chat
///
/// POST /api/notifications/withdraw
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let Json(req) = payload?;

    let mut errors = ValidationErrorBuilder::new();
    let amount = require_scalar(&mut errors, "amount", req.amount.as_ref());
    let address = require_scalar(&mut errors, "address", req.address.as_ref());
    errors.finish()?;

    state.notifier.notify_withdrawal(&amount, &address).await?;
    Ok(Json(WithdrawResponse { success: true }))
}
