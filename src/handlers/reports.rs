use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{errors::ServiceError, handlers::common::success_response, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct DailyReportParams {
    /// Report date in `YYYY-MM-DD`; defaults to today.
    pub date: Option<NaiveDate>,
}

/// Daily sales aggregate over completed transactions.
#[utoipa::path(
    get,
    path = "/api/v1/reports/sales/daily",
    params(DailyReportParams),
    responses(
        (status = 200, description = "Daily sales report", body = crate::services::reports::DailySalesReport),
        (status = 400, description = "Invalid date", body = crate::errors::ErrorResponse)
    ),
    tag = "Reports"
)]
pub async fn daily_sales_report(
    State(state): State<AppState>,
    Query(params): Query<DailyReportParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = match params.date {
        Some(date) => state.services.reports.daily_sales(date).await?,
        None => state.services.reports.today().await?,
    };
    Ok(success_response(report))
}
