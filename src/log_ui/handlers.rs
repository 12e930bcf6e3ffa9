use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::log_ui::LogUiState;
use crate::observability::{LogFilter, LogLevel, LogRow};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub search: Option<String>,
    pub correlation_id: Option<String>,
    pub page: Option<usize>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogPage {
    pub total: usize,
    pub page: usize,
    pub count: usize,
    pub rows: Vec<LogRow>,
}

pub async fn get_logs(State(state): State<LogUiState>, Query(query): Query<LogQuery>) -> Response {
    let level = match query.level.as_deref().filter(|l| !l.is_empty()) {
        Some(raw) => match raw.parse::<LogLevel>() {
            Ok(level) => Some(level),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        },
        None => None,
    };

    let filter = LogFilter {
        level,
        search: query.search.filter(|s| !s.is_empty()),
        correlation_id: query.correlation_id.filter(|s| !s.is_empty()),
        page: query.page.unwrap_or(0),
        count: query.count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
    };

    let (total, rows) = state.store.query(&filter);
    Json(LogPage {
        total,
        page: filter.page,
        count: filter.count,
        rows,
    })
    .into_response()
}

/// Column names, `Id` first.
pub async fn get_keys(State(state): State<LogUiState>) -> Json<Vec<String>> {
    let keys = std::iter::once("Id")
        .chain(state.store.layout().names())
        .map(str::to_string)
        .collect();
    Json(keys)
}
