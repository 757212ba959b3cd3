//! Extension administration handlers.

use axum::Json;
use axum::extract::{Path, Query, State};

use quill_core::error::AppError;
use quill_plugin::{ExtensionStatus, PluginError};

use crate::dto::request::{StatusFilter, UpdateSettingsRequest};
use crate::dto::response::{ApiResponse, ExtensionResponse, ReportResponse};
use crate::error::ApiResult;
use crate::state::AppState;

type ExtensionJson = Json<ApiResponse<ExtensionResponse>>;

/// GET /api/extensions
pub async fn list_extensions(
    State(state): State<AppState>,
    Query(params): Query<StatusFilter>,
) -> ApiResult<Json<ApiResponse<Vec<ExtensionResponse>>>> {
    let filter = params
        .status
        .as_deref()
        .map(str::parse::<ExtensionStatus>)
        .transpose()
        .map_err(AppError::validation)?;

    let records = state.manager.plugin_registry().list(filter).await;
    Ok(Json(ApiResponse::ok(
        records.into_iter().map(ExtensionResponse::from).collect(),
    )))
}

/// GET /api/extensions/report
pub async fn get_report(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<ReportResponse>>> {
    let report = state
        .manager
        .last_report()
        .await
        .ok_or_else(|| AppError::service_unavailable("Extensions have not been initialized yet"))?;
    Ok(Json(ApiResponse::ok(ReportResponse::from(&report))))
}

/// GET /api/extensions/{name}
pub async fn get_extension(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ExtensionJson> {
    let record = state
        .manager
        .plugin_registry()
        .get(&name)
        .await
        .ok_or_else(|| PluginError::not_found(&name))?;
    Ok(Json(ApiResponse::ok(record.into())))
}

/// POST /api/extensions/{name}/activate
pub async fn activate_extension(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ExtensionJson> {
    let record = state.manager.activate(&name, &state.request_context()).await?;
    Ok(Json(ApiResponse::ok(record.into())))
}

/// POST /api/extensions/{name}/deactivate
pub async fn deactivate_extension(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ExtensionJson> {
    let record = state
        .manager
        .deactivate(&name, &state.request_context())
        .await?;
    Ok(Json(ApiResponse::ok(record.into())))
}

/// POST /api/extensions/{name}/reload
pub async fn reload_extension(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ExtensionJson> {
    let record = state.manager.reload(&name, &state.request_context()).await?;
    Ok(Json(ApiResponse::ok(record.into())))
}

/// POST /api/extensions/{name}/uninstall
pub async fn uninstall_extension(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ExtensionJson> {
    let record = state
        .manager
        .uninstall(&name, &state.request_context())
        .await?;
    Ok(Json(ApiResponse::ok(record.into())))
}

/// PUT /api/extensions/{name}/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    if !req.settings.is_object() {
        return Err(AppError::validation("settings must be a JSON object").into());
    }

    let settings = state
        .manager
        .plugin_registry()
        .update_settings(&name, req.settings)
        .await?;
    Ok(Json(ApiResponse::ok(settings)))
}
