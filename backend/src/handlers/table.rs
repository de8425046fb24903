//! HTTP handlers for dining tables

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::table::{CreateTableInput, TableQuery, TableService};
use crate::AppState;
use shared::Table;

pub async fn list_tables(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<TableQuery>,
) -> AppResult<Json<Vec<Table>>> {
    let service = TableService::new(state.db);
    let tables = service.list(&current_user.0, query).await?;
    Ok(Json(tables))
}

pub async fn create_table(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTableInput>,
) -> AppResult<(StatusCode, Json<Table>)> {
    let service = TableService::new(state.db);
    let table = service.create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(table)))
}

pub async fn get_table(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(table_id): Path<Uuid>,
) -> AppResult<Json<Table>> {
    let service = TableService::new(state.db);
    let table = service.get(&current_user.0, table_id).await?;
    Ok(Json(table))
}
