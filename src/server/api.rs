use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};

use super::{AppState, AuthUser};
use crate::error::Result;
use crate::models::{Registration, Subtask, Task, TaskFields, TaskUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/tasks", get(list_tasks))
        .route("/tasks/update", put(update_task))
        .route("/tasks/:id", get(get_task))
        .route("/add", post(add_task))
        .route("/task/:id", delete(delete_task))
        .route("/subtasks", get(list_subtasks))
        .route("/subtasks/update", put(update_subtask))
        .route("/subtasks/:id", get(get_subtask).delete(delete_subtask))
        .route("/:task_id/subtasks", get(subtasks_for_task))
        .route("/:task_id/add/subtask", post(add_subtask))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, &'static str)> {
    let registration = Registration::new(&body.username, &body.password);
    let username = registration.username.clone();
    state
        .with_db_blocking(move |db, cost| db.register_user(&registration, cost))
        .await?;
    tracing::info!(%username, "user registered");
    Ok((StatusCode::CREATED, "Registered successfully"))
}

async fn list_tasks(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Task>>> {
    let tasks = state.with_db_blocking(move |db, _| db.list_tasks(user.id)).await?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Task>> {
    let task = state.with_db_blocking(move |db, _| db.get_task(user.id, id)).await?;
    Ok(Json(task))
}

async fn add_task(
    State(state): State<AppState>,
    user: AuthUser,
    Json(fields): Json<TaskFields>,
) -> Result<Json<Task>> {
    let user_id = user.id;
    let task = state
        .with_db_blocking(move |db, _| db.add_task(user_id, &fields.normalized()))
        .await?;
    tracing::info!(user = %user.username, task = task.id, "task added");
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>> {
    let update = TaskUpdate {
        fields: update.fields.normalized(),
        ..update
    };
    let user_id = user.id;
    let task = state
        .with_db_blocking(move |db, _| db.update_task(user_id, &update))
        .await?;
    tracing::debug!(user = %user.username, task = task.id, "task updated");
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let user_id = user.id;
    state
        .with_db_blocking(move |db, _| db.delete_task(user_id, id))
        .await?;
    tracing::info!(user = %user.username, task = id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subtasks(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Subtask>>> {
    let subtasks = state.with_db_blocking(move |db, _| db.list_subtasks(user.id)).await?;
    Ok(Json(subtasks))
}

async fn subtasks_for_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<Subtask>>> {
    let subtasks = state
        .with_db_blocking(move |db, _| db.subtasks_for_task(user.id, task_id))
        .await?;
    Ok(Json(subtasks))
}

async fn get_subtask(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Subtask>> {
    let subtask = state.with_db_blocking(move |db, _| db.get_subtask(user.id, id)).await?;
    Ok(Json(subtask))
}

async fn add_subtask(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    Json(fields): Json<TaskFields>,
) -> Result<Json<Subtask>> {
    let user_id = user.id;
    let subtask = state
        .with_db_blocking(move |db, _| db.add_subtask(user_id, task_id, &fields.normalized()))
        .await?;
    tracing::info!(user = %user.username, task = task_id, subtask = subtask.id, "subtask added");
    Ok(Json(subtask))
}

async fn update_subtask(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Subtask>> {
    let update = TaskUpdate {
        fields: update.fields.normalized(),
        ..update
    };
    let subtask = state
        .with_db_blocking(move |db, _| db.update_subtask(user.id, &update))
        .await?;
    Ok(Json(subtask))
}

async fn delete_subtask(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let user_id = user.id;
    state
        .with_db_blocking(move |db, _| db.delete_subtask(user_id, id))
        .await?;
    tracing::info!(user = %user.username, subtask = id, "subtask deleted");
    Ok(StatusCode::NO_CONTENT)
}
