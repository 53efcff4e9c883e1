use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct CreateTodo {
    pub id: Option<u64>,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct ReplaceTodo {
    pub title: String,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(rename = "_limit")]
    pub limit: Option<usize>,
}

pub type Db = Arc<RwLock<BTreeMap<u64, Todo>>>;

pub fn app() -> Router {
    app_with(Vec::new())
}

/// Router whose store starts with `todos`.
pub fn app_with(todos: Vec<Todo>) -> Router {
    let db: Db = Arc::new(RwLock::new(
        todos.into_iter().map(|todo| (todo.id, todo)).collect(),
    ));
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", get(get_todo).put(update_todo).delete(delete_todo))
        .with_state(db)
}

/// Seed data served by the binary.
pub fn sample_todos() -> Vec<Todo> {
    [
        ("delectus aut autem", false),
        ("quis ut nam facilis et officia qui", false),
        ("fugiat veniam minus", false),
        ("et porro tempora", true),
        ("laboriosam mollitia et enim quasi", false),
        ("qui ullam ratione quibusdam voluptatem quia omnis", false),
        ("illo expedita consequatur quia in", false),
        ("quo adipisci enim quam ut ab", true),
    ]
    .into_iter()
    .zip(1..)
    .map(|((title, completed), id)| Todo {
        id,
        title: title.to_string(),
        completed,
    })
    .collect()
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}

async fn list_todos(State(db): State<Db>, Query(params): Query<ListParams>) -> Json<Vec<Todo>> {
    let todos = db.read().await;
    let limit = params.limit.unwrap_or(usize::MAX);
    tracing::debug!(limit, "list todos");
    Json(todos.values().take(limit).cloned().collect())
}

/// An id the client supplies must be free; an existing todo is never
/// overwritten by a create.
async fn create_todo(
    State(db): State<Db>,
    Json(input): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), StatusCode> {
    let mut todos = db.write().await;
    let id = input
        .id
        .unwrap_or_else(|| todos.keys().next_back().map_or(1, |last| last + 1));
    if todos.contains_key(&id) {
        tracing::debug!(id, "create rejected, id taken");
        return Err(StatusCode::CONFLICT);
    }
    let todo = Todo {
        id,
        title: input.title,
        completed: input.completed,
    };
    tracing::debug!(id, "create todo");
    todos.insert(id, todo.clone());
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn get_todo(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<Todo>, StatusCode> {
    let todos = db.read().await;
    todos.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_todo(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<ReplaceTodo>,
) -> Result<Json<Todo>, StatusCode> {
    let mut todos = db.write().await;
    let todo = todos.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    tracing::debug!(id, completed = input.completed, "replace todo");
    todo.title = input.title;
    todo.completed = input.completed;
    Ok(Json(todo.clone()))
}

async fn delete_todo(State(db): State<Db>, Path(id): Path<u64>) -> Result<StatusCode, StatusCode> {
    let mut todos = db.write().await;
    tracing::debug!(id, "delete todo");
    todos.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}
