//! The todo state container and its synchronization actions.
//!
//! # Design
//! `TodoStore` is constructed explicitly and shared by reference or `Arc`.
//! State lives behind a `std::sync::RwLock` whose guards are never held
//! across an `.await`. Remote actions queue on an async mutex, so two
//! overlapping calls run one after the other in call order and never lose
//! each other's writes. Each remote action touches local state only after
//! its request succeeded; on failure the list is exactly what it was.
//!
//! `loading` counts actions that have been entered and not yet returned
//! (queued ones included). It is raised and lowered by a drop guard, so a
//! failed or cancelled action lowers it too.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::IgnoredAny;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::transport::Transport;
use crate::types::{Filter, Todo, TodoId};

const TODOS_PATH: &str = "/todos";
const LIMIT_PARAM: &str = "_limit";

fn item_path(id: TodoId) -> String {
    format!("{TODOS_PATH}/{id}")
}

/// Observable store state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoState {
    pub loading: bool,
    pub list: Vec<Todo>,
    pub filter: Filter,
}

impl TodoState {
    /// Todos visible under the current filter, in list order.
    pub fn filtered(&self) -> impl Iterator<Item = &Todo> + '_ {
        let filter = self.filter;
        self.list.iter().filter(move |todo| filter.matches(todo))
    }

    /// Todos not yet completed, regardless of the filter.
    pub fn active(&self) -> impl Iterator<Item = &Todo> + '_ {
        self.list.iter().filter(|todo| !todo.completed)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.list.iter().find(|todo| todo.id == id)
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: TodoState,
    in_flight: usize,
    last_issued_id: TodoId,
}

/// Raises `loading` for as long as it lives.
struct LoadingGuard<'a> {
    shared: &'a RwLock<Shared>,
}

impl<'a> LoadingGuard<'a> {
    fn raise(shared: &'a RwLock<Shared>) -> Self {
        let mut inner = shared.write().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight += 1;
        inner.state.loading = true;
        Self { shared }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.state.loading = inner.in_flight > 0;
    }
}

/// In-memory todo list kept in sync with the `/todos` API.
///
/// Construct one per application and share it by reference or `Arc`.
/// Remote actions run one at a time; reads never wait on them.
pub struct TodoStore<T> {
    client: RemoteClient<T>,
    page_size: usize,
    shared: RwLock<Shared>,
    actions: Mutex<()>,
}

impl<T> TodoStore<T> {
    pub fn new(client: RemoteClient<T>, page_size: usize) -> Self {
        Self {
            client,
            page_size,
            shared: RwLock::new(Shared::default()),
            actions: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StoreConfig, transport: T) -> Self {
        Self::new(RemoteClient::new(&config.base_url, transport), config.page_size)
    }

    /// Seed the list before the store is handed out.
    pub fn with_initial_list(self, list: Vec<Todo>) -> Self {
        self.write().state.list = list;
        self
    }

    pub fn client(&self) -> &RemoteClient<T> {
        &self.client
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Run `f` against the current state.
    pub fn state<R>(&self, f: impl FnOnce(&TodoState) -> R) -> R {
        f(&self.read().state)
    }

    pub fn snapshot(&self) -> TodoState {
        self.state(TodoState::clone)
    }

    pub fn is_loading(&self) -> bool {
        self.state(|s| s.loading)
    }

    pub fn filter(&self) -> Filter {
        self.state(|s| s.filter)
    }

    pub fn list(&self) -> Vec<Todo> {
        self.state(|s| s.list.clone())
    }

    pub fn filtered_list(&self) -> Vec<Todo> {
        self.state(|s| s.filtered().cloned().collect())
    }

    pub fn active_list(&self) -> Vec<Todo> {
        self.state(|s| s.active().cloned().collect())
    }

    pub fn active_count(&self) -> usize {
        self.state(TodoState::active_count)
    }

    pub fn set_filter(&self, filter: Filter) {
        debug!(%filter, "filter changed");
        self.write().state.filter = filter;
    }

    /// Drop every completed todo locally. Nothing is sent to the server.
    pub fn clear_completed(&self) {
        let mut shared = self.write();
        let before = shared.state.list.len();
        shared.state.list.retain(|todo| !todo.completed);
        debug!(removed = before - shared.state.list.len(), "cleared completed todos");
    }

    fn read(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next id for a locally created todo: above anything issued before and
    /// anything currently in the list.
    fn allocate_id(&self) -> Result<TodoId, StoreError> {
        let mut shared = self.write();
        let highest = shared.state.list.iter().map(|todo| todo.id).max().unwrap_or(0);
        let ceiling = shared.last_issued_id.max(highest);
        let id = ceiling
            .checked_add(1)
            .ok_or(StoreError::IdSpaceExhausted(ceiling))?;
        shared.last_issued_id = id;
        Ok(id)
    }
}

impl<T: Transport> TodoStore<T> {
    /// Replace the list with the first page from the server.
    pub async fn fetch_list(&self) -> Result<(), StoreError> {
        let _loading = LoadingGuard::raise(&self.shared);
        let _turn = self.actions.lock().await;
        debug!(limit = self.page_size, "fetching todos");

        let todos: Vec<Todo> = self
            .client
            .get(TODOS_PATH, &[(LIMIT_PARAM, self.page_size.to_string())])
            .await
            .map_err(StoreError::from)
            .inspect_err(|err| warn!(error = %err, "fetch failed; list unchanged"))?;

        debug!(count = todos.len(), "fetched todos");
        self.write().state.list = todos;
        Ok(())
    }

    /// Create a todo on the server and put it at the front of the list.
    ///
    /// The title is not validated. The returned todo is the locally built
    /// one; the server's acknowledgement is ignored.
    pub async fn create_todo(&self, title: impl Into<String>) -> Result<Todo, StoreError> {
        let _loading = LoadingGuard::raise(&self.shared);
        let _turn = self.actions.lock().await;

        let id = self
            .allocate_id()
            .inspect_err(|err| warn!(error = %err, "create refused; list unchanged"))?;
        let todo = Todo::new(id, title);
        debug!(id = todo.id, "creating todo");

        self.client
            .post::<_, IgnoredAny>(TODOS_PATH, &todo)
            .await
            .map_err(StoreError::from)
            .inspect_err(|err| warn!(id = todo.id, error = %err, "create failed; list unchanged"))?;

        self.write().state.list.insert(0, todo.clone());
        Ok(todo)
    }

    /// Flip `completed` on the todo with `id`, on the server and then locally.
    pub async fn update_todo(&self, id: TodoId) -> Result<Todo, StoreError> {
        let _loading = LoadingGuard::raise(&self.shared);
        let _turn = self.actions.lock().await;

        let current = self.state(|s| s.get(id).cloned());
        let Some(current) = current else {
            warn!(id, "update requested for a todo that is not in the list");
            return Err(StoreError::UnknownTodo(id));
        };
        let toggled = current.toggled();
        debug!(id, completed = toggled.completed, "updating todo");

        self.client
            .put::<_, IgnoredAny>(&item_path(id), &toggled)
            .await
            .map_err(StoreError::from)
            .inspect_err(|err| warn!(id, error = %err, "update failed; list unchanged"))?;

        let mut shared = self.write();
        for todo in shared.state.list.iter_mut().filter(|todo| todo.id == id) {
            *todo = toggled.clone();
        }
        Ok(toggled)
    }

    /// Delete the todo with `id` on the server, then drop it locally if present.
    pub async fn delete_todo(&self, id: TodoId) -> Result<(), StoreError> {
        let _loading = LoadingGuard::raise(&self.shared);
        let _turn = self.actions.lock().await;
        debug!(id, "deleting todo");

        self.client
            .delete::<IgnoredAny>(&item_path(id))
            .await
            .map_err(StoreError::from)
            .inspect_err(|err| warn!(id, error = %err, "delete failed; list unchanged"))?;

        self.write().state.list.retain(|todo| todo.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::error::ApiError;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};

    const BASE_URL: &str = "http://localhost:3000";

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: std::sync::Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        requests: std::sync::Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, ApiError>>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
                requests: std::sync::Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(
            &self,
            request: HttpRequest,
        ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
            self.requests.lock().unwrap().push(request);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left");
            async move { next }
        }
    }

    /// Holds every request until the gate is opened.
    struct GatedTransport {
        gate: Arc<Notify>,
        inner: ScriptedTransport,
    }

    impl Transport for GatedTransport {
        fn execute(
            &self,
            request: HttpRequest,
        ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
            async move {
                self.gate.notified().await;
                self.inner.execute(request).await
            }
        }
    }

    fn ok(status: u16, body: &str) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    fn todo(id: TodoId, title: &str, completed: bool) -> Todo {
        Todo {
            id,
            title: title.to_string(),
            completed,
        }
    }

    fn sample() -> Vec<Todo> {
        vec![
            todo(1, "A", false),
            todo(2, "B", true),
            todo(3, "C", false),
            todo(4, "D", true),
        ]
    }

    fn store(responses: Vec<Result<HttpResponse, ApiError>>) -> TodoStore<ScriptedTransport> {
        TodoStore::new(RemoteClient::new(BASE_URL, ScriptedTransport::new(responses)), 5)
    }

    #[test]
    fn new_store_starts_empty() {
        let store = store(vec![]);
        assert_eq!(store.snapshot(), TodoState::default());
        assert!(!store.is_loading());
        assert_eq!(store.filter(), Filter::All);
    }

    #[test]
    fn filtered_list_follows_filter_and_keeps_order() {
        let store = store(vec![]).with_initial_list(sample());
        for filter in Filter::ALL {
            store.set_filter(filter);
            let expected: Vec<Todo> = sample().into_iter().filter(|t| filter.matches(t)).collect();
            assert_eq!(store.filtered_list(), expected, "{filter}");
        }
    }

    #[test]
    fn completed_filter_scenario() {
        let store = store(vec![]).with_initial_list(vec![todo(1, "A", false), todo(2, "B", true)]);
        store.set_filter(Filter::Completed);
        assert_eq!(store.filtered_list(), vec![todo(2, "B", true)]);
    }

    #[test]
    fn active_list_ignores_filter() {
        let store = store(vec![]).with_initial_list(sample());
        let expected = vec![todo(1, "A", false), todo(3, "C", false)];
        for filter in Filter::ALL {
            store.set_filter(filter);
            assert_eq!(store.active_list(), expected);
            assert_eq!(store.active_count(), 2);
        }
    }

    #[test]
    fn clear_completed_is_local_and_immediate() {
        let store = store(vec![]).with_initial_list(sample());
        store.clear_completed();
        assert_eq!(store.list(), vec![todo(1, "A", false), todo(3, "C", false)]);
        assert!(!store.is_loading());
        assert!(store.client().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn fetch_list_replaces_list_in_response_order() {
        let body = r#"[
            {"userId":1,"id":9,"title":"nine","completed":true},
            {"userId":1,"id":2,"title":"two","completed":false}
        ]"#;
        let store = store(vec![ok(200, body)]).with_initial_list(sample());

        store.fetch_list().await.unwrap();

        assert_eq!(store.list(), vec![todo(9, "nine", true), todo(2, "two", false)]);
        assert!(!store.is_loading());
        let requests = store.client().transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].path, "http://localhost:3000/todos");
        assert_eq!(requests[0].query, vec![("_limit".to_string(), "5".to_string())]);
    }

    #[tokio::test]
    async fn fetch_list_failure_leaves_list_untouched() {
        let store = store(vec![Err(ApiError::Transport("connection refused".into()))])
            .with_initial_list(sample());

        let err = store.fetch_list().await.unwrap_err();

        assert!(matches!(err, StoreError::Api(ApiError::Transport(_))));
        assert_eq!(store.list(), sample());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn fetch_list_bad_payload_is_a_failure() {
        let store = store(vec![ok(200, r#"{"not":"a list"}"#)]).with_initial_list(sample());
        let err = store.fetch_list().await.unwrap_err();
        assert!(matches!(err, StoreError::Api(ApiError::Deserialization(_))));
        assert_eq!(store.list(), sample());
    }

    #[tokio::test]
    async fn create_todo_prepends_local_todo() {
        let store = store(vec![ok(201, r#"{"id":201}"#)]).with_initial_list(sample());

        let created = store.create_todo("Buy milk").await.unwrap();

        let list = store.list();
        assert_eq!(list[0], created);
        assert_eq!(list[0].title, "Buy milk");
        assert!(!list[0].completed);
        assert_eq!(&list[1..], sample().as_slice());

        let requests = store.client().transport().requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        let body: Todo = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, created);
    }

    #[tokio::test]
    async fn created_ids_are_unique_and_increasing() {
        let store = store(vec![ok(201, "{}"), ok(201, "{}"), ok(201, "{}")])
            .with_initial_list(sample());

        let first = store.create_todo("one").await.unwrap();
        let second = store.create_todo("two").await.unwrap();
        store.clear_completed();
        let third = store.create_todo("three").await.unwrap();

        assert_eq!(first.id, 5);
        assert_eq!(second.id, 6);
        assert_eq!(third.id, 7);
    }

    #[tokio::test]
    async fn created_ids_never_reuse_a_deleted_id() {
        let store = store(vec![ok(201, "{}"), ok(200, "{}"), ok(201, "{}")]);

        let first = store.create_todo("one").await.unwrap();
        store.delete_todo(first.id).await.unwrap();
        let second = store.create_todo("two").await.unwrap();

        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn create_todo_refuses_when_ids_run_out() {
        let store = store(vec![]).with_initial_list(vec![todo(u64::MAX, "max", false)]);

        let err = store.create_todo("x").await.unwrap_err();

        assert!(matches!(err, StoreError::IdSpaceExhausted(u64::MAX)));
        assert_eq!(store.list(), vec![todo(u64::MAX, "max", false)]);
        assert!(store.client().transport().requests().is_empty());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn create_todo_failure_leaves_list_untouched() {
        let store = store(vec![ok(500, "boom")]).with_initial_list(sample());
        let err = store.create_todo("Buy milk").await.unwrap_err();
        assert!(matches!(err, StoreError::Api(ApiError::Http { status: 500, .. })));
        assert_eq!(store.list(), sample());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn update_todo_toggles_only_the_target() {
        let store = store(vec![ok(200, "{}")]).with_initial_list(sample());

        let updated = store.update_todo(3).await.unwrap();

        assert_eq!(updated, todo(3, "C", true));
        let mut expected = sample();
        expected[2].completed = true;
        assert_eq!(store.list(), expected);

        let requests = store.client().transport().requests();
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[0].path, "http://localhost:3000/todos/3");
        let body: Todo = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, todo(3, "C", true));
    }

    #[tokio::test]
    async fn update_todo_failure_does_not_toggle() {
        let store = store(vec![ok(404, "")]).with_initial_list(sample());
        let err = store.update_todo(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Api(ApiError::NotFound)));
        assert_eq!(store.list(), sample());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn update_unknown_todo_sends_nothing() {
        let store = store(vec![]).with_initial_list(sample());
        let err = store.update_todo(99).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTodo(99)));
        assert!(store.client().transport().requests().is_empty());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn delete_todo_removes_entry() {
        let store = store(vec![ok(200, "{}")]).with_initial_list(sample());

        store.delete_todo(2).await.unwrap();

        let list = store.list();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|t| t.id != 2));
        let requests = store.client().transport().requests();
        assert_eq!(requests[0].method, HttpMethod::Delete);
        assert_eq!(requests[0].path, "http://localhost:3000/todos/2");
    }

    #[tokio::test]
    async fn delete_absent_todo_is_a_local_no_op() {
        let store = store(vec![ok(204, "")]).with_initial_list(sample());
        store.delete_todo(42).await.unwrap();
        assert_eq!(store.list(), sample());
    }

    #[tokio::test]
    async fn delete_todo_failure_keeps_entry() {
        let store = store(vec![Err(ApiError::Transport("reset".into()))]).with_initial_list(sample());
        assert!(store.delete_todo(2).await.is_err());
        assert_eq!(store.list(), sample());
    }

    #[tokio::test]
    async fn overlapping_updates_apply_in_call_order() {
        let store = store(vec![ok(200, "{}"), ok(200, "{}")]).with_initial_list(sample());

        let (first, second) = tokio::join!(store.update_todo(1), store.update_todo(1));

        assert!(first.unwrap().completed);
        assert!(!second.unwrap().completed);
        assert_eq!(store.list(), sample());

        let bodies: Vec<Todo> = store
            .client()
            .transport()
            .requests()
            .iter()
            .map(|r| serde_json::from_str(r.body.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(bodies, vec![todo(1, "A", true), todo(1, "A", false)]);
    }

    #[tokio::test]
    async fn loading_is_raised_while_a_request_is_in_flight() {
        let gate = Arc::new(Notify::new());
        let transport = GatedTransport {
            gate: gate.clone(),
            inner: ScriptedTransport::new(vec![ok(200, r#"[{"id":1,"title":"A","completed":false}]"#)]),
        };
        let store = Arc::new(TodoStore::new(RemoteClient::new(BASE_URL, transport), 5));

        let task = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_list().await }
        });
        while !store.is_loading() {
            tokio::task::yield_now().await;
        }
        assert!(store.list().is_empty());

        gate.notify_one();
        task.await.unwrap().unwrap();

        assert!(!store.is_loading());
        assert_eq!(store.list(), vec![todo(1, "A", false)]);
    }

    #[tokio::test]
    async fn cancelled_action_lowers_loading() {
        let transport = GatedTransport {
            gate: Arc::new(Notify::new()),
            inner: ScriptedTransport::new(vec![ok(200, "[]")]),
        };
        let store = TodoStore::new(RemoteClient::new(BASE_URL, transport), 5);

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), store.fetch_list()).await;

        assert!(timed_out.is_err());
        assert!(!store.is_loading());
    }
}
