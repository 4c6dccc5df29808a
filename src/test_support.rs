//! In-memory stand-ins for the API server, navigator, and notifier.
//!
//! `FakeApi` models the server's cookie semantics as flags: a signed-in
//! account, whether its access token is still accepted, and whether its
//! refresh token is. Scripted responses take priority over that model, and
//! an optional gate holds `/auth/refresh` open so tests can pile requests up
//! behind it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::models::Task;
use crate::navigation::MemoryNavigator;
use crate::notify::{Notification, Notifier};
use crate::transport::{ApiRequest, ApiResponse, REFRESH_PATH, Transport};

// =============================================================================
// FAKE API
// =============================================================================

struct Account {
    id: i64,
    email: String,
    password: String,
}

struct FakeState {
    accounts: HashMap<String, Account>,
    signed_in: Option<String>,
    access_valid: bool,
    refresh_valid: bool,
    tasks: Vec<Task>,
    next_task_id: i64,
    calls: Vec<String>,
    scripted: HashMap<String, VecDeque<ApiResponse>>,
    unreachable: HashSet<String>,
}

pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
    refresh_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeApi {
    /// Server with one account, `alice` / `pw`, nobody signed in.
    pub(crate) fn new() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            "alice".to_owned(),
            Account {
                id: 1,
                email: "alice@example.com".to_owned(),
                password: "pw".to_owned(),
            },
        );
        Self {
            state: Mutex::new(FakeState {
                accounts,
                signed_in: None,
                access_valid: false,
                refresh_valid: false,
                tasks: Vec::new(),
                next_task_id: 1,
                calls: Vec::new(),
                scripted: HashMap::new(),
                unreachable: HashSet::new(),
            }),
            refresh_gate: Mutex::new(None),
        }
    }

    pub(crate) fn signed_in_as(self, username: &str) -> Self {
        {
            let mut st = self.lock();
            st.signed_in = Some(username.to_owned());
            st.access_valid = true;
            st.refresh_valid = true;
        }
        self
    }

    pub(crate) fn with_tasks(self, titles: &[&str]) -> Self {
        for title in titles {
            self.lock().insert_task(title, false);
        }
        self
    }

    /// The access cookie stops being accepted; the refresh cookie still works.
    pub(crate) fn expire_access(&self) {
        self.lock().access_valid = false;
    }

    /// Both cookies stop being accepted.
    pub(crate) fn revoke_session(&self) {
        let mut st = self.lock();
        st.access_valid = false;
        st.refresh_valid = false;
    }

    /// Queue one canned response for `path`, served before the model.
    pub(crate) fn script(&self, path: &str, status: u16, body: Value) {
        self.lock()
            .scripted
            .entry(path.to_owned())
            .or_default()
            .push_back(ApiResponse {
                status,
                body: body.to_string(),
            });
    }

    /// Requests to `path` fail at the transport level.
    pub(crate) fn unreachable(&self, path: &str) {
        self.lock().unreachable.insert(path.to_owned());
    }

    /// Hold every `/auth/refresh` until the returned semaphore gets a permit.
    pub(crate) fn gate_refresh(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self
            .refresh_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.lock().calls.iter().filter(|p| *p == path).count()
    }

    pub(crate) fn is_signed_in(&self) -> bool {
        self.lock().signed_in.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        {
            let mut st = self.lock();
            st.calls.push(request.path.clone());
            if st.unreachable.contains(&request.path) {
                return Err(ApiError::Transport("connection refused".to_owned()));
            }
        }

        if request.path == REFRESH_PATH {
            let gate = self
                .refresh_gate
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
        }

        let mut st = self.lock();
        if let Some(response) = st
            .scripted
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }
        Ok(st.route(request))
    }
}

impl FakeState {
    fn route(&mut self, request: &ApiRequest) -> ApiResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        match request.path.as_str() {
            "/auth/register" => self.register(&body),
            "/auth/login" => self.login(&body),
            "/auth/logout" => {
                self.signed_in = None;
                self.access_valid = false;
                self.refresh_valid = false;
                ok(&json!({ "message": "Logged out" }))
            }
            "/auth/refresh" => {
                if self.signed_in.is_some() && self.refresh_valid {
                    self.access_valid = true;
                    ok(&token_pair())
                } else {
                    status(401, "Invalid refresh token")
                }
            }
            "/auth/me" => match self.current_user() {
                Some(user) => ok(&user),
                None => status(401, "Could not validate credentials"),
            },
            path => {
                if self.current_user().is_none() {
                    return status(401, "Could not validate credentials");
                }
                self.tasks_route(path, request, &body)
            }
        }
    }

    fn register(&mut self, body: &Value) -> ApiResponse {
        let username = field(body, "username");
        if self.accounts.contains_key(&username) {
            return status(400, "Username already registered");
        }
        let id = i64::try_from(self.accounts.len()).unwrap_or(0) + 1;
        self.accounts.insert(
            username,
            Account {
                id,
                email: field(body, "email"),
                password: field(body, "password"),
            },
        );
        ok(&json!({ "message": "User registered successfully" }))
    }

    fn login(&mut self, body: &Value) -> ApiResponse {
        let username = field(body, "username");
        let password = field(body, "password");
        match self.accounts.get(&username) {
            Some(account) if account.password == password => {
                self.signed_in = Some(username);
                self.access_valid = true;
                self.refresh_valid = true;
                ok(&token_pair())
            }
            _ => status(401, "Incorrect username or password"),
        }
    }

    fn current_user(&self) -> Option<Value> {
        if !self.access_valid {
            return None;
        }
        let username = self.signed_in.as_ref()?;
        let account = self.accounts.get(username)?;
        Some(json!({
            "id": account.id,
            "username": username,
            "email": account.email,
            "is_active": true,
            "created_at": "2024-03-01T10:00:00",
        }))
    }

    fn tasks_route(&mut self, path: &str, request: &ApiRequest, body: &Value) -> ApiResponse {
        if path == "/tasks/" {
            let completed = body.get("completed").and_then(Value::as_bool).unwrap_or(false);
            let task = self.insert_task(&field(body, "title"), completed);
            return ok(&task);
        }
        if path == "/tasks/list" {
            let completed = request
                .query
                .iter()
                .find(|(k, _)| k == "completed")
                .map(|(_, v)| v == "true");
            let tasks: Vec<&Task> = self
                .tasks
                .iter()
                .filter(|t| completed.is_none_or(|c| t.completed == c))
                .collect();
            return ok(&tasks);
        }

        let mut parts = path.trim_start_matches("/tasks/").split('/');
        let id = parts.next().and_then(|raw| raw.parse::<i64>().ok());
        let action = parts.next();
        let Some(index) = id.and_then(|id| self.tasks.iter().position(|t| t.id == id)) else {
            return status(404, "Task not found");
        };

        match action {
            Some("get") => ok(&self.tasks[index]),
            Some("update") => {
                let task = &mut self.tasks[index];
                if let Some(title) = body.get("title").and_then(Value::as_str) {
                    title.clone_into(&mut task.title);
                }
                if let Some(completed) = body.get("completed").and_then(Value::as_bool) {
                    task.completed = completed;
                }
                ok(&*task)
            }
            Some("delete") => {
                self.tasks.remove(index);
                ok(&json!({ "message": "Task deleted successfully" }))
            }
            _ => status(404, "Not Found"),
        }
    }

    fn insert_task(&mut self, title: &str, completed: bool) -> Task {
        let task = Task {
            id: self.next_task_id,
            title: title.to_owned(),
            description: None,
            completed,
            due_date: None,
            owner_id: 1,
            created_at: "2024-03-01T10:00:00".to_owned(),
            updated_at: "2024-03-01T10:00:00".to_owned(),
        };
        self.next_task_id += 1;
        self.tasks.push(task.clone());
        task
    }
}

fn field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn token_pair() -> Value {
    json!({ "access_token": "access", "refresh_token": "refresh", "token_type": "bearer" })
}

fn ok<T: serde::Serialize + ?Sized>(body: &T) -> ApiResponse {
    ApiResponse {
        status: 200,
        body: serde_json::to_string(body).unwrap_or_default(),
    }
}

fn status(code: u16, detail: &str) -> ApiResponse {
    ApiResponse {
        status: code,
        body: json!({ "detail": detail }).to_string(),
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(crate) fn seen(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

// =============================================================================
// WIRING
// =============================================================================

pub(crate) struct Harness {
    pub(crate) api: Arc<FakeApi>,
    pub(crate) navigator: Arc<MemoryNavigator>,
    pub(crate) client: Arc<ApiClient>,
}

/// Client over `api`, with the user sitting on `path`.
pub(crate) fn harness(api: FakeApi, path: &str) -> Harness {
    harness_with_config(api, path, &ClientConfig::default())
}

pub(crate) fn harness_with_config(api: FakeApi, path: &str, config: &ClientConfig) -> Harness {
    let api = Arc::new(api);
    let navigator = Arc::new(MemoryNavigator::new(path));
    let client = Arc::new(ApiClient::with_transport(api.clone(), navigator.clone(), config));
    Harness { api, navigator, client }
}
