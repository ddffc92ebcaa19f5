use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use sap_assist::auth::{session::basic_credentials, PasswordCipher};
use sap_assist::config::{
    AppConfig, LeaveSubmitMethod, RateLimitSettings, DEFAULT_LEAVE_SERVICE_PATH,
};
use sap_assist::models::{
    LeaveRequest, NewLeaveRequest, NewPurchaseRequest, NewUser, PaginationQuery, PurchaseRequest,
    User,
};
use sap_assist::ratelimit::build_rate_limiter;
use sap_assist::repository::{Repository, RepositoryError, RepositoryResult};
use sap_assist::routes;
use sap_assist::state::AppState;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

pub const TEST_ENCRYPTION_KEY: &str = "integration-test-key";
pub const TEST_ORIGIN: &str = "http://localhost:5173";
pub const ERP_PERSONNEL_NUMBER: &str = "00001234";
pub const ERP_PASSWORD: &str = "secret";
pub const ERP_CSRF_TOKEN: &str = "fake-csrf-token==";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    leave_requests: Vec<LeaveRequest>,
    purchase_requests: Vec<PurchaseRequest>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Repository double that keeps rows in memory but still encrypts passwords.
pub struct InMemoryRepository {
    cipher: PasswordCipher,
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new(cipher: PasswordCipher) -> Self {
        Self {
            cipher,
            tables: Mutex::new(Tables::default()),
        }
    }

    #[allow(dead_code)]
    pub async fn stored_password(&self, user_id: i32) -> Option<String> {
        let tables = self.tables.lock().await;
        tables
            .users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.password_hash.clone())
    }

    fn seal(&self, password: &str) -> RepositoryResult<String> {
        self.cipher.encrypt(password).map_err(RepositoryError::Cipher)
    }

    fn open(&self, mut user: User) -> RepositoryResult<User> {
        user.password_hash = self
            .cipher
            .decrypt(&user.password_hash)
            .map_err(RepositoryError::Cipher)?;
        Ok(user)
    }
}

fn page<T>(rows: Vec<T>, pagination: PaginationQuery) -> Vec<T> {
    rows.into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .collect()
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let password_hash = self.seal(&user.password_hash)?;
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let stored = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(stored.clone());
        drop(tables);
        self.open(stored)
    }

    async fn get_user(&self, id: i32) -> RepositoryResult<User> {
        let tables = self.tables.lock().await;
        let stored = tables
            .users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        drop(tables);
        self.open(stored)
    }

    async fn update_user(&self, id: i32, user: NewUser) -> RepositoryResult<User> {
        let password_hash = self.seal(&user.password_hash)?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .users
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(RepositoryError::NotFound)?;
        stored.username = user.username;
        stored.email = user.email;
        stored.password_hash = password_hash;
        stored.first_name = user.first_name;
        stored.last_name = user.last_name;
        stored.role = user.role;
        stored.updated_at = Utc::now();
        let stored = stored.clone();
        drop(tables);
        self.open(stored)
    }

    async fn delete_user(&self, id: i32) -> RepositoryResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.users.len();
        tables.users.retain(|user| user.id != id);
        if tables.users.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_leave_request(&self, request: NewLeaveRequest) -> RepositoryResult<LeaveRequest> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let stored = LeaveRequest {
            id: tables.next_id(),
            user_id: request.user_id,
            start_date: request.start_date,
            end_date: request.end_date,
            leave_type: request.leave_type,
            status: request.status,
            reason: request.reason,
            created_at: now,
            updated_at: now,
        };
        tables.leave_requests.push(stored.clone());
        Ok(stored)
    }

    async fn get_leave_request(&self, id: i32) -> RepositoryResult<LeaveRequest> {
        let tables = self.tables.lock().await;
        tables
            .leave_requests
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_leave_request(
        &self,
        id: i32,
        request: NewLeaveRequest,
    ) -> RepositoryResult<LeaveRequest> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .leave_requests
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(RepositoryError::NotFound)?;
        stored.user_id = request.user_id;
        stored.start_date = request.start_date;
        stored.end_date = request.end_date;
        stored.leave_type = request.leave_type;
        stored.status = request.status;
        stored.reason = request.reason;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_leave_request(&self, id: i32) -> RepositoryResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.leave_requests.len();
        tables.leave_requests.retain(|row| row.id != id);
        if tables.leave_requests.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_leave_requests(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> RepositoryResult<Vec<LeaveRequest>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<LeaveRequest> = tables
            .leave_requests
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, pagination))
    }

    async fn create_purchase_request(
        &self,
        request: NewPurchaseRequest,
    ) -> RepositoryResult<PurchaseRequest> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let stored = PurchaseRequest {
            id: tables.next_id(),
            user_id: request.user_id,
            item_name: request.item_name,
            quantity: request.quantity,
            estimated_cost: request.estimated_cost,
            status: request.status,
            reason: request.reason,
            created_at: now,
            updated_at: now,
        };
        tables.purchase_requests.push(stored.clone());
        Ok(stored)
    }

    async fn get_purchase_request(&self, id: i32) -> RepositoryResult<PurchaseRequest> {
        let tables = self.tables.lock().await;
        tables
            .purchase_requests
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_purchase_request(
        &self,
        id: i32,
        request: NewPurchaseRequest,
    ) -> RepositoryResult<PurchaseRequest> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .purchase_requests
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(RepositoryError::NotFound)?;
        stored.user_id = request.user_id;
        stored.item_name = request.item_name;
        stored.quantity = request.quantity;
        stored.estimated_cost = request.estimated_cost;
        stored.status = request.status;
        stored.reason = request.reason;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_purchase_request(&self, id: i32) -> RepositoryResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.purchase_requests.len();
        tables.purchase_requests.retain(|row| row.id != id);
        if tables.purchase_requests.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_purchase_requests(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> RepositoryResult<Vec<PurchaseRequest>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<PurchaseRequest> = tables
            .purchase_requests
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, pagination))
    }
}

async fn spawn_upstream(router: Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{addr}"))
}

#[derive(Clone)]
struct NlpReply {
    status: StatusCode,
    body: Value,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn nlp_classify(State(reply): State<NlpReply>, Json(payload): Json<Value>) -> Response {
    reply.requests.lock().await.push(payload);
    (reply.status, Json(reply.body.clone())).into_response()
}

/// Stand-in for the classification service.
pub struct FakeNlp {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeNlp {
    pub async fn start(status: StatusCode, body: Value) -> Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let reply = NlpReply {
            status,
            body,
            requests: requests.clone(),
        };
        let router = Router::new()
            .route("/classify", post(nlp_classify))
            .with_state(reply);
        Ok(Self {
            base_url: spawn_upstream(router).await?,
            requests,
        })
    }

    #[allow(dead_code)]
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.lock().await.clone()
    }
}

#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct RecordedSubmission {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone)]
struct ErpState {
    submit_status: StatusCode,
    logins: Arc<AtomicUsize>,
    submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
}

async fn erp_handler(
    State(erp): State<ErpState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::GET {
        erp.logins.fetch_add(1, Ordering::SeqCst);
        let expected = format!(
            "Basic {}",
            basic_credentials(ERP_PERSONNEL_NUMBER, ERP_PASSWORD)
        );
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            == Some(expected.as_str());
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        return Response::builder()
            .status(StatusCode::OK)
            .header("x-csrf-token", ERP_CSRF_TOKEN)
            .header("set-cookie", "SAP_SESSIONID_S4H_100=abc123; path=/; HttpOnly")
            .header("set-cookie", "sap-usercontext=sap-client=100; path=/")
            .body(Body::from("{\"d\":{\"results\":[]}}"))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    erp.submissions.lock().await.push(RecordedSubmission {
        method,
        path: uri.path().to_string(),
        headers,
        body: payload.clone(),
    });

    if erp.submit_status.is_success() {
        let request_id = payload["d"]["RequestId"].clone();
        (
            erp.submit_status,
            Json(json!({ "d": { "RequestId": request_id, "Status": "SENT" } })),
        )
            .into_response()
    } else {
        (erp.submit_status, "backend exploded").into_response()
    }
}

/// Stand-in for the ERP OData service. Accepts one credential pair.
pub struct FakeErp {
    pub base_url: String,
    logins: Arc<AtomicUsize>,
    submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
}

impl FakeErp {
    pub async fn start(submit_status: StatusCode) -> Result<Self> {
        let logins = Arc::new(AtomicUsize::new(0));
        let submissions = Arc::new(Mutex::new(Vec::new()));
        let state = ErpState {
            submit_status,
            logins: logins.clone(),
            submissions: submissions.clone(),
        };
        let router = Router::new().fallback(erp_handler).with_state(state);
        Ok(Self {
            base_url: spawn_upstream(router).await?,
            logins,
            submissions,
        })
    }

    #[allow(dead_code)]
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().await.clone()
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused@localhost/unused".to_string(),
        database_max_pool_size: 1,
        database_min_idle: 0,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        nlp_service_url: String::new(),
        sap_base_url: String::new(),
        sap_client_id: String::new(),
        sap_client_secret: String::new(),
        sap_leave_service_path: DEFAULT_LEAVE_SERVICE_PATH.to_string(),
        sap_leave_submit_method: LeaveSubmitMethod::Post,
        sap_verify_tls: true,
        outbound_timeout_secs: 5,
        allowed_origin: TEST_ORIGIN.to_string(),
        encryption_key: TEST_ENCRYPTION_KEY.to_string(),
        enable_test_login: true,
        rate_limit: RateLimitSettings {
            per_second: 1000.0,
            burst: 10_000,
            ..RateLimitSettings::default()
        },
    }
}

pub fn default_intent() -> Value {
    json!({
        "intent": "leave_request",
        "confidence": 0.92,
        "response": "ok",
        "entities": {}
    })
}

pub struct TestApp {
    router: Router,
    peer: SocketAddr,
    pub repository: Arc<InMemoryRepository>,
    pub nlp: FakeNlp,
    pub erp: FakeErp,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::build(|_| {}).await
    }

    pub async fn build(configure: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        Self::build_with(
            StatusCode::OK,
            default_intent(),
            StatusCode::CREATED,
            configure,
        )
        .await
    }

    pub async fn build_with(
        nlp_status: StatusCode,
        nlp_body: Value,
        erp_submit_status: StatusCode,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Result<Self> {
        let nlp = FakeNlp::start(nlp_status, nlp_body).await?;
        let erp = FakeErp::start(erp_submit_status).await?;

        let mut config = test_config();
        config.nlp_service_url = nlp.base_url.clone();
        config.sap_base_url = erp.base_url.clone();
        configure(&mut config);

        let cipher = PasswordCipher::new(&config.encryption_key)?;
        let repository = Arc::new(InMemoryRepository::new(cipher));
        let repository_for_state: Arc<dyn Repository> = repository.clone();
        let rate_limiter = build_rate_limiter(&config.rate_limit)?;
        let state = AppState::new(config, repository_for_state, rate_limiter)?;
        let router = routes::create_router(state)?;

        Ok(Self {
            router,
            peer: SocketAddr::from(([203, 0, 113, 7], 40_000)),
            repository,
            nlp,
            erp,
        })
    }

    /// Dispatches through the full middleware stack. Requests without peer info
    /// appear to come from a fixed test address.
    pub async fn send(&self, mut request: Request<Body>) -> Result<Response> {
        if request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .is_none()
        {
            request.extensions_mut().insert(ConnectInfo(self.peer));
        }
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn request_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<Response> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, payload: &T) -> Result<Response> {
        self.request_json(Method::POST, path, payload, None).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, payload: &T) -> Result<Response> {
        self.request_json(Method::PUT, path, payload, None).await
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str) -> Result<Response> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn create_user(&self, username: &str) -> Result<Value> {
        let response = self
            .post_json(
                "/api/v1/users",
                &json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password_hash": "pw",
                    "first_name": "Test",
                    "last_name": "User",
                    "role": "user"
                }),
            )
            .await?;
        let (status, body) = read_json(response).await?;
        if status != StatusCode::CREATED {
            return Err(anyhow!("create user failed with {status}: {body}"));
        }
        Ok(body)
    }

    /// Inserts leave rows straight through the repository, oldest first, each
    /// with a distinct `created_at`.
    #[allow(dead_code)]
    pub async fn seed_leave_requests(&self, user_id: i32, count: usize) -> Result<Vec<i32>> {
        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            let start = Utc::now() + Duration::days(index as i64);
            let row = self
                .repository
                .create_leave_request(NewLeaveRequest {
                    user_id,
                    start_date: start,
                    end_date: start + Duration::days(1),
                    leave_type: "annual".to_string(),
                    status: "pending".to_string(),
                    reason: format!("seed {index}"),
                })
                .await
                .context("failed to seed leave request")?;
            ids.push(row.id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        Ok(ids)
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json(response: Response) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let bytes = body_to_vec(response.into_body()).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("response body is not JSON: {}", String::from_utf8_lossy(&bytes)))?
    };
    Ok((status, value))
}
