use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use kasira_api::{
    config::AppConfig,
    db,
    entities::{product, stock},
    errors::ServiceError,
    events::{self, EventSender},
    gateway::{
        compute_signature, CreateSessionRequest, GatewaySession, GatewayStatusReport,
        GatewayTransactionStatus, PaymentGateway,
    },
    handlers::AppServices,
    AppState,
};

/// Scripted gateway double: sessions succeed with a canned token, status
/// polls answer from a per-order table.
pub struct MockGateway {
    pub sessions: Mutex<Vec<CreateSessionRequest>>,
    statuses: Mutex<HashMap<String, GatewayStatusReport>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Script the answer for a later status poll of `order_id`.
    pub fn set_status(
        &self,
        order_id: &str,
        status: GatewayTransactionStatus,
        fraud_status: Option<&str>,
    ) {
        self.statuses.lock().unwrap().insert(
            order_id.to_string(),
            GatewayStatusReport {
                order_id: order_id.to_string(),
                transaction_id: Some(format!("mock-{}", order_id)),
                transaction_status: status,
                fraud_status: fraud_status.map(str::to_string),
                payment_type: Some("qris".to_string()),
            },
        );
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let token = format!("mock-token-{}", request.order_id);
        self.sessions.lock().unwrap().push(request);
        Ok(GatewaySession {
            redirect_url: format!("https://gateway.test/pay/{}", token),
            token,
        })
    }

    async fn fetch_status(&self, order_id: &str) -> Result<GatewayStatusReport, ServiceError> {
        self.statuses
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::GatewaySessionError(format!("no scripted status for {}", order_id))
            })
    }
}

/// Test harness: application state over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with a fresh schema.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            gateway.clone(),
            event_sender.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .route(
                "/health",
                get(kasira_api::handlers::health::health_check),
            )
            .nest("/api/v1", kasira_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed a product with on-hand stock; returns the product id.
    pub async fn seed_product(&self, name: &str, price: i64, quantity: i32) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            sku: Set(format!("sku-{}", id.simple())),
            price: Set(price),
            is_active: Set(true),
            category: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product");

        stock::ActiveModel {
            product_id: Set(id),
            quantity: Set(quantity),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed stock");

        id
    }

    /// Current on-hand quantity for a product.
    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        stock::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("stock query")
            .map(|s| s.quantity)
            .unwrap_or(0)
    }

    /// Webhook signature as the gateway would compute it.
    pub fn sign(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        compute_signature(
            order_id,
            status_code,
            gross_amount,
            &self.state.config.gateway_server_key,
        )
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
