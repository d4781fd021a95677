#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use lokitee::loki::PushRequest;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// One request received by the mock.
#[derive(Debug, Clone)]
pub struct Captured {
    pub status: u16,
    pub body: PushRequest,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub at: Instant,
    /// Held past the client timeout, so the client never saw the status.
    pub stalled: bool,
}

#[derive(Default)]
struct MockState {
    /// Statuses returned before falling back to `default_status`.
    script: Mutex<VecDeque<u16>>,
    default_status: Mutex<u16>,
    /// Requests to hold before answering, one delay per request.
    stalls: Mutex<VecDeque<Duration>>,
    requests: Mutex<Vec<Captured>>,
}

/// In-process Loki push endpoint.
pub struct MockLoki {
    pub url: String,
    state: Arc<MockState>,
}

impl MockLoki {
    pub async fn start() -> Self {
        Self::with_script(Vec::new()).await
    }

    /// Answer with `script` in order, then 204 forever.
    pub async fn with_script(script: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, script)
    }

    /// Bind a specific address, e.g. one a client has been failing to reach.
    pub async fn start_at(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener, Vec::new())
    }

    fn serve(listener: TcpListener, script: Vec<u16>) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            default_status: Mutex::new(204),
            stalls: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/loki/api/v1/push", post(push))
            .with_state(Arc::clone(&state));

        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_default_status(&self, status: u16) {
        *self.state.default_status.lock().unwrap() = status;
    }

    /// Hold each of the next requests for the given time before answering.
    pub fn stall(&self, delays: Vec<Duration>) {
        self.state.stalls.lock().unwrap().extend(delays);
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Bodies that were answered with 204.
    pub fn delivered(&self) -> Vec<PushRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.status == 204 && !r.stalled)
            .map(|r| r.body)
            .collect()
    }

    pub async fn wait_for_deliveries(&self, count: usize, timeout: Duration) -> Vec<PushRequest> {
        let deadline = Instant::now() + timeout;
        loop {
            let delivered = self.delivered();
            if delivered.len() >= count || Instant::now() >= deadline {
                return delivered;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn push(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let status = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| *state.default_status.lock().unwrap());

    let stall = state.stalls.lock().unwrap().pop_front();

    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    state.requests.lock().unwrap().push(Captured {
        status,
        body: serde_json::from_slice(&body).expect("push body is a Loki push request"),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        at: Instant::now(),
        stalled: stall.is_some(),
    });

    if let Some(delay) = stall {
        tokio::time::sleep(delay).await;
    }

    StatusCode::from_u16(status).unwrap()
}

pub fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// A record in the default field layout.
pub fn record(time: DateTime<Utc>, level: &str, target: &str, extra: serde_json::Value) -> Vec<u8> {
    let mut value = serde_json::json!({
        "timestamp": rfc3339(time),
        "level": level,
        "target": target,
    });
    if let (Some(map), serde_json::Value::Object(extra)) = (value.as_object_mut(), extra) {
        map.extend(extra);
    }
    serde_json::to_vec(&value).unwrap()
}
