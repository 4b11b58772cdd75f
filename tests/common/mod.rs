//! Shared fixtures: an in-process fake ACE-Step API and a launcher that
//! "starts" it by flipping its health flag.

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use nueva_bridge::supervisor::{
    EngineLauncher, EngineProcess, HttpHealthProbe, ProcessExit, Supervisor, SupervisorConfig,
};
use nueva_bridge::{Dispatcher, HttpEngineClient};

#[derive(Clone, Default)]
pub struct EngineState {
    pub up: Arc<AtomicBool>,
    pub generate_calls: Arc<AtomicUsize>,
    pub payloads: Arc<Mutex<Vec<Value>>>,
    /// File written and returned as `audio_path` on success
    pub result_file: Arc<Mutex<Option<PathBuf>>>,
    pub fail_with: Arc<Mutex<Option<String>>>,
}

pub struct FakeEngine {
    pub base_url: String,
    pub state: EngineState,
}

impl FakeEngine {
    pub async fn spawn() -> Self {
        let state = EngineState::default();
        let router = Router::new()
            .route("/health", get(health))
            .route("/models", get(models))
            .route("/generate", post(generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_up(&self, up: bool) {
        self.state.up.store(up, Ordering::SeqCst);
    }

    pub fn generate_calls(&self) -> usize {
        self.state.generate_calls.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Value {
        self.state.payloads.lock().unwrap().last().cloned().unwrap()
    }

    pub fn produce(&self, path: PathBuf) {
        *self.state.result_file.lock().unwrap() = Some(path);
    }
}

async fn health(State(state): State<EngineState>) -> StatusCode {
    if state.up.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn models() -> Json<Value> {
    Json(json!({"models": ["acestep-v15-turbo"]}))
}

async fn generate(
    State(state): State<EngineState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.generate_calls.fetch_add(1, Ordering::SeqCst);
    state.payloads.lock().unwrap().push(payload);

    if let Some(reason) = state.fail_with.lock().unwrap().clone() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": reason})));
    }

    let audio_path = state.result_file.lock().unwrap().clone();
    if let Some(path) = &audio_path {
        std::fs::write(path, b"RIFF....WAVEfmt fake-audio").unwrap();
    }
    (
        StatusCode::OK,
        Json(json!({"audio_path": audio_path, "metadata": {"model": "acestep-v15-turbo"}})),
    )
}

/// Launcher whose "process" is the fake engine's health flag.
pub struct FlagLauncher {
    pub up: Arc<AtomicBool>,
    pub launches: Arc<AtomicUsize>,
}

impl EngineLauncher for FlagLauncher {
    fn launch(&self) -> io::Result<Box<dyn EngineProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.up.store(true, Ordering::SeqCst);
        Ok(Box::new(FlagProcess {
            up: self.up.clone(),
        }))
    }
}

struct FlagProcess {
    up: Arc<AtomicBool>,
}

#[async_trait]
impl EngineProcess for FlagProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(None)
    }

    fn request_terminate(&mut self) -> io::Result<()> {
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        Ok(ProcessExit { code: Some(0) })
    }

    async fn stderr_tail(&mut self) -> String {
        String::new()
    }
}

pub struct Bridge {
    pub dispatcher: Dispatcher,
    pub launches: Arc<AtomicUsize>,
}

/// Dispatcher wired to the fake engine through the real probe and client.
pub fn bridge(engine: &FakeEngine, auto_start: bool) -> Bridge {
    let launches = Arc::new(AtomicUsize::new(0));
    let config = SupervisorConfig {
        upstream_url: engine.base_url.clone(),
        auto_start,
        startup_timeout: Duration::from_secs(3),
        health_check_interval: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(1),
    };
    let probe = HttpHealthProbe::new(&engine.base_url).unwrap();
    let launcher = FlagLauncher {
        up: engine.state.up.clone(),
        launches: launches.clone(),
    };
    let supervisor = Supervisor::new(config, Arc::new(probe), Arc::new(launcher));
    let client = HttpEngineClient::new(&engine.base_url, Duration::from_secs(5));

    Bridge {
        dispatcher: Dispatcher::new(supervisor, Arc::new(client)),
        launches,
    }
}
