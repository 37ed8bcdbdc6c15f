use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use axum::{extract::State, response::Html, routing::get, Json, Router};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use fancontrol_common::{
    render_page, ControllerStatus, DriveError, FanCommand, FanEngine, RuntimeConfig,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<FanEngine>>,
    pwm: Arc<SimPwm>,
    pot: Arc<SimPot>,
}

struct SimPwm {
    duty: AtomicU16,
}

impl SimPwm {
    fn new() -> Self {
        Self {
            duty: AtomicU16::new(0),
        }
    }

    fn set_duty(&self, duty: u16) -> Result<(), DriveError> {
        self.duty.store(duty, Ordering::Relaxed);
        debug!("pwm duty set to {duty}");
        Ok(())
    }

    fn duty(&self) -> u16 {
        self.duty.load(Ordering::Relaxed)
    }
}

// baseline from FANCONTROL_SIM_POT_RAW, plus a small wobble per tick
struct SimPot {
    base: AtomicU16,
    tick: AtomicU64,
}

impl SimPot {
    fn from_env() -> Self {
        let base = std::env::var("FANCONTROL_SIM_POT_RAW")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(32_767);
        Self {
            base: AtomicU16::new(base),
            tick: AtomicU64::new(0),
        }
    }

    fn read(&self) -> u16 {
        let tick = self.tick.load(Ordering::Relaxed);
        let wobble = ((tick % 8) as u16) * 512;
        self.base.load(Ordering::Relaxed).saturating_add(wobble)
    }

    fn advance(&self) {
        self.tick.fetch_add(1, Ordering::Relaxed);
    }
}

struct AppStore {
    runtime_path: PathBuf,
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("FANCONTROL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.fancontrol"));

        Self {
            runtime_path: data_dir.join("runtime.json"),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    loop {
        match run_once().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                let delay_ms = RuntimeConfig::default().fan.restart_delay_ms;
                warn!("controller fault: {err:#}; restarting in {delay_ms}ms");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

async fn run_once() -> anyhow::Result<()> {
    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.fan.sanitize();

    let state = AppState {
        engine: Arc::new(Mutex::new(FanEngine::new(runtime.fan.clone()))),
        pwm: Arc::new(SimPwm::new()),
        pot: Arc::new(SimPot::from_env()),
    };

    if let Err(err) = state.pwm.set_duty(0) {
        warn!("initial pwm write failed: {err}");
    }

    let sampler = spawn_sampler(state.clone(), runtime.fan.sample_interval_ms);

    let app = Router::new()
        .route("/override", get(handle_override))
        .route("/manual", get(handle_manual))
        .route("/off", get(handle_off))
        .route("/api/status", get(handle_status))
        .fallback(handle_unrecognized)
        .with_state(state);

    let port = std::env::var("FANCONTROL_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("fan controller listening on http://{addr}");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sampler.abort();
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

fn spawn_sampler(state: AppState, period_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
        loop {
            interval.tick().await;
            state.pot.advance();

            let mut engine = state.engine.lock().await;
            let raw = state.pot.read();
            if let Some(duty) = engine.tick(raw) {
                debug!("manual mode sample: {}%", engine.current_percent());
                if let Err(err) = state.pwm.set_duty(duty) {
                    warn!("pwm write failed on tick: {err}");
                }
            }
        }
    })
}

async fn apply_and_render(state: &AppState, command: Option<FanCommand>) -> Html<String> {
    let mut engine = state.engine.lock().await;

    if let Some(command) = command {
        let raw = state.pot.read();
        let duty = engine.apply_command(command, raw);
        info!(
            "{} mode: {}%",
            engine.mode().as_str(),
            engine.current_percent()
        );
        if let Err(err) = state.pwm.set_duty(duty) {
            warn!(
                "pwm write failed after {} transition: {err}",
                engine.mode().as_str()
            );
        }
    }

    Html(render_page(engine.mode(), engine.current_percent()))
}

async fn handle_override(State(state): State<AppState>) -> Html<String> {
    apply_and_render(&state, Some(FanCommand::SetOverride)).await
}

async fn handle_manual(State(state): State<AppState>) -> Html<String> {
    apply_and_render(&state, Some(FanCommand::SetManual)).await
}

async fn handle_off(State(state): State<AppState>) -> Html<String> {
    apply_and_render(&state, Some(FanCommand::SetOff)).await
}

async fn handle_unrecognized(State(state): State<AppState>) -> Html<String> {
    apply_and_render(&state, None).await
}

async fn handle_status(State(state): State<AppState>) -> Json<ControllerStatus> {
    let engine = state.engine.lock().await;
    let mut status = engine.status();
    status.duty = state.pwm.duty();
    Json(status)
}
