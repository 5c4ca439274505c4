use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::filters::BoxedFilter;
use warp::reply::Reply;
use warp::Filter;

use crate::clock::{Clock, TokioClock};
use crate::controller::{ControllerError, GameController};
use crate::events::EventBus;
use crate::handlers;
use crate::metrics::MetricsCollector;
use crate::replay::{JsonFileSink, ReplayStore};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
    replay_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            replay_dir: None,
        }
    }

    /// Reads `PORT` from the environment, falling back to 3000.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self::new("127.0.0.1", port)
    }

    pub fn with_replay_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.replay_dir = Some(dir.into());
        self
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Shared wiring for the whole surface: bus, controller, replay store
/// and metrics, built once and cloned into every route.
#[derive(Clone)]
pub struct AppContext {
    config: ServerConfig,
    bus: EventBus,
    controller: GameController,
    replays: Arc<ReplayStore>,
    metrics: MetricsCollector,
}

impl AppContext {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Test entry point: everything timed runs off the supplied clock.
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let bus = EventBus::new();
        let metrics = MetricsCollector::new();
        let replays = Arc::new(match &config.replay_dir {
            Some(dir) => ReplayStore::with_sink(Arc::new(JsonFileSink::new(dir.clone()))),
            None => ReplayStore::new(),
        });
        let controller = GameController::new(
            bus.clone(),
            clock,
            Arc::clone(&replays),
            metrics.clone(),
        );
        Self {
            config,
            bus,
            controller,
            replays,
            metrics,
        }
    }

    pub fn new_for_tests() -> Self {
        Self::new(ServerConfig::for_tests())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn controller(&self) -> GameController {
        self.controller.clone()
    }

    pub fn replays(&self) -> Arc<ReplayStore> {
        Arc::clone(&self.replays)
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),
}

pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            context: AppContext::new(config),
        }
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let bind_addr = Self::bind_addr(context.config())?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        tracing::info!(address = %addr, "server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            context,
        })
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();
        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }
        let candidate = format!("{}:{}", host, config.port());
        candidate
            .to_socket_addrs()
            .map_err(|err| {
                ServerError::ConfigError(format!("failed to resolve `{candidate}`: {err}"))
            })?
            .next()
            .ok_or_else(|| ServerError::ConfigError(format!("failed to resolve `{candidate}`")))
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;
        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                return ServerError::BindError(std::io::Error::new(
                    io_err.kind(),
                    io_err.to_string(),
                ));
            }
        }
        ServerError::ConfigError(err.to_string())
    }

    pub fn routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let health = warp::path!("health")
            .and(warp::get())
            .and_then(|| async { Ok::<_, Infallible>(handlers::health().await) });

        let metrics = context.metrics();
        let stats = warp::path!("stats")
            .and(warp::get())
            .and(warp::any().map(move || metrics.clone()))
            .and_then(|metrics| async move {
                Ok::<_, Infallible>(handlers::stats(metrics).await)
            });

        let games = Self::game_routes(context);
        let replays = Self::replay_routes(context);
        let socket = Self::socket_route(context);

        health
            .map(Reply::into_response)
            .or(stats.map(Reply::into_response))
            .unify()
            .or(games)
            .unify()
            .or(replays)
            .unify()
            .or(socket)
            .unify()
            .boxed()
    }

    fn game_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let with_controller = Self::with_controller(context.controller());

        let list = warp::path!("api" / "games")
            .and(warp::get())
            .and(with_controller.clone())
            .and_then(|controller| async move {
                Ok::<_, Infallible>(handlers::list_games(controller).await)
            });

        let create = warp::path!("api" / "games")
            .and(warp::post())
            .and(with_controller.clone())
            .and(warp::body::json())
            .and_then(|controller, request: handlers::CreateGameRequest| async move {
                Ok::<_, Infallible>(handlers::create_game(controller, request).await)
            });

        let available = warp::path!("api" / "games" / "available")
            .and(warp::get())
            .and(with_controller.clone())
            .and_then(|controller| async move {
                Ok::<_, Infallible>(handlers::available_games(controller).await)
            });

        let meta = warp::path!("api" / "games" / String)
            .and(warp::get())
            .and(with_controller.clone())
            .and_then(|game_id, controller| async move {
                Ok::<_, Infallible>(handlers::get_game(controller, game_id).await)
            });

        let state = warp::path!("api" / "games" / String / "state")
            .and(warp::get())
            .and(with_controller.clone())
            .and(warp::query::<handlers::StateQuery>())
            .and_then(|game_id, controller, query| async move {
                Ok::<_, Infallible>(handlers::game_state(controller, game_id, query).await)
            });

        let start = warp::path!("api" / "games" / String / "start")
            .and(warp::post())
            .and(with_controller.clone())
            .and(warp::body::bytes())
            .and_then(|game_id, controller, body| async move {
                Ok::<_, Infallible>(handlers::start_game(controller, game_id, body).await)
            });

        let actions = warp::path!("api" / "games" / String / "actions")
            .and(warp::post())
            .and(with_controller.clone())
            .and(warp::body::json())
            .and_then(|game_id, controller, submitted| async move {
                Ok::<_, Infallible>(handlers::submit_action(controller, game_id, submitted).await)
            });

        let delete = warp::path!("api" / "games" / String)
            .and(warp::delete())
            .and(with_controller.clone())
            .and_then(|game_id, controller| async move {
                Ok::<_, Infallible>(handlers::delete_game(controller, game_id).await)
            });

        let controller_for_sse = context.controller();
        let bus_for_sse = context.bus();
        let events = warp::path!("api" / "games" / String / "events")
            .and(warp::get())
            .and(warp::any().map(move || controller_for_sse.clone()))
            .and(warp::any().map(move || bus_for_sse.clone()))
            .and_then(|game_id, controller, bus| async move {
                Ok::<_, Infallible>(handlers::stream_events(game_id, controller, bus).await)
            });

        list.or(available)
            .unify()
            .or(create)
            .unify()
            .or(state)
            .unify()
            .or(start)
            .unify()
            .or(actions)
            .unify()
            .or(events)
            .unify()
            .or(meta)
            .unify()
            .or(delete)
            .unify()
            .boxed()
    }

    fn replay_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let with_store = Self::with_replays(context.replays());

        let full = warp::path!("api" / "replays" / String)
            .and(warp::get())
            .and(with_store.clone())
            .and_then(|game_id, store| async move {
                Ok::<_, Infallible>(handlers::get_replay(store, game_id).await)
            });

        let analysis = warp::path!("api" / "replays" / String / "analysis")
            .and(warp::get())
            .and(with_store.clone())
            .and_then(|game_id, store| async move {
                Ok::<_, Infallible>(handlers::get_analysis(store, game_id).await)
            });

        let hand = warp::path!("api" / "replays" / String / "hands" / u64)
            .and(warp::get())
            .and(with_store.clone())
            .and_then(|game_id, hand_number, store| async move {
                Ok::<_, Infallible>(handlers::get_hand(store, game_id, hand_number).await)
            });

        let save = warp::path!("api" / "replays" / String / "save")
            .and(warp::post())
            .and(with_store)
            .and_then(|game_id, store| async move {
                Ok::<_, Infallible>(handlers::save_replay(store, game_id).await)
            });

        analysis
            .or(hand)
            .unify()
            .or(save)
            .unify()
            .or(full)
            .unify()
            .boxed()
    }

    fn socket_route(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let controller = context.controller();
        let bus = context.bus();
        let metrics = context.metrics();

        warp::path!("ws")
            .and(warp::ws())
            .and(warp::any().map(move || controller.clone()))
            .and(warp::any().map(move || bus.clone()))
            .and(warp::any().map(move || metrics.clone()))
            .map(
                |ws: warp::ws::Ws,
                 controller: GameController,
                 bus: EventBus,
                 metrics: MetricsCollector| {
                    ws.on_upgrade(move |socket| {
                        handlers::client_connection(socket, controller, bus, metrics)
                    })
                    .into_response()
                },
            )
            .boxed()
    }

    fn with_controller(
        controller: GameController,
    ) -> impl Filter<Extract = (GameController,), Error = Infallible> + Clone {
        warp::any().map(move || controller.clone())
    }

    fn with_replays(
        replays: Arc<ReplayStore>,
    ) -> impl Filter<Extract = (Arc<ReplayStore>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&replays))
    }
}

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        self.context.controller().destroy();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
