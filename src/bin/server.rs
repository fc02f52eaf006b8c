use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use tetra_arena_server::protocol::parse_client_message;
use tetra_arena_server::registry::Registry;
use tetra_arena_server::score_store::{FileScoreStore, ScoreStore};
use tetra_arena_server::server_utils::parse_scores_limit;
use tetra_arena_server::transport::{encode_frame, Outbound};
use tetra_arena_server::types::{ErrorKind, GameEvent};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type ClientMap = Arc<std::sync::Mutex<HashMap<String, mpsc::Sender<String>>>>;

/// Fans events out over the per-connection writer queues. Frames for slow
/// consumers are dropped rather than blocking a room's critical section.
struct WsOutbound {
    clients: ClientMap,
}

impl Outbound for WsOutbound {
    fn send_to(&self, conn_id: &str, event: &GameEvent) {
        let Some(frame) = encode_frame(event) else {
            eprintln!("[server] failed to encode outbound frame");
            return;
        };
        let clients = self.clients.lock().expect("client map lock");
        if let Some(tx) = clients.get(conn_id) {
            let _ = tx.try_send(frame);
        }
    }
}

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    clients: ClientMap,
    outbound: Arc<WsOutbound>,
    scores: Arc<FileScoreStore>,
}

#[derive(Debug, Deserialize)]
struct ScoresQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);
    let client_origin =
        std::env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let score_path = std::env::var("SCORE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/scores.json"));

    let clients: ClientMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
    let outbound = Arc::new(WsOutbound {
        clients: clients.clone(),
    });
    let scores = Arc::new(FileScoreStore::new(score_path));
    let registry = Arc::new(Registry::new(
        outbound.clone(),
        Some(scores.clone() as Arc<dyn ScoreStore>),
    ));

    let cors = CorsLayer::new()
        .allow_origin(
            client_origin
                .parse::<HeaderValue>()
                .expect("invalid CLIENT_ORIGIN"),
        )
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/scores", get(scores_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(AppState {
            registry,
            clients,
            outbound,
            scores,
        });

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    println!("[server] listening on :{port} (client origin {client_origin})");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn scores_handler(
    State(state): State<AppState>,
    Query(query): Query<ScoresQuery>,
) -> impl IntoResponse {
    Json(state.scores.top_scores(parse_scores_limit(query.limit.as_deref())))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let conn_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<String>(256);

    state
        .clients
        .lock()
        .expect("client map lock")
        .insert(conn_id.clone(), tx.clone());
    println!("[server] {conn_id} connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_frame(&state, &conn_id, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_frame(&state, &conn_id, &text).await;
                } else {
                    reject_frame(&state, &conn_id, "frame is not utf-8");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // A dropped connection behaves exactly like an explicit leave.
    state.registry.leave(&conn_id).await;
    state
        .clients
        .lock()
        .expect("client map lock")
        .remove(&conn_id);
    println!("[server] {conn_id} disconnected");

    drop(tx);
    let _ = writer.await;
}

async fn handle_frame(state: &AppState, conn_id: &str, raw: &str) {
    match parse_client_message(raw) {
        Some(message) => state.registry.dispatch(conn_id, message).await,
        None => reject_frame(state, conn_id, "unrecognized frame"),
    }
}

fn reject_frame(state: &AppState, conn_id: &str, message: &str) {
    state.outbound.send_to(
        conn_id,
        &GameEvent::Error {
            code: ErrorKind::UnknownCommand,
            message: message.to_string(),
        },
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
