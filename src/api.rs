// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tower_http::cors::CorsLayer;

use crate::broadcast::{Broadcaster, ChannelSubscriber, OUTBOUND_BUFFER};
use crate::ingest::{CycleReport, IngestPipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        let broadcaster = pipeline.broadcaster().clone();
        Self {
            pipeline,
            broadcaster,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ws", get(ws_subscribe))
        .route("/debug/last-cycle", get(debug_last_cycle))
        .route("/debug/subscribers", get(debug_subscribers))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn ws_subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state.broadcaster))
}

/// Lives for one connection: registered on entry, removed on close.
async fn serve_subscriber(socket: WebSocket, broadcaster: Broadcaster) {
    let (mut sink, mut stream) = socket.split();
    let (sub, mut rx) = ChannelSubscriber::channel(OUTBOUND_BUFFER);
    let id = broadcaster.subscribe(Arc::new(sub));

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; we only watch for the close.
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
    broadcaster.unsubscribe(id);
}

async fn debug_last_cycle(State(state): State<AppState>) -> Json<Option<CycleReport>> {
    Json(state.pipeline.last_report())
}

#[derive(serde::Serialize)]
struct SubscribersOut {
    live: usize,
}

async fn debug_subscribers(State(state): State<AppState>) -> Json<SubscribersOut> {
    Json(SubscribersOut {
        live: state.broadcaster.registry().len(),
    })
}
