//! Reload notifications over WebSocket.
//!
//! # Responsibilities
//! - Broadcast reload events from the watcher to every connected browser
//! - Serve the small client script that listens for them
//!
//! # Design Decisions
//! - Full page reloads only; there is no module graph to patch
//! - A lagging client gets a catch-all reload instead of the missed events

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::bridge::{LegacyRequest, LegacyResponse, Middleware, Next};

/// Path the browser loads the client script from.
pub const CLIENT_PATH: &str = "/@hmr/client";

const CLIENT_SCRIPT: &str = r#"const socket = new WebSocket(`ws://${location.hostname}:__HMR_PORT__/`);
socket.addEventListener('message', (event) => {
  const payload = JSON.parse(event.data);
  if (payload.type === 'full-reload') {
    console.debug('[hmr] reload', payload.path);
    location.reload();
  }
});
socket.addEventListener('open', () => console.debug('[hmr] connected'));
"#;

/// Message sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrEvent {
    Connected,
    FullReload { path: String },
}

/// Fan-out point between the watcher and socket sessions.
#[derive(Debug, Clone)]
pub struct HmrHub {
    tx: broadcast::Sender<HmrEvent>,
}

impl HmrHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns the number of sessions that will see it.
    pub fn notify(&self, event: HmrEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HmrEvent> {
        self.tx.subscribe()
    }

    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for HmrHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Accept WebSocket sessions on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    hub: HmrHub,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HMR socket listening");

    let app = Router::new().route("/", get(upgrade)).with_state(hub);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("HMR socket stopped");
    Ok(())
}

async fn upgrade(State(hub): State<HmrHub>, ws: WebSocketUpgrade) -> Response {
    let events = hub.subscribe();
    ws.on_upgrade(move |socket| session(socket, events))
}

async fn session(mut socket: WebSocket, mut events: broadcast::Receiver<HmrEvent>) {
    if send(&mut socket, &HmrEvent::Connected).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "HMR client lagged");
                        HmrEvent::FullReload { path: "*".to_string() }
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("HMR client disconnected");
}

async fn send(socket: &mut WebSocket, event: &HmrEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}

/// Middleware answering [`CLIENT_PATH`] with the client script.
pub struct HmrClient {
    script: Arc<str>,
}

impl HmrClient {
    pub fn new(port: u16) -> Self {
        Self {
            script: CLIENT_SCRIPT.replace("__HMR_PORT__", &port.to_string()).into(),
        }
    }
}

impl Middleware for HmrClient {
    fn handle(&self, req: Arc<LegacyRequest>, res: LegacyResponse, next: Next) {
        if req.path() != CLIENT_PATH {
            return next.run();
        }
        let headers = [
            ("Content-Type", "application/javascript"),
            ("Cache-Control", "no-cache"),
        ];
        if let Err(e) = res.write_head(200, headers) {
            return next.fail(e);
        }
        res.end(Some(self.script.to_string().into()));
    }
}
