//! Websocket bridge from the hosted change feed into the local [`RealtimeHub`].
//!
//! The feed speaks Phoenix channel frames: `{topic, event, payload, ref}`.
//! One channel is joined for all change kinds on the orders table; per-view
//! filtering happens in the hub. The channel always carries the current
//! user's token: session changes after the join are pushed as `access_token`
//! frames.

use std::fmt::Display;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, instrument, warn};

use crate::error::RealtimeError;
use crate::realtime::{ChangeEvent, ChangeKind, RealtimeHub, ORDERS_TABLE};
use crate::domain::Session;
use crate::session_store::SessionStore;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CHANNEL_TOPIC: &str = "realtime:orders";

#[derive(Debug, Serialize, Deserialize)]
struct PhoenixFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl PhoenixFrame {
    fn join(access_token: &str, reference: u64) -> Self {
        Self {
            topic: CHANNEL_TOPIC.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": ORDERS_TABLE }
                    ]
                },
                "access_token": access_token,
            }),
            reference: Some(reference.to_string()),
        }
    }

    fn access_token(access_token: &str, reference: u64) -> Self {
        Self {
            topic: CHANNEL_TOPIC.to_string(),
            event: "access_token".to_string(),
            payload: json!({ "access_token": access_token }),
            reference: Some(reference.to_string()),
        }
    }

    fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }
}

/// Extracts a row change from a feed frame, if it carries one.
///
/// Accepts both the `postgres_changes` envelope (change under `payload.data`)
/// and the older per-kind events (`INSERT`, `UPDATE`, `DELETE` with the change
/// directly in `payload`).
fn decode_change(frame: &PhoenixFrame) -> Option<ChangeEvent> {
    let change = if frame.event == "postgres_changes" {
        frame.payload.get("data")?
    } else if frame.event.parse::<ChangeKind>().is_ok() {
        &frame.payload
    } else {
        return None;
    };

    let kind = change
        .get("type")
        .or_else(|| change.get("eventType"))
        .and_then(Value::as_str)?
        .parse::<ChangeKind>()
        .ok()?;
    let table = change.get("table").and_then(Value::as_str)?.to_string();
    let row = |key: &str| change.get(key).filter(|v| !v.is_null()).cloned();

    Some(ChangeEvent {
        table,
        kind,
        record: row("record"),
        old_record: row("old_record"),
    })
}

/// Websocket URL of the change feed for a project URL.
pub fn feed_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", ws_base, anon_key)
}

/// Keeps a websocket to the hosted feed open and republishes its changes.
pub struct RealtimeBridge {
    url: String,
    anon_key: String,
    session: SessionStore,
    hub: RealtimeHub,
}

impl RealtimeBridge {
    pub fn new(
        url: impl Into<String>,
        anon_key: impl Into<String>,
        session: SessionStore,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            session,
            hub,
        }
    }

    /// Runs the bridge until the task is aborted, reconnecting after drops.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.run_once().await {
                    Ok(()) => info!("Realtime feed closed by server"),
                    Err(e) => warn!(error = %e, "Realtime feed dropped"),
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    #[instrument(name = "realtime_bridge", skip(self))]
    async fn run_once(&self) -> Result<(), RealtimeError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        info!("Realtime feed connected");
        let (write, read) = socket.split();
        self.pump(write, read).await
    }

    /// The user's token when signed in, the project key otherwise.
    fn token_for(&self, session: Option<Session>) -> String {
        session
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone())
    }

    /// Joins the orders channel on an open socket and serves it until the
    /// peer closes: heartbeats, token updates and incoming changes.
    async fn pump<W, R, E>(&self, mut write: W, mut read: R) -> Result<(), RealtimeError>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        // Subscribe before reading the session so no change slips in between.
        let mut sessions = self.session.subscribe();
        let mut next_ref = 1u64;
        let token = self.token_for(self.session.current());
        send_frame(&mut write, &PhoenixFrame::join(&token, next_ref)).await?;

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut sessions_open = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    send_frame(&mut write, &PhoenixFrame::heartbeat(next_ref)).await?;
                }
                change = sessions.changed(), if sessions_open => match change {
                    Some(session) => {
                        next_ref += 1;
                        debug!(signed_in = session.is_some(), "Updating realtime channel token");
                        let token = self.token_for(session);
                        send_frame(&mut write, &PhoenixFrame::access_token(&token, next_ref)).await?;
                    }
                    None => sessions_open = false,
                },
                message = read.next() => match message {
                    None | Some(Ok(Message::Close(_))) => return Ok(()),
                    Some(Err(e)) => return Err(RealtimeError::Protocol(e.to_string())),
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let frame: PhoenixFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable realtime frame");
                return;
            }
        };

        if frame.event == "phx_reply" {
            let status = frame.payload.get("status").and_then(Value::as_str).unwrap_or("unknown");
            debug!(topic = %frame.topic, status, "Realtime reply");
            return;
        }
        if frame.event == "phx_error" || frame.event == "system" {
            warn!(topic = %frame.topic, payload = %frame.payload, "Realtime channel notice");
            return;
        }
        if let Some(change) = decode_change(&frame) {
            self.hub.publish(change);
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: &PhoenixFrame) -> Result<(), RealtimeError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = serde_json::to_string(frame).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| RealtimeError::Protocol(e.to_string()))
}
