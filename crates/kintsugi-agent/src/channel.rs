//! Foreground <-> agent messaging
//!
//! Two messages, no request/response pairing. A client posts
//! `{"type":"CACHE_NOW"}` and moves on; when the refresh finishes the agent
//! broadcasts `"CACHE_DONE"` to every connected client, whoever asked.
//!
//! The agent runs on its own task with its own lifetime. Clients hold an
//! [`AgentClient`] and only get a [`Controller`] once the agent is active.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{AgentState, CacheAgent};
use crate::http::{Request, Response};
use crate::AgentError;

/// Pending events before `post_message` reports the agent as busy
const EVENT_QUEUE: usize = 64;
/// Notifications a slow client may fall behind by
const NOTICE_CAPACITY: usize = 16;

/// Foreground -> agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Re-populate the offline snapshot
    #[serde(rename = "CACHE_NOW")]
    CacheNow,
}

/// Agent -> every foreground client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentMessage {
    /// Refresh finished
    #[serde(rename = "CACHE_DONE")]
    CacheDone,
}

impl ClientMessage {
    /// Parse a raw payload. Anything unrecognized is `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(message) => Some(message),
            Err(_) => {
                debug!(%value, "Ignoring unknown client message");
                None
            }
        }
    }

    pub fn to_json(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl AgentMessage {
    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_json(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

enum AgentEvent {
    Message(ClientMessage),
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Response, AgentError>>,
    },
}

/// Owner's handle on a running agent
pub struct AgentHandle {
    events: mpsc::Sender<AgentEvent>,
    notices: broadcast::Sender<AgentMessage>,
    state: watch::Receiver<AgentState>,
    update: bool,
    task: JoinHandle<()>,
}

impl AgentHandle {
    /// Register the agent: install, activate, then serve events until
    /// every sender is gone.
    pub fn spawn(agent: CacheAgent) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(agent.state());
        let update = agent.is_update();
        if update {
            info!("Updating offline bundle");
        }

        let task = tokio::spawn(run(agent, events_rx, notices.clone(), state_tx));

        Self {
            events: events_tx,
            notices,
            state: state_rx,
            update,
            task,
        }
    }

    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Wait for install and activation to settle.
    pub async fn ready(&self) -> AgentState {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| matches!(s, AgentState::Active | AgentState::Redundant))
            .await
            .map(|s| *s);
        settled.unwrap_or(AgentState::Redundant)
    }

    /// Connect a new foreground context.
    pub fn client(&self) -> AgentClient {
        AgentClient {
            events: self.events.clone(),
            state: self.state.clone(),
            notices: self.notices.subscribe(),
            update: self.update,
        }
    }

    /// Stop the agent task.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run(
    mut agent: CacheAgent,
    mut events: mpsc::Receiver<AgentEvent>,
    notices: broadcast::Sender<AgentMessage>,
    state: watch::Sender<AgentState>,
) {
    if agent.state() == AgentState::Installing && agent.install().await.is_err() {
        state.send_replace(agent.state());
        return;
    }
    state.send_replace(agent.state());

    if agent.state() == AgentState::Activating {
        if let Err(e) = agent.activate() {
            warn!(error = %e, "Activation failed");
            state.send_replace(AgentState::Redundant);
            return;
        }
        state.send_replace(agent.state());
    }

    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Message(message) => {
                if let Some(notice) = agent.handle_message(message).await {
                    match notices.send(notice) {
                        Ok(clients) => info!(clients, "Notified clients: {:?}", notice),
                        Err(_) => debug!("No clients connected for {:?}", notice),
                    }
                }
            }
            AgentEvent::Fetch { request, reply } => {
                let result = agent.respond(&request).await;
                let _ = reply.send(result);
            }
        }
    }
    debug!("All clients gone, agent stopping");
}

/// A foreground context's connection to the agent
pub struct AgentClient {
    events: mpsc::Sender<AgentEvent>,
    state: watch::Receiver<AgentState>,
    notices: broadcast::Receiver<AgentMessage>,
    update: bool,
}

impl AgentClient {
    /// Where the agent is in its lifecycle right now.
    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// The agent is installing a new version over an older snapshot.
    pub fn is_update(&self) -> bool {
        self.update
    }

    /// The active agent controlling this client, if there is one.
    pub fn controller(&self) -> Option<Controller> {
        (*self.state.borrow() == AgentState::Active).then(|| Controller {
            events: self.events.clone(),
        })
    }

    /// Next broadcast from the agent. `None` once the agent is gone.
    pub async fn recv(&mut self) -> Option<AgentMessage> {
        loop {
            match self.notices.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Client fell behind agent notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// A broadcast already waiting, without blocking.
    pub fn try_recv(&mut self) -> Option<AgentMessage> {
        loop {
            match self.notices.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Send side of an active agent
#[derive(Clone)]
pub struct Controller {
    events: mpsc::Sender<AgentEvent>,
}

impl Controller {
    /// Fire-and-forget. Success only means the agent has the message.
    pub fn post_message(&self, message: ClientMessage) -> Result<(), AgentError> {
        self.events
            .try_send(AgentEvent::Message(message))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => AgentError::Busy,
                mpsc::error::TrySendError::Closed(_) => AgentError::Stopped,
            })
    }

    /// Post a raw payload. Unknown payloads are dropped and return false.
    pub fn post_json(&self, value: &Value) -> Result<bool, AgentError> {
        match ClientMessage::from_json(value) {
            Some(message) => self.post_message(message).map(|()| true),
            None => Ok(false),
        }
    }

    /// Route a request through the agent's cache.
    pub async fn fetch(&self, request: Request) -> Result<Response, AgentError> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(AgentEvent::Fetch { request, reply })
            .await
            .map_err(|_| AgentError::Stopped)?;
        response.await.map_err(|_| AgentError::Stopped)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{scope, FakeNetwork};
    use crate::agent::AgentConfig;
    use crate::snapshot::SnapshotStore;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_wire_format() {
        assert_eq!(ClientMessage::CacheNow.to_json(), json!({"type": "CACHE_NOW"}));
        assert_eq!(AgentMessage::CacheDone.to_json(), json!("CACHE_DONE"));

        assert_eq!(
            ClientMessage::from_json(&json!({"type": "CACHE_NOW", "extra": 1})),
            Some(ClientMessage::CacheNow)
        );
        assert_eq!(AgentMessage::from_json(&json!("CACHE_DONE")), Some(AgentMessage::CacheDone));
    }

    #[test]
    fn test_unknown_messages_ignored() {
        assert_eq!(ClientMessage::from_json(&json!({"type": "PURGE"})), None);
        assert_eq!(ClientMessage::from_json(&json!("CACHE_NOW")), None);
        assert_eq!(AgentMessage::from_json(&json!({"type": "CACHE_DONE"})), None);
    }

    #[tokio::test]
    async fn test_cache_done_reaches_every_client() {
        let network = Arc::new(FakeNetwork::default());
        let handle = AgentHandle::spawn(CacheAgent::new(AgentConfig::new(scope()), network));
        let mut requester = handle.client();
        let mut bystander = handle.client();

        assert_eq!(handle.ready().await, AgentState::Active);

        requester
            .controller()
            .expect("active agent controls its clients")
            .post_message(ClientMessage::CacheNow)
            .unwrap();

        assert_eq!(requester.recv().await, Some(AgentMessage::CacheDone));
        assert_eq!(bystander.recv().await, Some(AgentMessage::CacheDone));
    }

    #[tokio::test]
    async fn test_raw_payloads() {
        let network = Arc::new(FakeNetwork::default());
        let handle = AgentHandle::spawn(CacheAgent::new(AgentConfig::new(scope()), network));
        let mut client = handle.client();
        handle.ready().await;
        let controller = client.controller().unwrap();

        assert!(!controller.post_json(&json!({"type": "PURGE"})).unwrap());
        assert!(controller.post_json(&json!({"type": "CACHE_NOW"})).unwrap());

        assert_eq!(client.recv().await, Some(AgentMessage::CacheDone));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_no_controller_when_install_fails() {
        let network = Arc::new(FakeNetwork::default());
        network.go_offline();
        let handle = AgentHandle::spawn(CacheAgent::new(AgentConfig::new(scope()), network));
        let client = handle.client();

        assert_eq!(handle.ready().await, AgentState::Redundant);
        assert!(client.controller().is_none());
    }

    #[tokio::test]
    async fn test_fetch_through_controller_uses_cache() {
        let network = Arc::new(FakeNetwork::default());
        let handle = AgentHandle::spawn(CacheAgent::new(AgentConfig::new(scope()), network.clone()));
        handle.ready().await;
        let controller = handle.client().controller().unwrap();
        let before = network.calls();

        let response = controller
            .fetch(Request::get(scope().join("manifest.json").unwrap()))
            .await
            .unwrap();

        assert_eq!(response.body, b"body of /manifest.json");
        assert_eq!(network.calls(), before);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_update_flag_reaches_clients() {
        let network = Arc::new(FakeNetwork::default());
        let mut old = crate::cache::CacheStorage::new();
        old.open("kintsugi-reader-v0");
        let handle = AgentHandle::spawn(CacheAgent::with_caches(AgentConfig::new(scope()), old, network));
        let client = handle.client();

        assert!(client.is_update());
        assert_eq!(client.state(), AgentState::Installing);
        assert_eq!(handle.ready().await, AgentState::Active);
        assert_eq!(client.state(), AgentState::Active);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_resumed_agent_serves_offline() {
        let network = Arc::new(FakeNetwork::default());
        let snapshot = SnapshotStore::open_in_memory().unwrap();
        snapshot
            .write(
                crate::CACHE_NAME,
                &[(
                    Request::get(scope().join("index.html").unwrap()),
                    Response::new(scope().join("index.html").unwrap(), 200, "shell"),
                )],
            )
            .unwrap();
        network.go_offline();

        let agent = CacheAgent::persistent(AgentConfig::new(scope()), snapshot, network).unwrap();
        let handle = AgentHandle::spawn(agent);
        let client = handle.client();

        assert!(!client.is_update());
        assert_eq!(client.state(), AgentState::Active);
        let response = client
            .controller()
            .unwrap()
            .fetch(Request::get(scope().join("assets/js/main.js").unwrap()))
            .await
            .unwrap();
        assert_eq!(response.body, b"shell");
        handle.shutdown();
    }
}
