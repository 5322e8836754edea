//! Registry of live WebSocket connections, keyed by user id.
//!
//! Each admitted connection hands the registry an unbounded sender; the
//! matching receiver is drained into the socket sink by the writer task in
//! `routes::ws`. A failed send means the writer task is gone, which is the
//! signal to evict that connection.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::auth::TokenValidator;
use crate::models::events::{ClientFrame, OutboundEvent};

pub type ConnectionId = Uuid;

pub enum WebSocketMessage {
    Text(String),
    Close,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Missing user id or credential")]
    MissingCredentials,
    #[error("Invalid authentication credentials")]
    InvalidCredential,
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

impl AdmissionError {
    /// Close code the transport layer sends so clients can tell a bad
    /// request from a bad credential.
    pub fn close_code(&self) -> u16 {
        match self {
            AdmissionError::MissingCredentials => 4400,
            AdmissionError::InvalidCredential => 4401,
            AdmissionError::ConnectionLimitReached => 4429,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Idle,
    Closed,
}

/// One admitted real-time session. Mutated only by the registry.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: String,
    sender: UnboundedSender<WebSocketMessage>,
    pub admitted: DateTime<Utc>,
    last_active: AtomicI64,
    closed: AtomicBool,
}

impl Connection {
    fn new(user_id: String, sender: UnboundedSender<WebSocketMessage>) -> Self {
        let now = Utc::now();
        Connection {
            id: Uuid::new_v4(),
            user_id,
            sender,
            admitted: now,
            last_active: AtomicI64::new(now.timestamp_millis()),
            closed: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        self.last_active
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn send(&self, message: WebSocketMessage) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let ok = self.sender.send(message).is_ok();
        if ok {
            self.touch();
        }
        ok
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    /// `Active`/`Idle` are derived from the last-activity timestamp;
    /// `Closed` is terminal and set when the registry removes the record.
    pub fn state(&self, idle_after: Duration) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            return ConnectionState::Closed;
        }
        let idle_for = Utc::now().timestamp_millis()
            - self.last_active.load(Ordering::Relaxed);
        if idle_for > idle_after.as_millis() as i64 {
            ConnectionState::Idle
        } else {
            ConnectionState::Active
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SocketLimits {
    /// Maximum concurrent connections per user. `None` is unlimited.
    pub max_per_user: Option<usize>,
    /// Global connection ceiling. `None` is unlimited.
    pub max_total: Option<usize>,
}

pub struct ActiveSockets {
    sockets: DashMap<String, Vec<Arc<Connection>>>,
    user_ids: DashMap<ConnectionId, String>,
    count: AtomicUsize,
    malformed_frames: AtomicU64,
    limits: SocketLimits,
    validator: Arc<dyn TokenValidator>,
    auth_timeout: Duration,
}

impl ActiveSockets {
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        limits: SocketLimits,
        auth_timeout: Duration,
    ) -> Self {
        ActiveSockets {
            sockets: DashMap::new(),
            user_ids: DashMap::new(),
            count: AtomicUsize::new(0),
            malformed_frames: AtomicU64::new(0),
            limits,
            validator,
            auth_timeout,
        }
    }

    /// Admits a new connection for `claimed_user_id`.
    ///
    /// The credential must validate (within the configured timeout) to the
    /// claimed user. Every successful call registers a new, independent
    /// connection; a user may hold several at once. On error nothing is
    /// registered and the caller owns closing the transport.
    pub async fn connect(
        &self,
        claimed_user_id: &str,
        credential: &str,
        sender: UnboundedSender<WebSocketMessage>,
    ) -> Result<Arc<Connection>, AdmissionError> {
        if claimed_user_id.trim().is_empty() || credential.trim().is_empty() {
            return Err(AdmissionError::MissingCredentials);
        }

        let validated = tokio::time::timeout(
            self.auth_timeout,
            self.validator.validate(credential),
        )
        .await;

        match validated {
            Ok(Ok(user_id)) if user_id == claimed_user_id => {}
            Ok(Ok(other)) => {
                tracing::debug!(
                    claimed = claimed_user_id,
                    validated = %other,
                    "socket credential does not match claimed user"
                );
                return Err(AdmissionError::InvalidCredential);
            }
            Ok(Err(_)) => return Err(AdmissionError::InvalidCredential),
            Err(_) => {
                tracing::warn!("credential validation timed out after {:?}", self.auth_timeout);
                return Err(AdmissionError::InvalidCredential);
            }
        }

        // Reserve the counter slot before inserting so concurrent
        // admissions cannot overshoot the global ceiling; the reservation is
        // released again if the per-user check fails.
        self.reserve_slot()?;

        let connection = Arc::new(Connection::new(claimed_user_id.to_string(), sender));

        // The entry guard serializes connects/disconnects for this user, so
        // concurrent admissions cannot lose each other's insert.
        {
            let mut entry = self
                .sockets
                .entry(claimed_user_id.to_string())
                .or_default();
            if let Some(max_per_user) = self.limits.max_per_user {
                if entry.len() >= max_per_user {
                    let empty = entry.is_empty();
                    drop(entry);
                    if empty {
                        self.sockets
                            .remove_if(claimed_user_id, |_, conns| conns.is_empty());
                    }
                    self.count.fetch_sub(1, Ordering::AcqRel);
                    return Err(AdmissionError::ConnectionLimitReached);
                }
            }
            entry.push(connection.clone());
        }
        self.user_ids
            .insert(connection.id, claimed_user_id.to_string());

        tracing::debug!(user_id = claimed_user_id, connection_id = %connection.id, "socket admitted");
        Ok(connection)
    }

    /// Removes a connection wherever it is found. Safe to call repeatedly or
    /// for an id that was never registered; teardown and eviction can race.
    pub fn disconnect(&self, id: ConnectionId) {
        // The reverse-index removal decides who decrements the counter, so
        // racing disconnects settle on exactly one winner.
        let Some((_, user_id)) = self.user_ids.remove(&id) else {
            return;
        };

        if let Some(mut entry) = self.sockets.get_mut(&user_id) {
            if let Some(position) = entry.iter().position(|c| c.id == id) {
                let connection = entry.remove(position);
                connection.closed.store(true, Ordering::Release);
                let _ = connection.sender.send(WebSocketMessage::Close);

                let session = Utc::now().signed_duration_since(connection.admitted);
                tracing::debug!(
                    user_id = %user_id,
                    connection_id = %id,
                    session_secs = session.num_seconds(),
                    "socket removed"
                );
            }
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.sockets.remove_if(&user_id, |_, conns| conns.is_empty());
            }
        }

        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                c.checked_sub(1)
            });
    }

    /// Dispatches one inbound frame. Unknown connection ids and malformed
    /// frames are dropped without error; garbage on a real-time channel must
    /// not tear the channel down.
    pub fn handle_message(&self, id: ConnectionId, raw_frame: &str) {
        let Some(connection) = self.get_connection(id) else {
            return;
        };

        match serde_json::from_str::<ClientFrame>(raw_frame) {
            Ok(frame) => {
                connection.touch();
                match frame {
                    ClientFrame::Ping => {
                        let pong = OutboundEvent::pong();
                        if !self.deliver(&connection, &pong) {
                            self.disconnect(id);
                        }
                    }
                    ClientFrame::Ack { event_id } => {
                        tracing::trace!(connection_id = %id, ?event_id, "frame acknowledged");
                    }
                    // Forward compatibility with newer clients.
                    ClientFrame::Unknown => {}
                }
            }
            Err(error) => {
                self.malformed_frames.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(connection_id = %id, %error, "dropping malformed socket frame");
            }
        }
    }

    /// Fans an event out to every connection the user currently holds.
    /// Returns the number of connections delivered to; 0 means the user is
    /// offline, which is a normal outcome and not an error.
    pub fn send_to_user(&self, user_id: &str, event: &OutboundEvent) -> usize {
        let targets = match self.sockets.get(user_id) {
            Some(entry) => entry.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for connection in targets {
            if self.deliver(&connection, event) {
                delivered += 1;
            } else {
                self.disconnect(connection.id);
            }
        }
        delivered
    }

    /// Delivers an event to every registered connection, skipping users in
    /// `exclude_user_ids`. Failure on one connection only evicts that
    /// connection.
    pub fn broadcast(&self, event: &OutboundEvent, exclude_user_ids: &[&str]) -> usize {
        let targets: Vec<Arc<Connection>> = self
            .sockets
            .iter()
            .filter(|entry| !exclude_user_ids.contains(&entry.key().as_str()))
            .flat_map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0;
        for connection in targets {
            if self.deliver(&connection, event) {
                delivered += 1;
            } else {
                self.disconnect(connection.id);
            }
        }
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn connected_user_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn malformed_frame_count(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Evicts connections idle beyond `idle_after`. Eviction goes through
    /// `disconnect` so registry state stays consistent. Returns the number
    /// evicted.
    pub fn sweep_idle(&self, idle_after: Duration) -> usize {
        let stale: Vec<ConnectionId> = self
            .sockets
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|c| c.state(idle_after) == ConnectionState::Idle)
                    .map(|c| c.id)
                    .collect::<Vec<_>>()
            })
            .collect();

        for id in &stale {
            self.disconnect(*id);
        }
        stale.len()
    }

    fn reserve_slot(&self) -> Result<(), AdmissionError> {
        match self.limits.max_total {
            Some(max_total) => self
                .count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                    (c < max_total).then_some(c + 1)
                })
                .map(|_| ())
                .map_err(|_| AdmissionError::ConnectionLimitReached),
            None => {
                self.count.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    fn get_connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let user_id = self.user_ids.get(&id)?;
        let entry = self.sockets.get(user_id.value())?;
        entry.iter().find(|c| c.id == id).cloned()
    }

    // Snapshot callers hold no map guard here, so a send can safely trigger
    // disconnect without re-entering a locked shard.
    fn deliver(&self, connection: &Connection, event: &OutboundEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "failed to serialize outbound event");
                return false;
            }
        };
        connection.send(WebSocketMessage::Text(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenValidator;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn registry() -> ActiveSockets {
        registry_with_limits(SocketLimits::default())
    }

    fn registry_with_limits(limits: SocketLimits) -> ActiveSockets {
        let validator = StaticTokenValidator::new();
        validator.insert("tok-u1", "u1");
        validator.insert("tok-u2", "u2");
        validator.insert("tok-u3", "u3");
        ActiveSockets::new(Arc::new(validator), limits, Duration::from_secs(5))
    }

    async fn admit(
        sockets: &ActiveSockets,
        user: &str,
    ) -> (Arc<Connection>, UnboundedReceiver<WebSocketMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = sockets
            .connect(user, &format!("tok-{user}"), tx)
            .await
            .unwrap();
        (connection, rx)
    }

    fn recv_text(rx: &mut UnboundedReceiver<WebSocketMessage>) -> Option<String> {
        match rx.try_recv() {
            Ok(WebSocketMessage::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[tokio::test]
    async fn connect_and_disconnect_adjust_count_by_one() {
        let sockets = registry();
        let (connection, _rx) = admit(&sockets, "u1").await;
        assert_eq!(sockets.connection_count(), 1);

        sockets.disconnect(connection.id);
        assert_eq!(sockets.connection_count(), 0);
        assert_eq!(sockets.connected_user_count(), 0);
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected_without_side_effects() {
        let sockets = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u1", "", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::MissingCredentials);
        assert_eq!(sockets.connection_count(), 0);

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("  ", "tok-u1", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::MissingCredentials);
        assert_eq!(sockets.connection_count(), 0);
    }

    #[tokio::test]
    async fn bad_and_mismatched_credentials_are_rejected() {
        let sockets = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u1", "tok-unknown", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::InvalidCredential);

        // Live token, wrong claimed identity.
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u1", "tok-u2", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::InvalidCredential);
        assert_eq!(sockets.connection_count(), 0);
    }

    #[tokio::test]
    async fn validation_timeout_is_an_invalid_credential() {
        struct StalledValidator;

        #[async_trait::async_trait]
        impl TokenValidator for StalledValidator {
            async fn validate(
                &self,
                _credential: &str,
            ) -> Result<String, crate::auth::AuthenticationError> {
                futures::future::pending().await
            }
        }

        let sockets = ActiveSockets::new(
            Arc::new(StalledValidator),
            SocketLimits::default(),
            Duration::from_millis(20),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u1", "tok-u1", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::InvalidCredential);
        assert_eq!(sockets.connection_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let sockets = registry();
        let (connection, _rx) = admit(&sockets, "u1").await;

        sockets.disconnect(connection.id);
        sockets.disconnect(connection.id);
        sockets.disconnect(Uuid::new_v4());
        assert_eq!(sockets.connection_count(), 0);
    }

    #[tokio::test]
    async fn send_to_offline_user_returns_zero() {
        let sockets = registry();
        let delivered = sockets.send_to_user("u1", &OutboundEvent::new("ping_event", json!({})));
        assert_eq!(delivered, 0);
        assert_eq!(sockets.connection_count(), 0);
    }

    #[tokio::test]
    async fn fan_out_reaches_every_device() {
        let sockets = registry();
        let (_c1, mut rx1) = admit(&sockets, "u1").await;
        let (_c2, mut rx2) = admit(&sockets, "u1").await;

        let delivered =
            sockets.send_to_user("u1", &OutboundEvent::new("ping_event", json!({})));
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            let text = recv_text(rx).unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "ping_event");
        }
    }

    #[tokio::test]
    async fn failed_delivery_evicts_only_the_stale_connection() {
        let sockets = registry();
        let (c1, rx1) = admit(&sockets, "u1").await;
        let (c2, mut rx2) = admit(&sockets, "u1").await;
        let before = sockets.connection_count();

        // Writer task gone: the receiver half is dropped.
        drop(rx1);

        let delivered =
            sockets.send_to_user("u1", &OutboundEvent::new("ping_event", json!({})));
        assert_eq!(delivered, 1);
        assert_eq!(sockets.connection_count(), before - 1);
        assert!(sockets.get_connection(c1.id).is_none());
        assert!(sockets.get_connection(c2.id).is_some());
        assert!(recv_text(&mut rx2).is_some());
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_users_and_hits_everyone_else_once() {
        let sockets = registry();
        let (_c1, mut rx1) = admit(&sockets, "u1").await;
        let (_c2, mut rx2) = admit(&sockets, "u2").await;
        let (_c3, mut rx3) = admit(&sockets, "u2").await;
        let (_c4, mut rx4) = admit(&sockets, "u3").await;

        let delivered = sockets.broadcast(
            &OutboundEvent::new("announcement", json!({"text": "maintenance"})),
            &["u2"],
        );
        assert_eq!(delivered, 2);

        assert!(recv_text(&mut rx1).is_some());
        assert!(recv_text(&mut rx4).is_some());
        assert!(recv_text(&mut rx2).is_none());
        assert!(recv_text(&mut rx3).is_none());
        // Exactly once per connection.
        assert!(recv_text(&mut rx1).is_none());
        assert!(recv_text(&mut rx4).is_none());
    }

    #[tokio::test]
    async fn ping_frame_gets_a_pong_on_the_same_connection_only() {
        let sockets = registry();
        let (c1, mut rx1) = admit(&sockets, "u1").await;
        let (_c2, mut rx2) = admit(&sockets, "u1").await;

        sockets.handle_message(c1.id, r#"{"type":"ping"}"#);

        let text = recv_text(&mut rx1).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(recv_text(&mut rx2).is_none());
    }

    #[tokio::test]
    async fn unknown_frame_type_only_updates_activity() {
        let sockets = registry();
        let (c1, mut rx1) = admit(&sockets, "u1").await;
        let before_count = sockets.connection_count();
        let before_active = c1.last_active();

        tokio::time::sleep(Duration::from_millis(5)).await;
        sockets.handle_message(c1.id, r#"{"type":"subscribe_topic","topic":"meeting:7"}"#);

        assert_eq!(sockets.connection_count(), before_count);
        assert_eq!(sockets.malformed_frame_count(), 0);
        assert!(c1.last_active() > before_active);
        assert!(recv_text(&mut rx1).is_none());
    }

    #[tokio::test]
    async fn malformed_frames_are_counted_and_dropped() {
        let sockets = registry();
        let (c1, mut rx1) = admit(&sockets, "u1").await;

        sockets.handle_message(c1.id, "not json at all");
        sockets.handle_message(c1.id, r#"{"no_type_tag":true}"#);

        assert_eq!(sockets.malformed_frame_count(), 2);
        assert_eq!(sockets.connection_count(), 1);
        assert!(recv_text(&mut rx1).is_none());

        // Unknown connection id is a silent no-op.
        sockets.handle_message(Uuid::new_v4(), r#"{"type":"ping"}"#);
        assert_eq!(sockets.malformed_frame_count(), 2);
    }

    #[tokio::test]
    async fn failing_send_scenario_reduces_count_by_exactly_one() {
        let sockets = registry();
        let (_c1, rx1) = admit(&sockets, "u1").await;
        let (_c2, _rx2) = admit(&sockets, "u1").await;

        let event = OutboundEvent::new("ping_event", json!({}));
        assert_eq!(sockets.send_to_user("u1", &event), 2);

        let before = sockets.connection_count();
        drop(rx1);
        assert_eq!(sockets.send_to_user("u1", &event), 1);
        assert_eq!(sockets.connection_count(), before - 1);
    }

    #[tokio::test]
    async fn concurrent_connects_for_one_user_both_register() {
        let sockets = Arc::new(registry());
        let a = {
            let sockets = sockets.clone();
            tokio::spawn(async move {
                let (tx, rx) = mpsc::unbounded_channel();
                let conn = sockets.connect("u1", "tok-u1", tx).await.unwrap();
                (conn, rx)
            })
        };
        let b = {
            let sockets = sockets.clone();
            tokio::spawn(async move {
                let (tx, rx) = mpsc::unbounded_channel();
                let conn = sockets.connect("u1", "tok-u1", tx).await.unwrap();
                (conn, rx)
            })
        };

        let ((c1, _rx1), (c2, _rx2)) = (a.await.unwrap(), b.await.unwrap());
        assert_ne!(c1.id, c2.id);
        assert_eq!(sockets.connection_count(), 2);
        assert!(sockets.get_connection(c1.id).is_some());
        assert!(sockets.get_connection(c2.id).is_some());
    }

    #[tokio::test]
    async fn per_user_and_global_limits_are_enforced() {
        let sockets = registry_with_limits(SocketLimits {
            max_per_user: Some(1),
            max_total: Some(2),
        });
        let (_c1, _rx1) = admit(&sockets, "u1").await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u1", "tok-u1", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::ConnectionLimitReached);

        let (_c2, _rx2) = admit(&sockets, "u2").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u3", "tok-u3", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::ConnectionLimitReached);
        assert_eq!(sockets.connection_count(), 2);
    }

    #[tokio::test]
    async fn per_user_limit_failure_releases_the_reserved_slot() {
        let sockets = registry_with_limits(SocketLimits {
            max_per_user: Some(1),
            max_total: Some(2),
        });
        let (_c1, _rx1) = admit(&sockets, "u1").await;

        // A second device for u1 trips the per-user limit; the global slot
        // it reserved must come back.
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u1", "tok-u1", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::ConnectionLimitReached);
        assert_eq!(sockets.connection_count(), 1);

        let (_c2, _rx2) = admit(&sockets, "u2").await;
        assert_eq!(sockets.connection_count(), 2);

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = sockets.connect("u3", "tok-u3", tx).await;
        assert_eq!(result.unwrap_err(), AdmissionError::ConnectionLimitReached);
    }

    #[tokio::test]
    async fn concurrent_connects_never_overshoot_the_global_ceiling() {
        let validator = StaticTokenValidator::new();
        for n in 0..8 {
            validator.insert(&format!("tok-user{n}"), &format!("user{n}"));
        }
        let sockets = Arc::new(ActiveSockets::new(
            Arc::new(validator),
            SocketLimits {
                max_per_user: None,
                max_total: Some(4),
            },
            Duration::from_secs(5),
        ));

        let mut tasks = Vec::new();
        for n in 0..8 {
            let sockets = sockets.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, rx) = mpsc::unbounded_channel();
                let result = sockets
                    .connect(&format!("user{n}"), &format!("tok-user{n}"), tx)
                    .await;
                (result, rx)
            }));
        }

        let mut admitted = 0;
        let mut receivers = Vec::new();
        for task in tasks {
            let (result, rx) = task.await.unwrap();
            match result {
                Ok(_) => {
                    admitted += 1;
                    receivers.push(rx);
                }
                Err(error) => {
                    assert_eq!(error, AdmissionError::ConnectionLimitReached)
                }
            }
        }
        assert_eq!(admitted, 4);
        assert_eq!(sockets.connection_count(), 4);
    }

    #[tokio::test]
    async fn admission_timestamp_is_fixed_and_precedes_activity() {
        let sockets = registry();
        let (c1, _rx1) = admit(&sockets, "u1").await;
        let admitted = c1.admitted;
        assert!(admitted <= c1.last_active());

        tokio::time::sleep(Duration::from_millis(5)).await;
        sockets.handle_message(c1.id, r#"{"type":"ack"}"#);

        assert_eq!(c1.admitted, admitted);
        assert!(c1.last_active() > admitted);
    }

    #[tokio::test]
    async fn sweep_evicts_idle_connections_through_disconnect() {
        let sockets = registry();
        let (c1, _rx1) = admit(&sockets, "u1").await;
        let (c2, _rx2) = admit(&sockets, "u2").await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Fresh traffic on c2 keeps it active.
        sockets.handle_message(c2.id, r#"{"type":"ping"}"#);

        let evicted = sockets.sweep_idle(Duration::from_millis(10));
        assert_eq!(evicted, 1);
        assert_eq!(sockets.connection_count(), 1);
        assert!(sockets.get_connection(c1.id).is_none());
        assert_eq!(c1.state(Duration::from_secs(60)), ConnectionState::Closed);
        assert!(sockets.get_connection(c2.id).is_some());
    }

    #[tokio::test]
    async fn closed_connections_refuse_sends() {
        let sockets = registry();
        let (c1, _rx1) = admit(&sockets, "u1").await;
        sockets.disconnect(c1.id);

        assert!(!c1.send(WebSocketMessage::Text("late".to_string())));
        assert_eq!(c1.state(Duration::from_secs(60)), ConnectionState::Closed);
    }
}
