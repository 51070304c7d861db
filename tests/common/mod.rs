//! Shared test fixtures: an in-memory application state, seeded
//! documents, fake connected sessions with inspectable outbound queues,
//! and the live-database helpers.
#![allow(dead_code)]

/// Live-Postgres fixtures
pub mod database;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use xfdocs::backend::docs::record::{DocRecord, DocStatus};
use xfdocs::backend::registry::OUTBOUND_QUEUE_CAPACITY;
use xfdocs::backend::server::config::ServerConfig;
use xfdocs::backend::server::state::AppState;
use xfdocs::shared::crdt::{Chunk, ChunkList, LseqId, Version};
use xfdocs::shared::Envelope;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        service_version: 1,
        database_url: None,
        hot_tier_url: None,
        token_secret: "integration-test-secret".to_string(),
        listen_port: 0,
        google_client_id: None,
        google_client_secret: None,
    }
}

/// Application state with no durable store and a process-local cache.
pub fn test_state() -> AppState {
    AppState::for_tests(test_config())
}

pub fn lseq(components: &[u16]) -> LseqId {
    LseqId::from_components(components.to_vec()).unwrap()
}

/// Seed one cached document and return its id.
pub async fn seed_doc(
    state: &AppState,
    channel_id: Uuid,
    owner: Uuid,
    chunks: &[(&[u16], &str)],
) -> Uuid {
    let doc_id = Uuid::new_v4();
    let chunk_list = ChunkList::from_chunks(
        chunks
            .iter()
            .map(|(c, t)| Chunk {
                id: lseq(c),
                text: t.to_string(),
            })
            .collect(),
    );
    let record = DocRecord {
        id: doc_id,
        channel_id,
        parent_id: None,
        name: format!("doc-{doc_id}.txt"),
        is_directory: false,
        status: DocStatus::Normal,
        created_by: owner,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: Version::initial(1),
        content: chunk_list.content(),
        chunks: chunk_list,
        op_log: Vec::new(),
        last_snapshot_at: None,
        lock_reason: None,
        dirty: false,
    };
    assert!(state.cache.put(&record).await);
    doc_id
}

/// A fake connected session: registry entry plus the receiving ends of
/// its outbound queue and close signal.
pub struct TestClient {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub outbound: mpsc::Receiver<Envelope>,
    pub close: watch::Receiver<Option<u16>>,
}

impl TestClient {
    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.outbound.try_recv().ok()).collect()
    }

    /// Drain and return only the events with this name.
    pub fn drain_event(&mut self, event: &str) -> Vec<Envelope> {
        self.drain().into_iter().filter(|e| e.event == event).collect()
    }
}

/// Register a session as an authenticated connection would.
pub fn connect(state: &AppState) -> TestClient {
    connect_as(state, Uuid::new_v4())
}

pub fn connect_as(state: &AppState, user_id: Uuid) -> TestClient {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let (close_tx, close_rx) = watch::channel(None);
    let session_id = state.registry.register(user_id, tx, close_tx);
    TestClient {
        session_id,
        user_id,
        outbound: rx,
        close: close_rx,
    }
}

/// Walk a client into a channel room and a doc room.
pub fn enter(state: &AppState, client: &TestClient, channel_id: Uuid, doc_id: Uuid) {
    assert!(state.registry.attach_channel(client.session_id, channel_id));
    assert!(state.registry.attach_doc(client.session_id, doc_id));
}
