/**
 * Wire Envelope
 *
 * Every message on the socket is a JSON object `{event, data}`. Client
 * requests arrive as envelopes; server replies and room broadcasts leave
 * as envelopes with a server timestamp `time` (milliseconds since epoch)
 * stamped into `data`.
 *
 * Two diagnostic envelopes exist: `systemmessage` for user-facing
 * validation failures and `error` for protocol-level failures that keep
 * the connection open.
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names the server handles.
pub mod client_event {
    pub const PING: &str = "ping";
    pub const CREATE_CHANNEL: &str = "createChannel";
    pub const JOIN_CHANNEL: &str = "joinChannel";
    pub const LIST_CHANNEL: &str = "listChannel";
    pub const QUIT_CHANNEL: &str = "quitChannel";
    pub const ENTER_CHANNEL: &str = "enterChannel";
    pub const LEAVE_CHANNEL: &str = "leaveChannel";
    pub const CREATE_DOC: &str = "createDoc";
    pub const DELETE_DOC: &str = "deleteDoc";
    pub const LIST_DOC: &str = "listDoc";
    pub const UPDATE_DOC: &str = "updateDoc";
    pub const ENTER_DOC: &str = "enterDoc";
    pub const LEAVE_DOC: &str = "leaveDoc";
    pub const EDIT_DOC: &str = "editDoc";
    pub const EDIT_DOC_BATCH: &str = "editDocBatch";
    pub const SYNC_DOC: &str = "syncDoc";
    pub const SNAPSHOT_DOC: &str = "snapshotDoc";
    pub const GET_CHANNEL_USERS: &str = "getChannelUsers";
    pub const GET_DOC_USERS: &str = "getDocUsers";
    pub const GET_DOC_STATUS: &str = "getDocStatus";
}

/// Event names the server emits.
pub mod server_event {
    pub const PONG: &str = "pong";
    pub const SYSTEM_MESSAGE: &str = "systemmessage";
    pub const ERROR: &str = "error";

    // Per-request replies.
    pub const CHANNEL_CREATED: &str = "channelCreated";
    pub const CHANNEL_JOINED: &str = "channelJoined";
    pub const CHANNEL_LIST: &str = "channelList";
    pub const CHANNEL_QUIT: &str = "channelQuit";
    pub const CHANNEL_ENTERED: &str = "channelEntered";
    pub const CHANNEL_LEFT: &str = "channelLeft";
    pub const DOC_CREATED: &str = "docCreated";
    pub const DOC_ENTERED: &str = "docEntered";
    pub const DOC_LEFT: &str = "docLeft";
    pub const DOC_LIST: &str = "docList";
    pub const DOC_OP: &str = "docOp";
    pub const DOC_OP_BATCH: &str = "docOpBatch";
    pub const SNAPSHOT_CREATED: &str = "snapshotCreated";
    pub const DOC_SYNCED: &str = "docSynced";
    pub const EDIT_REJECTED: &str = "editRejected";
    pub const DOC_STATUS: &str = "docStatus";
    pub const CHANNEL_USERS: &str = "channelUsers";
    pub const DOC_USERS: &str = "docUsers";

    // Room broadcasts.
    pub const DOC_LIST_CHANGED: &str = "docListChanged";
    pub const USER_ENTERED: &str = "userEntered";
    pub const USER_LEFT: &str = "userLeft";
    pub const USER_ENTERED_DOC: &str = "userEnteredDoc";
    pub const USER_LEFT_DOC: &str = "userLeftDoc";
    pub const USER_DOC_STATUS_CHANGED: &str = "userDocStatusChanged";
    pub const DOC_STATUS_CHANGED: &str = "docStatusChanged";
    pub const DOC_DELETED: &str = "docDeleted";
    pub const DOC_UPDATED: &str = "docUpdated";
    pub const DOC_INFO_CHANGED: &str = "docInfoChanged";
    pub const DOC_SNAPSHOT_CREATED: &str = "docSnapshotCreated";
    pub const DOC_SYNC_COMPLETED: &str = "docSyncCompleted";
}

/// One framed message: `{event, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build a server→client envelope, stamping the server time into
    /// `data`. `data` should be a JSON object; anything else is wrapped
    /// so the timestamp always has a place to live.
    pub fn server(event: &str, data: Value) -> Self {
        let mut data = match data {
            Value::Object(map) => Value::Object(map),
            Value::Null => Value::Object(serde_json::Map::new()),
            other => serde_json::json!({ "value": other }),
        };
        if let Value::Object(map) = &mut data {
            map.insert(
                "time".to_string(),
                Value::from(chrono::Utc::now().timestamp_millis()),
            );
        }
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// User-facing validation or authorization failure.
    pub fn system_message(message: impl Into<String>) -> Self {
        Self::server(
            server_event::SYSTEM_MESSAGE,
            serde_json::json!({ "message": message.into() }),
        )
    }

    /// Protocol-level failure tied to the event that caused it.
    pub fn error(original_event: &str, message: impl Into<String>) -> Self {
        Self::server(
            server_event::ERROR,
            serde_json::json!({
                "originalEvent": original_event,
                "message": message.into(),
            }),
        )
    }

    /// Parse an inbound frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serialize for the socket.
    pub fn encode(&self) -> String {
        // Envelope is two plain fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
