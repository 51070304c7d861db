/**
 * Socket Request Payloads
 *
 * Typed `data` shapes for the events the server handles. Field names are
 * the wire names; every payload deserializes with serde so malformed
 * requests surface as protocol errors before a handler runs.
 */
use serde::Deserialize;
use uuid::Uuid;

use crate::shared::intent::{BatchEdit, EditIntent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelData {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdData {
    pub channel_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocData {
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub is_directory: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocIdData {
    pub doc_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocData {
    #[serde(default)]
    pub channel_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocData {
    pub doc_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    /// Present means "move": `null` moves to the channel root.
    #[serde(default, with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDocData {
    pub doc_id: Uuid,
    #[serde(flatten)]
    pub intent: EditIntent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDocBatchData {
    pub doc_id: Uuid,
    #[serde(flatten)]
    pub edit: BatchEdit,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetChannelUsersData {
    #[serde(default)]
    pub channel_id: Option<Uuid>,
}

/// Distinguishes an absent `parentId` from an explicit `parentId: null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
