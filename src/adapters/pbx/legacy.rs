//! Legacy PBX API client (session cookie).
//!
//! Login: POST /api/login
//! Groups: GET /api/GroupList, POST /api/GroupList/set, POST /api/edit/update
//! Calls: GET /api/activeCalls

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::config::PbxConfig;
use crate::domain::{CallSnapshot, ExtensionSet};

use super::{decode, http_client, send, ApiGeneration, PbxApi, PbxError};

/// Legacy API client. The session cookie lives in the reqwest cookie store.
pub struct LegacyClient {
    host: String,
    user: String,
    pass: String,
    group: String,
    client: reqwest::Client,
    extensions: ExtensionSet,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    list: Vec<GroupSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupSummary {
    id: i64,
    name: String,
    extensions_count: usize,
}

/// Edit session opened by `/api/GroupList/set`
#[derive(Debug, Deserialize)]
struct GroupEditSession {
    #[serde(rename = "Id")]
    id: i64,
}

#[derive(Debug, Deserialize)]
struct MemberPageEntry {
    #[serde(rename = "Item")]
    item: GroupObject,
}

#[derive(Debug, Deserialize)]
struct GroupObject {
    #[serde(rename = "Members")]
    members: MemberSelection,
}

#[derive(Debug, Deserialize)]
struct MemberSelection {
    #[serde(default)]
    selected: Vec<GroupMember>,
}

#[derive(Debug, Deserialize)]
struct GroupMember {
    #[serde(rename = "Number")]
    number: MemberNumber,
}

#[derive(Debug, Deserialize)]
struct MemberNumber {
    #[serde(rename = "_value")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ActiveCalls {
    #[serde(default)]
    list: Vec<ActiveCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ActiveCall {
    id: Value,
    #[serde(default)]
    caller: String,
    #[serde(default)]
    callee: String,
    #[serde(default)]
    status: String,
}

impl ActiveCall {
    fn into_snapshot(self) -> CallSnapshot {
        let id = match self.id {
            Value::String(id) => id,
            other => other.to_string(),
        };
        CallSnapshot::from_party_text(id, &self.caller, &self.callee, self.status)
    }
}

impl LegacyClient {
    /// Create a client for the host and credentials in `config`
    pub fn new(config: &PbxConfig) -> Result<Self, PbxError> {
        Ok(Self {
            host: config.host.clone(),
            user: config.user.clone(),
            pass: config.pass.clone(),
            group: config.group.clone(),
            client: http_client(true)?,
            extensions: ExtensionSet::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn login(&self) -> Result<(), PbxError> {
        let request = self.client.post(self.url("/api/login")).json(&json!({
            "Username": self.user,
            "Password": self.pass,
        }));
        send(request, "logging in").await?;
        Ok(())
    }

    /// Id and member count of the monitored group
    async fn find_group(&self) -> Result<(i64, usize), PbxError> {
        let body = send(self.client.get(self.url("/api/GroupList")), "listing groups").await?;
        let groups: GroupList = decode(&body, "listing groups")?;

        groups
            .list
            .into_iter()
            .find(|g| g.name == self.group)
            .map(|g| (g.id, g.extensions_count))
            .ok_or_else(|| PbxError::GroupNotFound(self.group.clone()))
    }

    /// Open an edit session on the group; its id addresses the member pages
    async fn open_group(&self, group_id: i64) -> Result<String, PbxError> {
        let request = self
            .client
            .post(self.url("/api/GroupList/set"))
            .json(&json!({ "Id": group_id }));
        let body = send(request, "opening the group").await?;
        let session: GroupEditSession = decode(&body, "opening the group")?;
        Ok(session.id.to_string())
    }

    async fn fetch_member_page(&self, object_id: &str, start: usize) -> Result<Vec<String>, PbxError> {
        let request = self.client.post(self.url("/api/edit/update")).json(&json!({
            "Path": {
                "ObjectId": object_id,
                "PropertyPath": [{ "Name": "Members" }],
            },
            "PropertyValue": {
                "State": {
                    "Start": start,
                    "SortBy": null,
                    "Reverse": false,
                    "Search": "",
                },
            },
        }));
        let body = send(request, "listing group members").await?;
        let entries: Vec<MemberPageEntry> = decode(&body, "listing group members")?;

        Ok(entries
            .into_iter()
            .flat_map(|e| e.item.members.selected)
            .map(|m| m.number.value)
            .collect())
    }

    /// Walk the member pages until the reported total is reached or a page
    /// comes back empty.
    async fn fetch_group_members(&self) -> Result<ExtensionSet, PbxError> {
        let (group_id, total) = self.find_group().await?;
        let object_id = self.open_group(group_id).await?;

        let mut members = ExtensionSet::new();
        let mut start = 0;
        while start < total {
            let page = self.fetch_member_page(&object_id, start).await?;
            if page.is_empty() {
                break;
            }
            debug!(start, count = page.len(), "Fetched group member page");
            start += page.len();
            members.extend(page);
        }

        Ok(members)
    }
}

#[async_trait]
impl PbxApi for LegacyClient {
    fn generation(&self) -> ApiGeneration {
        ApiGeneration::Legacy
    }

    #[instrument(skip(self), fields(host = %self.host, user = %self.user))]
    async fn authenticate(&mut self) -> Result<(), PbxError> {
        debug!("Authenticating to the PBX (legacy)");
        self.login().await?;

        let extensions = self.fetch_group_members().await?;
        info!(group = %self.group, extensions = ?extensions.sorted(), "Loaded extensions");
        self.extensions = extensions;
        Ok(())
    }

    async fn fetch_active_calls(&self) -> Result<Vec<CallSnapshot>, PbxError> {
        let body = send(
            self.client.get(self.url("/api/activeCalls")),
            "fetching active calls",
        )
        .await?;
        let calls: ActiveCalls = decode(&body, "fetching active calls")?;

        Ok(calls.list.into_iter().map(ActiveCall::into_snapshot).collect())
    }

    fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }
}
