// Async job wire types
//
// Long-running operations answer `202 Accepted` with a job reference:
// `{"job": {"uuid": "...", "_links": {"self": {"href": "/api/cluster/jobs/<uuid>"}}}}`.
// The job record is then polled at `cluster/jobs/{uuid}` until terminal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operation::Operation;

/// Reference to a running job, as embedded in an accepted response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLink {
    pub uuid: String,
    #[serde(rename = "_links", default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: Href,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

impl JobLink {
    /// Extract the job reference from a response body, if it carries one.
    pub fn from_response(body: &Value) -> Option<Self> {
        body.get("job")
            .and_then(|job| serde_json::from_value(job.clone()).ok())
    }

    /// Relative status path for polling.
    pub fn status_path(&self) -> String {
        format!("cluster/jobs/{}", self.uuid)
    }

    /// The status-check operation, requesting only the fields the poller
    /// needs.
    pub fn status_operation(&self) -> Operation {
        Operation::get(self.status_path()).with_query("fields", "uuid,state,message,code,description")
    }
}

/// Remote job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Paused,
    Success,
    Failure,
    /// Any state this client does not know; treated as still pending.
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Job status record from `cluster/jobs/{uuid}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRecord {
    pub uuid: String,
    pub state: JobState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}
