use crate::config::DateRange;
use crate::turn::{Turn, TurnKind};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure talking to the transcripts API. Every variant is fatal for a run.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("GET {url} returned an undecodable body: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where transcripts come from.
///
/// Implementations are shared across fetch workers, hence `Sync`.
pub trait TranscriptSource: Sync {
    /// Ids of all transcripts in `range` for `project_id`.
    fn list_transcript_ids(
        &self,
        project_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, ApiError>;

    /// The ordered turn log of one transcript.
    fn transcript_turns(&self, project_id: &str, transcript_id: &str)
    -> Result<Vec<Turn>, ApiError>;
}

/// One element of the listing response. Only the id is needed.
#[derive(Debug, Deserialize)]
struct TranscriptSummary {
    #[serde(rename = "_id")]
    id: String,
}

/// The transcripts REST API over a blocking `ureq` agent.
pub struct HttpSource {
    agent: ureq::Agent,
    base_url: String,
    auth_token: String,
}

impl HttpSource {
    pub fn new(base_url: &str, auth_token: &str, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut request = self
            .agent
            .get(url)
            .header("Authorization", self.auth_token.as_str())
            .header("accept", "application/json");
        for (key, value) in query {
            request = request.query(*key, value.as_str());
        }
        let mut response = request.call().map_err(|e| match e {
            ureq::Error::StatusCode(status) => ApiError::Status {
                url: url.to_string(),
                status,
            },
            other => ApiError::Transport {
                url: url.to_string(),
                source: other,
            },
        })?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport {
                url: url.to_string(),
                source: e,
            })?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            source: e,
        })
    }
}

impl TranscriptSource for HttpSource {
    fn list_transcript_ids(
        &self,
        project_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/{}", self.base_url, project_id);
        let query = [
            ("startDate", range.start_label()),
            ("endDate", range.end_label()),
        ];
        let summaries: Vec<TranscriptSummary> = self.get_json(&url, &query)?;
        Ok(summaries.into_iter().map(|s| s.id).collect())
    }

    fn transcript_turns(
        &self,
        project_id: &str,
        transcript_id: &str,
    ) -> Result<Vec<Turn>, ApiError> {
        let url = format!("{}/{}/{}", self.base_url, project_id, transcript_id);
        let values: Vec<serde_json::Value> = self.get_json(&url, &[])?;
        let (turns, errors) = Turn::parse_all(values);
        for (index, err) in &errors {
            debug!(transcript_id, index, error = %err, "skipping undecodable turn");
        }
        let other = turns.iter().filter(|t| t.kind() == TurnKind::Other).count();
        debug!(transcript_id, turns = turns.len(), other, "fetched turn log");
        Ok(turns)
    }
}
