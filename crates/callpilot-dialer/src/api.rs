//! The form-encoded Agent API client.

use crate::DialerError;
use callpilot_types::AgentStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the dialer endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Agent API endpoint (the `…/agc/api.php`-style URL). Empty disables
    /// the client.
    pub base_url: String,
    /// API account user.
    pub api_user: String,
    /// API account password.
    pub api_pass: String,
    /// `source` tag sent with every call, identifying this service in the
    /// dialer's logs.
    pub source: String,
    /// Admin endpoint returning the campaign list as JSON. Empty disables
    /// campaign listing.
    pub campaigns_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_user: String::new(),
            api_pass: String::new(),
            source: "callpilot".to_string(),
            campaigns_url: String::new(),
            timeout_secs: 15,
        }
    }
}

/// Classification of a dialer reply by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiOutcome {
    /// Reply began with `SUCCESS`.
    Success,
    /// Reply began with `ERROR`.
    Error,
    /// Reply began with `NOTICE` (informational, usually still usable).
    Notice,
    /// Anything else, including empty bodies.
    Other,
}

impl ApiOutcome {
    /// Classifies a raw reply body.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("SUCCESS") {
            Self::Success
        } else if trimmed.starts_with("ERROR") {
            Self::Error
        } else if trimmed.starts_with("NOTICE") {
            Self::Notice
        } else {
            Self::Other
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// A dialer reply: the raw text plus its classification.
#[derive(Debug, Clone)]
pub struct ApiReply {
    /// The reply body as received.
    pub raw: String,
    /// Leading-keyword classification.
    pub outcome: ApiOutcome,
}

impl ApiReply {
    fn new(raw: String) -> Self {
        let outcome = ApiOutcome::parse(&raw);
        Self { raw, outcome }
    }

    /// Converts an `ERROR` reply into `DialerError::Vendor`, passing other
    /// replies through.
    pub fn into_result(self) -> Result<Self, DialerError> {
        if self.outcome.is_error() {
            Err(DialerError::Vendor(self.raw))
        } else {
            Ok(self)
        }
    }
}

/// A dialer campaign as returned by the admin endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    /// Campaign ID, e.g. `001`.
    pub campaign_id: String,
    /// Display name.
    pub campaign_name: String,
    /// Whether the campaign is currently dialing.
    #[serde(default)]
    pub active: bool,
}

/// Typed client for the dialer's Agent API.
#[derive(Debug, Clone)]
pub struct AgentApiClient {
    config: DialerConfig,
    http: reqwest::Client,
}

impl AgentApiClient {
    /// Builds a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `DialerError::Http` if the underlying client cannot be built.
    pub fn new(config: DialerConfig) -> Result<Self, DialerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    /// Whether the Agent API is configured.
    pub fn is_enabled(&self) -> bool {
        !self.config.base_url.is_empty()
    }

    /// Performs one Agent API call: form-encodes `params` with the account
    /// credentials and the `function` name, POSTs, and classifies the reply.
    ///
    /// Call-control functions are logged at debug with the reply, matching
    /// how operators diagnose the dialer: by reading its text verbatim.
    pub async fn call(
        &self,
        function: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiReply, DialerError> {
        if !self.is_enabled() {
            return Err(DialerError::Disabled);
        }

        let mut form: Vec<(&str, &str)> = vec![
            ("function", function),
            ("user", self.config.api_user.as_str()),
            ("pass", self.config.api_pass.as_str()),
            ("source", self.config.source.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(&self.config.base_url)
            .form(&form)
            .send()
            .await?;

        let raw = response.text().await?;
        let reply = ApiReply::new(raw);
        tracing::debug!(
            function,
            outcome = ?reply.outcome,
            reply = %reply.raw.trim_end(),
            "agent api call"
        );
        Ok(reply)
    }

    /// Creates an agent account on the dialer. Phone credentials default to
    /// the agent credentials when not provisioned separately.
    pub async fn add_agent(
        &self,
        agent_user: &str,
        agent_pass: &str,
        full_name: &str,
    ) -> Result<ApiReply, DialerError> {
        self.call(
            "add_user",
            &[
                ("agent_user", agent_user),
                ("agent_pass", agent_pass),
                ("agent_user_level", "1"),
                ("full_name", full_name),
                ("phone_login", agent_user),
                ("phone_pass", agent_pass),
                ("hotkeys_active", "1"),
                ("voicemail_id", agent_user),
                ("format", "text"),
            ],
        )
        .await
    }

    /// Logs an agent in to a campaign. The reply may or may not carry a
    /// session ID; see `SessionManager::login` for extraction.
    pub async fn log_agent(
        &self,
        agent_user: &str,
        agent_pass: &str,
        campaign: &str,
    ) -> Result<ApiReply, DialerError> {
        self.call(
            "log_agent",
            &[
                ("agent_user", agent_user),
                ("agent_pass", agent_pass),
                ("phone_login", agent_user),
                ("phone_pass", agent_pass),
                ("campaign", campaign),
                ("format", "text"),
            ],
        )
        .await
    }

    /// Rings the agent's phone.
    pub async fn call_agent(&self, agent_user: &str) -> Result<ApiReply, DialerError> {
        self.call("call_agent", &[("agent_user", agent_user), ("value", "CALL")])
            .await
    }

    /// Places a manual outbound call from the agent's session.
    pub async fn external_dial(
        &self,
        agent_user: &str,
        phone_number: &str,
    ) -> Result<ApiReply, DialerError> {
        self.call(
            "external_dial",
            &[
                ("agent_user", agent_user),
                ("value", phone_number),
                ("phone_code", "1"),
                ("search", "NO"),
                ("preview", "NO"),
                ("focus", "YES"),
            ],
        )
        .await
    }

    /// Hangs up the agent's current call.
    pub async fn external_hangup(&self, agent_user: &str) -> Result<ApiReply, DialerError> {
        self.call(
            "external_hangup",
            &[("agent_user", agent_user), ("value", "1")],
        )
        .await
    }

    /// Pauses or resumes the agent.
    pub async fn external_pause(
        &self,
        agent_user: &str,
        pause: bool,
    ) -> Result<ApiReply, DialerError> {
        self.call(
            "external_pause",
            &[
                ("agent_user", agent_user),
                ("value", if pause { "PAUSE" } else { "RESUME" }),
            ],
        )
        .await
    }

    /// Sets the agent's dispo/status code.
    pub async fn external_status(
        &self,
        agent_user: &str,
        status: AgentStatus,
    ) -> Result<ApiReply, DialerError> {
        self.call(
            "external_status",
            &[("agent_user", agent_user), ("value", status.as_code())],
        )
        .await
    }

    /// Queries recording state for the agent's session.
    pub async fn recording_status(&self, agent_user: &str) -> Result<ApiReply, DialerError> {
        self.call(
            "recording",
            &[("agent_user", agent_user), ("value", "STATUS")],
        )
        .await
    }

    /// Conferences a third party in with the customer and drops the bot leg
    /// once bridged.
    pub async fn transfer_conference(
        &self,
        agent_user: &str,
        phone_number: &str,
    ) -> Result<ApiReply, DialerError> {
        self.call(
            "transfer_conference",
            &[
                ("agent_user", agent_user),
                ("value", "DIAL_WITH_CUSTOMER"),
                ("phone_number", phone_number),
            ],
        )
        .await
    }

    /// Fetches the campaign list from the admin endpoint.
    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>, DialerError> {
        if self.config.campaigns_url.is_empty() {
            return Err(DialerError::Disabled);
        }

        let response = self.http.get(&self.config.campaigns_url).send().await?;
        if !response.status().is_success() {
            return Err(DialerError::InvalidReply(format!(
                "campaign endpoint returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_classifies_by_leading_keyword() {
        assert_eq!(
            ApiOutcome::parse("SUCCESS: external_status command sent"),
            ApiOutcome::Success
        );
        assert_eq!(
            ApiOutcome::parse("ERROR: agent_user is not logged in"),
            ApiOutcome::Error
        );
        assert_eq!(
            ApiOutcome::parse("NOTICE: no recording active"),
            ApiOutcome::Notice
        );
        assert_eq!(ApiOutcome::parse("hello world"), ApiOutcome::Other);
        assert_eq!(ApiOutcome::parse(""), ApiOutcome::Other);
    }

    #[test]
    fn outcome_ignores_leading_whitespace() {
        assert_eq!(ApiOutcome::parse("\n  SUCCESS: ok"), ApiOutcome::Success);
    }

    #[test]
    fn error_reply_becomes_vendor_error() {
        let reply = ApiReply::new("ERROR: session not found".to_string());
        let err = reply.into_result().unwrap_err();
        match err {
            DialerError::Vendor(text) => assert!(text.contains("session not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn notice_reply_passes_through() {
        let reply = ApiReply::new("NOTICE: recording not active".to_string());
        let reply = reply.into_result().expect("notice is not an error");
        assert_eq!(reply.outcome, ApiOutcome::Notice);
    }

    #[test]
    fn disabled_client_refuses_calls() {
        let client = AgentApiClient::new(DialerConfig::default()).expect("client");
        assert!(!client.is_enabled());

        let err = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(client.call("call_agent", &[]))
            .unwrap_err();
        assert!(matches!(err, DialerError::Disabled));
    }

    #[test]
    fn campaign_deserializes_with_default_active() {
        let json = r#"[{"campaign_id":"001","campaign_name":"Leads"}]"#;
        let campaigns: Vec<Campaign> = serde_json::from_str(json).unwrap();
        assert_eq!(campaigns[0].campaign_id, "001");
        assert!(!campaigns[0].active);
    }
}
