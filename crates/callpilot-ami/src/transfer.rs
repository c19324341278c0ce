//! Composed call operations: closer hand-off and bot origination.

use crate::protocol::{Action, AmiResponse};
use crate::{AmiClient, AmiError};
use serde::Deserialize;

/// Dialplan coordinates for the hand-off flow. Defaults are the values the
/// dialer installation ships with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Dialplan context for redirects and originations.
    pub context: String,
    /// Conference extension the customer is parked in.
    pub conference_exten: String,
    /// Extension that bridges an originated closer into the conference.
    pub bridge_exten: String,
    /// Channel template for reaching an available closer. `{campaign}` is
    /// replaced with the campaign ID.
    pub closer_channel_template: String,
    /// Caller ID presented on the closer leg.
    pub caller_id: String,
    /// Campaign used when the caller does not name one.
    pub default_campaign: String,
    /// Originate timeout in milliseconds.
    pub originate_timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            context: "default".to_string(),
            conference_exten: "8300".to_string(),
            bridge_exten: "8365".to_string(),
            closer_channel_template: "Local/933*{campaign}*CL_AGENT@default".to_string(),
            caller_id: "BotTransfer <1000>".to_string(),
            default_campaign: "002".to_string(),
            originate_timeout_ms: 30_000,
        }
    }
}

impl TransferConfig {
    fn closer_channel(&self, campaign_id: &str) -> String {
        self.closer_channel_template
            .replace("{campaign}", campaign_id)
    }
}

/// Hands a live bot-customer call to an available human closer.
///
/// Two steps:
/// 1. `Redirect` the live channel into the conference extension, parking
///    the customer there.
/// 2. `Originate` a closer leg (via the campaign's closer channel) to the
///    bridge extension, joining the same conference.
///
/// Fails fast on an empty channel; a redirect failure aborts before the
/// originate so the customer is never left waiting for a closer that was
/// never dialed.
pub async fn transfer_to_closer(
    client: &AmiClient,
    config: &TransferConfig,
    live_channel: &str,
    campaign_id: Option<&str>,
) -> Result<(), AmiError> {
    if live_channel.trim().is_empty() {
        return Err(AmiError::Protocol("live channel is required".to_string()));
    }
    let campaign = campaign_id.unwrap_or(&config.default_campaign);

    let redirect = Action::new("Redirect")
        .field("Channel", live_channel)
        .field("Context", &config.context)
        .field("Exten", &config.conference_exten)
        .field("Priority", "1");
    client.send_action(redirect).await?;
    tracing::info!(
        channel = live_channel,
        exten = %config.conference_exten,
        "customer parked in conference"
    );

    let originate = Action::new("Originate")
        .field("Channel", config.closer_channel(campaign))
        .field("Context", &config.context)
        .field("Exten", &config.bridge_exten)
        .field("Priority", "1")
        .field("CallerID", &config.caller_id)
        .field("Timeout", config.originate_timeout_ms.to_string());
    client.send_action(originate).await?;
    tracing::info!(campaign, exten = %config.bridge_exten, "closer originated into conference");

    Ok(())
}

/// Originates an outbound call from a bot's SIP peer to a destination
/// extension.
pub async fn originate_bot_call(
    client: &AmiClient,
    config: &TransferConfig,
    bot_extension: &str,
    destination: &str,
) -> Result<AmiResponse, AmiError> {
    if bot_extension.trim().is_empty() {
        return Err(AmiError::Protocol("bot extension is required".to_string()));
    }

    let originate = Action::new("Originate")
        .field("Channel", format!("SIP/{bot_extension}"))
        .field("Context", &config.context)
        .field("Exten", destination)
        .field("Priority", "1")
        .field("CallerID", "Bot")
        .field("Timeout", config.originate_timeout_ms.to_string());

    let response = client.send_action(originate).await?;
    tracing::info!(bot_extension, destination, "bot call originated");
    Ok(response)
}
