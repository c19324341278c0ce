//! AMI frame construction and parsing.

use std::collections::HashMap;

/// A manager action: the action name plus its key/value fields, serialized
/// as one CRLF-terminated frame.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    fields: Vec<(String, String)>,
}

impl Action {
    /// Starts an action frame.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field. Field order is preserved on the wire.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// The action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serializes the frame, injecting the given `ActionID` for response
    /// correlation.
    pub fn serialize(&self, action_id: &str) -> String {
        let mut out = String::new();
        out.push_str("Action: ");
        out.push_str(&self.name);
        out.push_str("\r\n");
        out.push_str("ActionID: ");
        out.push_str(action_id);
        out.push_str("\r\n");
        for (key, value) in &self.fields {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

/// A parsed manager frame (response or event).
#[derive(Debug, Clone, Default)]
pub struct AmiResponse {
    fields: HashMap<String, String>,
}

impl AmiResponse {
    /// Parses the lines of one frame (without the terminating blank line).
    /// Lines without a `:` separator are ignored — the manager pads some
    /// responses with free-text output lines.
    pub fn parse(lines: &[String]) -> Self {
        let mut fields = HashMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(
                    key.trim().to_ascii_lowercase(),
                    value.trim().to_string(),
                );
            }
        }
        Self { fields }
    }

    /// Looks a field up case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the frame is `Response: Success` (or the follow-up
    /// `Response: Follows`).
    pub fn is_success(&self) -> bool {
        matches!(self.get("response"), Some("Success") | Some("Follows"))
    }

    /// The frame's `ActionID`, if any.
    pub fn action_id(&self) -> Option<&str> {
        self.get("actionid")
    }

    /// The frame's `Message` field, or an empty string.
    pub fn message(&self) -> &str {
        self.get("message").unwrap_or("")
    }

    /// Whether this frame is an unsolicited event rather than a response.
    pub fn is_event(&self) -> bool {
        self.get("event").is_some() && self.get("response").is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_crlf_frame_with_action_id() {
        let frame = Action::new("Redirect")
            .field("Channel", "SIP/telecast-00013813")
            .field("Context", "default")
            .field("Exten", "8300")
            .field("Priority", "1")
            .serialize("cp-1");

        assert_eq!(
            frame,
            "Action: Redirect\r\nActionID: cp-1\r\nChannel: SIP/telecast-00013813\r\n\
             Context: default\r\nExten: 8300\r\nPriority: 1\r\n\r\n"
        );
    }

    #[test]
    fn parses_response_fields_case_insensitively() {
        let lines = vec![
            "Response: Success".to_string(),
            "ActionID: cp-2".to_string(),
            "Message: Redirect successful".to_string(),
        ];
        let response = AmiResponse::parse(&lines);

        assert!(response.is_success());
        assert_eq!(response.action_id(), Some("cp-2"));
        assert_eq!(response.get("MESSAGE"), Some("Redirect successful"));
    }

    #[test]
    fn error_response_is_not_success() {
        let lines = vec![
            "Response: Error".to_string(),
            "Message: Channel not found".to_string(),
        ];
        let response = AmiResponse::parse(&lines);

        assert!(!response.is_success());
        assert_eq!(response.message(), "Channel not found");
    }

    #[test]
    fn event_frames_are_recognized() {
        let lines = vec![
            "Event: Newchannel".to_string(),
            "Channel: SIP/8024-0001".to_string(),
        ];
        let frame = AmiResponse::parse(&lines);
        assert!(frame.is_event());
        assert!(!frame.is_success());
    }

    #[test]
    fn free_text_lines_are_ignored() {
        let lines = vec![
            "Response: Follows".to_string(),
            "core show channels output here".to_string(),
        ];
        let frame = AmiResponse::parse(&lines);
        assert!(frame.is_success());
    }
}
