//! Decoding of stack notifications delivered through the event queue
//!
//! The queue receives pub/sub envelopes (JSON). Stack notifications carry a
//! fixed subject and a body of `Key='Value'` lines:
//!
//! ```text
//! StackId='arn:aws:cloudformation:...'
//! LogicalResourceId='FlightVPC'
//! PhysicalResourceId='vpc-0abc'
//! ResourceStatus='CREATE_COMPLETE'
//! ```

use crate::events::ResourceTransition;
use serde::Deserialize;
use std::collections::HashMap;

/// Subject carried by every stack notification
pub const NOTIFICATION_SUBJECT: &str = "AWS CloudFormation Notification";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    message: String,
}

/// The message body is not a pub/sub envelope
#[derive(Debug, thiserror::Error)]
#[error("Malformed notification envelope: {0}")]
pub struct MalformedNotification(#[from] serde_json::Error);

/// Decode a queue message body.
///
/// Returns `Ok(None)` for envelopes that are not stack notifications or that
/// lack a physical id, logical id or status.
pub fn parse_notification(
    body: &str,
) -> Result<Option<ResourceTransition>, MalformedNotification> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.subject != NOTIFICATION_SUBJECT {
        return Ok(None);
    }

    let fields = parse_fields(&envelope.message);
    let physical = fields
        .get("PhysicalResourceId")
        .filter(|p| !p.is_empty());
    let logical = fields.get("LogicalResourceId");
    let status = fields.get("ResourceStatus");

    Ok(match (physical, logical, status) {
        (Some(physical), Some(logical), Some(status)) => Some(ResourceTransition::new(
            status.as_str(),
            logical.as_str(),
            physical.as_str(),
        )),
        _ => None,
    })
}

/// `Key='Value'` lines; a quoted value that wraps onto the next line is
/// rejoined first
fn parse_fields(message: &str) -> HashMap<String, String> {
    message
        .replace("\n'", "'")
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(subject: &str, message: &str) -> String {
        serde_json::json!({
            "Type": "Notification",
            "MessageId": "5e6f",
            "Subject": subject,
            "Message": message,
        })
        .to_string()
    }

    #[test]
    fn test_stack_notification() {
        let body = envelope(
            NOTIFICATION_SUBJECT,
            "StackId='arn:aws:cloudformation:eu-west-1:1:stack/flight-lab/x'\n\
             Timestamp='2017-01-10T12:00:00.000Z'\n\
             LogicalResourceId='FlightVPC'\n\
             PhysicalResourceId='vpc-0abc'\n\
             ResourceStatus='CREATE_COMPLETE'\n\
             ResourceProperties='{\"CidrBlock\":\"10.0.0.0/16\"}\n'\n",
        );
        let transition = parse_notification(&body).unwrap().unwrap();
        assert_eq!(
            transition,
            ResourceTransition::new("CREATE_COMPLETE", "FlightVPC", "vpc-0abc")
        );
    }

    #[test]
    fn test_other_subject_ignored() {
        let body = envelope(
            "Something else",
            "LogicalResourceId='A'\nPhysicalResourceId='b'\nResourceStatus='CREATE_COMPLETE'",
        );
        assert!(parse_notification(&body).unwrap().is_none());
    }

    #[test]
    fn test_empty_physical_id_ignored() {
        let body = envelope(
            NOTIFICATION_SUBJECT,
            "LogicalResourceId='FlightVPC'\nPhysicalResourceId=''\nResourceStatus='CREATE_IN_PROGRESS'",
        );
        assert!(parse_notification(&body).unwrap().is_none());
    }

    #[test]
    fn test_missing_status_ignored() {
        let body = envelope(
            NOTIFICATION_SUBJECT,
            "LogicalResourceId='FlightVPC'\nPhysicalResourceId='vpc-1'",
        );
        assert!(parse_notification(&body).unwrap().is_none());
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(parse_notification("not json at all").is_err());
    }
}
