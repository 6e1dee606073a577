use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{registrant::Registrant, validation::validate_recipient_email};

/// Welcome-notification request as it travels through the broker.
///
/// Field names on the wire are PascalCase so that payloads produced by the
/// registration API (`{"Username", "Email", "PhoneNumber"}`) decode without a
/// translation layer. `MessageId` and `RegisteredAt` are optional so older
/// publishers that only send the three contact fields are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationEnvelope {
    #[serde(rename = "Username", default)]
    pub recipient_name: String,

    #[serde(rename = "Email")]
    pub recipient_email: String,

    #[serde(
        rename = "PhoneNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl NotificationEnvelope {
    pub fn new(
        recipient_name: impl Into<String>,
        recipient_email: impl Into<String>,
        recipient_phone: Option<String>,
    ) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            recipient_email: recipient_email.into(),
            recipient_phone,
            message_id: None,
            registered_at: None,
        }
    }

    /// Builds a freshly stamped envelope for a user whose record was just committed.
    pub fn for_registrant<R: Registrant + ?Sized>(registrant: &R) -> Self {
        Self {
            recipient_name: registrant.display_name().to_string(),
            recipient_email: registrant.email().trim().to_string(),
            recipient_phone: registrant
                .phone_number()
                .filter(|phone| !phone.trim().is_empty())
                .map(str::to_string),
            message_id: Some(Uuid::new_v4()),
            registered_at: Some(Utc::now()),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| anyhow!("Failed to serialize envelope: {}", e))
    }

    /// Decodes a delivery body. Anything that fails here is a poison message.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| anyhow!("Payload is not valid UTF-8: {}", e))?;

        let envelope = serde_json::from_str::<Self>(text)
            .map_err(|e| anyhow!("Payload is not a notification envelope: {}", e))?;

        envelope.validate()?;

        Ok(envelope)
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_recipient_email(&self.recipient_email)
    }

    /// Key used to suppress duplicate sends when the broker redelivers.
    ///
    /// Envelopes from legacy publishers carry no id, so the key is derived from
    /// their whole content: two different notifications to one address get
    /// different keys, while a redelivery of the same payload maps to the same one.
    pub fn idempotency_key(&self) -> String {
        match self.message_id {
            Some(id) => id.to_string(),
            None => {
                let canonical = serde_json::json!([
                    self.recipient_name,
                    self.recipient_email.trim().to_lowercase(),
                    self.recipient_phone,
                ])
                .to_string();

                format!(
                    "content:{}",
                    Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical.as_bytes())
                )
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMessage {
    pub original_message: NotificationEnvelope,
    pub failure_reason: String,
    pub attempts: u32,
    pub failed_at: String,
}

impl DlqMessage {
    pub fn new(original_message: NotificationEnvelope, failure_reason: String, attempts: u32) -> Self {
        Self {
            original_message,
            failure_reason,
            attempts,
            failed_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}
