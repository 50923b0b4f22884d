//! Notification text. Values are rendered as submitted.

use crate::lead::Lead;

/// Text of the notification every channel receives on dispatch.
pub fn offer_text(lead: &Lead) -> String {
    format!(
        "📞 Lead #{}\nName: {}\nPhone: {}",
        lead.id, lead.name, lead.phone
    )
}

/// Text every copy is rewritten to once the claimant reports the outcome.
pub fn resolved_text(lead: &Lead) -> String {
    format!(
        "{}\nTaken by: {}\nResult: {}",
        offer_text(lead),
        lead.taker_display_name.as_deref().unwrap_or_default(),
        lead.result.as_deref().unwrap_or_default()
    )
}
