use super::classify::{ClassifiedFrame, Role};
use serde_json::Value;
use tracing::debug;

/// Decide whether a surviving classified frame is relay noise that must
/// never reach the UI. Sentinels are handled by the reducer before this
/// point; the remaining rules are, in order:
///
/// 1. a text frame whose content is a stringified echo of the user's own
///    outbound frame — dropped regardless of the outer sender, since the
///    relay may re-wrap the echo under a different label;
/// 2. a text frame attributed to the internal UserProxy relay role, whether
///    the attribution sits on the frame itself or inside a stringified
///    envelope of any shape.
///
/// Any parse failure while checking counts as "not an echo": we fail open
/// to delivery rather than losing a real message.
pub fn is_noise(frame: &ClassifiedFrame) -> bool {
    let ClassifiedFrame::Text { sender, content } = frame else {
        return false;
    };

    if *sender == Role::UserProxy {
        debug!("dropping UserProxy relay frame");
        return true;
    }

    if is_user_echo(content) {
        debug!(sender = %sender, "dropping stringified user echo");
        return true;
    }

    // The classifier only unwraps inner envelopes that carry string
    // content, so a shapeless relay status object still reaches us as raw
    // JSON text. Probe the inner sender directly.
    if inner_sender(content) == Some(Role::UserProxy) {
        debug!(sender = %sender, "dropping wrapped UserProxy relay frame");
        return true;
    }

    false
}

/// Sender named inside a stringified JSON object, if `content` is one.
fn inner_sender(content: &str) -> Option<Role> {
    let trimmed = content.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let inner = serde_json::from_str::<Value>(trimmed).ok()?;
    inner
        .get("sender")
        .and_then(|v| v.as_str())
        .map(Role::parse)
}

/// True when `content` decodes to a JSON object that is itself a user text
/// frame: `{"sender":"user","type":"text","content":"..."}`. Applies
/// regardless of the outer sender, since relays re-wrap the echo under
/// varying labels.
fn is_user_echo(content: &str) -> bool {
    let trimmed = content.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return false;
    }
    let Ok(inner) = serde_json::from_str::<Value>(trimmed) else {
        return false;
    };
    super::classify::is_user_text_envelope(&inner)
}
