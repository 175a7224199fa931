//! Legacy-alias ingress normalization.
//!
//! Earlier deployments of this protocol used player-centric names. Both
//! sides accept the legacy vocabulary on ingress by rewriting it to the
//! canonical names in a single pass, before any typed parsing; downstream
//! code only ever sees canonical names. Emission is canonical-only.
//!
//! Only the top level of a message is rewritten. `appData` contents are
//! application-owned and never touched.

use serde_json::Value;

/// Legacy → canonical `type` tag values.
const TYPE_ALIASES: [(&str, &str); 4] = [
    ("player_ready", "participant_ready"),
    ("game_started", "session_started"),
    ("game_over", "session_ended"),
    ("game_reset", "session_reset"),
];

/// Legacy → canonical top-level field names.
const KEY_ALIASES: [(&str, &str); 5] = [
    ("playerId", "participantId"),
    ("playerNumber", "participantNumber"),
    ("gamePhase", "sessionPhase"),
    ("votedPlayerIds", "votedParticipantIds"),
    ("totalPlayers", "totalParticipants"),
];

/// Rewrites legacy tags and field names in `message` to canonical form.
///
/// A legacy key never clobbers a canonical one already present; if both
/// appear, the canonical value wins and the legacy key is dropped.
/// Non-object values are left untouched.
pub fn normalize(message: &mut Value) {
    let Value::Object(map) = message else {
        return;
    };

    let canonical_tag = match map.get("type") {
        Some(Value::String(tag)) => TYPE_ALIASES
            .iter()
            .find(|(legacy, _)| *legacy == tag.as_str())
            .map(|(_, canonical)| *canonical),
        _ => None,
    };
    if let Some(canonical) = canonical_tag {
        map.insert("type".to_owned(), Value::String(canonical.to_owned()));
    }

    for (legacy, canonical) in KEY_ALIASES {
        if let Some(value) = map.remove(legacy) {
            map.entry(canonical.to_owned()).or_insert(value);
        }
    }
}
