use crate::constants::MAX_ROOM_NAME_LEN;

/// Room names are caller-chosen URL-ish tokens; empty or oversized ones are
/// rejected rather than rewritten. Player names are not policed here: the
/// room collision-checks them exactly as received.
pub fn valid_room_name(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty()
        && trimmed.len() <= MAX_ROOM_NAME_LEN
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn parse_scores_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}
