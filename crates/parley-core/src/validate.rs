//! Input validation and sanitization for Parley.
//!
//! All functions are pure. Validators return the normalized value on success
//! or a human-readable reason that is reported to the client verbatim.

use serde_json::Value;

/// Maximum room identifier length in characters.
pub const MAX_ROOM_ID_LENGTH: usize = 100;

/// Maximum user identifier length in characters.
pub const MAX_USER_ID_LENGTH: usize = 50;

/// Maximum message length in characters, after trimming.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Default history page size.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Maximum history page size.
pub const MAX_PAGE_LIMIT: usize = 100;

/// A validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// Validated chat message input: identifiers trimmed, message sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatData {
    pub room_id: String,
    pub user_id: String,
    pub message: String,
}

/// Validate a room identifier.
///
/// # Errors
///
/// Returns a reason if the identifier is absent, empty after trimming, or
/// longer than 100 characters.
pub fn validate_room_id(id: Option<&str>) -> Result<String, &'static str> {
    let trimmed = id.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err("Room ID is required");
    }
    if trimmed.chars().count() > MAX_ROOM_ID_LENGTH {
        return Err("Room ID must be between 1 and 100 characters");
    }
    Ok(trimmed.to_string())
}

/// Validate a user identifier.
///
/// # Errors
///
/// Returns a reason if the identifier is absent, empty after trimming, or
/// longer than 50 characters.
pub fn validate_user_id(id: Option<&str>) -> Result<String, &'static str> {
    let trimmed = id.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err("User ID is required");
    }
    if trimmed.chars().count() > MAX_USER_ID_LENGTH {
        return Err("User ID must be between 1 and 50 characters");
    }
    Ok(trimmed.to_string())
}

/// Escape HTML-significant characters so stored text renders verbatim.
///
/// Single left-to-right pass replacing `& < > " ' /` with their entity
/// equivalents, applied once (not recursively). This is a minimal injection
/// defense, not full HTML sanitization, and the exact output is a
/// compatibility contract. It is deliberately NOT idempotent: sanitizing an
/// already-escaped `&amp;` yields `&amp;amp;`.
#[must_use]
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Validate and sanitize message text.
///
/// # Errors
///
/// Returns a reason if the text is absent, empty after trimming, or longer
/// than 1000 characters after trimming.
pub fn validate_message(text: Option<&str>) -> Result<String, &'static str> {
    let trimmed = text.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err("Message is required");
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err("Message must be between 1 and 1000 characters");
    }
    Ok(sanitize(trimmed))
}

/// Validate a board position for the shared game feature.
///
/// # Errors
///
/// Returns a reason unless the value is a JSON integer in `[0, 8]`.
pub fn validate_game_position(value: Option<&Value>) -> Result<u8, &'static str> {
    let n = value
        .and_then(Value::as_i64)
        .ok_or("Position must be an integer between 0 and 8")?;
    if (0..=8).contains(&n) {
        Ok(n as u8)
    } else {
        Err("Position must be an integer between 0 and 8")
    }
}

/// Parse a leading integer from a JSON value.
///
/// Numbers truncate toward zero; strings are parsed with `parseInt`
/// semantics (skip leading whitespace, optional sign, consume digits,
/// ignore trailing garbage). Anything else yields `None`.
fn parse_leading_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.as_bytes().first() {
                Some(b'-') => (-1, &s[1..]),
                Some(b'+') => (1, &s[1..]),
                _ => (1, s),
            };
            let end = digits
                .as_bytes()
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if end == 0 {
                return None;
            }
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// Validate pagination parameters.
///
/// `limit` defaults to 50 and must land in `[1, 100]`; `offset` defaults to
/// 0 and must be non-negative. Both accept permissive leading-integer input.
///
/// # Errors
///
/// Returns a reason if either value is present but out of range or
/// unparseable.
pub fn validate_pagination(
    limit: Option<&Value>,
    offset: Option<&Value>,
) -> Result<Page, &'static str> {
    let limit = match limit {
        None | Some(Value::Null) => DEFAULT_PAGE_LIMIT,
        Some(v) => match parse_leading_int(v) {
            Some(n) if (1..=MAX_PAGE_LIMIT as i64).contains(&n) => n as usize,
            _ => return Err("Limit must be an integer between 1 and 100"),
        },
    };

    let offset = match offset {
        None | Some(Value::Null) => 0,
        Some(v) => match parse_leading_int(v) {
            Some(n) if n >= 0 => n as usize,
            _ => return Err("Offset must be a non-negative integer"),
        },
    };

    Ok(Page { limit, offset })
}

/// Validate a full chat submission.
///
/// Checks short-circuit in order room → user → message; the first failure is
/// returned verbatim.
///
/// # Errors
///
/// Returns the first failing field's reason.
pub fn validate_chat_data(
    room_id: Option<&str>,
    user_id: Option<&str>,
    message: Option<&str>,
) -> Result<ChatData, &'static str> {
    let room_id = validate_room_id(room_id)?;
    let user_id = validate_user_id(user_id)?;
    let message = validate_message(message)?;
    Ok(ChatData {
        room_id,
        user_id,
        message,
    })
}
