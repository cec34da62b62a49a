//! Request field rules. Each check returns the normalized value or a 400
//! naming the offending field.

use crate::error::{ApiError, ApiResult};

const MAX_EMAIL_LEN: usize = 254;
const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 10_000;
const MAX_URL_LEN: usize = 2048;

pub fn username(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ApiError::bad_request(
            "username may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(name.to_string())
}

pub fn email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_lowercase();
    let invalid = || ApiError::bad_request("email is not a valid address");

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels_ok = domain.contains('.') && domain.split('.').all(|label| !label.is_empty());
    if !labels_ok {
        return Err(invalid());
    }
    Ok(email)
}

pub fn password(raw: &str) -> ApiResult<()> {
    let len = raw.chars().count();
    if len < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }
    if len > 128 {
        return Err(ApiError::bad_request("password must be at most 128 characters"));
    }
    Ok(())
}

pub fn note_title(raw: &str) -> ApiResult<String> {
    let title = raw.trim();
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request("title must be at most 200 characters"));
    }
    Ok(title.to_string())
}

pub fn note_content(raw: &str) -> ApiResult<String> {
    if raw.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }
    if raw.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::bad_request("content must be at most 10000 characters"));
    }
    Ok(raw.to_string())
}

pub fn timestamp(raw: f64) -> ApiResult<f64> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(ApiError::bad_request("timestamp must be a non-negative number of seconds"));
    }
    Ok(raw)
}

/// `Ok(None)` means clear the picture.
pub fn profile_picture(raw: &str) -> ApiResult<Option<String>> {
    let url = raw.trim();
    if url.is_empty() {
        return Ok(None);
    }
    let valid = url.len() <= MAX_URL_LEN
        && reqwest::Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
    if !valid {
        return Err(ApiError::bad_request("profilePicture must be an http(s) URL"));
    }
    Ok(Some(url.to_string()))
}
