use reqwest::StatusCode;

/// Errors surfaced by the station directory, the reading resolver and the
/// EPA client.
#[derive(Debug, thiserror::Error)]
pub enum AirQualityError {
    #[error("EPA API is unreachable: {0}")]
    ProviderUnreachable(#[source] reqwest::Error),

    #[error("EPA API rejected the API key ({status})")]
    AuthenticationFailed { status: String },

    #[error("API key contains characters that cannot be sent in a request header")]
    InvalidApiKey,

    #[error("invalid EPA API base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("EPA API returned no monitoring stations")]
    NoStationsReturned,

    #[error("no granularity of {parameter} at station {station_id} has a current reading")]
    AllGranularitiesUnavailable {
        station_id: String,
        parameter: String,
    },

    #[error("monitoring station '{0}' was not found")]
    SiteNotFound(String),

    #[error("EPA API is busy, try again later")]
    RateLimited,

    #[error("EPA API request failed with status {status}: {body}")]
    UnexpectedStatus { status: String, body: String },

    #[error("failed to decode EPA API response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("could not geocode '{0}'")]
    GeocodeFailed(String),
}

pub type Result<T, E = AirQualityError> = std::result::Result<T, E>;

/// Render a status code as `"503/Service unavailable"`, falling back to the
/// bare code for statuses without a translation.
pub fn translate_status(status: StatusCode) -> String {
    let text = match status.as_u16() {
        200 => "Success",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not found",
        418 => "I'm a teapot",
        429 => "Try again later",
        500 => "Internal web server error",
        501 => "Not implemented",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        _ => return status.as_u16().to_string(),
    };
    format!("{}/{}", status.as_u16(), text)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_are_translated() {
        assert_eq!(translate_status(StatusCode::SERVICE_UNAVAILABLE), "503/Service unavailable");
        assert_eq!(translate_status(StatusCode::UNAUTHORIZED), "401/Unauthorized");
    }

    #[test]
    fn unknown_status_is_bare_code() {
        assert_eq!(translate_status(StatusCode::IM_USED), "226");
    }

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate_body("oops"), "oops");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "µ".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }
}
