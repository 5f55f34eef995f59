use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

/// Minimum number of non-whitespace-trimmed characters a pitch must have
pub const MIN_PITCH_CHARS: usize = 10;

/// Hostnames accepted without further checks (development convenience)
const LOCAL_HOSTNAME: &str = "localhost";

/// Hostnames a LinkedIn profile link may live on
const LINKEDIN_HOSTS: [&str; 2] = ["linkedin.com", "www.linkedin.com"];

/// Path segment marking a LinkedIn member profile
const PROFILE_SEGMENT: &str = "/in/";

static IPV4_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("IPv4 literal pattern should be valid")
});

static DOMAIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$",
    )
    .expect("Domain name pattern should be valid")
});

/// Reason a candidate input was rejected.
///
/// The display text is what the composer shows next to the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("Invalid URL format. Please include http:// or https://")]
    UnparseableUrl,

    #[error("URL must start with http:// or https://")]
    Scheme,

    #[error("Invalid URL format")]
    Hostname,

    #[error("Invalid domain name")]
    Domain,

    #[error("URL must be from linkedin.com")]
    NotLinkedIn,

    #[error(
        "Invalid LinkedIn profile URL. Should be like: https://linkedin.com/in/yourprofile"
    )]
    MissingProfilePath,

    #[error("Pitch must be at least {} characters", MIN_PITCH_CHARS)]
    PitchTooShort,
}

/// Parses a non-empty http(s) URL, the shared first step of both validators
fn parse_web_url(input: &str, field: &'static str) -> Result<Url, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }

    let url = Url::parse(input.trim()).map_err(|_| ValidationError::UnparseableUrl)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::Scheme);
    }
    Ok(url)
}

/// Validates the URL of the portfolio to embed
pub fn validate_portfolio_url(input: &str) -> Result<(), ValidationError> {
    let url = parse_web_url(input, "Portfolio URL")?;

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Err(ValidationError::Hostname),
    };

    if host == LOCAL_HOSTNAME || IPV4_LITERAL.is_match(host) {
        return Ok(());
    }

    if !DOMAIN_NAME.is_match(host) {
        return Err(ValidationError::Domain);
    }

    Ok(())
}

/// Validates a LinkedIn member profile URL
pub fn validate_linkedin_url(input: &str) -> Result<(), ValidationError> {
    let url = parse_web_url(input, "LinkedIn URL")?;

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !LINKEDIN_HOSTS.contains(&host.as_str()) {
        return Err(ValidationError::NotLinkedIn);
    }

    if !url.path().contains(PROFILE_SEGMENT) {
        return Err(ValidationError::MissingProfilePath);
    }

    Ok(())
}

/// Validates the pitch text handed to narration
pub fn validate_pitch_text(input: &str) -> Result<(), ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required("Pitch"));
    }
    if trimmed.chars().count() < MIN_PITCH_CHARS {
        return Err(ValidationError::PitchTooShort);
    }
    Ok(())
}

/// Re-serializes a URL from its scheme, host, port, path, query and fragment.
///
/// Userinfo is dropped. Anything that is not an http(s) URL with a host
/// (`javascript:`, `data:`, garbage) yields an empty string, which callers
/// must treat as a hard validation failure.
pub fn sanitize_url(input: &str) -> String {
    let Ok(url) = Url::parse(input.trim()) else {
        return String::new();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return String::new();
    }
    let Some(host) = url.host_str() else {
        return String::new();
    };

    let mut out = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(url.path());
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
