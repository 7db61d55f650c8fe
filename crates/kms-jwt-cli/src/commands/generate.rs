//! `kms-jwt generate` - Issue a token for a user and their journey.

use super::{OFFICIAL_CHALLENGE_CLAIM, OUTPUT_SEPARATOR, USERNAME_CLAIM, WARMUP_CHALLENGES_CLAIM};
use anyhow::Context;
use chrono::{Duration, Utc};
use kms_jwt::{Claims, KeyProtection, TokenEncoder};
use std::io::Write;
use std::sync::Arc;

/// A journey split into its warm-up challenges and the official one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journey {
    pub warmup_challenges: Vec<String>,
    pub official_challenge: String,
}

/// Split a comma-separated journey. The last challenge is the official one.
pub fn split_journey(journey: &str) -> anyhow::Result<Journey> {
    let mut parts: Vec<String> = journey
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();

    let official_challenge = parts.pop().context("Journey must contain at least one challenge")?;

    Ok(Journey {
        warmup_challenges: parts,
        official_challenge,
    })
}

/// Parse a duration string like "2d", "24h", "30m" into chrono::Duration.
///
/// A bare number is a number of days.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    let (amount, unit) = match s.char_indices().last() {
        Some((i, unit @ ('d' | 'h' | 'm' | 's'))) => (&s[..i], unit),
        _ => (s.as_str(), 'd'),
    };

    let n: i64 = amount.parse().with_context(|| format!("Invalid expiry: {s}"))?;
    let duration = match unit {
        'h' => Duration::try_hours(n),
        'm' => Duration::try_minutes(n),
        's' => Duration::try_seconds(n),
        _ => Duration::try_days(n),
    };
    duration.with_context(|| format!("Invalid expiry: {s}"))
}

/// Build the claims carried by a user token.
pub fn user_claims(username: &str, journey: Journey) -> Claims {
    Claims::new()
        .with(USERNAME_CLAIM, username)
        .with(WARMUP_CHALLENGES_CLAIM, journey.warmup_challenges)
        .with(OFFICIAL_CHALLENGE_CLAIM, journey.official_challenge)
}

/// Issue a token and print it as `JWT_TOKEN=<token>`.
pub async fn run(
    protection: Arc<dyn KeyProtection>,
    username: &str,
    journey: &str,
    expire_in: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let journey = split_journey(journey)?;
    let validity = parse_duration(expire_in)?;
    let claims = user_claims(username, journey);

    let encoder = TokenEncoder::new(protection);
    let expires_at = Utc::now().checked_add_signed(validity).context("Expiry is out of range")?;
    let token = encoder
        .encode(&claims, expires_at)
        .await
        .context("Failed to generate token")?;

    writeln!(out, "{OUTPUT_SEPARATOR}")?;
    writeln!(out, "JWT_TOKEN={token}")?;

    Ok(())
}
