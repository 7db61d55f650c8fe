//! `kms-jwt validate` - Verify a token and print its claims.

use super::{OFFICIAL_CHALLENGE_CLAIM, OUTPUT_SEPARATOR, USERNAME_CLAIM, WARMUP_CHALLENGES_CLAIM};
use anyhow::Context;
use kms_jwt::{Claims, TokenDecoder};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Claims printed after a successful validation, in order.
const PRINTED_CLAIMS: [&str; 3] = [USERNAME_CLAIM, WARMUP_CHALLENGES_CLAIM, OFFICIAL_CHALLENGE_CLAIM];

/// Load the token from a file if `token` names one, otherwise use it as-is.
fn resolve_token(token: &str) -> anyhow::Result<String> {
    let path = Path::new(token);
    if path.is_file() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read token from file: {}", path.display()))?;
        return Ok(contents.trim().to_string());
    }

    Ok(token.to_string())
}

/// Print `JWT_CLAIM_<name>=<value>` for each known claim present.
fn print_claims(claims: &Claims, out: &mut impl Write) -> std::io::Result<()> {
    for name in PRINTED_CLAIMS {
        if let Some(value) = claims.get(name) {
            writeln!(out, "JWT_CLAIM_{name}={value}")?;
        }
    }
    Ok(())
}

/// Verify a token and print the outcome.
pub async fn run(decoder: &TokenDecoder, token: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let token = resolve_token(token)?;
    let claims = decoder.decode(&token).await.context("Token validation failed")?;

    writeln!(out, "{OUTPUT_SEPARATOR}")?;
    writeln!(out, "JWT_VALIDATED=true")?;
    print_claims(&claims, out)?;

    Ok(())
}
