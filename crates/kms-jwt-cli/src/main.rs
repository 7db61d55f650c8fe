use clap::{Parser, Subcommand};
use kms_jwt::{KmsConfig, KmsKeyProtection, TokenDecoder};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "kms-jwt", version, about = "Issue and validate KMS-backed JSON Web Tokens")]
struct Cli {
    /// Optional KMS endpoint override (e.g. http://localhost:4566)
    #[arg(short = 'e', long, global = true, env = "KMS_JWT_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a JWT token
    Generate {
        /// The region where the KMS key lives
        #[arg(short, long, env = "AWS_REGION")]
        region: String,

        /// The ARN (or alias) of the key used to wrap the signing key
        #[arg(short, long)]
        key: String,

        /// Unique username. Should not contain names.
        #[arg(short, long)]
        username: String,

        /// The journey associated to this user, e.g. "SUM,HLO,UPR"
        #[arg(short, long)]
        journey: String,

        /// The expiry period, e.g. "2d", "12h". A bare number means days.
        #[arg(short = 'x', long = "expire-in", default_value = "2d")]
        expire_in: String,
    },

    /// Validate a JWT token
    Validate {
        /// The region where the KMS key lives
        #[arg(short, long, env = "AWS_REGION")]
        region: String,

        /// An allowed KMS key (ARN, key id or alias). Repeat to allow several.
        #[arg(short = 'k', long = "key", required = true)]
        keys: Vec<String>,

        /// JWT token value to validate, or a path to a file containing it
        #[arg(short, long)]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();

    match cli.cmd {
        Command::Generate {
            region,
            key,
            username,
            journey,
            expire_in,
        } => {
            info!(username = %username, journey = %journey, expire_in = %expire_in, "Generating JWT");
            let client = KmsConfig::new(region).with_endpoint(cli.endpoint).client().await;
            let protection = Arc::new(KmsKeyProtection::with_wrapping_key(client, key));

            commands::generate::run(protection, &username, &journey, &expire_in, &mut stdout).await?
        }

        Command::Validate { region, keys, token } => {
            info!(keys = ?keys, region = %region, "Validating JWT");
            let client = KmsConfig::new(region).with_endpoint(cli.endpoint).client().await;
            let decoder = TokenDecoder::resolve(Arc::new(KmsKeyProtection::new(client)), keys).await;

            commands::validate::run(&decoder, &token, &mut stdout).await?
        }
    }

    Ok(())
}
