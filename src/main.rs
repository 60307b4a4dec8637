use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use grpc_guard::config::Config;
use grpc_guard::jwt::TokenService;
use grpc_guard::telemetry;
use grpc_guard::tls::{CertificatePaths, CredentialProvider};
use std::path::PathBuf;
use tracing::info;

/// Issue and check identity tokens and mutual-TLS credentials
#[derive(Parser)]
#[command(name = "grpc-guard", version, about)]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a token for a subject and print it
    Issue {
        #[arg(long)]
        subject: String,
    },
    /// Validate a token and print its subject
    Validate {
        #[arg(long)]
        token: String,
    },
    /// Load the certificate material and report whether it is usable
    CheckCredentials {
        #[arg(long, value_enum, default_value_t = Role::Server)]
        role: Role,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Server,
    Client,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.env_file {
        Some(path) => Config::from_env_file(path)?,
        None => Config::from_env()?,
    };
    telemetry::init(&config.telemetry);

    match cli.command {
        Command::Issue { subject } => {
            let token = TokenService::new(&config.jwt)
                .issue(&subject)
                .context("failed to issue token")?;
            println!("{}", token);
        }
        Command::Validate { token } => {
            let subject = TokenService::new(&config.jwt)
                .validate(&token)
                .context("token rejected")?;
            println!("{}", subject);
        }
        Command::CheckCredentials { role } => {
            let paths = match role {
                Role::Server => CertificatePaths::server(&config.tls),
                Role::Client => CertificatePaths::client(&config.tls),
            };
            let bundle = CredentialProvider::new(paths)
                .load()
                .context("credential material is not usable")?;
            info!(
                trusted_roots = bundle.trusted_roots().len(),
                chain_len = bundle.certificate_chain().len(),
                "credentials OK"
            );
            println!("credentials OK");
        }
    }

    Ok(())
}
