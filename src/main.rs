use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use authflow::services::history::MemoryHistory;
use authflow::services::http::HttpClient;
use authflow::services::storage::FileTokenStorage;
use authflow::services::{Location, NoU2fDevice};
use authflow::{AuthConfig, AuthError, AuthProviderType, Collaborators, Operation, Reactor, RequestStatus, UserActions};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{operation} failed: {message}")]
    Failed { operation: Operation, message: String },
    #[error("{0} did not complete")]
    Incomplete(Operation),
}

#[derive(Parser, Debug)]
#[command(name = "authflow", about = "Drive the web login flow from the command line")]
struct Cli {
    #[arg(long, env = "AUTHFLOW_BASE_URL")]
    base_url: String,

    #[arg(long, env = "AUTHFLOW_TOKEN_FILE", default_value = ".authflow/token.json")]
    token_file: PathBuf,

    /// Client location the flow starts from, e.g. `/web/login?redirect_uri=...`.
    #[arg(long, default_value = "/web/login")]
    location: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        user: String,
        #[arg(long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        token: String,
    },
    Logout,
    /// Show the user an invite token was issued for.
    Invite { invite_token: String },
    /// Print the SSO URL the client would navigate to.
    Sso { provider_name: String, provider_type: String },
    ChangePassword {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
        #[arg(long, default_value = "")]
        token: String,
    },
    Whoami,
    /// Check the session before entering `path`.
    Check {
        #[arg(default_value = "/web")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AuthConfig::new(&cli.base_url)?;
    if let Ok(env_config) = AuthConfig::from_env() {
        config.timeouts = env_config.timeouts;
    }

    let storage = Arc::new(FileTokenStorage::new(&cli.token_file));
    let history = Arc::new(MemoryHistory::new(config.clone(), &cli.location));
    let http = Arc::new(HttpClient::new(config.clone(), storage.clone(), Arc::new(NoU2fDevice))?);
    let collaborators = Collaborators {
        auth: http.clone(),
        session: http.clone(),
        api: http,
        history: history.clone(),
        storage,
    };
    let actions = UserActions::new(Reactor::new(), config, collaborators);

    match cli.command {
        Command::Login { user, password, token } => {
            actions.login(&user, &password, &token).await;
            finish(&actions, Operation::TryingToLogin)?;
            println!("logged in, continue at {}", history.current());
        }
        Command::Logout => {
            actions.logout().await;
            println!("logged out");
        }
        Command::Invite { invite_token } => {
            actions.fetch_invite(&invite_token).await;
            finish(&actions, Operation::FetchingInvite)?;
            if let Some(invite) = actions.reactor().invite() {
                println!("invite for {}", invite.user);
            }
        }
        Command::Sso { provider_name, provider_type } => {
            let provider_type: AuthProviderType = provider_type.parse()?;
            actions.login_with_sso(&provider_name, provider_type);
            println!("{}", history.current());
        }
        Command::ChangePassword { old, new, token } => {
            actions.change_password(&old, &new, &token).await;
            finish(&actions, Operation::TryingToChangePassword)?;
            println!("password changed");
        }
        Command::Whoami => {
            actions.fetch_user().await;
            finish(&actions, Operation::FetchingUser)?;
            if let Some(user) = actions.reactor().user() {
                let kind = if user.is_sso() { "sso" } else { user.auth_type().as_str() };
                println!("{} ({kind})", user.name());
            }
        }
        Command::Check { path } => {
            let target = Location::parse(&path);
            actions
                .ensure_user(
                    &target,
                    |login| println!("session required, go to {login}"),
                    || tracing::debug!("session check settled"),
                )
                .await;
        }
    }
    Ok(())
}

fn finish(actions: &UserActions, operation: Operation) -> Result<(), CliError> {
    match actions.reactor().status(operation) {
        RequestStatus::Succeeded => Ok(()),
        RequestStatus::Failed(message) => Err(CliError::Failed { operation, message }),
        RequestStatus::Idle | RequestStatus::InFlight => Err(CliError::Incomplete(operation)),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
