use anyhow::Context;
use box_oauth::auth::AuthorizationCodeFlow;
use box_oauth::{AuthBroker, AuthError, BoxClient, CreateOutcome, ErrorKind, Session, Settings, Strategy};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

/// box-auth - Box API authentication demos
#[derive(Parser)]
#[command(name = "box-auth")]
#[command(version)]
#[command(about = "Authenticate against the Box API (OAuth2, JWT, CCG) and run small demos", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Pretty, global = true)]
    output: OutputFormat,

    /// Debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Oauth,
    Jwt,
    Ccg,
}

#[derive(Subcommand)]
enum Commands {
    /// OAuth2 authorization code: reuse the stored token or open the browser
    Oauth {
        /// Discard the stored token and authorize again
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// JWT server authentication from JWT_CONFIG_PATH
    Jwt {
        /// Act as this user (As-User)
        #[arg(long)]
        as_user: Option<String>,
    },

    /// Client credentials: enterprise service account, then CCG_USER_ID if set
    Ccg {
        /// Act as this user (As-User)
        #[arg(long)]
        as_user: Option<String>,
    },

    /// Remove the stored OAuth2 token
    Logout,

    /// Create a folder, reusing it if the name is taken
    CreateFolder {
        /// Parent folder id ("0" is the root)
        #[arg(short = 'p', long, default_value = "0")]
        parent: String,

        /// Folder name
        #[arg(short = 'n', long)]
        name: String,

        /// How to authenticate
        #[arg(short = 's', long, value_enum, default_value_t = StrategyArg::Oauth)]
        strategy: StrategyArg,
    },
}

/// Uniform command output
#[derive(serde::Serialize)]
struct CliResponse {
    success: bool,
    data: Option<serde_json::Value>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

impl CliResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    fn failure(err: &anyhow::Error) -> Self {
        let kind = err.downcast_ref::<AuthError>().map(AuthError::kind);
        let mut message = format!("{:#}", err);
        if let Some(hint) = kind.and_then(hint_for) {
            message = format!("{} ({})", message, hint);
        }
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_kind: kind.map(|k| k.as_str()),
        }
    }
}

fn hint_for(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Configuration => Some("check your .env file"),
        ErrorKind::Authentication => Some("for OAuth2, run `box-auth oauth --force` to authorize again"),
        ErrorKind::Security => Some("the callback did not match this run, start over"),
        ErrorKind::Vendor | ErrorKind::Transport => None,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "box_oauth=info,box_auth=info,warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let response = match execute_command(&cli).await {
        Ok(response) => response,
        Err(e) => CliResponse::failure(&e),
    };

    let exit_code = if response.success { 0 } else { 1 };
    output_response(response, cli.output);
    std::process::exit(exit_code);
}

async fn execute_command(cli: &Cli) -> anyhow::Result<CliResponse> {
    let settings = Settings::from_env().context("Failed to load settings")?;
    let broker = AuthBroker::new(&settings);

    match &cli.command {
        Commands::Oauth { force } => {
            let session = broker
                .authenticate(Strategy::AuthorizationCode { force: *force })
                .await?;
            greet(&settings, &session).await
        }

        Commands::Jwt { as_user } => {
            let session = broker
                .authenticate(Strategy::Jwt { as_user: as_user.clone() })
                .await?;
            greet(&settings, &session).await
        }

        Commands::Ccg { as_user } => {
            let enterprise = broker.ccg_enterprise(as_user.as_deref()).await?;
            let mut greetings = vec![hello(&settings, &enterprise).await?];

            if settings.ccg_user_id().is_some() {
                let user = broker.ccg_user(as_user.as_deref()).await?;
                greetings.push(hello(&settings, &user).await?);
            }

            Ok(CliResponse::success(json!({ "greetings": greetings })))
        }

        Commands::Logout => {
            AuthorizationCodeFlow::new(&settings).logout()?;
            Ok(CliResponse::success(json!({
                "message": "Stored token removed",
                "token_store": settings.token_store_path().display().to_string()
            })))
        }

        Commands::CreateFolder { parent, name, strategy } => {
            let strategy = match strategy {
                StrategyArg::Oauth => Strategy::AuthorizationCode { force: false },
                StrategyArg::Jwt => Strategy::Jwt { as_user: None },
                StrategyArg::Ccg => Strategy::ClientCredentials {
                    subject: box_oauth::Subject::Enterprise(settings.require_enterprise_id()?.to_string()),
                    as_user: None,
                },
            };
            let session = broker.authenticate(strategy).await?;
            let client = BoxClient::new(&session, settings.api_base_url())?;

            let data = match client.create_folder(parent, name).await? {
                CreateOutcome::Created(folder) => json!({
                    "created": true,
                    "id": folder.id,
                    "name": folder.name
                }),
                CreateOutcome::AlreadyExists(id) => {
                    let folder = client.get_folder(&id).await?;
                    json!({
                        "created": false,
                        "id": folder.id,
                        "name": folder.name
                    })
                }
            };
            Ok(CliResponse::success(data))
        }
    }
}

async fn hello(settings: &Settings, session: &Session) -> anyhow::Result<String> {
    let user = BoxClient::new(session, settings.api_base_url())?
        .current_user()
        .await
        .context("Failed to fetch the current user")?;
    Ok(format!("Hello, I'm {} ({}) [{}]", user.name, user.login, user.id))
}

async fn greet(settings: &Settings, session: &Session) -> anyhow::Result<CliResponse> {
    let greeting = hello(settings, session).await?;
    Ok(CliResponse::success(json!({
        "greeting": greeting,
        "token_preview": session.token().preview(),
        "expires_in_secs": session.token().time_to_expiry()
    })))
}

fn output_response(response: CliResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(&response) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("❌ Error: {}", e),
        },
        OutputFormat::Pretty => {
            if response.success {
                if let Some(data) = response.data {
                    println!("✅ Success!");
                    match serde_json::to_string_pretty(&data) {
                        Ok(pretty) => println!("{}", pretty),
                        Err(_) => println!("{}", data),
                    }
                }
            } else if let Some(error) = response.error {
                match response.error_kind {
                    Some(kind) => eprintln!("❌ Error [{}]: {}", kind, error),
                    None => eprintln!("❌ Error: {}", error),
                }
            }
        }
    }
}
