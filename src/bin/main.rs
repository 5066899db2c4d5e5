use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use context_gateway::{
    AppState, DatabaseConfig, TokenVerifier, UserContextStore, VerifierConfig, create_connection,
    create_router, ensure_schema,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "context-gateway")]
#[command(about = "Authenticated user-context API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Server {
        #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, env = "API_PORT", default_value = "8000")]
        port: u16,
        #[arg(long, env = "DATABASE_URL", default_value = "memory")]
        db_url: String,
        /// Auth issuer base URL; keys are fetched from <URL>/auth/v1/jwks
        #[arg(long, env = "SUPABASE_URL")]
        issuer_url: Option<String>,
        /// Public API key sent with key-set requests
        #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Shared HS256 signing secret
        #[arg(long, env = "SUPABASE_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "DATABASE_URL", default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("context_gateway=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            host,
            port,
            db_url,
            issuer_url,
            api_key,
            jwt_secret,
        } => {
            let verifier_config = VerifierConfig {
                issuer_url,
                api_key,
                jwt_secret,
                ..VerifierConfig::from_env()
            };
            info!("Auth configuration:");
            verifier_config.log_status();

            let verifier = TokenVerifier::new(verifier_config).map_err(|err| {
                error!("Cannot start without auth configuration: {}", err);
                err
            })?;
            info!("Verifying tokens issued by {}", verifier.issuer_url());
            info!("Signing keys published at {}", verifier.jwks_url());

            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for API server: {}", db_config.url);

            let db = create_connection(db_config).await?;
            ensure_schema(&db).await?;

            let app = create_router(AppState {
                verifier: Arc::new(verifier),
                user_contexts: UserContextStore::new(db),
            });

            let bind = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {}", bind))?;

            info!("Server listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = create_connection(db_config).await?;
            ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}
