//! Multisig engine CLI Application
//!
//! A command-line interface for managing K-of-N shared accounts.

use clap::{Args, Parser, Subcommand};
use multisig_engine::api::{create_router, ApiState, WsBroadcaster};
use multisig_engine::cli::{self, AppState};
use multisig_engine::config::EngineConfig;
use multisig_engine::multisig::{AccountAction, SchemaChange};
use multisig_engine::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(version = "0.1.0")]
#[command(about = "K-of-N multisig account engine", long_about = None)]
struct Cli {
    /// Data directory for engine state
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a data directory
    Init {
        /// Maximum unresolved transactions per account
        #[arg(long)]
        max_pending: Option<u64>,

        /// Disable the queue bound and ranged operations
        #[arg(long)]
        legacy: bool,
    },

    /// Show the engine configuration
    Config,

    /// Generate a key-controlled ledger account
    Keygen,

    /// Multisig account operations
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Propose a transaction
    Propose {
        /// Multisig account address
        #[arg(short, long)]
        account: String,

        /// Proposing owner
        #[arg(short, long)]
        proposer: String,

        /// Store only the payload digest
        #[arg(long)]
        digest_only: bool,

        #[command(subcommand)]
        payload: PayloadCommands,
    },

    /// Vote on a pending transaction
    Vote {
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        owner: String,

        /// Sequence number (start of the range with --to)
        #[arg(short, long)]
        sequence: u64,

        /// Last sequence number of a ranged vote
        #[arg(long)]
        to: Option<u64>,

        /// Vote to reject instead of approve
        #[arg(long)]
        reject: bool,
    },

    /// Execute the next pending transaction
    Execute {
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        executor: String,

        /// Hex payload, required when only the digest was proposed
        #[arg(long)]
        payload: Option<String>,
    },

    /// Finalize rejection of the next pending transaction
    Reject {
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        owner: String,

        /// Reject every transaction up to this sequence number
        #[arg(long)]
        up_to: Option<u64>,
    },

    /// List pending transactions
    Pending {
        #[arg(short, long)]
        account: String,
    },

    /// Show an account's events
    Events {
        #[arg(short, long)]
        account: String,

        /// First event index to show
        #[arg(long, default_value = "0")]
        since: u64,
    },

    /// REST API server
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Create a new multisig account
    Create {
        /// Creator, the first owner
        #[arg(short, long)]
        creator: String,

        /// Additional owners (comma-separated)
        #[arg(long, value_delimiter = ',')]
        owners: Vec<String>,

        /// Required approvals
        #[arg(short, long, default_value = "1")]
        threshold: usize,

        /// Metadata entry key=value (repeatable)
        #[arg(short, long)]
        metadata: Vec<String>,

        /// Remove the creator from the owners after creation
        #[arg(long)]
        remove_creator: bool,
    },

    /// Convert a key-controlled account into a multisig account
    Migrate {
        /// Private key (hex) of the account being converted
        #[arg(long)]
        private_key: String,

        /// Owners (comma-separated)
        #[arg(long, value_delimiter = ',')]
        owners: Vec<String>,

        #[arg(short, long)]
        threshold: usize,

        #[arg(short, long)]
        metadata: Vec<String>,

        /// Keep the original key able to control the account
        #[arg(long)]
        keep_key: bool,
    },

    /// Show account details
    Show {
        #[arg(short, long)]
        address: String,
    },

    /// List all multisig accounts
    List,

    /// Show the address the next account of a creator will get
    NextAddress {
        #[arg(short, long)]
        creator: String,
    },
}

#[derive(Subcommand)]
enum PayloadCommands {
    /// Change owners and/or threshold
    Schema(SchemaArgs),

    /// Replace the account metadata
    Metadata {
        /// Entry key=value (repeatable)
        #[arg(short, long)]
        entry: Vec<String>,
    },

    /// Payload with no effect
    Noop,

    /// Raw hex payload
    Raw {
        #[arg(long)]
        hex: String,
    },
}

#[derive(Args)]
struct SchemaArgs {
    /// Owners to add (comma-separated)
    #[arg(long, value_delimiter = ',')]
    add: Vec<String>,

    /// Owners to remove (comma-separated)
    #[arg(long, value_delimiter = ',')]
    remove: Vec<String>,

    /// New threshold
    #[arg(short, long)]
    threshold: Option<usize>,
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Start the REST API server
    Start {
        /// Port to listen on for REST API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Handle init command separately (doesn't need full state)
    if let Commands::Init { max_pending, legacy } = &cli.command {
        return cli::cmd_init(&cli.data_dir, *max_pending, *legacy);
    }

    // Handle API commands with tokio runtime
    if let Commands::Api { ref action } = cli.command {
        return run_api_command(action, &cli.data_dir);
    }

    let mut state = AppState::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::Init { .. } | Commands::Api { .. } => unreachable!(),

        Commands::Config => cli::cmd_config(&state)?,

        Commands::Keygen => cli::cmd_keygen(&mut state)?,

        Commands::Account { action } => match action {
            AccountCommands::Create {
                creator,
                owners,
                threshold,
                metadata,
                remove_creator,
            } => {
                cli::cmd_account_create(
                    &mut state,
                    &creator,
                    owners,
                    threshold,
                    &metadata,
                    remove_creator,
                )?;
            }
            AccountCommands::Migrate {
                private_key,
                owners,
                threshold,
                metadata,
                keep_key,
            } => {
                cli::cmd_account_migrate(
                    &mut state,
                    &private_key,
                    owners,
                    threshold,
                    &metadata,
                    !keep_key,
                )?;
            }
            AccountCommands::Show { address } => cli::cmd_account_show(&state, &address)?,
            AccountCommands::List => cli::cmd_account_list(&state)?,
            AccountCommands::NextAddress { creator } => {
                cli::cmd_next_address(&state, &creator)?;
            }
        },

        Commands::Propose {
            account,
            proposer,
            digest_only,
            payload,
        } => {
            let payload = match payload {
                PayloadCommands::Schema(args) => {
                    cli::action_payload(&AccountAction::UpdateSchema(SchemaChange {
                        add_owners: args.add,
                        remove_owners: args.remove,
                        threshold: args.threshold,
                    }))?
                }
                PayloadCommands::Metadata { entry } => {
                    let (keys, values) = cli::parse_metadata(&entry)?;
                    cli::action_payload(&AccountAction::UpdateMetadata { keys, values })?
                }
                PayloadCommands::Noop => cli::action_payload(&AccountAction::Noop)?,
                PayloadCommands::Raw { hex } => hex::decode(hex)?,
            };
            cli::cmd_propose(&mut state, &account, &proposer, payload, digest_only)?;
        }

        Commands::Vote {
            account,
            owner,
            sequence,
            to,
            reject,
        } => {
            cli::cmd_vote(&mut state, &account, &owner, sequence, to, !reject)?;
        }

        Commands::Execute {
            account,
            executor,
            payload,
        } => {
            cli::cmd_execute(&mut state, &account, &executor, payload.as_deref())?;
        }

        Commands::Reject {
            account,
            owner,
            up_to,
        } => {
            cli::cmd_reject(&mut state, &account, &owner, up_to)?;
        }

        Commands::Pending { account } => cli::cmd_pending(&state, &account)?,

        Commands::Events { account, since } => cli::cmd_events(&state, &account, since)?,
    }

    Ok(())
}

fn run_api_command(
    action: &ApiCommands,
    data_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ApiCommands::Start { port } => {
                let config = EngineConfig::load_or_default(data_dir)?;
                let storage_config = StorageConfig {
                    data_dir: data_dir.to_path_buf(),
                    ..Default::default()
                };
                let storage = Arc::new(Storage::new(storage_config)?);

                println!("📂 Loading engine state...");
                let engine = storage.load_or_default(config)?;
                println!(
                    "   {} multisig account(s), {} ledger account(s)",
                    engine.multisig.account_count(),
                    engine.ledger.account_count()
                );

                let state = ApiState {
                    engine: Arc::new(RwLock::new(engine)),
                    storage: storage.clone(),
                    ws_broadcaster: Arc::new(WsBroadcaster::new()),
                };
                let shutdown_state = state.clone();

                let app = create_router(state);

                let addr = format!("0.0.0.0:{}", port);
                println!("🚀 REST API server starting on http://localhost:{}", port);
                println!();
                println!("📖 Available endpoints:");
                println!("   GET  /health                                   - Health check");
                println!("   GET  /ws                                       - WebSocket events");
                println!("   GET  /api/config                               - Engine config");
                println!("   POST /api/keys                                 - New key account");
                println!("   GET  /api/multisig                             - List accounts");
                println!("   POST /api/multisig                             - Create account");
                println!("   POST /api/multisig/migrate                     - Convert account");
                println!("   GET  /api/multisig/{{addr}}                      - Account details");
                println!("   GET  /api/multisig/{{addr}}/transactions         - Pending");
                println!("   POST /api/multisig/{{addr}}/transactions         - Propose");
                println!("   POST /api/multisig/{{addr}}/transactions/{{seq}}/vote - Vote");
                println!("   POST /api/multisig/{{addr}}/execute              - Execute next");
                println!("   POST /api/multisig/{{addr}}/reject               - Reject next");
                println!("   GET  /api/multisig/{{addr}}/events               - Events");
                println!();

                // Handle Ctrl+C with graceful shutdown
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    println!("\n📴 Shutting down API server...");

                    println!("💾 Saving data...");
                    let engine = shutdown_state.engine.read().await;
                    match shutdown_state.storage.save(&engine) {
                        Ok(()) => println!("✅ Data saved successfully!"),
                        Err(e) => log::error!("Failed to save state: {}", e),
                    }
                    std::process::exit(0);
                });

                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
