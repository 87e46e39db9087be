use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scd_config::SyncSettings;
use scd_schemas::Machine;
use scd_sync::{run_pass, StockStore, Watermarks};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "scd")]
#[command(about = "ScoopDesk franchise ops CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> machine overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Machine registry commands
    Machine {
        #[command(subcommand)]
        cmd: MachineCmd,
    },

    /// Run one reconciliation pass for a machine and print the report
    Sync {
        /// Machine id
        #[arg(long)]
        machine: String,

        /// Layered config paths in merge order (defaults apply when omitted)
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Reset stock to capacity after a physical refill
    Refill {
        /// Machine id
        #[arg(long)]
        machine: String,

        /// Topping position; omit to refill every slot on the machine
        #[arg(long)]
        position: Option<i32>,
    },

    /// Print current stock rows for a machine
    Stock {
        /// Machine id
        #[arg(long)]
        machine: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum MachineCmd {
    /// Register (or update) a machine. Active machines are picked up by
    /// the daemon's sync loops on its next start.
    Register {
        /// Machine id as known to the vendor API
        #[arg(long)]
        id: String,

        /// Human-readable name
        #[arg(long)]
        name: String,

        /// Free-form location string
        #[arg(long)]
        location: Option<String>,

        /// Register without activating (no sync loop)
        #[arg(long, default_value_t = false)]
        inactive: bool,

        /// Owning franchisee account id
        #[arg(long)]
        owner: Option<Uuid>,
    },

    /// List registered machines
    List,

    /// Mark a machine inactive (the daemon stops its loop on next poll
    /// of the registry; stock rows and cursor are kept)
    Deactivate {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = scd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = scd_db::status(&pool).await?;
                    println!("db_ok={} has_schema={}", s.ok, s.has_schema);
                }
                DbCmd::Migrate => {
                    scd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = scd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Machine { cmd } => {
            let pool = scd_db::connect_from_env().await?;
            let store = scd_db::PgStore::new(pool);
            match cmd {
                MachineCmd::Register {
                    id,
                    name,
                    location,
                    inactive,
                    owner,
                } => {
                    let machine = Machine {
                        machine_id: id,
                        display_name: name,
                        location,
                        active: !inactive,
                        owner_id: owner,
                    };
                    store.register_machine(&machine).await?;
                    println!(
                        "registered=true machine_id={} active={}",
                        machine.machine_id, machine.active
                    );
                }

                MachineCmd::List => {
                    for m in store.list_machines().await? {
                        println!(
                            "machine_id={} active={} name={:?} location={:?}",
                            m.machine_id, m.active, m.display_name, m.location
                        );
                    }
                }

                MachineCmd::Deactivate { id } => {
                    store.set_machine_active(&id, false).await?;
                    println!("deactivated=true machine_id={}", id);
                }
            }
        }

        Commands::Sync {
            machine,
            config_paths,
        } => {
            let settings = load_settings(&config_paths)?;
            let pool = scd_db::connect_from_env().await?;
            let store = scd_db::PgStore::new(pool);
            let ledger = scd_vendor::HttpVendorClient::from_settings(&settings)
                .context("vendor client setup failed")?;

            // One-shot process: a fresh watermark primes on this fetch.
            let report = run_pass(&store, &ledger, &Watermarks::new(), &machine).await?;

            println!("machine_id={}", report.machine_id);
            println!("kind={:?}", report.kind);
            println!("applied_sales={}", report.applied_sales);
            println!("duplicates_dropped={}", report.duplicates_dropped);
            println!("deducted_positions={}", report.deducted_positions);
            println!("untracked_positions={}", report.untracked_positions);
            println!("failed_positions={}", report.failed_positions);
            println!(
                "cursor={}",
                report.cursor.as_deref().unwrap_or("(unchanged)")
            );
        }

        Commands::Refill { machine, position } => {
            let pool = scd_db::connect_from_env().await?;
            let store = scd_db::PgStore::new(pool);
            store.refill(&machine, position).await?;
            match position {
                Some(p) => println!("refilled=true machine_id={} position={}", machine, p),
                None => println!("refilled=true machine_id={} position=all", machine),
            }
        }

        Commands::Stock { machine } => {
            let pool = scd_db::connect_from_env().await?;
            let store = scd_db::PgStore::new(pool);
            for item in store.list_stock(&machine).await? {
                println!(
                    "position={} units={}/{} low={}",
                    item.position,
                    item.units_current,
                    item.capacity_max,
                    item.is_low()
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

fn load_settings(config_paths: &[String]) -> Result<SyncSettings> {
    if config_paths.is_empty() {
        return Ok(SyncSettings::default());
    }
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = scd_config::load_layered_yaml(&path_refs)?;
    Ok(SyncSettings::from_config(&loaded.config_json))
}
