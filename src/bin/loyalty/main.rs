//! Loyalty CLI
//!
//! Operator command-line interface for the loyalty server.

mod client;
mod commands;
mod style;

use clap::{Parser, Subcommand};
use style::*;
use uuid::Uuid;

const BANNER: &str = r#"
   █████╗ ███████╗████████╗███████╗██████╗ ██████╗  █████╗ ██████╗ ██╗  ██╗
  ██╔══██╗██╔════╝╚══██╔══╝██╔════╝██╔══██╗██╔══██╗██╔══██╗██╔══██╗██║ ██╔╝
  ███████║█████╗     ██║   █████╗  ██████╔╝██║  ██║███████║██████╔╝█████╔╝
  ██╔══██║██╔══╝     ██║   ██╔══╝  ██╔══██╗██║  ██║██╔══██║██╔══██╗██╔═██╗
  ██║  ██║██║        ██║   ███████╗██║  ██║██████╔╝██║  ██║██║  ██║██║  ██╗
  ╚═╝  ╚═╝╚═╝        ╚═╝   ╚══════╝╚═╝  ╚═╝╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝
"#;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "loyalty")]
#[command(version)]
#[command(about = "AfterDark Loyalty - memberships, points and tiers for venues", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Loyalty server URL
    #[arg(
        short,
        long,
        env = "LOYALTY_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    url: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the loyalty server
    #[command(visible_alias = "s")]
    Server {
        /// Config file
        #[arg(short, long, env = "LOYALTY_CONFIG", default_value = "config.toml")]
        config: String,
    },

    /// Show a member's standing at a venue
    #[command(visible_alias = "st")]
    Status {
        /// Member id
        #[arg(short = 'm', long)]
        user: Uuid,

        /// Venue id
        #[arg(long)]
        venue: Uuid,
    },

    /// List a member's point transactions
    #[command(visible_alias = "h")]
    History {
        /// Member id
        #[arg(short = 'm', long)]
        user: Uuid,

        /// Only this venue
        #[arg(long)]
        venue: Option<Uuid>,

        /// Only this transaction type (earn, spend, redeem, ...)
        #[arg(short = 't', long = "type")]
        entry_type: Option<String>,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        per_page: u32,
    },

    /// View a venue leaderboard
    #[command(visible_alias = "lb")]
    Leaderboard {
        /// Venue id
        #[arg(long)]
        venue: Uuid,

        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Check an employee PIN
    #[command(visible_alias = "pin")]
    VerifyPin {
        /// Employee id
        #[arg(short, long)]
        employee: Uuid,
    },

    /// Move stock between storage and the bar
    #[command(visible_alias = "t")]
    Transfer {
        /// Inventory item id
        #[arg(short, long)]
        item: Uuid,

        /// Quantity to move
        #[arg(short, long)]
        quantity: i64,

        /// Source location
        #[arg(long, default_value = "storage")]
        from: String,

        /// Destination location
        #[arg(long, default_value = "bar")]
        to: String,

        /// Employee making the transfer
        #[arg(short, long)]
        employee: Option<Uuid>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Show server configuration
    Config,

    /// Run the maintenance sweep now
    #[command(visible_alias = "m")]
    Maintenance,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let result = match cli.command {
        Commands::Server { config } => {
            print_banner();
            commands::server::run(&config, cli.verbose).await
        }
        Commands::Status { user, venue } => commands::status::run(&cli.url, user, venue).await,
        Commands::History {
            user,
            venue,
            entry_type,
            page,
            per_page,
        } => {
            commands::history::run(&cli.url, user, venue, entry_type.as_deref(), page, per_page)
                .await
        }
        Commands::Leaderboard { venue, limit } => {
            commands::leaderboard::run(&cli.url, venue, limit).await
        }
        Commands::VerifyPin { employee } => commands::verify_pin::run(&cli.url, employee).await,
        Commands::Transfer {
            item,
            quantity,
            from,
            to,
            employee,
            notes,
        } => {
            let request = client::TransferRequest {
                item_id: item,
                from,
                to,
                quantity,
                employee_id: employee,
                notes,
            };
            commands::transfer::run(&cli.url, request).await
        }
        Commands::Config => commands::config::run(&cli.url).await,
        Commands::Maintenance => commands::maintenance::run(&cli.url).await,
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

pub fn print_banner() {
    println!("{}", style_cyan(BANNER));
    println!(
        "  {} {}",
        style_dim("AfterDark Loyalty"),
        style_dim(&format!("v{}", VERSION))
    );
    println!();
}
