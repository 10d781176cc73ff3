use crate::demo::{run_demo, DemoArgs};
use crate::server;
use canteiro::access::{PermissionResolver, RoleTable};
use canteiro::config::AppConfig;
use canteiro::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Canteiro Back-Office",
    about = "Run and inspect the construction back-office timesheet service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the permissions granted to a role
    Roles(RolesArgs),
    /// Walk a timesheet through approval, payment and replication against in-memory storage
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct RolesArgs {
    /// Role name, matched case-insensitively
    pub(crate) role: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Roles(args) => print_role(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn print_role(args: RolesArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let resolver = PermissionResolver::new(RoleTable::standard(&config.access.privileged_role)?);
    let permissions = resolver.resolve(&args.role);

    if permissions.is_empty() {
        println!("role '{}' grants no permissions", args.role.trim());
        return Ok(());
    }

    println!("role '{}' grants:", args.role.trim());
    for permission in permissions {
        println!("  - {permission}");
    }
    Ok(())
}
