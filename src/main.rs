use clap::{Parser, Subcommand};
use qryptic_vpn::auth::{AuthOutcome, LoginMethod};
use qryptic_vpn::controller::{ControllerClient, Gateway};
use qryptic_vpn::platform::{self, SystemBrowser, TunnelEngine};
use qryptic_vpn::session::find_gateway;
use qryptic_vpn::tunnel::StopOutcome;
use qryptic_vpn::{Config, Session, SessionError, Store};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

type CliSession = Session<ControllerClient, SystemBrowser, Box<dyn TunnelEngine + Send + Sync>>;

#[derive(Parser)]
#[command(name = "qryptic")]
#[command(about = "Connect to Qryptic VPN gateways")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to a Qryptic controller
    Login {
        /// Controller URL (defaults to the last one used)
        #[arg(short, long)]
        url: Option<String>,

        /// Log in again even if the stored token is still valid
        #[arg(short, long)]
        force: bool,
    },
    /// Connect to a gateway
    Connect {
        /// Gateway name or UUID (prompts when omitted)
        #[arg(short, long)]
        gateway: Option<String>,
    },
    /// Bring the tunnel down
    Disconnect,
    /// Show the current session
    Status {
        /// Include raw tunnel engine output
        #[arg(short, long)]
        debug: bool,
    },
    /// Disconnect and remove all stored session data
    Logout,
    /// Check WireGuard tools and prepare the config directory
    Setup,
    /// Generate default config file
    Init,
}

impl Commands {
    #[cfg_attr(windows, allow(dead_code))]
    fn name(&self) -> &'static str {
        match self {
            Commands::Login { .. } => "login",
            Commands::Connect { .. } => "connect",
            Commands::Disconnect => "disconnect",
            Commands::Status { .. } => "status",
            Commands::Logout => "logout",
            Commands::Setup => "setup",
            Commands::Init => "init",
        }
    }
}

/// Commands that require admin privileges
///
/// All of them: `sudo` may reset HOME, and every command must resolve the
/// same config file and session store.
fn requires_admin(cmd: &Commands) -> bool {
    match cmd {
        Commands::Login { .. }
        | Commands::Connect { .. }
        | Commands::Disconnect
        | Commands::Status { .. }
        | Commands::Logout
        | Commands::Setup
        | Commands::Init => true,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if requires_admin(&cli.command) && !platform::is_admin() {
        eprintln!("ERROR: This command requires Administrator privileges.\n");
        #[cfg(windows)]
        eprintln!("Right-click your terminal and choose \"Run as Administrator\".");
        #[cfg(not(windows))]
        eprintln!("Run with: sudo qryptic {}", cli.command.name());
        std::process::exit(1);
    }

    let config_path = Config::default_path();
    if let Commands::Init = cli.command {
        info!("Generating default config...");
        Config::default().save(&config_path)?;
        println!("Created default config: {}", config_path.display());
        return Ok(());
    }

    let config = Config::load_or_default(&config_path)?;
    let store = Arc::new(Store::open(config.store_path())?);
    let controller = ControllerClient::new(&config.controller)?;
    let engine = platform::get_tunnel_engine()?;
    let mut session = Session::new(&config, store, controller, SystemBrowser, engine);

    if let Err(e) = run(cli.command, &mut session).await {
        error!("{}", e);
        if let Some(session_error) = e.downcast_ref::<SessionError>() {
            eprintln!("Hint: {}", session_error.category().remediation());
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, session: &mut CliSession) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Login { url, force } => {
            let base_url = match url.or_else(|| session.store().base_url()) {
                Some(url) => url,
                None => {
                    let url = prompt("Controller URL", None)?;
                    if url.is_empty() {
                        return Err("a controller URL is required (--url)".into());
                    }
                    url
                }
            };

            match session.login(&base_url, force, choose_login_method).await? {
                AuthOutcome::AlreadyAuthenticated => {
                    println!("Already logged in (use --force to log in again)")
                }
                AuthOutcome::LoggedIn(_) => println!("Logged in to {}", base_url),
            }
        }
        Commands::Connect { gateway } => {
            if !session.store().setup_completed() {
                warn!("Setup has not been run yet; if connecting fails, run `qryptic setup`");
            }

            let gateways = session.list_gateways().await?;
            if gateways.is_empty() {
                println!("No gateways are available for this account");
                return Ok(());
            }

            let selected = match gateway {
                Some(selector) => find_gateway(&gateways, &selector)
                    .ok_or(SessionError::GatewayNotFound(selector))?,
                None => select_gateway(&gateways)?,
            };

            info!("Connecting to {}...", selected.name);
            let connection = session.connect(&selected.uuid, &selected.name).await?;
            println!(
                "Connected to {} ({})",
                connection.gateway_name, connection.endpoint
            );
        }
        Commands::Disconnect => {
            info!("Disconnecting...");
            match session.disconnect()? {
                StopOutcome::Stopped => println!("Disconnected successfully"),
                StopOutcome::NotRunning | StopOutcome::NoConfig => {
                    println!("VPN is not connected")
                }
            }
        }
        Commands::Status { debug } => {
            let status = session.status(debug)?;

            match &status.base_url {
                Some(url) => println!("Controller: {}", url),
                None => println!("Controller: not configured"),
            }
            println!(
                "Logged in: {}",
                if status.authenticated { "yes" } else { "no" }
            );
            match &status.active_gateway {
                Some(gateway) => {
                    println!("VPN Status: Connected");
                    println!("  Gateway: {} ({})", gateway.name, gateway.uuid);
                    if let Some(endpoint) = &status.endpoint {
                        println!("  Endpoint: {}", endpoint);
                    }
                }
                None => println!("VPN Status: Not connected"),
            }
            match &status.engine {
                Some(Ok(engine)) => {
                    println!(
                        "Tunnel engine: {}",
                        if engine.running { "running" } else { "no active tunnel" }
                    );
                    if !engine.output.trim().is_empty() {
                        println!("{}", engine.output.trim_end());
                    }
                }
                Some(Err(e)) => println!("Tunnel engine: unavailable ({})", e),
                None => {}
            }
        }
        Commands::Logout => {
            session.logout()?;
            println!("Logged out");
        }
        Commands::Setup => {
            session.setup()?;
            println!(
                "Setup complete. Tunnel configs will be written to {}",
                session.tunnel().config_dir().display()
            );
        }
        Commands::Init => unreachable!("handled before the session is built"),
    }

    Ok(())
}

/// Ask which login method to use
fn choose_login_method() -> io::Result<LoginMethod> {
    println!("How do you want to log in?");
    println!("  1. Email and password");
    println!("  2. Browser (SSO)");

    loop {
        match prompt("Choice", Some("1"))?.as_str() {
            "1" => {
                let email = prompt("Email", None)?;
                let password = rpassword::prompt_password("Password: ")?;
                return Ok(LoginMethod::Password { email, password });
            }
            "2" => return Ok(LoginMethod::BrowserSso),
            other => println!("Invalid choice {:?}, enter 1 or 2", other),
        }
    }
}

/// Numbered gateway picker
fn select_gateway(gateways: &[Gateway]) -> io::Result<&Gateway> {
    println!("Available gateways:");
    for (i, gateway) in gateways.iter().enumerate() {
        println!(
            "  {}. {} ({}:{})",
            i + 1,
            gateway.name,
            gateway.ip_address,
            gateway.port
        );
    }

    loop {
        let input = prompt("Gateway", Some("1"))?;
        match input.parse::<usize>() {
            Ok(n) if (1..=gateways.len()).contains(&n) => return Ok(&gateways[n - 1]),
            _ => println!("Enter a number between 1 and {}", gateways.len()),
        }
    }
}

/// Prompt for input with optional default value
fn prompt(label: &str, default: Option<&str>) -> io::Result<String> {
    if let Some(def) = default {
        print!("{} [{}]: ", label, def);
    } else {
        print!("{}: ", label);
    }
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    let input = input.trim();

    if input.is_empty() {
        Ok(default.unwrap_or("").to_string())
    } else {
        Ok(input.to_string())
    }
}
