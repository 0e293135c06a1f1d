use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sftpsync::{ConnectionConfig, Direction, Profile, SftpSync, SyncOptions, SyncRequest};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sftpsync")]
#[command(about = "One-way directory mirroring over SFTP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Profile file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SFTP server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// SFTP server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Login name
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Connection timeout, e.g. "10s" or "1m"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Connection attempts before giving up
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Print statistics as JSON and log in JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a local directory onto the server
    Upload(SyncArgs),
    /// Mirror a remote directory onto the local filesystem
    Download(SyncArgs),
    /// Write a profile template
    Init {
        /// Output path for the profile
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct SyncArgs {
    /// Directory to mirror
    source: String,

    /// Where the mirror lives
    destination: String,

    /// Regular expression a relative path must match (repeatable)
    #[arg(short, long = "include")]
    includes: Vec<String>,

    /// Regular expression a relative path must not match (repeatable)
    #[arg(short, long = "exclude")]
    excludes: Vec<String>,

    /// Remove destination entries that are not in the source
    #[arg(long)]
    delete: bool,

    /// Report what would change without changing anything
    #[arg(short = 'n', long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.json);

    match &cli.command {
        Commands::Upload(args) => run_sync(&cli, Direction::Upload, args).await,
        Commands::Download(args) => run_sync(&cli, Direction::Download, args).await,
        Commands::Init { output } => {
            let path = match output {
                Some(path) => path.clone(),
                None => default_profile_path().context("No config directory on this platform")?,
            };
            generate_profile(&cli, &path).await
        }
    }
}

fn init_logging(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sftpsync={0},sftpsync_cli={0}", log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_sync(cli: &Cli, direction: Direction, args: &SyncArgs) -> Result<()> {
    let profile = load_profile(cli.config.as_deref()).await?;
    let connection = connection_config(cli, profile.as_ref())?;
    let options = sync_options(args, profile.as_ref().map(|p| &p.sync));

    let request = SyncRequest::new(&args.source, &args.destination, direction)
        .with_options(options);
    debug!("request: {:?}", request);

    let client = SftpSync::connect(&connection)
        .await
        .with_context(|| format!("Failed to connect to {}", connection.host))?;
    let stats = client
        .run(&request)
        .await
        .with_context(|| format!("Failed to sync {} to {}", args.source, args.destination))?;
    client.close().await.context("Failed to close the session")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", stats.summary());
    }
    Ok(())
}

async fn load_profile(explicit: Option<&Path>) -> Result<Option<Profile>> {
    if let Some(path) = explicit {
        info!("Loading profile from {}", path.display());
        let profile = Profile::load(path)
            .await
            .with_context(|| format!("Failed to load profile {}", path.display()))?;
        return Ok(Some(profile));
    }

    match default_profile_path() {
        Some(path) if path.exists() => {
            info!("Loading profile from {}", path.display());
            Ok(Some(Profile::load(&path).await?))
        }
        _ => Ok(None),
    }
}

/// Merge command line connection settings over the profile's
fn connection_config(cli: &Cli, profile: Option<&Profile>) -> Result<ConnectionConfig> {
    let mut config = match (profile, &cli.host, &cli.user) {
        (Some(profile), _, _) => profile.connection.clone(),
        (None, Some(host), Some(user)) => ConnectionConfig::new(host, user).with_env_password(),
        (None, _, _) => bail!("No profile found; --host and --user are required"),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(user) = &cli.user {
        config.username = user.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }

    config.validate()?;
    Ok(config)
}

/// Command line patterns replace the profile's; flags are additive
fn sync_options(args: &SyncArgs, defaults: Option<&SyncOptions>) -> SyncOptions {
    let defaults = defaults.cloned().unwrap_or_default();
    SyncOptions {
        includes: if args.includes.is_empty() {
            defaults.includes
        } else {
            args.includes.clone()
        },
        excludes: if args.excludes.is_empty() {
            defaults.excludes
        } else {
            args.excludes.clone()
        },
        delete: args.delete || defaults.delete,
        dry_run: args.dry_run || defaults.dry_run,
    }
}

async fn generate_profile(cli: &Cli, path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut connection = ConnectionConfig::new(
        cli.host.clone().unwrap_or_else(|| "sftp.example.com".to_string()),
        cli.user.clone().unwrap_or_else(|| "username".to_string()),
    );
    if let Some(port) = cli.port {
        connection.port = port;
    }
    let profile = Profile {
        connection,
        sync: SyncOptions::default(),
    };
    profile.save(path).await?;

    println!("Profile written to {}", path.display());
    Ok(())
}

fn default_profile_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sftpsync").join("profile.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn sync_args(cli: &Cli) -> &SyncArgs {
        match &cli.command {
            Commands::Upload(args) | Commands::Download(args) => args,
            Commands::Init { .. } => panic!("not a sync command"),
        }
    }

    #[test]
    fn test_parses_repeated_patterns() {
        let cli = parse(&[
            "sftpsync", "upload", "/src", "/dst", "-i", "\\.jpg$", "--include", "\\.png$",
            "--exclude", "^tmp/", "--delete", "-n",
        ]);
        let args = sync_args(&cli);

        assert_eq!(args.includes, vec!["\\.jpg$", "\\.png$"]);
        assert_eq!(args.excludes, vec!["^tmp/"]);
        assert!(args.delete);
        assert!(args.dry_run);
    }

    #[test]
    fn test_global_connection_flags() {
        let cli = parse(&[
            "sftpsync", "download", "/remote", "/local", "--host", "h", "-u", "me", "--port",
            "2022", "--timeout", "30s", "--max-attempts", "5",
        ]);
        let config = connection_config(&cli, None).unwrap();

        assert_eq!(config.host, "h");
        assert_eq!(config.username, "me");
        assert_eq!(config.port, 2022);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn test_host_required_without_profile() {
        let cli = parse(&["sftpsync", "upload", "/a", "/b"]);
        assert!(connection_config(&cli, None).is_err());
    }

    #[test]
    fn test_command_line_overrides_profile() {
        let profile = Profile::parse(
            "[connection]\nhost = \"profile-host\"\nusername = \"p\"\nport = 2200\n\n[sync]\nexcludes = [\"\\\\.bak$\"]\ndelete = true\n",
        )
        .unwrap();
        let cli = parse(&["sftpsync", "upload", "/a", "/b", "--host", "cli-host"]);

        let config = connection_config(&cli, Some(&profile)).unwrap();
        assert_eq!(config.host, "cli-host");
        assert_eq!(config.username, "p");
        assert_eq!(config.port, 2200);

        let options = sync_options(sync_args(&cli), Some(&profile.sync));
        assert_eq!(options.excludes, vec!["\\.bak$"]);
        assert!(options.delete);
        assert!(!options.dry_run);
    }
}
