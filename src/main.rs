#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use scrollbar_profiles::clock::SystemClock;
use scrollbar_profiles::config::Settings;
use scrollbar_profiles::migration;
use scrollbar_profiles::profile::{Buttons, OverrideMode, ScrollbarColors, Width};
use scrollbar_profiles::storage::JsonFileStorage;
use scrollbar_profiles::{Coordinator, ProfileId, ProfilePatch};

#[derive(Parser)]
#[command(name = "scrollbar-profiles")]
#[command(about = "Manage per-site scrollbar profiles", long_about = None)]
#[command(version)]
struct Cli {
    /// Storage file (overrides the settings file)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, edit and delete profiles
    Profiles {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Manage domain rules
    Rules {
        #[command(subcommand)]
        command: RuleCommand,
    },

    /// Print the profile used for a page
    Resolve {
        /// Page URL or hostname
        url: String,
    },

    /// Print the stylesheet for a page
    Css {
        /// Page URL or hostname
        url: Option<String>,
        /// Preview a profile instead, without override handling
        #[arg(long, conflicts_with = "url")]
        preview: Option<ProfileId>,
    },

    /// Upgrade storage to the current schema
    Migrate,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// List profiles sorted by name
    List,
    /// Show a profile with defaults applied
    Show { id: ProfileId },
    /// Create a profile with default settings
    Create { name: String },
    /// Rename a profile
    Rename { id: ProfileId, name: String },
    /// Delete a profile
    Delete {
        id: ProfileId,
        /// Move its rules to this profile instead of deleting them
        #[arg(long)]
        reassign_to: Option<ProfileId>,
    },
    /// Make a profile the default
    SetDefault { id: ProfileId },
    /// Change profile settings
    Set {
        id: ProfileId,
        #[arg(long, value_enum)]
        width: Option<WidthArg>,
        /// Custom width value, used with `--width other`
        #[arg(long, requires = "custom_unit")]
        custom_width: Option<u32>,
        /// Custom width unit, e.g. px
        #[arg(long, requires = "custom_width")]
        custom_unit: Option<String>,
        /// Track color as hex8
        #[arg(long, requires = "thumb")]
        track: Option<String>,
        /// Thumb color as hex8
        #[arg(long, requires = "track")]
        thumb: Option<String>,
        /// Disable custom colors
        #[arg(long, conflicts_with_all = ["track", "thumb"])]
        no_colors: bool,
        /// 0, 1 (color), 10 (width) or 11 (both)
        #[arg(long, value_parser = parse_override)]
        allow_override: Option<OverrideMode>,
        #[arg(long, value_enum)]
        buttons: Option<ButtonsArg>,
        /// Thumb corner radius in percent
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        radius: Option<u8>,
    },
}

#[derive(Subcommand)]
enum RuleCommand {
    /// List rules
    List,
    /// Add a rule; prefix the domain with `*.` to include subdomains
    Add { pattern: String, profile: ProfileId },
    /// Remove a rule
    Remove { pattern: String },
    /// Point an existing rule at another profile
    Change { pattern: String, profile: ProfileId },
    /// Use a profile for exactly the page's host
    Assign {
        url: String,
        /// Omit to remove the host rule
        profile: Option<ProfileId>,
    },
    /// Profile for local files; omit to use the default
    LocalFile { profile: Option<ProfileId> },
}

#[derive(Clone, Copy, ValueEnum)]
enum WidthArg {
    Auto,
    Thin,
    None,
    Other,
}

impl From<WidthArg> for Width {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::Auto => Width::Auto,
            WidthArg::Thin => Width::Thin,
            WidthArg::None => Width::None,
            WidthArg::Other => Width::Other,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ButtonsArg {
    None,
    Light,
    Dark,
}

impl From<ButtonsArg> for Buttons {
    fn from(arg: ButtonsArg) -> Self {
        match arg {
            ButtonsArg::None => Buttons::None,
            ButtonsArg::Light => Buttons::Light,
            ButtonsArg::Dark => Buttons::Dark,
        }
    }
}

fn parse_override(s: &str) -> Result<OverrideMode, String> {
    let code: i64 = s.trim().parse().map_err(|_| format!("'{s}' is not a number"))?;
    OverrideMode::try_from(code)
}

fn init_logging(settings: &Settings) -> Result<()> {
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| settings.log_level.clone())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    init_logging(&settings)?;

    let storage_path = cli.storage.clone().unwrap_or_else(|| settings.storage_path.clone());
    info!(path = %storage_path.display(), "Using storage file");
    let storage = JsonFileStorage::new(storage_path);

    if let Commands::Migrate = cli.command {
        let outcome = migration::migrate(&storage, &SystemClock)
            .await
            .context("Storage migration failed")?;
        println!("{outcome:?}");
        return Ok(());
    }

    let mut coordinator = Coordinator::init(storage, Box::new(SystemClock))
        .await
        .context("Failed to open profile storage")?;

    match cli.command {
        Commands::Profiles { command } => cmd_profiles(&mut coordinator, command).await,
        Commands::Rules { command } => cmd_rules(&mut coordinator, command).await,
        Commands::Resolve { url } => {
            let id = coordinator.resolve(&url);
            let profile = coordinator.profile(id)?;
            println!("{id}\t{}", profile.name);
            Ok(())
        }
        Commands::Css { url, preview } => {
            let css = match (preview, url) {
                (Some(id), _) => coordinator.preview_css(id)?,
                (None, Some(url)) => coordinator.css_for_url(&url)?,
                (None, None) => coordinator.preview_css(coordinator.default_profile())?,
            };
            print!("{css}");
            Ok(())
        }
        Commands::Migrate => Ok(()),
    }
}

async fn cmd_profiles(coordinator: &mut Coordinator<JsonFileStorage>, command: ProfileCommand) -> Result<()> {
    match command {
        ProfileCommand::List => {
            let default = coordinator.default_profile();
            for (id, name) in coordinator.list_profiles() {
                let marker = if id == default { "*" } else { " " };
                println!("{marker} {id}\t{name}");
            }
        }
        ProfileCommand::Show { id } => {
            let profile = coordinator.profile(id)?;
            let record = serde_json::to_string_pretty(&profile.to_record())
                .context("Failed to format profile")?;
            println!("{record}");
        }
        ProfileCommand::Create { name } => {
            let id = coordinator.create_profile(&name).await?;
            println!("{id}\t{}", coordinator.profile(id)?.name);
        }
        ProfileCommand::Rename { id, name } => {
            let resolved = coordinator.rename_profile(id, &name).await?;
            println!("{id}\t{resolved}");
        }
        ProfileCommand::Delete { id, reassign_to } => {
            coordinator
                .delete_profile(id, reassign_to)
                .await
                .with_context(|| format!("Failed to delete profile {id}"))?;
        }
        ProfileCommand::SetDefault { id } => coordinator.set_default_profile(id).await?,
        ProfileCommand::Set {
            id,
            width,
            custom_width,
            custom_unit,
            track,
            thumb,
            no_colors,
            allow_override,
            buttons,
            radius,
        } => {
            let colors = match (track, thumb) {
                (Some(track), Some(thumb)) => Some(Some(ScrollbarColors { track, thumb })),
                _ if no_colors => Some(None),
                _ => None,
            };
            let patch = ProfilePatch {
                name: None,
                width: width.map(Width::from),
                custom_width: custom_width.zip(custom_unit),
                colors,
                allow_override,
                buttons: buttons.map(Buttons::from),
                thumb_radius: radius,
            };
            coordinator.update_profile(id, &patch).await?;
        }
    }
    Ok(())
}

async fn cmd_rules(coordinator: &mut Coordinator<JsonFileStorage>, command: RuleCommand) -> Result<()> {
    match command {
        RuleCommand::List => {
            for rule in coordinator.rules().iter() {
                let name = coordinator
                    .profile(rule.profile)
                    .map(|p| p.name)
                    .unwrap_or_default();
                println!("{}\t{}\t{name}", rule.key(), rule.profile);
            }
            if let Some(id) = coordinator.rules().local_file_profile() {
                println!("(local files)\t{id}");
            }
        }
        RuleCommand::Add { pattern, profile } => {
            let key = coordinator.add_rule(profile, &pattern).await?;
            println!("{key}");
        }
        RuleCommand::Remove { pattern } => coordinator.remove_rule(&pattern).await?,
        RuleCommand::Change { pattern, profile } => {
            coordinator.change_rule_profile(&pattern, profile).await?
        }
        RuleCommand::Assign { url, profile } => coordinator.assign_page(&url, profile).await?,
        RuleCommand::LocalFile { profile } => coordinator.set_local_file_profile(profile).await?,
    }
    Ok(())
}
