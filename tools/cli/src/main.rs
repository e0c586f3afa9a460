//! Nivelver CLI - command line interface for accounts, content and sync.
//!
//! Every command runs against the local store; the cloud is only touched by
//! the advisory half of account writes and by explicit sync commands.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use nivelver_app::{default_config_path, AppConfig, AppContext, CloudConfig};
use nivelver_common::{Nivel, User};
use nivelver_crypto::KdfParams;
use nivelver_sync::{CloudWrite, SyncReport, SyncRequest};

#[derive(Parser)]
#[command(name = "nivelver")]
#[command(about = "Nivelver - offline-first accounts and study content")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the configuration.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account.
    Register {
        username: String,

        /// Starting nivel.
        #[arg(short, long, default_value = "A0")]
        nivel: String,
    },

    /// Sign in with an existing account.
    Login { username: String },

    /// Change an account's nivel.
    SetNivel { username: String, nivel: String },

    /// Show one account.
    Show { username: String },

    /// List all accounts.
    Users {
        /// Keep printing snapshots as accounts change.
        #[arg(short, long)]
        watch: bool,
    },

    /// Reconcile with the cloud.
    Sync {
        #[command(subcommand)]
        direction: SyncDirection,
    },

    /// Add a vocabulary entry.
    AddWord {
        spanish: String,
        russian: String,
        #[arg(short, long, default_value = "A0")]
        nivel: String,
    },

    /// List vocabulary at a nivel.
    Words { nivel: String },

    /// Add a reading passage with a question.
    AddLectura {
        #[arg(long)]
        text: String,
        #[arg(long)]
        question: String,
        /// Possible answers, in order (repeat the flag).
        #[arg(short, long = "answer", required = true)]
        answers: Vec<String>,
        /// Zero-based index of the correct answer.
        #[arg(long)]
        correct: u32,
        #[arg(short, long, default_value = "A0")]
        nivel: String,
    },

    /// List reading passages at a nivel.
    Lecturas { nivel: String },

    /// Add a listening prompt with a question.
    AddAudio {
        /// Path of the audio file.
        #[arg(long)]
        path: String,
        #[arg(long)]
        question: String,
        /// Possible answers, in order (repeat the flag).
        #[arg(short, long = "answer", required = true)]
        answers: Vec<String>,
        /// Zero-based index of the correct answer.
        #[arg(long)]
        correct: u32,
        #[arg(short, long, default_value = "A0")]
        nivel: String,
    },

    /// List listening prompts at a nivel.
    Audios { nivel: String },

    /// Show record counts.
    Stats,

    /// Generate shell completions.
    Completions { shell: Shell },

    /// Write a configuration file with defaults.
    InitConfig {
        /// Cloud backend: "memory" or "firestore".
        #[arg(long, default_value = "memory")]
        cloud: String,

        /// Firestore project id (firestore backend only).
        #[arg(long)]
        project_id: Option<String>,

        /// Hashing strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "moderate")]
        strength: String,

        /// Seconds between periodic syncs.
        #[arg(long)]
        interval: Option<u64>,

        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum SyncDirection {
    /// Cloud to local.
    Pull,
    /// Local to cloud.
    Push,
    /// Pull, then push.
    Full,
}

impl From<SyncDirection> for SyncRequest {
    fn from(direction: SyncDirection) -> Self {
        match direction {
            SyncDirection::Pull => SyncRequest::Pull,
            SyncDirection::Push => SyncRequest::Push,
            SyncDirection::Full => SyncRequest::Full,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "nivelver", &mut std::io::stdout());
            Ok(())
        }
        Commands::InitConfig {
            cloud,
            project_id,
            strength,
            interval,
            force,
        } => cmd_init_config(&config_path, &cloud, project_id, &strength, interval, force),
        command => {
            let mut config = AppConfig::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
            if let Some(database) = cli.database {
                config.database_path = database;
            }

            let context = AppContext::init(config)
                .await
                .context("Failed to start application")?;
            let result = run(&context, command).await;
            context.close().await.context("Failed to close application")?;
            result
        }
    }
}

async fn run(context: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Register { username, nivel } => cmd_register(context, &username, &nivel).await,
        Commands::Login { username } => cmd_login(context, &username).await,
        Commands::SetNivel { username, nivel } => cmd_set_nivel(context, &username, &nivel).await,
        Commands::Show { username } => cmd_show(context, &username).await,
        Commands::Users { watch } => cmd_users(context, watch).await,
        Commands::Sync { direction } => cmd_sync(context, direction.into()).await,
        Commands::AddWord {
            spanish,
            russian,
            nivel,
        } => {
            let word = context
                .local()
                .add_word(&spanish, &russian, &parse_nivel(&nivel)?)
                .await
                .context("Failed to add word")?;
            println!("Word added: {} ({})", word.id, word.nivel);
            Ok(())
        }
        Commands::Words { nivel } => {
            let words = context.local().list_words_by_nivel(&parse_nivel(&nivel)?).await?;
            for word in &words {
                println!("  {} - {}", word.spanish, word.russian);
            }
            println!("{} word(s) at {}", words.len(), nivel);
            Ok(())
        }
        Commands::AddLectura {
            text,
            question,
            answers,
            correct,
            nivel,
        } => {
            let lectura = context
                .local()
                .add_lectura(&text, &question, answers, correct, &parse_nivel(&nivel)?)
                .await
                .context("Failed to add lectura")?;
            println!("Lectura added: {} ({})", lectura.id, lectura.nivel);
            Ok(())
        }
        Commands::Lecturas { nivel } => {
            let lecturas = context
                .local()
                .list_lecturas_by_nivel(&parse_nivel(&nivel)?)
                .await?;
            for lectura in &lecturas {
                println!("{}\n  Q: {}", lectura.text, lectura.question);
                print_answers(&lectura.answers, lectura.correct_answer_index);
            }
            println!("{} lectura(s) at {}", lecturas.len(), nivel);
            Ok(())
        }
        Commands::AddAudio {
            path,
            question,
            answers,
            correct,
            nivel,
        } => {
            let audio = context
                .local()
                .add_audio(&path, &question, answers, correct, &parse_nivel(&nivel)?)
                .await
                .context("Failed to add audio")?;
            println!("Audio added: {} ({})", audio.id, audio.nivel);
            Ok(())
        }
        Commands::Audios { nivel } => {
            let audios = context
                .local()
                .list_audios_by_nivel(&parse_nivel(&nivel)?)
                .await?;
            for audio in &audios {
                println!("{}\n  Q: {}", audio.audio_path, audio.question);
                print_answers(&audio.answers, audio.correct_answer_index);
            }
            println!("{} audio(s) at {}", audios.len(), nivel);
            Ok(())
        }
        Commands::Stats => {
            let stats = context.local().stats().await?;
            println!("Database: {}", context.config().database_path.display());
            println!("  Users:    {}", stats.users);
            println!("  Words:    {}", stats.words);
            println!("  Lecturas: {}", stats.lecturas);
            println!("  Audios:   {}", stats.audios);
            Ok(())
        }
        Commands::Completions { .. } | Commands::InitConfig { .. } => {
            unreachable!("handled before the context is built")
        }
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn parse_nivel(nivel: &str) -> Result<Nivel> {
    Nivel::new(nivel).context("Invalid nivel")
}

fn print_answers(answers: &[String], correct: u32) {
    for (i, answer) in answers.iter().enumerate() {
        let marker = if i == correct as usize { "*" } else { " " };
        println!("  {} {}. {}", marker, i + 1, answer);
    }
}

fn print_cloud_status(cloud: &CloudWrite) {
    match cloud {
        CloudWrite::Synced => println!("  Cloud: synced"),
        CloudWrite::Deferred { reason } => {
            println!("  Cloud: not synced, will retry on next sync ({})", reason)
        }
    }
}

fn print_user(user: &User) {
    println!(
        "  {:<20} nivel {:<4} modified {}",
        user.username,
        user.nivel,
        format_millis(user.last_modified)
    );
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Register a new account.
async fn cmd_register(context: &AppContext, username: &str, nivel: &str) -> Result<()> {
    info!("Registering account: {}", username);

    let nivel = parse_nivel(nivel)?;
    let password = prompt_password("Enter password: ")?;
    let confirm = prompt_password("Confirm password: ")?;

    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }

    let outcome = context
        .coordinator()
        .create_user_with_nivel(username, &password, &nivel)
        .await
        .context("Failed to register account")?;

    println!("Account created!");
    print_user(&outcome.value);
    print_cloud_status(&outcome.cloud);
    Ok(())
}

async fn cmd_login(context: &AppContext, username: &str) -> Result<()> {
    let password = prompt_password("Enter password: ")?;
    let outcome = context.login(username, &password).await?;

    println!("{}", outcome.message());
    if !outcome.is_success() {
        anyhow::bail!("Login failed");
    }
    Ok(())
}

async fn cmd_set_nivel(context: &AppContext, username: &str, nivel: &str) -> Result<()> {
    let outcome = context
        .coordinator()
        .update_user_nivel(username, nivel)
        .await
        .context("Failed to update nivel")?;

    if outcome.value {
        println!("Nivel updated: {} -> {}", username, nivel);
    } else {
        println!("No local account named '{}'", username);
    }
    print_cloud_status(&outcome.cloud);
    Ok(())
}

async fn cmd_show(context: &AppContext, username: &str) -> Result<()> {
    match context.coordinator().get_user_by_username(username).await? {
        Some(user) => print_user(&user),
        None => anyhow::bail!("No local account named '{}'", username),
    }
    Ok(())
}

async fn cmd_users(context: &AppContext, watch: bool) -> Result<()> {
    let mut snapshots = context.coordinator().get_all_users();

    loop {
        let next = tokio::select! {
            next = snapshots.next() => next,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(users) = next else {
            break;
        };

        let users = users?;
        for user in &users {
            print_user(user);
        }
        println!("{} account(s)", users.len());

        if !watch {
            break;
        }
        println!();
    }
    Ok(())
}

async fn cmd_sync(context: &AppContext, request: SyncRequest) -> Result<()> {
    let report = context.sync(request).await.context("Sync failed")?;

    match report {
        SyncReport::Pull(pull) if !pull.cloud_reachable => {
            println!("Cloud unavailable; local data kept");
        }
        report => println!("Sync completed: {}", report),
    }
    Ok(())
}

/// Write a fresh configuration file.
fn cmd_init_config(
    path: &Path,
    cloud: &str,
    project_id: Option<String>,
    strength: &str,
    interval: Option<u64>,
    force: bool,
) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let cloud = match (cloud, project_id) {
        ("memory", _) => CloudConfig::default(),
        ("firestore", Some(project_id)) => CloudConfig {
            provider: "firestore".to_string(),
            config: serde_json::json!({ "project_id": project_id }),
        },
        ("firestore", None) => anyhow::bail!("--project-id is required for firestore"),
        (other, _) => anyhow::bail!("Unknown cloud backend '{}'. Use: memory or firestore", other),
    };

    let mut config = AppConfig {
        cloud,
        hashing: KdfParams::preset(strength)?,
        ..AppConfig::default()
    };
    config.sync.interval_secs = interval;
    config.validate()?;
    config.save(path)?;

    println!("Config written to {}", path.display());
    println!("  Database: {}", config.database_path.display());
    println!("  Cloud:    {}", config.cloud.provider);
    Ok(())
}
