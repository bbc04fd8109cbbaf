use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use biso_sync::cache::QueryKey;
use biso_sync::config::Config;
use biso_sync::gateway::{Gateway, HttpGateway};
use biso_sync::local::{LocalStore, SqliteBackend};
use biso_sync::logging;
use biso_sync::model::{FontSize, JobQuery, LayoutDensity, SavedJob};
use biso_sync::query::Query;
use biso_sync::SyncEngine;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};

#[derive(Parser, Debug)]
#[command(name = "biso-sync")]
#[command(about = "Command-line client for the BISO synchronized cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/biso-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show session, campus, membership and unread counts
  Status,
  /// List campuses
  Campuses,
  /// Manage the selected campus
  Campus {
    #[command(subcommand)]
    action: CampusAction,
  },
  /// List job postings
  Jobs {
    /// Campus name (default: selected campus)
    #[arg(long)]
    campus: Option<String>,
    #[arg(long)]
    include_expired: bool,
    #[arg(long)]
    page: Option<u32>,
  },
  /// Manage saved jobs
  Saved {
    #[command(subcommand)]
    action: SavedAction,
  },
  /// Show or change preferences
  Prefs {
    #[command(subcommand)]
    action: PrefsAction,
  },
  /// Sign in and remember the session on this device
  SignIn { user_id: String, secret: String },
  /// Sign out of the current session
  SignOut,
  /// Follow or unfollow a department
  Follow { department_id: String },
}

#[derive(Subcommand, Debug)]
enum CampusAction {
  /// Select a campus by id
  Set { id: String },
}

#[derive(Subcommand, Debug)]
enum SavedAction {
  List,
  Save { job_id: u64 },
  Unsave { job_id: u64 },
}

#[derive(Subcommand, Debug)]
enum PrefsAction {
  Show,
  Set {
    #[arg(long)]
    font_size: Option<FontSizeArg>,
    #[arg(long)]
    reduce_motion: Option<bool>,
    #[arg(long)]
    compact: Option<bool>,
    #[arg(long)]
    notifications: Option<bool>,
    #[arg(long)]
    sound: Option<bool>,
    #[arg(long)]
    vibration: Option<bool>,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FontSizeArg {
  Small,
  Medium,
  Large,
}

impl From<FontSizeArg> for FontSize {
  fn from(arg: FontSizeArg) -> Self {
    match arg {
      FontSizeArg::Small => FontSize::Small,
      FontSizeArg::Medium => FontSize::Medium,
      FontSizeArg::Large => FontSize::Large,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&Config::data_dir()?.join("logs"), args.verbose)?;

  let local = LocalStore::new(SqliteBackend::open(&config.storage_path()?)?);
  let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&config)?);
  let engine = Arc::new(SyncEngine::new(&config, gateway, local));
  let watcher = engine.spawn_session_watcher();

  engine.bootstrap().await;
  let result = run(&engine, args.command).await;

  watcher.abort();
  result
}

async fn run(engine: &SyncEngine, command: Command) -> Result<()> {
  match command {
    Command::Status => print_status(engine),
    Command::Campuses => {
      let current = engine.campus().current();
      for campus in engine.campus().available() {
        let marker = if Some(&campus) == current.as_ref() { "*" } else { " " };
        println!("{} {:>4}  {}", marker, campus.id, campus.name);
      }
    }
    Command::Campus {
      action: CampusAction::Set { id },
    } => {
      let campus = engine.change_campus(&id).await?;
      println!("Campus set to {}", campus.name);
    }
    Command::Jobs {
      campus,
      include_expired,
      page,
    } => {
      let query = JobQuery {
        campus: campus.or_else(|| engine.campus().current().map(|c| c.name)),
        include_expired,
        page,
      };
      list_jobs(engine, query).await?;
    }
    Command::Saved { action } => match action {
      SavedAction::List => {
        for job in engine.saved_jobs().jobs() {
          println!(
            "{:>8}  {}  ({})",
            job.job_id,
            job.title,
            job.saved_at.format("%Y-%m-%d")
          );
        }
      }
      SavedAction::Save { job_id } => {
        let job = engine.job(job_id).await?;
        if engine.save_job(SavedJob::from_job(&job.data)).await? {
          println!("Saved {}", job.data.title);
        } else {
          println!("Already saved");
        }
      }
      SavedAction::Unsave { job_id } => {
        if engine.unsave_job(job_id).await? {
          println!("Removed {}", job_id);
        } else {
          println!("Not saved");
        }
      }
    },
    Command::Prefs { action } => match action {
      PrefsAction::Show => print_preferences(engine),
      PrefsAction::Set {
        font_size,
        reduce_motion,
        compact,
        notifications,
        sound,
        vibration,
      } => {
        let prefs = engine.ui_preferences().update(|p| {
          if let Some(size) = font_size {
            p.font_size = size.into();
          }
          if let Some(v) = reduce_motion {
            p.reduce_motion = v;
          }
          if let Some(v) = compact {
            p.layout_density = if v {
              LayoutDensity::Compact
            } else {
              LayoutDensity::Comfortable
            };
          }
          if let Some(v) = notifications {
            p.notifications.enabled = v;
          }
          if let Some(v) = sound {
            p.notifications.sound = v;
          }
          if let Some(v) = vibration {
            p.notifications.vibration = v;
          }
        });
        println!("{:#?}", prefs);
      }
    },
    Command::SignIn { user_id, secret } => {
      let session = engine.sign_in(&user_id, &secret).await?;
      println!("Signed in as {} <{}>", session.display_name, session.email);
    }
    Command::SignOut => {
      engine.sign_out().await;
      println!("Signed out");
    }
    Command::Follow { department_id } => {
      if engine.toggle_department(&department_id).await? {
        println!("Following {}", department_id);
      } else {
        println!("Unfollowed {}", department_id);
      }
    }
  }

  Ok(())
}

async fn list_jobs(engine: &SyncEngine, query: JobQuery) -> Result<()> {
  let gateway = engine.gateway();
  let key = QueryKey::jobs(&query);
  let mut jobs = Query::new(engine.cache().clone(), key, move || {
    let gateway = Arc::clone(&gateway);
    let query = query.clone();
    async move { gateway.list_jobs(&query).await }
  });

  jobs.fetch();
  let mut tick = tokio::time::interval(Duration::from_millis(50));
  while jobs.is_loading() {
    tick.tick().await;
    jobs.poll();
  }

  if let Some(error) = jobs.error() {
    return Err(eyre!("Failed to load jobs: {}", error));
  }
  for job in jobs.data().into_iter().flatten() {
    let saved = if engine.saved_jobs().is_saved(job.id) { "*" } else { " " };
    println!(
      "{} {:>8}  {}  {}  {}",
      saved,
      job.id,
      job.title,
      job.company.as_deref().unwrap_or("-"),
      job.deadline.as_deref().unwrap_or("-")
    );
  }
  Ok(())
}

fn print_status(engine: &SyncEngine) {
  match engine.auth().session() {
    Some(session) => println!("Signed in:   {} <{}>", session.display_name, session.email),
    None => println!("Signed in:   no"),
  }
  match engine.campus().current() {
    Some(campus) => println!("Campus:      {}", campus.name),
    None => println!("Campus:      none"),
  }
  if engine.auth().is_signed_in() {
    match engine.membership().expiry() {
      Some(expiry) if engine.membership().is_member() => {
        println!("Membership:  active until {}", expiry)
      }
      _ if engine.membership().is_member() => println!("Membership:  active"),
      _ => println!("Membership:  none"),
    }
    println!("Following:   {} departments", engine.departments().followed().len());
    println!("Unread:      {}", engine.chats().total_unread());
  }
  println!("Saved jobs:  {}", engine.saved_jobs().jobs().len());

  let errors = [
    ("auth", engine.auth().state().snapshot().error),
    ("profile", engine.profile().state().snapshot().error),
    ("membership", engine.membership().state().snapshot().error),
    ("campus", engine.campus().state().snapshot().error),
    ("departments", engine.departments().state().snapshot().error),
    ("saved jobs", engine.saved_jobs().state().snapshot().error),
    ("chats", engine.chats().state().snapshot().error),
  ];
  for (store, error) in errors {
    if let Some(error) = error {
      println!("! {}: {}", store, error);
    }
  }
}

fn print_preferences(engine: &SyncEngine) {
  let ui = engine.ui_preferences().preferences();
  println!("Font size:      {:?}", ui.font_size);
  println!("Reduce motion:  {}", ui.reduce_motion);
  println!("Layout:         {:?}", ui.layout_density);
  println!(
    "Notifications:  {} (sound {}, vibration {})",
    ui.notifications.enabled, ui.notifications.sound, ui.notifications.vibration
  );

  if let Some(session) = engine.auth().session() {
    let prefs = session.preferences;
    println!("Language:       {}", prefs.language.as_deref().unwrap_or("default"));
    println!("Theme:          {:?}", prefs.theme);
    println!("Push enabled:   {}", prefs.notifications_enabled);
  }
}
