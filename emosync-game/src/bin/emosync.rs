//! `emosync`: composition root.
//!
//! Owns the single [`SessionManager`], the bus, the store and the poller,
//! and exposes a few one-shot commands plus a long-running `run` mode that
//! keeps the consumers fed until Ctrl-C.
//!
//! ```text
//! emosync [--config PATH] run
//! emosync [--config PATH] login <username> <password>
//! emosync [--config PATH] register <username> <password> [email]
//! emosync [--config PATH] logout
//! emosync [--config PATH] submit <text...>
//! emosync [--config PATH] history [days]
//! emosync [--config PATH] entries [page_size] [max_pages]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use emosync_client::{EmotionApi, HttpTransport, PollingScheduler, SessionManager, StateSource};
use emosync_core::config::GeneralConfig;
use emosync_core::policy::{CombatModifiers, MoodArea};
use emosync_core::{AuthStatus, EmosyncConfig, EventBus, LastStateCache, SqliteStore, TokenStore};
use emosync_game::ConsumerRig;
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "emosync.toml";
const FRAME: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Command {
    Run,
    Login { username: String, password: String },
    Register { username: String, password: String, email: Option<String> },
    Logout,
    Submit { text: String },
    History { days: u32 },
    Entries { page_size: u32, max_pages: u32 },
}

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Result<Args> {
    let mut config = std::env::var_os("EMOSYNC_CONFIG").map(PathBuf::from);
    let mut rest = Vec::new();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config = Some(it.next().map(PathBuf::from).ok_or_else(|| anyhow!("--config needs a path"))?);
            }
            _ => rest.push(arg),
        }
    }

    let mut words = rest.into_iter();
    let verb = words.next().unwrap_or_else(|| "run".to_string());

    let command = match verb.as_str() {
        "run" => Command::Run,
        "login" => Command::Login {
            username: required(&mut words, &verb, "username")?,
            password: required(&mut words, &verb, "password")?,
        },
        "register" => Command::Register {
            username: required(&mut words, &verb, "username")?,
            password: required(&mut words, &verb, "password")?,
            email: words.next(),
        },
        "logout" => Command::Logout,
        "submit" => {
            let text = words.collect::<Vec<_>>().join(" ");
            if text.trim().is_empty() {
                bail!("submit: missing <text>");
            }
            Command::Submit { text }
        }
        "history" => Command::History {
            days: parse_number(words.next(), 30)?,
        },
        "entries" => Command::Entries {
            page_size: parse_number(words.next(), 20)?,
            max_pages: parse_number(words.next(), 10)?,
        },
        other => bail!("unknown command '{other}'"),
    };
    Ok(Args { config, command })
}

fn required(words: &mut impl Iterator<Item = String>, verb: &str, what: &str) -> Result<String> {
    words.next().ok_or_else(|| anyhow!("{verb}: missing <{what}>"))
}

fn parse_number(word: Option<String>, default: u32) -> Result<u32> {
    match word {
        Some(w) => w.parse().with_context(|| format!("'{w}' is not a number")),
        None => Ok(default),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EmosyncConfig> {
    match path {
        Some(path) => EmosyncConfig::from_file(&path).with_context(|| format!("loading {}", path.display())),
        None if std::path::Path::new(DEFAULT_CONFIG).exists() => {
            EmosyncConfig::from_file(std::path::Path::new(DEFAULT_CONFIG)).context("loading emosync.toml")
        }
        None => Ok(EmosyncConfig::default()),
    }
}

fn init_tracing(general: &GeneralConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if general.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let config = load_config(args.config)?;
    init_tracing(&config.general);

    let store = Arc::new(
        SqliteStore::open(&config.storage.path, &config.storage)
            .with_context(|| format!("opening {}", config.storage.path))?,
    );
    let bus = EventBus::new();
    let transport = Arc::new(HttpTransport::new(&config.api)?);
    let session = Arc::new(SessionManager::new(
        transport,
        TokenStore::new(store.clone()),
        bus.clone(),
        &config.api,
    ));
    let api = EmotionApi::new(Arc::clone(&session));
    let cache = LastStateCache::new(store);

    match args.command {
        Command::Run => run(&config, session, api, bus, &cache).await,
        Command::Login { username, password } => {
            let credential = session.login(&username, &password).await?;
            println!("Logged in as {}", credential.user_id());
            Ok(())
        }
        Command::Register { username, password, email } => {
            let credential = session.register(&username, &password, email.as_deref()).await?;
            println!("Registered and logged in as {}", credential.user_id());
            Ok(())
        }
        Command::Logout => {
            session.restore();
            if session.logout() {
                println!("Logged out");
            } else {
                println!("No active session");
            }
            Ok(())
        }
        Command::Submit { text } => {
            require_session(&session)?;
            let _persist = cache.attach(&bus, Arc::clone(&session) as Arc<dyn AuthStatus>);
            let state = api.submit_entry(&text).await?;
            println!(
                "{} (intensity {:.2}, valence {:+.2})",
                state.primary_emotion(),
                state.intensity(),
                state.valence()
            );
            Ok(())
        }
        Command::History { days } => {
            require_session(&session)?;
            for s in api.fetch_mood_samples(days).await? {
                println!(
                    "{}  {:<10} valence {:+.2} arousal {:.2}",
                    s.timestamp.format("%Y-%m-%d %H:%M"),
                    s.primary_emotion.label(),
                    s.valence,
                    s.arousal
                );
            }
            Ok(())
        }
        Command::Entries { page_size, max_pages } => {
            require_session(&session)?;
            let entries = api.fetch_all_journal_entries(page_size, max_pages).await?;
            for e in &entries {
                let emotion = e.analysis.as_ref().map_or("-", |a| a.primary_emotion().label());
                println!("{}  {:<10} {}", e.timestamp.format("%Y-%m-%d %H:%M"), emotion, e.id);
            }
            println!("{} entries", entries.len());
            Ok(())
        }
    }
}

fn require_session(session: &SessionManager) -> Result<()> {
    if session.restore() {
        Ok(())
    } else {
        Err(anyhow!("not logged in; run `emosync login <username> <password>` first"))
    }
}

async fn run(
    config: &EmosyncConfig,
    session: Arc<SessionManager>,
    api: EmotionApi,
    bus: EventBus,
    cache: &LastStateCache,
) -> Result<()> {
    let auth: Arc<dyn AuthStatus> = session.clone();
    let rig = ConsumerRig::build(config, &auth, &bus, cache, MoodArea::new(0.0, 0.0, 1.0, 1.0));

    let source: Arc<dyn StateSource> = Arc::new(api.clone());
    let poller = Arc::new(PollingScheduler::new(
        source,
        Arc::clone(&auth),
        bus.clone(),
        &config.polling,
        Handle::current(),
    ));
    let poll_subscription = config.polling.enabled.then(|| poller.follow_auth(&bus));

    match session.auto_login().await {
        Ok(true) => match api.fetch_mood_samples(30).await {
            Ok(samples) => {
                rig.mood_map.load_history(samples);
            }
            Err(e) => warn!(error = %e, "Could not load mood history"),
        },
        Ok(false) => warn!("No stored session; run `emosync login` to start receiving state"),
        Err(e) => warn!(error = %e, "Backend not reachable; staying logged out"),
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut frame = tokio::time::interval(FRAME);
    let mut last_mods = CombatModifiers::NEUTRAL;

    info!("Running; press Ctrl-C to exit");
    loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("waiting for Ctrl-C")?;
                break;
            }
            _ = frame.tick() => {
                if let Some(kind) = rig.weather.tick(FRAME) {
                    println!("weather → {kind}");
                }
                rig.mood_map.tick(FRAME);
                let mods = rig.combat.modifiers();
                if mods != last_mods {
                    println!(
                        "combat → atk ×{:.2} def ×{:.2} spd ×{:.2} crit +{:.2}",
                        mods.attack_mult, mods.defense_mult, mods.speed_mult, mods.crit_chance_add
                    );
                    last_mods = mods;
                }
            }
        }
    }

    info!("Shutting down");
    if let Some(sub) = poll_subscription {
        bus.unsubscribe(&sub);
    }
    poller.stop();
    rig.detach();
    Ok(())
}
