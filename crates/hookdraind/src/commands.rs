//! Subcommand implementations.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::watch;
use tracing::info;

use hookdrain_core::{
    DrainRequest, DrainSettings, HookdrainConfig, LifecycleEvent, MetricQuery, SchedulerSettings,
    epoch_secs,
};
use hookdrain_loop::{DrainLoop, DrainScheduler, handle_event};
use hookdrain_state::{StateStore, StoreLifecycleController, StoreMetricSource, UsageSample};

const CONFIG_FILE: &str = "hookdrain.toml";
const DB_FILE: &str = "hookdrain.redb";

/// Everything a subcommand needs: the opened store and resolved settings.
pub struct Context {
    pub store: StateStore,
    pub drain: DrainSettings,
    pub scheduler: SchedulerSettings,
}

impl Context {
    pub fn load(data_dir: PathBuf, config: Option<PathBuf>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config_path = config.or_else(|| {
            let default = data_dir.join(CONFIG_FILE);
            default.exists().then_some(default)
        });
        let config = match &config_path {
            Some(path) => HookdrainConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => HookdrainConfig::default(),
        };

        let db_path = data_dir.join(DB_FILE);
        let store = StateStore::open(&db_path)?;
        info!(path = ?db_path, config = ?config_path, "state store opened");

        Ok(Self {
            store,
            drain: config.drain_settings()?,
            scheduler: config.scheduler_settings()?,
        })
    }

    /// Decision loop wired to the store-backed collaborators.
    fn drain_loop(&self) -> DrainLoop {
        DrainLoop::new(
            Arc::new(StoreMetricSource::new(self.store.clone())),
            Arc::new(StoreLifecycleController::new(self.store.clone())),
            self.drain.clone(),
        )
    }
}

fn read_event(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read event from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read event {source}"))
    }
}

pub async fn run(ctx: &Context, event: &str) -> anyhow::Result<()> {
    let raw = read_event(event)?;
    let completion = handle_event(&ctx.drain_loop(), &raw).await?;
    println!("{}", serde_json::to_string(&completion)?);
    Ok(())
}

pub async fn admit(ctx: &Context, event: &str) -> anyhow::Result<()> {
    let raw = read_event(event)?;
    info!(event = %raw, "received lifecycle event");
    let event = LifecycleEvent::from_json(&raw)?;

    let scheduler = DrainScheduler::new(ctx.store.clone(), Arc::new(ctx.drain_loop()));
    let state = scheduler.admit(event.request).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn scheduler(ctx: &Context, inbox: Option<PathBuf>, once: bool) -> anyhow::Result<()> {
    let mut scheduler = DrainScheduler::new(ctx.store.clone(), Arc::new(ctx.drain_loop()));
    if let Some(dir) = inbox {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create inbox {}", dir.display()))?;
        scheduler = scheduler.with_inbox(dir);
    }

    if once {
        let stepped = scheduler.tick().await?;
        scheduler.prune(ctx.scheduler.retain_resolved)?;
        info!(stepped = stepped.len(), "single tick complete");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    scheduler
        .run(ctx.scheduler.tick, ctx.scheduler.retain_resolved, shutdown_rx)
        .await;
    info!("hookdraind stopped");
    Ok(())
}

pub fn status(ctx: &Context) -> anyhow::Result<()> {
    let checkpoints = ctx.store.list_checkpoints()?;
    println!("{}", serde_json::to_string_pretty(&checkpoints)?);
    Ok(())
}

pub fn pause_begin(ctx: &Context, instance: &str, group: &str, hook: &str) -> anyhow::Result<()> {
    let request = DrainRequest::new(instance, group, hook)?;
    let record = ctx.store.begin_pause(&request, epoch_secs())?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub fn pause_show(ctx: &Context) -> anyhow::Result<()> {
    let pauses = ctx.store.list_pauses()?;
    println!("{}", serde_json::to_string_pretty(&pauses)?);
    Ok(())
}

pub fn metric_put(
    ctx: &Context,
    instance: &str,
    group: &str,
    value: f64,
    at: Option<u64>,
) -> anyhow::Result<()> {
    anyhow::ensure!(value.is_finite(), "usage value must be finite, got {value}");
    // Only the instance and group matter for the sample's dimensions.
    let request = DrainRequest::new(instance, group, "-")?;
    let sample = UsageSample {
        namespace: ctx.drain.namespace.clone(),
        metric_name: ctx.drain.metric_name.clone(),
        dimensions: MetricQuery::dimensions_for(&request),
        timestamp: at.unwrap_or_else(epoch_secs),
        value,
    };
    ctx.store.put_sample(&sample)?;
    info!(%instance, %group, value, timestamp = sample.timestamp, "usage sample recorded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookdrain_state::PauseStatus;
    use std::time::Duration;

    fn test_context(dir: &std::path::Path, config: &str) -> Context {
        std::fs::write(dir.join(CONFIG_FILE), config).unwrap();
        Context::load(dir.to_path_buf(), None).unwrap()
    }

    #[test]
    fn load_picks_up_config_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), "[drain]\nmax_attempts = 3\ndelay = \"10s\"\n");

        assert_eq!(ctx.drain.max_attempts, 3);
        assert_eq!(ctx.drain.delay, Duration::from_secs(10));
        assert!(dir.path().join(DB_FILE).exists());
    }

    #[test]
    fn load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[drain]\nmax_attempts = 0\n").unwrap();
        assert!(Context::load(dir.path().to_path_buf(), None).is_err());
    }

    #[test]
    fn read_event_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(read_event(path.to_str().unwrap()).unwrap(), "{}");
        assert!(read_event("/nonexistent/event.json").is_err());
    }

    #[tokio::test]
    async fn run_releases_idle_instance() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), "[drain]\ndelay = \"0s\"\n");

        pause_begin(&ctx, "i-1", "workers", "drain-hook").unwrap();
        metric_put(&ctx, "i-1", "workers", 0.0, None).unwrap();

        let event = dir.path().join("event.json");
        std::fs::write(
            &event,
            r#"{"detail":{"EC2InstanceId":"i-1","AutoScalingGroupName":"workers","LifecycleHookName":"drain-hook"}}"#,
        )
        .unwrap();
        run(&ctx, event.to_str().unwrap()).await.unwrap();

        let pause = ctx
            .store
            .get_pause("workers/i-1/drain-hook")
            .unwrap()
            .unwrap();
        assert_eq!(pause.status, PauseStatus::Continued);
    }

    #[tokio::test]
    async fn admit_then_single_tick() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), "[drain]\ndelay = \"0s\"\n");

        pause_begin(&ctx, "i-1", "workers", "drain-hook").unwrap();
        metric_put(&ctx, "i-1", "workers", 2.0, None).unwrap();

        let event = dir.path().join("event.json");
        std::fs::write(
            &event,
            r#"{"resourceId":"i-1","groupId":"workers","hookId":"drain-hook"}"#,
        )
        .unwrap();
        admit(&ctx, event.to_str().unwrap()).await.unwrap();

        let state = ctx
            .store
            .get_checkpoint("workers/i-1/drain-hook")
            .unwrap()
            .unwrap();
        assert_eq!(state.attempt, 1);

        scheduler(&ctx, None, true).await.unwrap();
        let state = ctx
            .store
            .get_checkpoint("workers/i-1/drain-hook")
            .unwrap()
            .unwrap();
        assert_eq!(state.attempt, 2);
        assert_eq!(state.heartbeats, 1);
    }

    #[test]
    fn metric_put_rejects_non_finite_values() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), "");

        assert!(metric_put(&ctx, "i-1", "workers", f64::NAN, Some(100)).is_err());
        assert!(metric_put(&ctx, "i-1", "workers", f64::INFINITY, Some(100)).is_err());
        metric_put(&ctx, "i-1", "workers", 0.0, Some(200)).unwrap();

        let request = DrainRequest::new("i-1", "workers", "-").unwrap();
        let peak = ctx
            .store
            .max_sample(
                &ctx.drain.namespace,
                &ctx.drain.metric_name,
                &MetricQuery::dimensions_for(&request),
                0,
                300,
            )
            .unwrap();
        assert_eq!(peak, Some(0.0));
    }
}
