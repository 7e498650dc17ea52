//! Job registry: one recurring timer per active endpoint.
//!
//! Each job is a timer task that spawns a separate task per tick, so a
//! hung probe never delays any timer. Ticks for one endpoint pass through
//! that endpoint's gate: a tick that finds the previous one still running
//! is dropped rather than queued.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use vigil_state::{EndpointId, StateStore};

use crate::error::{SchedulerError, SchedulerResult};
use crate::pipeline::{CheckPipeline, TickOutcome};
use crate::retention::RetentionSweeper;

/// Serializes ticks of one endpoint.
type TickGate = Arc<Mutex<()>>;

/// Handle to one endpoint's timer.
struct ScheduledJob {
    interval: Duration,
    cancel_tx: watch::Sender<bool>,
    timer: JoinHandle<()>,
    /// The only long-lived strong reference; ticks hold short-lived ones.
    _gate: TickGate,
}

impl ScheduledJob {
    /// Stop future ticks. A tick already past its gate runs to completion.
    fn cancel(self) {
        let _ = self.cancel_tx.send(true);
        self.timer.abort();
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<EndpointId, ScheduledJob>,
    /// Live while a job or an in-flight tick holds the gate, so a
    /// replacement still waits for an old tick.
    gates: HashMap<EndpointId, Weak<Mutex<()>>>,
}

impl Registry {
    fn prune_gates(&mut self) {
        self.gates.retain(|_, gate| gate.strong_count() > 0);
    }
}

struct SweeperSlot {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns all per-endpoint jobs and the retention sweeper.
pub struct MonitorScheduler {
    store: StateStore,
    pipeline: Arc<CheckPipeline>,
    registry: RwLock<Registry>,
    retention: RetentionSweeper,
    sweeper: Mutex<Option<SweeperSlot>>,
    running: AtomicBool,
}

impl MonitorScheduler {
    pub fn new(store: StateStore, pipeline: CheckPipeline) -> Self {
        let retention = RetentionSweeper::new(store.clone());
        Self {
            store,
            pipeline: Arc::new(pipeline),
            registry: RwLock::new(Registry::default()),
            retention,
            sweeper: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_retention(mut self, retention: RetentionSweeper) -> Self {
        self.retention = retention;
        self
    }

    /// Begin accepting jobs and start the retention sweeper.
    pub async fn start(&self) -> SchedulerResult<()> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = runtime.spawn(self.retention.clone().run(shutdown_rx));
            *sweeper = Some(SweeperSlot {
                shutdown_tx,
                handle,
            });
        }
        self.running.store(true, Ordering::SeqCst);
        info!(
            sweep_period_secs = self.retention.period().as_secs(),
            "monitor scheduler started"
        );
        Ok(())
    }

    /// Cancel every job and the sweeper. In-flight ticks finish on their own.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel_all().await;
        if let Some(slot) = self.sweeper.lock().await.take() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
        }
        info!("monitor scheduler stopped");
    }

    /// Schedule `endpoint_id` every `interval`, first fire one interval
    /// from now. Any existing job for the id is cancelled first.
    pub async fn add_or_replace(
        &self,
        endpoint_id: &str,
        interval: Duration,
    ) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(endpoint_id.to_string()));
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let mut registry = self.registry.write().await;
        let gate: TickGate = registry
            .gates
            .get(endpoint_id)
            .and_then(Weak::upgrade)
            .unwrap_or_default();
        if let Some(old) = registry.jobs.remove(endpoint_id) {
            debug!(%endpoint_id, old_interval_secs = old.interval.as_secs(), "replacing job");
            old.cancel();
        }
        registry
            .gates
            .insert(endpoint_id.to_string(), Arc::downgrade(&gate));
        registry.prune_gates();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let timer = runtime.spawn(run_timer(
            endpoint_id.to_string(),
            Instant::now() + interval,
            interval,
            Arc::downgrade(&gate),
            Arc::clone(&self.pipeline),
            cancel_rx,
        ));
        registry.jobs.insert(
            endpoint_id.to_string(),
            ScheduledJob {
                interval,
                cancel_tx,
                timer,
                _gate: gate,
            },
        );

        info!(%endpoint_id, interval_secs = interval.as_secs(), "job scheduled");
        Ok(())
    }

    /// Cancel the job for `endpoint_id`, if any.
    pub async fn remove(&self, endpoint_id: &str) {
        let mut registry = self.registry.write().await;
        if let Some(job) = registry.jobs.remove(endpoint_id) {
            job.cancel();
            info!(%endpoint_id, "job removed");
        }
        registry.prune_gates();
    }

    /// Replace every job with one per active endpoint in the store.
    ///
    /// The retention sweeper is not touched.
    pub async fn reload_all(&self) -> SchedulerResult<usize> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        self.cancel_all().await;

        let endpoints = self.store.list_active_endpoints()?;
        for endpoint in &endpoints {
            self.add_or_replace(&endpoint.id, endpoint.interval()).await?;
        }
        info!(count = endpoints.len(), "jobs reloaded");
        Ok(endpoints.len())
    }

    async fn cancel_all(&self) {
        let mut registry = self.registry.write().await;
        for (endpoint_id, job) in registry.jobs.drain() {
            job.cancel();
            debug!(%endpoint_id, "job cancelled");
        }
        registry.prune_gates();
    }

    /// Ids with a live job, sorted.
    pub async fn scheduled_endpoints(&self) -> Vec<EndpointId> {
        let registry = self.registry.read().await;
        let mut ids: Vec<_> = registry.jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_scheduled(&self, endpoint_id: &str) -> bool {
        self.registry.read().await.jobs.contains_key(endpoint_id)
    }

    pub async fn job_count(&self) -> usize {
        self.registry.read().await.jobs.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Endpoints whose tick gate is still tracked.
    pub async fn gate_count(&self) -> usize {
        self.registry.read().await.gates.len()
    }

    pub async fn sweeper_active(&self) -> bool {
        self.sweeper
            .lock()
            .await
            .as_ref()
            .is_some_and(|slot| !slot.handle.is_finished())
    }
}

/// Timer loop for one job.
async fn run_timer(
    endpoint_id: EndpointId,
    first_fire: Instant,
    interval: Duration,
    gate: Weak<Mutex<()>>,
    pipeline: Arc<CheckPipeline>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(first_fire, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let tick_cancel = cancel_rx.clone();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(gate) = gate.upgrade() else {
                    break;
                };
                tokio::spawn(run_tick(
                    endpoint_id.clone(),
                    gate,
                    Arc::clone(&pipeline),
                    tick_cancel.clone(),
                ));
            }
            _ = cancel_rx.changed() => {
                debug!(%endpoint_id, "timer cancelled");
                break;
            }
        }
    }
}

/// One tick, isolated in its own task.
async fn run_tick(
    endpoint_id: EndpointId,
    gate: TickGate,
    pipeline: Arc<CheckPipeline>,
    cancelled: watch::Receiver<bool>,
) {
    if *cancelled.borrow() {
        return;
    }
    let Ok(_guard) = gate.try_lock_owned() else {
        debug!(%endpoint_id, "previous tick still running, skipping");
        return;
    };
    // The job may have been cancelled while this tick waited to be polled.
    if *cancelled.borrow() {
        return;
    }

    match pipeline.run_tick(&endpoint_id).await {
        Ok(TickOutcome::Checked {
            success,
            transition,
        }) => debug!(%endpoint_id, success, %transition, "tick complete"),
        Ok(TickOutcome::Skipped) => {}
        Err(e) => error!(%endpoint_id, error = %e, "tick failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingChannel, ScriptedProbe, endpoint, pipeline_with};

    const INTERVAL: Duration = Duration::from_secs(10);

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    async fn running_scheduler(
        probe: Arc<ScriptedProbe>,
    ) -> (StateStore, MonitorScheduler, Arc<RecordingChannel>) {
        let (store, pipeline, channel) = pipeline_with(probe);
        let scheduler = MonitorScheduler::new(store.clone(), pipeline);
        scheduler.start().await.unwrap();
        (store, scheduler, channel)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_one_interval_after_registration() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        advance(9).await;
        assert_eq!(probe.calls(), 0);
        advance(2).await;
        assert_eq!(probe.calls(), 1);
        advance(10).await;
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn double_add_leaves_single_job() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        assert_eq!(scheduler.job_count().await, 1);

        advance(35).await;
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_stops_future_ticks() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        advance(15).await;
        assert_eq!(probe.calls(), 1);

        scheduler.remove("ep").await;
        scheduler.remove("ep").await;
        assert!(!scheduler.is_scheduled("ep").await);

        advance(60).await;
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_resets_phase() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        advance(7).await;
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        // Original phase would fire at t=10; the new one fires at t=17.
        advance(5).await;
        assert_eq!(probe.calls(), 0);
        advance(6).await;
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_takes_effect() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        scheduler
            .add_or_replace("ep", Duration::from_secs(30))
            .await
            .unwrap();
        advance(65).await;
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_never_overlaps_itself() {
        let probe = ScriptedProbe::slow(&[false; 20], Duration::from_secs(25));
        let (store, scheduler, channel) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        advance(200).await;

        assert_eq!(probe.max_in_flight(), 1);
        assert!(probe.calls() < 20);
        let downs = channel.alerts().iter().filter(|a| !a.is_up).count();
        assert_eq!(downs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_endpoint_does_not_delay_others() {
        let slow = ScriptedProbe::slow(&[], Duration::from_secs(1000));
        let (store, pipeline, _) = pipeline_with(slow.clone());
        let scheduler = MonitorScheduler::new(store.clone(), pipeline);
        scheduler.start().await.unwrap();
        store.put_endpoint(&endpoint("a", true)).unwrap();
        store.put_endpoint(&endpoint("b", true)).unwrap();

        scheduler.add_or_replace("a", INTERVAL).await.unwrap();
        scheduler.add_or_replace("b", INTERVAL).await.unwrap();
        advance(15).await;

        // Both endpoints entered the probe although neither has returned.
        assert_eq!(slow.calls(), 2);
        assert_eq!(slow.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_endpoint_ticks_are_silent() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        store.delete_endpoint("ep").unwrap();
        advance(25).await;

        assert_eq!(probe.calls(), 0);
        assert!(scheduler.is_scheduled("ep").await);
        assert!(store.query_recent_results("ep", 5).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reload_all_schedules_active_endpoints_only() {
        let probe = ScriptedProbe::up();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("a", true)).unwrap();
        store.put_endpoint(&endpoint("b", true)).unwrap();
        store.put_endpoint(&endpoint("off", false)).unwrap();
        scheduler.add_or_replace("stale", INTERVAL).await.unwrap();

        let count = scheduler.reload_all().await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(scheduler.scheduled_endpoints().await, vec!["a", "b"]);
        assert!(scheduler.sweeper_active().await);

        advance(11).await;
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn four_timeouts_then_success_alerts_down_only() {
        let probe = ScriptedProbe::scripted(&[false, false, false, false, true]);
        let (store, scheduler, channel) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        advance(35).await;
        assert_eq!(probe.calls(), 3);
        assert!(channel.alerts().is_empty());

        advance(10).await;
        assert_eq!(probe.calls(), 4);
        let alerts = channel.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(!alerts[0].is_up);

        advance(10).await;
        assert_eq!(probe.calls(), 5);
        assert_eq!(channel.alerts().len(), 1);
        let state = store.get_runtime_state("ep").unwrap();
        assert!(state.threshold_down);
        assert_eq!(state.last_success, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_alerts_up() {
        let probe = ScriptedProbe::scripted(&[false, false, false, false, true, true]);
        let (store, scheduler, channel) = running_scheduler(probe).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        advance(65).await;
        let states: Vec<bool> = channel.alerts().iter().map(|a| a.is_up).collect();
        assert_eq!(states, vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_rejects_jobs() {
        let probe = ScriptedProbe::up();
        let (store, pipeline, _) = pipeline_with(probe.clone());
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        let scheduler = MonitorScheduler::new(store, pipeline);

        assert!(matches!(
            scheduler.add_or_replace("ep", INTERVAL).await,
            Err(SchedulerError::NotRunning)
        ));

        scheduler.start().await.unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.job_count().await, 0);
        assert!(!scheduler.sweeper_active().await);
        assert!(matches!(
            scheduler.reload_all().await,
            Err(SchedulerError::NotRunning)
        ));

        advance(30).await;
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_rejected() {
        let (_, scheduler, _) = running_scheduler(ScriptedProbe::up()).await;
        assert!(matches!(
            scheduler.add_or_replace("ep", Duration::ZERO).await,
            Err(SchedulerError::InvalidInterval(_))
        ));
        assert_eq!(scheduler.job_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_tick_does_not_stop_timer() {
        let probe = ScriptedProbe::panicking_once();
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        advance(25).await;
        assert_eq!(probe.calls(), 2);
        // Only the second tick got as far as recording a result.
        assert_eq!(store.query_recent_results("ep", 5).unwrap().len(), 1);
        assert!(scheduler.is_scheduled("ep").await);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tick_completes_after_remove() {
        let probe = ScriptedProbe::slow(&[true], Duration::from_secs(5));
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        advance(12).await;
        assert_eq!(probe.calls(), 1);
        scheduler.remove("ep").await;

        advance(30).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(store.query_recent_results("ep", 5).unwrap().len(), 1);
        assert!(
            store
                .get_runtime_state("ep")
                .unwrap()
                .last_checked
                .is_some()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removed_endpoints_release_their_gates() {
        let (store, scheduler, _) = running_scheduler(ScriptedProbe::up()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();

        for _ in 0..100 {
            scheduler.add_or_replace("ep", INTERVAL).await.unwrap();
            scheduler.remove("ep").await;
        }
        advance(1).await;
        assert_eq!(scheduler.job_count().await, 0);
        assert_eq!(scheduler.gate_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_outlives_remove_until_tick_finishes() {
        let probe = ScriptedProbe::slow(&[true], Duration::from_secs(5));
        let (store, scheduler, _) = running_scheduler(probe.clone()).await;
        store.put_endpoint(&endpoint("ep", true)).unwrap();
        store.put_endpoint(&endpoint("other", true)).unwrap();
        scheduler.add_or_replace("ep", INTERVAL).await.unwrap();

        advance(12).await;
        scheduler.remove("ep").await;
        assert_eq!(scheduler.gate_count().await, 1);

        // Pruned by the next registry change once the tick is done.
        advance(10).await;
        scheduler.add_or_replace("other", INTERVAL).await.unwrap();
        assert_eq!(scheduler.gate_count().await, 1);
        assert_eq!(scheduler.scheduled_endpoints().await, vec!["other".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_all_drops_gates_of_vanished_endpoints() {
        let (store, scheduler, _) = running_scheduler(ScriptedProbe::up()).await;
        store.put_endpoint(&endpoint("a", true)).unwrap();
        scheduler.add_or_replace("a", INTERVAL).await.unwrap();
        scheduler.add_or_replace("b", INTERVAL).await.unwrap();

        assert_eq!(scheduler.reload_all().await.unwrap(), 1);
        assert_eq!(scheduler.gate_count().await, 1);
        scheduler.stop().await;
        assert_eq!(scheduler.gate_count().await, 0);
    }
}
