//! Crawler coordinator - worker pool orchestration
//!
//! This module ties the crawl together:
//! - Opening or resuming the run-state database
//! - Seeding the frontier with the release root
//! - Running `concurrency` workers that claim, fetch, classify and link
//! - Streaming records to the sink task in id order
//! - Stopping cleanly on Ctrl-C so the run can be resumed
//! - Finishing the run and assembling the [`CrawlReport`]

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::crawler::{
    build_http_client, Claim, FetchError, Fetcher, Frontier, MemoryFrontier, RetryPolicy,
    SqliteFrontier,
};
use crate::model::{Classification, ClassifiedRecord, Entity};
use crate::output::{
    self, CrawlReport, FailedUrl, MissingLink, OutputError, RecordSink, SinkEvent,
    UnresolvedParent,
};
use crate::storage::{RunStatus, SqliteStorage, Storage, StorageResult};
use crate::taxonomy::{
    classify, resolve_ancestors, Ancestors, AssignedId, EntityStore, IdAssigner,
};
use crate::url::{normalize_entity_url, resolve_entity_url};
use crate::HarvestError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinSet;

/// How a coordinator treats state left by earlier runs
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Discard the frontier, entities and assignments of earlier runs
    pub fresh: bool,
    /// Hash of the configuration file, stored with the run
    pub config_hash: String,
}

/// Run-state database handle plus the run this crawl belongs to
struct RunState {
    storage: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    sink: Box<dyn RecordSink>,
    fetcher: Fetcher,
    frontier: Box<dyn Frontier>,
    store: EntityStore,
    assigner: IdAssigner,
    state: Option<RunState>,
    root_url: String,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Without a `state-path` the crawl runs entirely in memory and cannot
    /// be resumed. With one, the latest unfinished run is resumed unless
    /// `options.fresh` is set: its in-progress URLs go back to pending and
    /// the entity store and id counters are restored.
    pub fn new(
        config: Config,
        sink: Box<dyn RecordSink>,
        tokens: Arc<dyn TokenProvider>,
        options: RunOptions,
    ) -> crate::Result<Self> {
        let force_https = config.api.force_https;
        let root_url = normalize_entity_url(&config.api.release_url, force_https)?;

        let client = build_http_client(&config.api)?;
        let fetcher = Fetcher::new(
            client,
            tokens,
            RetryPolicy::from_config(&config.crawler),
            &config.api,
        );

        let mut store = EntityStore::new(force_https);
        let mut assigner = IdAssigner::new(
            config.api.release_id.clone(),
            &config.classification.infectious_keywords,
        );

        let (frontier, state): (Box<dyn Frontier>, Option<RunState>) =
            match &config.output.state_path {
                None => {
                    tracing::info!("No state path configured; this run cannot be resumed");
                    (Box::new(MemoryFrontier::new()), None)
                }
                Some(path) => {
                    let mut storage = SqliteStorage::new(Path::new(path))?;
                    let run_id = open_run(&mut storage, &options)?;

                    if !options.fresh {
                        let restored = store.hydrate(storage.load_entities()?);
                        let assignments = storage.load_assignments()?;
                        let assigned = assignments.len();
                        assigner.restore(assignments);
                        if restored > 0 || assigned > 0 {
                            tracing::info!(
                                "Restored {} entities and {} assigned ids from {}",
                                restored,
                                assigned,
                                path
                            );
                        }
                    }

                    let storage = Arc::new(Mutex::new(storage));
                    let mut frontier = SqliteFrontier::new(Arc::clone(&storage));
                    let reset = frontier.reset_in_progress()?;
                    if reset > 0 {
                        tracing::info!("Returned {} interrupted URLs to the frontier", reset);
                    }

                    (Box::new(frontier), Some(RunState { storage, run_id }))
                }
            };

        Ok(Self {
            config,
            sink,
            fetcher,
            frontier,
            store,
            assigner,
            state,
            root_url,
        })
    }

    /// Id of the run-state row, when a state database is in use
    pub fn run_id(&self) -> Option<i64> {
        self.state.as_ref().map(|s| s.run_id)
    }

    /// Runs the crawl until the frontier is exhausted or a fatal error occurs
    pub async fn run(self) -> crate::Result<CrawlReport> {
        let Coordinator {
            config,
            sink,
            fetcher,
            mut frontier,
            store,
            assigner,
            state,
            root_url,
        } = self;

        let run_id = state.as_ref().map(|s| s.run_id);
        tracing::info!(
            "Starting crawl of {} with {} workers",
            root_url,
            config.crawler.concurrency
        );

        if frontier.enqueue(&root_url)? {
            tracing::debug!("Seeded frontier with {}", root_url);
        }

        let (events, receiver) = mpsc::channel(config.crawler.channel_capacity.max(1));
        let sink_task = tokio::task::spawn_blocking(move || output::drain(sink, receiver));

        let shared = Arc::new(Shared {
            fetcher,
            frontier: Mutex::new(frontier),
            store: Mutex::new(store),
            assigner: AsyncMutex::new(assigner),
            state,
            events,
            wake: Notify::new(),
            aborted: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            fatal: Mutex::new(None),
            report: Mutex::new(CrawlReport::new(run_id)),
            failures: Mutex::new(HashMap::new()),
            completed: AtomicU64::new(0),
            requeue_limit: config.crawler.requeue_limit,
            progress_interval: config.crawler.progress_interval,
            force_https: config.api.force_https,
            started: Instant::now(),
        });

        let interrupt = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, finishing in-flight URLs");
                    shared.interrupted.store(true, Ordering::SeqCst);
                    shared.abort();
                }
            })
        };

        let mut workers = JoinSet::new();
        for worker_id in 0..config.crawler.concurrency.max(1) {
            let shared = Arc::clone(&shared);
            workers.spawn(async move { shared.work(worker_id).await });
        }

        let mut worker_error = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined
                .map_err(|e| HarvestError::Worker(e.to_string()))
                .and_then(|r| r);
            if let Err(e) = result {
                tracing::error!("Worker stopped: {}", e);
                shared.abort();
                worker_error.get_or_insert(e);
            }
        }

        interrupt.abort();
        let _ = interrupt.await;

        let shared = Arc::into_inner(shared)
            .ok_or_else(|| HarvestError::Worker("worker state still shared".to_string()))?;
        let Shared {
            frontier,
            state,
            events,
            fatal,
            report,
            interrupted,
            started,
            ..
        } = shared;

        let fatal = fatal.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut report = report.into_inner().unwrap_or_else(PoisonError::into_inner);

        let interrupted = interrupted.into_inner();
        let clean = fatal.is_none() && worker_error.is_none() && !interrupted;
        if clean && events.send(SinkEvent::End).await.is_err() {
            worker_error = Some(OutputError::ChannelClosed.into());
        }
        drop(events);

        let sink_result = sink_task
            .await
            .map_err(|e| HarvestError::Worker(e.to_string()))?;

        report.elapsed = started.elapsed();
        report.frontier = frontier
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .counts()?;

        let failure = match (fatal, worker_error, sink_result) {
            (Some((url, source)), _, _) => Some(HarvestError::Aborted { url, source }),
            // The sink's own error explains a closed channel better
            (None, Some(_), Err(sink_error)) => Some(sink_error.into()),
            (None, Some(e), Ok(_)) => Some(e),
            (None, None, Err(sink_error)) => Some(sink_error.into()),
            (None, None, Ok(_)) if interrupted => Some(HarvestError::Interrupted),
            (None, None, Ok(summary)) => {
                tracing::debug!(
                    "Sink wrote {} records and {} updates",
                    summary.records,
                    summary.updates
                );
                None
            }
        };

        let status = match &failure {
            None => RunStatus::Completed,
            Some(HarvestError::Interrupted) => RunStatus::Interrupted,
            Some(_) => RunStatus::Failed,
        };
        if let Some(state) = &state {
            lock(&state.storage).finish_run(state.run_id, status)?;
        }

        if let Some(e) = failure {
            tracing::error!("Crawl stopped after {:?}: {}", report.elapsed, e);
            return Err(e);
        }

        report.validation.log_summary();
        tracing::info!(
            "Crawl completed: {} URLs, {} records ({} chapters, {} sections, {} subsections, {} diagnoses) in {:?}",
            report.urls_completed,
            report.total_records(),
            report.records_of(Classification::Chapter),
            report.records_of(Classification::Section),
            report.records_of(Classification::Subsection),
            report.records_of(Classification::Diagnosis),
            report.elapsed
        );

        Ok(report)
    }
}

/// Opens the run row this crawl writes to
fn open_run(storage: &mut SqliteStorage, options: &RunOptions) -> StorageResult<i64> {
    if options.fresh {
        tracing::info!("Starting fresh run (clearing previous state)");
        storage.clear_state()?;
        return storage.create_run(&options.config_hash);
    }

    match storage.get_latest_run()? {
        Some(run) if run.status.is_resumable() => {
            tracing::info!(
                "Resuming run {} (last status: {})",
                run.id,
                run.status.to_db_string()
            );
            if run.config_hash != options.config_hash {
                tracing::warn!("Configuration changed since run {} started", run.id);
            }
            storage.update_run_status(run.id, RunStatus::Running)?;
            Ok(run.id)
        }
        Some(run) => {
            tracing::info!("Run {} already completed, starting new run", run.id);
            storage.create_run(&options.config_hash)
        }
        None => {
            tracing::info!("No previous runs found, starting new run");
            storage.create_run(&options.config_hash)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by all workers of one run
///
/// Lock order: `assigner`, then `store`, then `frontier`, then the
/// run-state storage, then `report`. No std lock is held across an await.
struct Shared {
    fetcher: Fetcher,
    frontier: Mutex<Box<dyn Frontier>>,
    store: Mutex<EntityStore>,
    /// Held across the channel send so the sink sees records in id order
    assigner: AsyncMutex<IdAssigner>,
    state: Option<RunState>,
    events: mpsc::Sender<SinkEvent>,
    wake: Notify,
    aborted: AtomicBool,
    interrupted: AtomicBool,
    fatal: Mutex<Option<(String, FetchError)>>,
    report: Mutex<CrawlReport>,
    failures: Mutex<HashMap<String, u32>>,
    completed: AtomicU64,
    requeue_limit: u32,
    progress_interval: u64,
    force_https: bool,
    started: Instant,
}

impl Shared {
    async fn work(&self, worker_id: u32) -> crate::Result<()> {
        tracing::trace!("Worker {} started", worker_id);

        loop {
            if self.aborted.load(Ordering::SeqCst) {
                break;
            }

            // Registered before claiming so a wake-up between an Idle claim
            // and the await is not lost
            let wake = self.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            let claim = lock(&self.frontier).claim_next()?;
            match claim {
                Claim::Claimed(url) => {
                    let result = self.process(&url).await;
                    self.wake.notify_waiters();
                    result?;
                }
                Claim::Idle => wake.await,
                Claim::Exhausted => {
                    self.wake.notify_waiters();
                    break;
                }
            }
        }

        tracing::trace!("Worker {} finished", worker_id);
        Ok(())
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    async fn process(&self, url: &str) -> crate::Result<()> {
        tracing::debug!("Fetching {}", url);

        match self.fetcher.fetch(url).await {
            Ok(mut entity) => self.record(url, &mut entity).await,
            Err(e) if e.is_fatal() => {
                tracing::error!("Fatal error fetching {}: {}", url, e);
                lock(&self.frontier).requeue(url)?;
                lock(&self.fatal).get_or_insert_with(|| (url.to_string(), e));
                self.abort();
                Ok(())
            }
            Err(e) => self.fail(url, e),
        }
    }

    async fn record(&self, url: &str, entity: &mut Entity) -> crate::Result<()> {
        let is_new = lock(&self.store).record_if_new(entity);
        if !is_new {
            tracing::debug!("{} resolves to an entity already recorded", url);
            lock(&self.report).aliases += 1;
            return self.complete(url);
        }

        self.emit(entity).await?;

        let mut discovered = 0;
        {
            let mut frontier = lock(&self.frontier);
            for child in &entity.child {
                match resolve_entity_url(url, child, self.force_https) {
                    Ok(child_url) => {
                        if frontier.enqueue(&child_url)? {
                            discovered += 1;
                        }
                    }
                    Err(e) => tracing::warn!("Skipping child {} of {}: {}", child, url, e),
                }
            }
        }

        if let Some(state) = &self.state {
            lock(&state.storage).save_entity(entity)?;
        }
        lock(&self.report).entities_recorded += 1;
        tracing::trace!("{} recorded with {} new children", entity.key(), discovered);

        self.complete(url)
    }

    /// Classifies, links and sends one newly recorded entity
    async fn emit(&self, entity: &Entity) -> crate::Result<()> {
        if entity.is_release_root() {
            tracing::debug!("Release root produces no record");
            return Ok(());
        }

        let class = classify(entity);
        let mut assigner = self.assigner.lock().await;

        let key = entity.key();
        if let Some((assigned_class, id)) = assigner.assigned(&key) {
            // Re-fetched after an interruption that hit between id
            // assignment and saving the entity
            tracing::debug!("{} already emitted as {} {}", key, assigned_class, id);
            return Ok(());
        }

        let assignment = {
            let store = lock(&self.store);
            let ancestors = resolve_ancestors(entity, &store);
            let assignment = assigner.assign(class, entity, &ancestors);
            self.note_findings(&assignment.record, entity, &ancestors);
            assignment
        };

        if let Some(state) = &self.state {
            let mut storage = lock(&state.storage);
            storage.save_assignment(&AssignedId {
                entity_key: key,
                class,
                id: assignment.record.id(),
                code: match class {
                    Classification::Diagnosis => entity.code().unwrap_or_default().to_string(),
                    _ => String::new(),
                },
                has_subclassification: false,
            })?;
            if let Some(parent_id) = assignment.subclassified_parent {
                storage.mark_subclassified(parent_id)?;
            }
        }

        {
            let mut report = lock(&self.report);
            *report.records.entry(class).or_insert(0) += 1;
            if assignment.subclassified_parent.is_some() {
                report.subclassified += 1;
            }
        }

        self.send(SinkEvent::Record(assignment.record)).await?;
        if let Some(diagnosis_id) = assignment.subclassified_parent {
            self.send(SinkEvent::Subclassified { diagnosis_id }).await?;
        }

        Ok(())
    }

    fn note_findings(&self, record: &ClassifiedRecord, entity: &Entity, ancestors: &Ancestors<'_>) {
        let mut report = lock(&self.report);

        if record.classification() != Classification::Chapter && record.chapter_id().is_none() {
            report.validation.missing_chapter.push(MissingLink {
                class: record.classification(),
                id: record.id(),
                code: record.code().to_string(),
            });
        }
        if ancestors.cycle_detected {
            report.validation.cycles.push(entity.key());
        }
        if let Some(parent_url) = ancestors.unresolved_parent {
            report.validation.unresolved_parents.push(UnresolvedParent {
                entity_key: entity.key(),
                parent_url: parent_url.to_string(),
            });
        }
    }

    async fn send(&self, event: SinkEvent) -> crate::Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| OutputError::ChannelClosed.into())
    }

    /// Requeues a failed URL while it has retries left, else abandons it
    fn fail(&self, url: &str, error: FetchError) -> crate::Result<()> {
        let failures = {
            let mut failures = lock(&self.failures);
            let count = failures.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if failures <= self.requeue_limit {
            tracing::warn!(
                "Requeueing {} ({}/{}): {}",
                url,
                failures,
                self.requeue_limit,
                error
            );
            lock(&self.frontier).requeue(url)?;
            return Ok(());
        }

        tracing::error!("Abandoning {} and its subtree: {}", url, error);
        lock(&self.report).validation.failed_urls.push(FailedUrl {
            url: url.to_string(),
            error: error.to_string(),
        });
        self.complete(url)
    }

    fn complete(&self, url: &str) -> crate::Result<()> {
        lock(&self.frontier).complete(url)?;

        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.report).urls_completed = done;

        if self.progress_interval > 0 && done % self.progress_interval == 0 {
            let counts = lock(&self.frontier).counts()?;
            let rate = done as f64 / self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: {} URLs done, {} pending, {} in progress, {:.2} URLs/sec",
                done,
                counts.pending,
                counts.in_progress,
                rate
            );
        }

        Ok(())
    }
}

/// Builds a coordinator and runs it to completion
pub async fn run_crawl(
    config: Config,
    sink: Box<dyn RecordSink>,
    tokens: Arc<dyn TokenProvider>,
    options: RunOptions,
) -> crate::Result<CrawlReport> {
    Coordinator::new(config, sink, tokens, options)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{StaticToken, TokenCache};
    use crate::config::parse_config;
    use crate::output::MemorySink;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, state_path: Option<&Path>) -> Config {
        let state = state_path
            .map(|p| format!("state-path = \"{}\"\n", p.display()))
            .unwrap_or_default();
        parse_config(&format!(
            r#"
[api]
release-url = "{}/icd/release/11/2024-01/mms"
force-https = false

[crawler]
concurrency = 3
max-attempts = 1
initial-backoff-ms = 1

[output]
path = "unused.jsonl"
{}
"#,
            server.uri(),
            state
        ))
        .unwrap()
    }

    fn tokens() -> Arc<dyn TokenProvider> {
        Arc::new(TokenCache::new(StaticToken::new("test-token")))
    }

    async fn mount(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_tree(server: &MockServer) {
        let base = format!("{}/icd/release/11/2024-01/mms", server.uri());
        mount(
            server,
            "/icd/release/11/2024-01/mms",
            serde_json::json!({"@id": base, "child": [format!("{}/1", base), format!("{}/2", base)]}),
        )
        .await;
        mount(
            server,
            "/icd/release/11/2024-01/mms/1",
            serde_json::json!({
                "@id": format!("{}/1", base), "code": "01", "classKind": "chapter",
                "title": "Infections", "parent": [base], "child": [format!("{}/11", base)]
            }),
        )
        .await;
        mount(
            server,
            "/icd/release/11/2024-01/mms/2",
            serde_json::json!({
                "@id": format!("{}/2", base), "code": "02", "classKind": "chapter",
                "title": "Neoplasms", "parent": [base]
            }),
        )
        .await;
        mount(
            server,
            "/icd/release/11/2024-01/mms/11",
            serde_json::json!({
                "@id": format!("{}/11", base), "code": "1A00", "classKind": "category",
                "title": "Cholera", "parent": [format!("{}/1", base)],
                "child": [format!("{}/1", base)]
            }),
        )
        .await;
    }

    #[tokio::test]
    async fn test_crawl_in_memory() {
        let server = MockServer::start().await;
        mount_tree(&server).await;

        let (sink, collected) = MemorySink::new();
        let coordinator =
            Coordinator::new(config_for(&server, None), Box::new(sink), tokens(), RunOptions::default())
                .unwrap();
        assert_eq!(coordinator.run_id(), None);

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.records_of(Classification::Chapter), 2);
        assert_eq!(report.records_of(Classification::Subsection), 1);
        assert_eq!(report.urls_completed, 4);
        assert!(report.frontier.is_drained());

        let collected = collected.lock().unwrap();
        assert_eq!(collected.records.len(), 3);
        assert_eq!(collected.end_calls, 1);

        let mut chapter_ids: Vec<u32> = collected
            .records
            .iter()
            .filter(|r| r.classification() == Classification::Chapter)
            .map(ClassifiedRecord::id)
            .collect();
        chapter_ids.sort_unstable();
        assert_eq!(chapter_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_url_is_reported_once_limit_is_reached() {
        let server = MockServer::start().await;
        let base = format!("{}/icd/release/11/2024-01/mms", server.uri());
        mount(
            &server,
            "/icd/release/11/2024-01/mms",
            serde_json::json!({"@id": base, "child": [format!("{}/9", base)]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/icd/release/11/2024-01/mms/9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let (sink, collected) = MemorySink::new();
        let report = run_crawl(
            config_for(&server, None),
            Box::new(sink),
            tokens(),
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.validation.failed_urls.len(), 1);
        assert!(report.validation.failed_urls[0].url.ends_with("/9"));
        assert_eq!(collected.lock().unwrap().end_calls, 1);
    }

    #[tokio::test]
    async fn test_state_database_records_run() {
        let server = MockServer::start().await;
        mount_tree(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");

        let (sink, _collected) = MemorySink::new();
        let coordinator = Coordinator::new(
            config_for(&server, Some(&db)),
            Box::new(sink),
            tokens(),
            RunOptions {
                fresh: true,
                config_hash: "abc".to_string(),
            },
        )
        .unwrap();
        let run_id = coordinator.run_id().unwrap();
        coordinator.run().await.unwrap();

        let storage = SqliteStorage::new(&db).unwrap();
        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(storage.count_entities().unwrap(), 4);
        assert_eq!(storage.frontier_counts().unwrap().completed, 4);
        let counts = storage.count_assignments().unwrap();
        assert_eq!(counts.get(&Classification::Chapter), Some(&2));
    }
}
