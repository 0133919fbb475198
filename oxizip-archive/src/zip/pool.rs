//! Worker pool running entry pipelines off the calling thread.
//!
//! A worker owns at most one [`Pipeline`] at a time. The caller leases a
//! worker through [`WorkerPool::start`], then feeds it one chunk at a time:
//! every chunk waits for its `Processed` reply before the next is sent, so a
//! slow consumer never lets input pile up. Idle workers retire after
//! [`PoolConfig::idle_timeout`]. Whenever a worker cannot be had (pool
//! disabled, thread spawn refused, hand-off failed) the task runs in the
//! calling thread instead, with identical results.

use super::codec::{Pipeline, PipelineOutcome};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use oxizip_core::abort::AbortSignal;
use oxizip_core::error::{OxiZipError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Use worker threads at all.
    pub enabled: bool,
    /// Upper bound on live workers.
    pub max_workers: usize,
    /// How long an idle worker lingers.
    pub idle_timeout: Duration,
    /// Bytes handed to a worker per message.
    pub chunk_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: num_cpus::get().max(1),
            idle_timeout: Duration::from_secs(5),
            chunk_size: 512 * 1024,
        }
    }
}

impl PoolConfig {
    /// Enable or disable workers.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Cap the number of workers.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

enum Command {
    Start(Pipeline),
    Chunk(Vec<u8>),
    Finish,
    Cancel,
}

enum Reply {
    Processed(Result<Vec<u8>>),
    Finished(Result<(Vec<u8>, PipelineOutcome)>),
}

struct WorkerHandle {
    id: usize,
    commands: Sender<Command>,
    replies: Receiver<Reply>,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<WorkerHandle>,
    live: usize,
    next_id: usize,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // State stays consistent across a panicking holder
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn give_back(&self, handle: WorkerHandle) {
        let mut state = self.lock();
        if !state.shutdown {
            state.idle.push(handle);
        }
        drop(state);
        self.returned.notify_one();
    }

    /// Retire an idle worker; false if it was leased in the meantime.
    fn retire(&self, id: usize) -> bool {
        let mut state = self.lock();
        match state.idle.iter().position(|h| h.id == id) {
            Some(index) => {
                state.idle.swap_remove(index);
                true
            }
            None => state.shutdown,
        }
    }
}

/// Decrements the live count however the worker thread ends.
struct LiveGuard {
    shared: Arc<Shared>,
    id: usize,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.live -= 1;
        if let Some(index) = state.idle.iter().position(|h| h.id == self.id) {
            state.idle.swap_remove(index);
        }
        drop(state);
        self.shared.returned.notify_one();
        trace!(worker = self.id, "worker exited");
    }
}

fn worker_loop(
    commands: Receiver<Command>,
    replies: Sender<Reply>,
    guard: LiveGuard,
    idle_timeout: Duration,
) {
    let mut pipeline: Option<Pipeline> = None;
    loop {
        let command = if pipeline.is_some() {
            commands.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            commands.recv_timeout(idle_timeout)
        };
        match command {
            Err(RecvTimeoutError::Timeout) => {
                if guard.shared.retire(guard.id) {
                    debug!(worker = guard.id, "idle worker retiring");
                    break;
                }
                // Leased while timing out: a Start is on its way
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Ok(Command::Start(p)) => pipeline = Some(p),
            Ok(Command::Chunk(data)) => {
                let result = match pipeline.as_mut() {
                    Some(p) => p.push(&data),
                    None => Err(OxiZipError::worker_failed("chunk sent before start")),
                };
                if replies.send(Reply::Processed(result)).is_err() {
                    break;
                }
            }
            Ok(Command::Finish) => {
                let result = match pipeline.take() {
                    Some(mut p) => p.finish(),
                    None => Err(OxiZipError::worker_failed("finish sent before start")),
                };
                if replies.send(Reply::Finished(result)).is_err() {
                    break;
                }
            }
            Ok(Command::Cancel) => pipeline = None,
        }
    }
}

/// Pool of pipeline workers, shared through an `Arc`.
pub struct WorkerPool {
    config: PoolConfig,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool; no thread starts until the first task.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Pool settings.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Workers currently alive (idle or busy).
    pub fn live_workers(&self) -> usize {
        self.shared.lock().live
    }

    /// Workers waiting for work.
    pub fn idle_workers(&self) -> usize {
        self.shared.lock().idle.len()
    }

    /// Run `pipeline` on a worker, or in this thread if none can be had.
    ///
    /// Blocks while all `max_workers` workers are leased.
    pub fn start(&self, pipeline: Pipeline) -> EntryTask {
        if !self.config.enabled {
            return EntryTask::inline(pipeline);
        }
        let Some(handle) = self.lease() else {
            return EntryTask::inline(pipeline);
        };
        match handle.commands.send(Command::Start(pipeline)) {
            Ok(()) => EntryTask {
                inner: TaskInner::Remote {
                    worker: Some(handle),
                    shared: Arc::clone(&self.shared),
                },
                abort: None,
            },
            Err(crossbeam_channel::SendError(Command::Start(pipeline))) => {
                warn!(worker = handle.id, "worker hand-off failed, running in-thread");
                EntryTask::inline(pipeline)
            }
            Err(_) => unreachable!("only Start was sent"),
        }
    }

    fn lease(&self) -> Option<WorkerHandle> {
        let mut state = self.shared.lock();
        loop {
            if let Some(handle) = state.idle.pop() {
                return Some(handle);
            }
            if state.live < self.config.max_workers {
                state.live += 1;
                let id = state.next_id;
                state.next_id += 1;
                drop(state);
                return self.spawn(id);
            }
            state = self
                .shared
                .returned
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn spawn(&self, id: usize) -> Option<WorkerHandle> {
        let (command_tx, command_rx) = bounded(1);
        let (reply_tx, reply_rx) = bounded(1);
        let guard = LiveGuard {
            shared: Arc::clone(&self.shared),
            id,
        };
        let idle_timeout = self.config.idle_timeout;
        let spawned = thread::Builder::new()
            .name(format!("oxizip-worker-{}", id))
            .spawn(move || worker_loop(command_rx, reply_tx, guard, idle_timeout));
        match spawned {
            Ok(_) => {
                debug!(worker = id, "worker started");
                Some(WorkerHandle {
                    id,
                    commands: command_tx,
                    replies: reply_rx,
                })
            }
            Err(e) => {
                // The guard moved into the failed closure and already ran
                warn!(error = %e, "worker spawn failed, running in-thread");
                None
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.shutdown = true;
        // Dropping the senders disconnects idle workers
        state.idle.clear();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("live", &self.live_workers())
            .finish()
    }
}

enum TaskInner {
    Inline(Pipeline),
    Remote {
        worker: Option<WorkerHandle>,
        shared: Arc<Shared>,
    },
}

/// One entry's pipeline, running on a worker or inline.
pub struct EntryTask {
    inner: TaskInner,
    abort: Option<AbortSignal>,
}

impl EntryTask {
    /// Run in the calling thread.
    pub fn inline(pipeline: Pipeline) -> Self {
        Self {
            inner: TaskInner::Inline(pipeline),
            abort: None,
        }
    }

    /// Start `pipeline` on `pool` when given, inline otherwise.
    pub fn start(pool: Option<&WorkerPool>, pipeline: Pipeline) -> Self {
        match pool {
            Some(pool) => pool.start(pipeline),
            None => Self::inline(pipeline),
        }
    }

    /// Check `abort` before every chunk.
    pub fn with_abort(mut self, abort: Option<AbortSignal>) -> Self {
        self.abort = abort;
        self
    }

    /// True when running on a worker thread.
    pub fn is_remote(&self) -> bool {
        matches!(self.inner, TaskInner::Remote { .. })
    }

    fn check_abort(&self) -> Result<()> {
        match &self.abort {
            Some(abort) => abort.check(),
            None => Ok(()),
        }
    }

    /// Send one chunk and wait for its output.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        self.check_abort()?;
        match &mut self.inner {
            TaskInner::Inline(pipeline) => pipeline.push(chunk),
            TaskInner::Remote { worker, .. } => {
                let worker = worker.as_ref().ok_or(OxiZipError::ArchiveClosed)?;
                worker
                    .commands
                    .send(Command::Chunk(chunk.to_vec()))
                    .map_err(|_| OxiZipError::worker_failed("worker gone before chunk"))?;
                match worker.replies.recv() {
                    Ok(Reply::Processed(result)) => result,
                    Ok(Reply::Finished(_)) => Err(OxiZipError::worker_failed("out of order reply")),
                    Err(_) => Err(OxiZipError::worker_failed("worker died mid-chunk")),
                }
            }
        }
    }

    /// Flush the pipeline and release the worker.
    pub fn finish(mut self) -> Result<(Vec<u8>, PipelineOutcome)> {
        self.check_abort()?;
        match &mut self.inner {
            TaskInner::Inline(pipeline) => pipeline.finish(),
            TaskInner::Remote { worker, shared } => {
                let handle = worker.take().ok_or(OxiZipError::ArchiveClosed)?;
                handle
                    .commands
                    .send(Command::Finish)
                    .map_err(|_| OxiZipError::worker_failed("worker gone before finish"))?;
                let reply = handle.replies.recv();
                match reply {
                    Ok(Reply::Finished(result)) => {
                        shared.give_back(handle);
                        result
                    }
                    Ok(Reply::Processed(_)) => Err(OxiZipError::worker_failed("out of order reply")),
                    Err(_) => Err(OxiZipError::worker_failed("worker died during finish")),
                }
            }
        }
    }
}

impl Drop for EntryTask {
    fn drop(&mut self) {
        if let TaskInner::Remote { worker, shared } = &mut self.inner {
            if let Some(handle) = worker.take() {
                // Unfinished: drop the pipeline but keep the worker
                if handle.commands.send(Command::Cancel).is_ok() {
                    shared.give_back(handle);
                }
            }
        }
    }
}

impl std::fmt::Debug for EntryTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryTask")
            .field("remote", &self.is_remote())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::codec::{CodecOptions, Pipeline, PipelineStats};
    use oxizip_core::entry::CompressionMethod;
    use std::time::Instant;

    fn deflate_pipeline() -> Pipeline {
        Pipeline::for_write(&CodecOptions {
            method: CompressionMethod::Deflate,
            level: 6,
            ..Default::default()
        })
        .unwrap()
    }

    fn run(task: &mut EntryTask, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(4096) {
            out.extend(task.push(chunk).unwrap());
        }
        out
    }

    fn stats(outcome: PipelineOutcome) -> PipelineStats {
        match outcome {
            PipelineOutcome::Completed(stats) => stats,
            PipelineOutcome::PasswordVerified => panic!("unexpected outcome"),
        }
    }

    #[test]
    fn test_remote_matches_inline() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 97) as u8).collect();
        let pool = WorkerPool::new(PoolConfig::default().with_max_workers(2));

        let mut remote = pool.start(deflate_pipeline());
        assert!(remote.is_remote());
        let mut a = run(&mut remote, &data);
        let (tail, outcome) = remote.finish().unwrap();
        a.extend(tail);

        let mut inline = EntryTask::inline(deflate_pipeline());
        let mut b = run(&mut inline, &data);
        let (tail, inline_outcome) = inline.finish().unwrap();
        b.extend(tail);

        assert_eq!(a, b);
        assert_eq!(stats(outcome), stats(inline_outcome));
        assert_eq!(oxizip_deflate::inflate(&a).unwrap(), data);
        assert_eq!(pool.idle_workers(), 1);
    }

    #[test]
    fn test_disabled_pool_runs_inline() {
        let pool = WorkerPool::new(PoolConfig::default().with_enabled(false));
        let task = pool.start(deflate_pipeline());
        assert!(!task.is_remote());
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_bounded_workers_under_contention() {
        let pool = WorkerPool::new(PoolConfig::default().with_max_workers(2));
        let data = vec![7u8; 50_000];
        thread::scope(|scope| {
            for _ in 0..6 {
                scope.spawn(|| {
                    let mut task = pool.start(deflate_pipeline());
                    let mut out = run(&mut task, &data);
                    let (tail, _) = task.finish().unwrap();
                    out.extend(tail);
                    assert_eq!(oxizip_deflate::inflate(&out).unwrap(), data);
                    assert!(pool.live_workers() <= 2);
                });
            }
        });
        assert!(pool.live_workers() <= 2);
    }

    #[test]
    fn test_idle_workers_retire() {
        let pool = WorkerPool::new(
            PoolConfig::default()
                .with_max_workers(1)
                .with_idle_timeout(Duration::from_millis(30)),
        );
        let task = pool.start(deflate_pipeline());
        task.finish().unwrap();
        assert_eq!(pool.live_workers(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.live_workers() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.live_workers(), 0);

        // A retired pool spawns again on demand
        let task = pool.start(deflate_pipeline());
        assert!(task.is_remote());
        task.finish().unwrap();
    }

    #[test]
    fn test_dropped_task_returns_worker() {
        let pool = WorkerPool::new(PoolConfig::default().with_max_workers(1));
        let mut task = pool.start(deflate_pipeline());
        task.push(b"partial").unwrap();
        drop(task);
        assert_eq!(pool.idle_workers(), 1);

        // The single worker is reusable, so this does not block
        let task = pool.start(deflate_pipeline());
        let (out, _) = task.finish().unwrap();
        assert_eq!(oxizip_deflate::inflate(&out).unwrap(), b"");
    }

    #[test]
    fn test_abort_before_chunk() {
        let pool = WorkerPool::new(PoolConfig::default());
        let abort = AbortSignal::new();
        let mut task = pool.start(deflate_pipeline()).with_abort(Some(abort.clone()));
        task.push(b"abc").unwrap();
        abort.abort();
        assert!(matches!(task.push(b"def"), Err(OxiZipError::Aborted)));
        drop(task);
        assert_eq!(pool.idle_workers(), 1);
    }
}
