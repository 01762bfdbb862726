//! Runs a built file in a child process and restarts it on every call.
//!
//! Each [`ProcessRunner::run`] kills the previous child (if any) before spawning
//! a new one, so calling it after every successful build gives hot-restart
//! behaviour. While a child is alive the runner holds one SIGINT and one SIGTERM
//! listener that kill the child.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Weak};

use kiln_config::{validate_run, RunOptions};
use parking_lot::Mutex;

use crate::error::{DevError, Result};
use crate::signals::{self, ListenerId, Signal, SignalRegistry};

/// Program and arguments of a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Command line for `options`.
    ///
    /// `interpreter [--inspect=host:port] file args...`, or `ndb file args...` when
    /// the inspector is enabled with `ndb`.
    pub fn for_options(options: &RunOptions) -> Self {
        let file = options.file.to_string_lossy().into_owned();

        if options.inspect.enabled && options.inspect.ndb {
            let mut args = vec![file];
            args.extend(options.args.iter().cloned());
            return Self {
                program: "ndb".to_string(),
                args,
            };
        }

        let mut args = Vec::with_capacity(options.args.len() + 2);
        if options.inspect.enabled {
            args.push(options.inspect.flag());
        }
        args.push(file);
        args.extend(options.args.iter().cloned());

        Self {
            program: options.interpreter.clone(),
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A running child process.
pub trait ChildHandle: Send + Sync {
    fn id(&self) -> Option<u32>;

    /// Ask the child to terminate without waiting for it.
    fn kill(&mut self) -> std::io::Result<()>;
}

/// Starts child processes. Swapped out in tests.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ChildHandle>>;
}

/// Spawns real processes with `tokio::process`, inheriting stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

struct TokioChild(tokio::process::Child);

impl ChildHandle for TokioChild {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.0.start_kill()
    }
}

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ChildHandle>> {
        let child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DevError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        Ok(Box::new(TokioChild(child)))
    }
}

/// Lifecycle callback receiving the runner.
pub type RunnerCallback = Arc<dyn Fn(&ProcessRunner) + Send + Sync>;

struct ActiveChild {
    child: Box<dyn ChildHandle>,
    listeners: [ListenerId; 2],
}

struct RunnerInner {
    options: RunOptions,
    spawner: Arc<dyn ProcessSpawner>,
    signals: SignalRegistry,
    active: Mutex<Option<ActiveChild>>,
    on_start: Option<RunnerCallback>,
    on_stop: Option<RunnerCallback>,
}

/// Hot-restarting process runner. Clones share the same child slot.
#[derive(Clone)]
pub struct ProcessRunner {
    inner: Arc<RunnerInner>,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("file", &self.inner.options.file)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Builder for [`ProcessRunner`].
pub struct ProcessRunnerBuilder {
    options: RunOptions,
    spawner: Arc<dyn ProcessSpawner>,
    signals: Option<SignalRegistry>,
    on_start: Option<RunnerCallback>,
    on_stop: Option<RunnerCallback>,
}

impl ProcessRunnerBuilder {
    pub fn spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn signals(mut self, signals: SignalRegistry) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn on_start(mut self, callback: impl Fn(&ProcessRunner) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_stop(mut self, callback: impl Fn(&ProcessRunner) + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(callback));
        self
    }

    /// # Errors
    ///
    /// Returns [`DevError::Config`] when the options are invalid.
    pub fn build(self) -> Result<ProcessRunner> {
        validate_run(&self.options)?;

        Ok(ProcessRunner {
            inner: Arc::new(RunnerInner {
                options: self.options,
                spawner: self.spawner,
                signals: self.signals.unwrap_or_default(),
                active: Mutex::new(None),
                on_start: self.on_start,
                on_stop: self.on_stop,
            }),
        })
    }
}

impl ProcessRunner {
    pub fn builder(options: RunOptions) -> ProcessRunnerBuilder {
        ProcessRunnerBuilder {
            options,
            spawner: Arc::new(TokioSpawner),
            signals: None,
            on_start: None,
            on_stop: None,
        }
    }

    /// Runner with the default spawner and OS signal delivery.
    pub fn new(options: RunOptions) -> Result<Self> {
        Self::builder(options).build()
    }

    pub fn options(&self) -> &RunOptions {
        &self.inner.options
    }

    pub fn file(&self) -> &Path {
        &self.inner.options.file
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    /// Process id of the current child.
    pub fn pid(&self) -> Option<u32> {
        self.inner
            .active
            .lock()
            .as_ref()
            .and_then(|active| active.child.id())
    }

    /// (Re)start the child process.
    ///
    /// # Errors
    ///
    /// Returns [`DevError::FileNotFound`] without touching a running child if the
    /// file is missing, and [`DevError::Spawn`] if the process cannot start.
    pub fn run(&self) -> Result<()> {
        let file = &self.inner.options.file;
        if !file.exists() {
            return Err(DevError::FileNotFound(file.clone()));
        }

        if self.stop_active() {
            tracing::info!("restarting {}", file.display());
        }

        let command = CommandLine::for_options(&self.inner.options);
        tracing::debug!("spawning `{command}`");
        let child = self.inner.spawner.spawn(&command)?;

        let listeners = Signal::ALL.map(|signal| {
            let runner = Arc::downgrade(&self.inner);
            self.inner.signals.register(
                signal,
                signals::handler(move || {
                    let runner = runner.clone();
                    async move { kill_on_signal(&runner, signal) }
                }),
            )
        });

        // An overlapping run may have stored its child since stop_active
        let replaced = self
            .inner
            .active
            .lock()
            .replace(ActiveChild { child, listeners });
        if let Some(replaced) = replaced {
            tracing::debug!(pid = ?replaced.child.id(), "replacing child from overlapping run");
            terminate(&self.inner.signals, replaced);
            if let Some(on_stop) = &self.inner.on_stop {
                on_stop(self);
            }
        }

        if let Some(on_start) = &self.inner.on_start {
            on_start(self);
        }
        Ok(())
    }

    /// Kill the current child, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        self.stop_active()
    }

    fn stop_active(&self) -> bool {
        let Some(active) = self.inner.active.lock().take() else {
            return false;
        };

        tracing::debug!(pid = ?active.child.id(), "stopping child process");
        terminate(&self.inner.signals, active);

        if let Some(on_stop) = &self.inner.on_stop {
            on_stop(self);
        }
        true
    }
}

fn terminate(signals: &SignalRegistry, mut active: ActiveChild) {
    if let Err(e) = active.child.kill() {
        tracing::warn!(error = %e, "failed to kill child process");
    }
    for id in active.listeners {
        signals.deregister(id);
    }
}

fn kill_on_signal(runner: &Weak<RunnerInner>, signal: Signal) {
    let Some(inner) = runner.upgrade() else {
        return;
    };
    let Some(active) = inner.active.lock().take() else {
        return;
    };
    tracing::info!(%signal, pid = ?active.child.id(), "killing child process");
    terminate(&inner.signals, active);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::InspectCommand;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSpawner {
        spawned: Mutex<Vec<CommandLine>>,
        kills: Arc<AtomicUsize>,
    }

    struct FakeChild {
        pid: u32,
        kills: Arc<AtomicUsize>,
    }

    impl ChildHandle for FakeChild {
        fn id(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn kill(&mut self) -> std::io::Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ChildHandle>> {
            let mut spawned = self.spawned.lock();
            spawned.push(command.clone());
            Ok(Box::new(FakeChild {
                pid: 1000 + spawned.len() as u32,
                kills: self.kills.clone(),
            }))
        }
    }

    struct Fixture {
        _dir: TempDir,
        runner: ProcessRunner,
        spawner: Arc<FakeSpawner>,
        signals: SignalRegistry,
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    fn fixture(configure: impl FnOnce(&mut RunOptions)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("index.js");
        std::fs::write(&file, "console.log('hi')").unwrap();

        let mut options = RunOptions::for_file(&file);
        configure(&mut options);

        let spawner = Arc::new(FakeSpawner::default());
        let signals = SignalRegistry::manual();
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let runner = {
            let starts = starts.clone();
            let stops = stops.clone();
            ProcessRunner::builder(options)
                .spawner(spawner.clone())
                .signals(signals.clone())
                .on_start(move |_| {
                    starts.fetch_add(1, Ordering::SeqCst);
                })
                .on_stop(move |_| {
                    stops.fetch_add(1, Ordering::SeqCst);
                })
                .build()
                .unwrap()
        };

        Fixture {
            _dir: dir,
            runner,
            spawner,
            signals,
            starts,
            stops,
        }
    }

    #[test]
    fn test_command_line_plain() {
        let mut options = RunOptions::for_file("dist/index.js");
        options.args = vec!["--port".to_string(), "3000".to_string()];
        let command = CommandLine::for_options(&options);
        assert_eq!(command.program, "node");
        assert_eq!(command.args, vec!["dist/index.js", "--port", "3000"]);
        assert_eq!(command.to_string(), "node dist/index.js --port 3000");
    }

    #[test]
    fn test_command_line_with_inspector() {
        let mut options = RunOptions::for_file("dist/index.js");
        options.inspect.enabled = true;
        options.inspect.command = InspectCommand::InspectBrk;
        let command = CommandLine::for_options(&options);
        assert_eq!(
            command.args,
            vec!["--inspect-brk=0.0.0.0:9229", "dist/index.js"]
        );
    }

    #[test]
    fn test_command_line_with_ndb() {
        let mut options = RunOptions::for_file("dist/index.js");
        options.inspect.enabled = true;
        options.inspect.ndb = true;
        options.args = vec!["--verbose".to_string()];
        let command = CommandLine::for_options(&options);
        assert_eq!(command.program, "ndb");
        assert_eq!(command.args, vec!["dist/index.js", "--verbose"]);
    }

    #[test]
    fn test_missing_file_fails_before_spawn() {
        let spawner = Arc::new(FakeSpawner::default());
        let runner = ProcessRunner::builder(RunOptions::for_file("/no/such/file.js"))
            .spawner(spawner.clone())
            .signals(SignalRegistry::manual())
            .build()
            .unwrap();

        assert!(matches!(runner.run(), Err(DevError::FileNotFound(_))));
        assert!(spawner.spawned.lock().is_empty());
        assert!(!runner.is_running());
    }

    #[test]
    fn test_invalid_options_fail_at_construction() {
        assert!(matches!(
            ProcessRunner::new(RunOptions::default()),
            Err(DevError::Config(_))
        ));
    }

    #[test]
    fn test_run_registers_two_listeners() {
        let f = fixture(|_| {});
        f.runner.run().unwrap();

        assert!(f.runner.is_running());
        assert_eq!(f.runner.pid(), Some(1001));
        assert_eq!(f.signals.count_for(Signal::Interrupt), 1);
        assert_eq!(f.signals.count_for(Signal::Terminate), 1);
        assert_eq!(f.starts.load(Ordering::SeqCst), 1);
        assert_eq!(f.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rerun_restarts_child() {
        let f = fixture(|_| {});
        f.runner.run().unwrap();
        f.runner.run().unwrap();
        f.runner.run().unwrap();

        assert_eq!(f.spawner.spawned.lock().len(), 3);
        assert_eq!(f.spawner.kills.load(Ordering::SeqCst), 2);
        assert_eq!(f.stops.load(Ordering::SeqCst), 2);
        assert_eq!(f.starts.load(Ordering::SeqCst), 3);
        // Only the live child's listeners remain
        assert_eq!(f.signals.registered_count(), 2);
        assert_eq!(f.signals.total_registrations(), 6);
    }

    #[tokio::test]
    async fn test_signal_kills_child_without_restart() {
        let f = fixture(|_| {});
        f.runner.run().unwrap();

        f.signals.trigger(Signal::Terminate).await;

        assert!(!f.runner.is_running());
        assert_eq!(f.spawner.kills.load(Ordering::SeqCst), 1);
        assert_eq!(f.signals.registered_count(), 0);

        // The matching SIGINT listener is gone too, so nothing else fires
        f.signals.trigger(Signal::Interrupt).await;
        assert_eq!(f.spawner.kills.load(Ordering::SeqCst), 1);
    }

    /// Starts a second run of the same runner from inside the first spawn.
    struct OverlappingSpawner {
        spawner: FakeSpawner,
        runner: Mutex<Option<ProcessRunner>>,
    }

    impl ProcessSpawner for OverlappingSpawner {
        fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ChildHandle>> {
            let child = self.spawner.spawn(command)?;
            let runner = self.runner.lock().take();
            if let Some(runner) = runner {
                runner.run()?;
            }
            Ok(child)
        }
    }

    #[test]
    fn test_overlapping_runs_keep_one_child() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("index.js");
        std::fs::write(&file, "").unwrap();

        let spawner = Arc::new(OverlappingSpawner {
            spawner: FakeSpawner::default(),
            runner: Mutex::new(None),
        });
        let signals = SignalRegistry::manual();
        let runner = ProcessRunner::builder(RunOptions::for_file(&file))
            .spawner(spawner.clone())
            .signals(signals.clone())
            .build()
            .unwrap();
        *spawner.runner.lock() = Some(runner.clone());

        runner.run().unwrap();

        assert_eq!(spawner.spawner.spawned.lock().len(), 2);
        assert_eq!(spawner.spawner.kills.load(Ordering::SeqCst), 1);
        assert_eq!(runner.pid(), Some(1001));
        assert_eq!(signals.registered_count(), 2);
        assert_eq!(signals.total_registrations(), 4);
    }

    #[test]
    fn test_stop_without_child_is_noop() {
        let f = fixture(|_| {});
        assert!(!f.runner.stop());
        assert_eq!(f.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_inspector_flag_reaches_spawner() {
        let f = fixture(|options| {
            options.inspect.enabled = true;
            options.inspect.port = 9230;
        });
        f.runner.run().unwrap();

        let spawned = f.spawner.spawned.lock();
        assert_eq!(spawned[0].args[0], "--inspect=0.0.0.0:9230");
    }
}
