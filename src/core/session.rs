//! # Run Pipeline Module / 运行流水线模块
//!
//! `RunSession` drives one run through its stages:
//!
//! `Init → Delay → StartHooks → PreProcesses → LocalTests → RemoteTests → Summary → Teardown`
//!
//! A failing stage skips the ones after it, but `Teardown` always runs: relay
//! messages are flushed, capture is uninstalled and every process started by
//! the run is killed. Test failures are recorded, never raised.
//!
//! `RunSession` 驱动一次运行经过各个阶段。某个阶段失败会跳过后续阶段，
//! 但 `Teardown` 总会执行。测试失败只会被记录，不会作为错误抛出。

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

use crate::core::config::{RunOptions, Wait};
use crate::core::error::{Error, Result, RunFailure};
use crate::core::execution;
use crate::core::models::{DRIVER_EXECUTOR, OutputMessage, RunResult, SERVER_EXECUTOR};
use crate::core::output::OutputAggregator;
use crate::core::registry::{Filters, Registry, Selector};
use crate::infra::capture;
use crate::infra::command::ProcessGroup;
use crate::remote::browser;
use crate::remote::relay::{RelayClient, RelayTarget};

const SUBSCRIBER_CAPACITY: usize = 1024;
const HEADER_RULE: &str = "====================================================";
const SUMMARY_RULE: &str = "----------------------------------------------------";

/// One run of a registry.
///
/// ```no_run
/// # async fn demo() -> Result<(), crosstest::RunFailure> {
/// use crosstest::{Registry, RunOptions, RunSession};
///
/// let registry = Registry::new();
/// registry
///     .register_named("adds", |ctx| async move { ctx.equal(1 + 1, 2) })
///     .expect("unique name");
/// let result = RunSession::new(&registry, RunOptions::default()).run().await?;
/// assert_eq!(result.test_count, 1);
/// # Ok(())
/// # }
/// ```
pub struct RunSession<'r> {
    registry: &'r Registry,
    options: RunOptions,
    delay: Option<Wait>,
    relay: Option<RelayTarget>,
    cancel: CancellationToken,
    subscribers: broadcast::Sender<OutputMessage>,
}

impl<'r> RunSession<'r> {
    pub fn new(registry: &'r Registry, options: RunOptions) -> Self {
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            registry,
            options,
            delay: None,
            relay: None,
            cancel: CancellationToken::new(),
            subscribers,
        }
    }

    /// Waits before anything else happens.
    pub fn with_delay(mut self, wait: Option<Wait>) -> Self {
        self.delay = wait;
        self
    }

    /// Relays every output line to a coordinator. The run then executes as
    /// the remote driver: its executor tag is `driver` and it has no remote
    /// stage of its own.
    pub fn with_relay(mut self, target: RelayTarget) -> Self {
        self.relay = Some(target);
        self
    }

    /// Cancelling `token` stops the run at the next suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receives every output line of the run.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputMessage> {
        self.subscribers.subscribe()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn executor(&self) -> &'static str {
        if self.relay.is_some() {
            DRIVER_EXECUTOR
        } else {
            SERVER_EXECUTOR
        }
    }

    /// Runs every stage and returns the aggregated result.
    ///
    /// Runs on the same registry are serialized.
    pub async fn run(self) -> std::result::Result<RunResult, RunFailure> {
        let _exclusive = self.registry.run_lock.lock().await;

        let relay = self.relay.clone().map(RelayClient::start);
        let output = Arc::new(OutputAggregator::new(
            self.executor(),
            &self.options,
            Some(self.subscribers.clone()),
            relay,
        ));
        let mut processes = ProcessGroup::new(output.clone());

        let stages = self
            .stages(&output, &mut processes)
            .with_subscriber(capture::run_dispatch(output.clone()));
        let outcome = tokio::select! {
            outcome = stages => outcome,
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
        };

        // Teardown
        if outcome.is_err() {
            output.discard_test();
        }
        output.flush_relay().await;
        output.uninstall();
        processes.kill_all().await;

        let result = output.take_result();
        match outcome {
            Ok(()) => Ok(result),
            Err(error) => Err(RunFailure::new(error, result)),
        }
    }

    async fn stages(&self, output: &Arc<OutputAggregator>, processes: &mut ProcessGroup) -> Result<()> {
        // Init
        self.options.validate()?;
        self.registry.include(&self.options.include)?;
        let filters = self.options.filters();

        // Delay
        if let Some(wait) = &self.delay {
            self.wait(wait).await?;
        }

        // StartHooks
        output.install();
        self.log_header(output, &filters);

        // PreProcesses
        for spec in self
            .options
            .processes
            .iter()
            .filter(|p| p.is_selected_by(&filters))
        {
            processes.start(spec).await?;
        }

        // LocalTests
        if self.options.enable_local_tests {
            execution::run_local_tests(self.registry, &filters, output, self.options.timeout())
                .await;
        }

        // RemoteTests
        if self.relay.is_none() && self.options.runs_web_tests() {
            browser::run_web_tests(&self.options, &filters, output).await?;
        }

        // Summary
        log_summary(output);
        Ok(())
    }

    async fn wait(&self, wait: &Wait) -> Result<()> {
        match wait {
            Wait::Millis(ms) => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
            }
            Wait::Hook(name) => {
                let hook = self
                    .registry
                    .hook(name)
                    .ok_or_else(|| Error::UnknownHook(name.clone()))?;
                hook().await;
            }
        }
        Ok(())
    }

    fn log_header(&self, output: &OutputAggregator, filters: &Filters) {
        let names = |s: &Option<Selector>| s.as_ref().map_or_else(|| "*".to_string(), Selector::to_string);
        output.log(HEADER_RULE);
        if self.relay.is_some() {
            output.log("Start testing");
        } else {
            output.log("Start testing on the server side...");
        }
        output.log(format!("Parts:  {}", names(&filters.parts)));
        output.log(format!("Groups: {}", names(&filters.groups)));
        output.log(format!("Tests:  {}", names(&filters.tests)));
    }
}

fn log_summary(output: &OutputAggregator) {
    let result = output.snapshot();
    let failed: Vec<String> = result
        .failed_tests()
        .map(|t| format!("Executor {}:  {}", t.executor, t.key()))
        .collect();

    output.log("");
    output.log(SUMMARY_RULE);
    output.log(format!(
        "{} test{} have been completed.",
        result.test_count,
        if result.test_count == 1 { "" } else { "s" }
    ));
    output.log(format!(
        "Errors: {}; Successfully: {}; Total: {}",
        result.error_count, result.successful_count, result.test_count
    ));
    if !failed.is_empty() {
        output.log(format!("Tests that failed: \n{}", failed.join(";\n")));
    }
}

impl Registry {
    /// Runs this registry with `options`. Shorthand for `RunSession::new(..).run()`.
    pub async fn run(&self, options: RunOptions) -> std::result::Result<RunResult, RunFailure> {
        RunSession::new(self, options).run().await
    }
}
