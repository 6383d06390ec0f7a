use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::Result;

use crate::client::{DirectoryState, RemoteClient};
use crate::config::SyncConfig;
use crate::direction::TransferDirection;
use crate::gate::{GateVerdict, ThresholdGate};
use crate::probe::ReachabilityProbe;
use crate::selector::HostSelector;
use crate::session::SessionConnector;
use crate::transfer::{TransferEndpoint, TransferInvocation, TransferTool};

/// Run-level switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncOptions {
    /// Perform every check but never invoke the transfer tool.
    pub dry_run: bool,
}

/// One directory to mirror.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncTask {
    pub directory: PathBuf,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

/// State of the destination root after the resolve phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootState {
    Ready,
    /// Absent, and left absent because the run is a dry run.
    Missing,
    /// Absent and could not be created; nothing may be synced into it.
    CreationFailed,
    /// Existence could not be checked; nothing may be synced into it.
    Unverified,
}

/// What happened to one task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Transferred,
    /// Dry run: the transfer would have been invoked.
    Previewed,
    /// The threshold gate refused the task.
    Skipped { verdict: GateVerdict },
    /// The task could not be judged safely and was not attempted.
    Blocked { reason: String },
    /// The transfer tool ran and failed, or could not be launched.
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct TaskReport {
    pub task: SyncTask,
    pub destination_existed: bool,
    pub verdict: Option<GateVerdict>,
    pub command_line: String,
    pub outcome: TaskOutcome,
}

/// Summary of a sync run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub direction: TransferDirection,
    pub hostname: String,
    pub dry_run: bool,
    pub root_state: RootState,
    pub reports: Vec<TaskReport>,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn transferred(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Transferred | TaskOutcome::Previewed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped { .. } | TaskOutcome::Blocked { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }
}

/// Output of the resolve phase.
pub struct ResolvedRun {
    pub direction: TransferDirection,
    pub client: RemoteClient,
    pub root_state: RootState,
}

/// Coordinates a run: resolve, plan, execute, in that order.
pub struct SyncOrchestrator {
    config: SyncConfig,
    options: SyncOptions,
    probe: Arc<dyn ReachabilityProbe>,
    connector: Arc<dyn SessionConnector>,
    tool: Box<dyn TransferTool>,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        options: SyncOptions,
        probe: Arc<dyn ReachabilityProbe>,
        connector: Arc<dyn SessionConnector>,
        tool: Box<dyn TransferTool>,
    ) -> Self {
        Self {
            config,
            options,
            probe,
            connector,
            tool,
        }
    }

    /// Run all three phases. Fatal configuration and connectivity errors abort
    /// before any task executes; per-task problems end up in the summary.
    pub fn run(self) -> Result<RunSummary> {
        log::info!("starting sync");
        let mut resolved = self.resolve()?;
        let tasks = self.plan();
        let summary = self.execute(&mut resolved, &tasks);
        log::info!(
            "finished sync: {} transferred, {} skipped, {} failed",
            summary.transferred(),
            summary.skipped(),
            summary.failed()
        );
        Ok(summary)
    }

    /// Direction, host and destination root.
    pub fn resolve(&self) -> Result<ResolvedRun> {
        let direction = self.config.resolve_direction()?;
        self.config.validate(direction)?;
        log::info!("transfer direction: {direction}");

        let remote = self.config.remote_side(direction);
        let mut selector = HostSelector::new(Arc::clone(&self.probe), Arc::clone(&self.connector));
        let mut client = selector.select(&remote.host_list, remote.username.as_deref())?;
        log::debug!("bound client: {client:?}");

        let root_state = self.prepare_destination_root(direction, &mut client);
        Ok(ResolvedRun {
            direction,
            client,
            root_state,
        })
    }

    fn prepare_destination_root(
        &self,
        direction: TransferDirection,
        client: &mut RemoteClient,
    ) -> RootState {
        let root = self.config.destination.root_path.as_path();
        let remote = direction.destination_is_remote();
        let state = if remote {
            client.directory_state_remote(root)
        } else {
            client.directory_state_local(root)
        };
        match state {
            DirectoryState::Present => return RootState::Ready,
            DirectoryState::Unknown => {
                log::error!(
                    "could not check whether destination root {} exists; no directory will be synced",
                    root.display()
                );
                return RootState::Unverified;
            }
            DirectoryState::Absent => {}
        }
        if self.options.dry_run {
            log::info!(
                "destination root {} does not exist and would be created",
                root.display()
            );
            return RootState::Missing;
        }

        let created = if remote {
            client.create_root_directory_remote(root)
        } else {
            client.create_root_directory_local(root)
        };
        if created {
            log::info!("created destination root {}", root.display());
            RootState::Ready
        } else {
            log::error!(
                "destination root {} could not be created; no directory will be synced",
                root.display()
            );
            RootState::CreationFailed
        }
    }

    /// One task per entry of the source directory list, in order.
    pub fn plan(&self) -> Vec<SyncTask> {
        let source_root = &self.config.source.root_path;
        let destination_root = &self.config.destination.root_path;
        self.config
            .source
            .directory_list
            .iter()
            .map(|directory| SyncTask {
                directory: directory.clone(),
                source_path: source_root.join(directory),
                destination_path: destination_root.join(directory),
            })
            .collect()
    }

    /// Gate and transfer each task in order. Tasks never affect each other.
    pub fn execute(&self, resolved: &mut ResolvedRun, tasks: &[SyncTask]) -> RunSummary {
        let gate = ThresholdGate::from_config(&self.config.threshold);
        let reports = tasks
            .iter()
            .map(|task| self.execute_task(resolved, gate.as_ref(), task))
            .collect();

        RunSummary {
            direction: resolved.direction,
            hostname: resolved.client.hostname().to_string(),
            dry_run: self.options.dry_run,
            root_state: resolved.root_state,
            reports,
        }
    }

    fn invocation(&self, resolved: &ResolvedRun, task: &SyncTask) -> TransferInvocation {
        let prefix = resolved.client.remote_prefix();
        let destination_root = with_trailing_separator(&self.config.destination.root_path);
        let (source, destination) = if resolved.direction.source_is_remote() {
            (
                TransferEndpoint::Remote {
                    prefix,
                    path: task.source_path.clone(),
                },
                TransferEndpoint::Local(destination_root),
            )
        } else {
            (
                TransferEndpoint::Local(task.source_path.clone()),
                TransferEndpoint::Remote {
                    prefix,
                    path: destination_root,
                },
            )
        };
        TransferInvocation {
            source,
            destination,
            tool_dry_run: self.options.dry_run,
        }
    }

    fn execute_task(
        &self,
        resolved: &mut ResolvedRun,
        gate: Option<&ThresholdGate>,
        task: &SyncTask,
    ) -> TaskReport {
        let invocation = self.invocation(resolved, task);
        let command_line = invocation.command_line(self.tool.name());
        let mut report = TaskReport {
            task: task.clone(),
            destination_existed: false,
            verdict: None,
            command_line,
            outcome: TaskOutcome::Previewed,
        };

        let blocked_by_root = match resolved.root_state {
            RootState::CreationFailed => Some("destination root could not be created"),
            RootState::Unverified => Some("destination root could not be checked"),
            RootState::Ready | RootState::Missing => None,
        };
        if let Some(reason) = blocked_by_root {
            report.outcome = TaskOutcome::Blocked {
                reason: reason.to_string(),
            };
            return report;
        }

        let destination_state = match resolved.root_state {
            RootState::Missing => DirectoryState::Absent,
            _ if resolved.direction.destination_is_remote() => resolved
                .client
                .directory_state_remote(&task.destination_path),
            _ => resolved.client.directory_state_local(&task.destination_path),
        };
        if destination_state == DirectoryState::Unknown {
            log::warn!(
                "Warning: cannot sync {}: could not check whether {} exists",
                task.directory.display(),
                task.destination_path.display()
            );
            report.outcome = TaskOutcome::Blocked {
                reason: format!(
                    "could not check whether {} exists",
                    task.destination_path.display()
                ),
            };
            return report;
        }
        report.destination_existed = destination_state.exists();

        if let (true, Some(gate)) = (report.destination_existed, gate) {
            let verdict = match gate.evaluate(
                &mut resolved.client,
                resolved.direction,
                &task.source_path,
                &task.destination_path,
            ) {
                Ok(verdict) => verdict,
                Err(err) => {
                    log::warn!(
                        "Warning: cannot sync {}: sizes could not be compared ({err:#})",
                        task.directory.display()
                    );
                    report.outcome = TaskOutcome::Blocked {
                        reason: format!("{err:#}"),
                    };
                    return report;
                }
            };
            report.verdict = Some(verdict);

            if !verdict.permitted {
                log::warn!(
                    "Warning: cannot sync {} to {} since the remote copy is not at least {}M \
                     (remote size is {}M)",
                    task.directory.display(),
                    task.destination_path.display(),
                    verdict.required_mib(),
                    verdict.actual_mib()
                );
                report.outcome = TaskOutcome::Skipped { verdict };
                return report;
            }
            log::info!(
                "{} is at least {}M (remote size is {}M)",
                task.directory.display(),
                verdict.required_mib(),
                verdict.actual_mib()
            );
        } else if !report.destination_existed {
            log::info!(
                "{} does not exist yet; syncing without a size check",
                task.destination_path.display()
            );
        }

        if self.options.dry_run {
            log::info!("dry run, not calling: {}", report.command_line);
            report.outcome = TaskOutcome::Previewed;
            return report;
        }

        log::debug!("calling: {}", report.command_line);
        report.outcome = match self.tool.run(&invocation) {
            Ok(status) if status.success() => TaskOutcome::Transferred,
            Ok(status) => {
                let reason = match status.exit_code {
                    Some(code) => format!("{} exited with status {code}", self.tool.name()),
                    None => format!("{} was terminated by a signal", self.tool.name()),
                };
                log::error!("{}: {reason}", task.directory.display());
                TaskOutcome::Failed { reason }
            }
            Err(err) => {
                log::error!("{}: {err:#}", task.directory.display());
                TaskOutcome::Failed {
                    reason: format!("{err:#}"),
                }
            }
        };
        report
    }
}

/// `root` with a trailing separator, so rsync places `SRC/<dir>` at `root/<dir>`.
fn with_trailing_separator(root: &Path) -> PathBuf {
    root.join("")
}
