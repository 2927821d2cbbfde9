//! Task pipelines.
//!
//! A [`Task`] starts from a factory producing the first [`Step`], chains any
//! number of `then` stages that each turn the previous result into the next
//! step, and ends in `finally` on success or `catch` on the first failure.
//! A failing stage short-circuits everything after it.

use futures::future::LocalBoxFuture;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use tether_core::{Device, ExecError, ExecResult, ExecutionStatus, Request, Status};
use thiserror::Error;
use tokio::sync::oneshot;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The device refused the operation synchronously.
    #[error("device '{device}' rejected the request{}", detail(.error))]
    Rejected {
        device: String,
        error: Option<ExecError>,
    },

    #[error("execution failed: {0}")]
    Execution(ExecError),

    /// Raised by a stage.
    #[error("{0}")]
    Raised(String),

    #[error("device dropped the callback without completing")]
    Abandoned,
}

fn detail(error: &Option<ExecError>) -> String {
    match error {
        Some(error) => format!(": {}", error.message()),
        None => String::new(),
    }
}

impl TaskError {
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised(message.into())
    }

    /// The envelope error behind this failure, when a device produced one.
    pub fn exec_error(&self) -> Option<&ExecError> {
        match self {
            TaskError::Rejected { error, .. } => error.as_ref(),
            TaskError::Execution(error) => Some(error),
            _ => None,
        }
    }
}

/// The asynchronous object a stage hands back.
pub enum Step {
    /// Connect `device` when needed, then execute `request` on it.
    Execute {
        device: Rc<dyn Device>,
        request: Request,
    },
    Ready(ExecResult),
    Future(LocalBoxFuture<'static, TaskResult<ExecResult>>),
}

impl Step {
    pub fn execute(device: Rc<dyn Device>, request: Request) -> Self {
        Step::Execute { device, request }
    }

    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = TaskResult<ExecResult>> + 'static,
    {
        Step::Future(Box::pin(future))
    }

    pub async fn resolve(self) -> TaskResult<ExecResult> {
        match self {
            Step::Execute { device, request } => run_on_device(device.as_ref(), &request).await,
            Step::Ready(result) => Ok(result),
            Step::Future(future) => future.await,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Execute { device, request } => f
                .debug_struct("Execute")
                .field("device", &device.label())
                .field("target", &request.target())
                .finish(),
            Step::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Step::Future(_) => f.write_str("Future"),
        }
    }
}

async fn run_on_device(device: &dyn Device, request: &Request) -> TaskResult<ExecResult> {
    let recorded = device.errors_recorded();
    let (connected_tx, connected_rx) = oneshot::channel();
    let status = device.connect(Box::new(move |outcome| {
        let _ = connected_tx.send(outcome);
    }));
    match status {
        Status::Nop => {}
        Status::Async => match connected_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(TaskError::Execution(error)),
            Err(_) => return Err(TaskError::Abandoned),
        },
        Status::Error => return Err(rejected(device, recorded)),
    }

    let recorded = device.errors_recorded();
    let (executed_tx, executed_rx) = oneshot::channel();
    let status = device.execute(
        Box::new(move |status, result| {
            let _ = executed_tx.send((status, result));
        }),
        request,
    );
    if status == Status::Error {
        return Err(rejected(device, recorded));
    }
    match executed_rx.await {
        Ok((ExecutionStatus::Ok, result)) => Ok(result),
        Ok((ExecutionStatus::Error, result)) => {
            let error = result
                .error()
                .cloned()
                .unwrap_or_else(|| ExecError::new(device.target(), "execution failed"));
            Err(TaskError::Execution(error))
        }
        Err(_) => Err(TaskError::Abandoned),
    }
}

/// Attaches the device's last error only when the rejected call recorded it.
fn rejected(device: &dyn Device, recorded_before: u64) -> TaskError {
    let error = if device.errors_recorded() == recorded_before {
        None
    } else {
        device.detach_last_error()
    };
    TaskError::Rejected {
        device: device.label(),
        error,
    }
}

type Factory = Box<dyn FnOnce() -> TaskResult<Step>>;
type Stage = Box<dyn FnOnce(ExecResult) -> TaskResult<Step>>;
type Finally = Box<dyn FnOnce(ExecResult)>;
type Catch = Box<dyn FnOnce(TaskError)>;

/// Which terminal stage a task ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Finished,
    Caught,
}

pub struct Task {
    factory: Factory,
    stages: Vec<Stage>,
    finally: Option<Finally>,
    catch: Option<Catch>,
}

impl Task {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> TaskResult<Step> + 'static,
    {
        Self {
            factory: Box::new(factory),
            stages: Vec::new(),
            finally: None,
            catch: None,
        }
    }

    /// Single-stage task executing `request` on `device`.
    pub fn execute(device: Rc<dyn Device>, request: Request) -> Self {
        Self::new(move || Ok(Step::execute(device, request)))
    }

    pub fn then<F>(mut self, stage: F) -> Self
    where
        F: FnOnce(ExecResult) -> TaskResult<Step> + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn finally<F>(mut self, finally: F) -> Self
    where
        F: FnOnce(ExecResult) + 'static,
    {
        self.finally = Some(Box::new(finally));
        self
    }

    pub fn catch<F>(mut self, catch: F) -> Self
    where
        F: FnOnce(TaskError) + 'static,
    {
        self.catch = Some(Box::new(catch));
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Drives every stage in order and runs exactly one terminal stage.
    pub async fn run(self) -> TaskOutcome {
        let Task {
            factory,
            stages,
            finally,
            catch,
        } = self;

        match run_stages(factory, stages).await {
            Ok(result) => {
                if let Some(finally) = finally {
                    finally(result);
                }
                TaskOutcome::Finished
            }
            Err(error) => {
                match catch {
                    Some(catch) => catch(error),
                    None => tracing::warn!(error = %error, "task failed without a catch stage"),
                }
                TaskOutcome::Caught
            }
        }
    }
}

async fn run_stages(factory: Factory, stages: Vec<Stage>) -> TaskResult<ExecResult> {
    let mut result = factory()?.resolve().await?;
    for (index, stage) in stages.into_iter().enumerate() {
        tracing::trace!(stage = index, "running stage");
        result = stage(result)?.resolve().await?;
    }
    Ok(result)
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("stages", &self.stages.len())
            .field("finally", &self.finally.is_some())
            .field("catch", &self.catch.is_some())
            .finish()
    }
}
