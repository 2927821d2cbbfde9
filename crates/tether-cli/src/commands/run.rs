//! Drives one request through a configured device and prints the reply

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use crate::utils::{format_duration, ColoredOutput};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tether_config::ConfigLoader;
use tether_core::{EventLoop, ExecResult, Request, Target};
use tether_runtime::{Runtime, Task, TaskError};
use tracing::info;

type Outcome = Rc<RefCell<Option<Result<ExecResult, TaskError>>>>;

pub async fn run_request(
    config_file: &str,
    target: Target,
    device_name: &str,
    request: Request,
    format: OutputFormat,
) -> CliResult<()> {
    let manifest = ConfigLoader::new().load_from_file(Path::new(config_file))?;
    info!(config = %config_file, "configuration loaded");

    let event_loop = EventLoop::new();
    let runtime = Runtime::from_manifest(event_loop.handle(), &manifest);
    let device = runtime.device(target, device_name)?;
    let client = runtime.client()?;

    let outcome: Outcome = Rc::new(RefCell::new(None));
    let (succeeded, failed) = (outcome.clone(), outcome.clone());
    let task = Task::execute(device, request)
        .finally(move |result| *succeeded.borrow_mut() = Some(Ok(result)))
        .catch(move |error| *failed.borrow_mut() = Some(Err(error)));

    let started = Instant::now();
    let handle = runtime.push(&client, task)?;
    event_loop
        .run_until(handle)
        .await
        .map_err(|e| CliError::General(format!("Task did not complete: {}", e)))?;
    let elapsed = started.elapsed();

    runtime.scheduler().unregister(&client)?;
    runtime.shutdown();

    let result = outcome
        .borrow_mut()
        .take()
        .ok_or_else(|| CliError::General("Task finished without an outcome".to_string()))??;
    print_result(&result, format, elapsed)
}

fn print_result(result: &ExecResult, format: OutputFormat, elapsed: Duration) -> CliResult<()> {
    let reply = result
        .reply()
        .ok_or_else(|| CliError::ExecutionFailed("No reply attached to the result".to_string()))?;
    let json = reply.to_json();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&json)?),
        OutputFormat::Pretty => {
            println!("{}", serde_json::to_string_pretty(&json)?);
            println!(
                "{} {}",
                ColoredOutput::success("Completed"),
                ColoredOutput::dim(&format!("in {}", format_duration(elapsed)))
            );
        }
    }
    Ok(())
}
