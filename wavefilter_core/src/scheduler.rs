//! One-thread-per-unit scheduler.
//!
//! Every [`WorkUnit`] gets a dedicated worker thread that calls
//! [`WorkUnit::run`] until the unit reports it is done. Teardown joins every
//! worker before any unit is finalised, so header patching in
//! [`WorkUnit::finish`] never races with queue traffic.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::PipelineError;

/// A repeatable step of pipeline work.
pub trait WorkUnit: Send {
    /// Short name used for the worker thread and in log output.
    fn name(&self) -> &str;

    /// Perform one step. `Ok(true)` asks to be called again, `Ok(false)` means
    /// the unit is permanently done.
    fn run(&mut self) -> Result<bool, PipelineError>;

    /// Finish every queue this unit touches so its neighbours stop waiting.
    ///
    /// Called by the worker once `run` stops, whatever the outcome. Must be
    /// idempotent.
    fn close(&mut self);

    /// Teardown hook, called after every worker of the pipeline has exited.
    fn finish(&mut self) -> Result<UnitReport, PipelineError>;
}

/// Summary returned by a unit at teardown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    /// Unit-specific count: samples read, chunks split or bytes written.
    pub processed: u64,
}

impl UnitReport {
    pub fn new(name: impl Into<String>, processed: u64) -> Self {
        Self {
            name: name.into(),
            processed,
        }
    }
}

type WorkerOutcome = (Box<dyn WorkUnit>, Result<(), PipelineError>);

struct Worker {
    name: String,
    handle: JoinHandle<WorkerOutcome>,
}

/// Owns a fixed set of work units and the threads driving them.
#[derive(Default)]
pub struct Scheduler {
    pending: Vec<Box<dyn WorkUnit>>,
    workers: Vec<Worker>,
    started: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register units. Only allowed before [`Scheduler::start`].
    pub fn add_units<I>(&mut self, units: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = Box<dyn WorkUnit>>,
    {
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }
        self.pending.extend(units);
        Ok(())
    }

    /// Spawn one worker per registered unit.
    ///
    /// If a worker cannot be spawned the units that were not started yet are
    /// dropped, which closes their queues so the running workers can drain.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }
        self.started = true;

        let mut pending = std::mem::take(&mut self.pending).into_iter();
        while let Some(unit) = pending.next() {
            let name = unit.name().to_owned();
            let spawned = thread::Builder::new()
                .name(format!("wavefilter-{name}"))
                .spawn(move || drive(unit));

            match spawned {
                Ok(handle) => {
                    debug!("started worker '{name}'");
                    self.workers.push(Worker { name, handle });
                }
                Err(source) => {
                    drop(pending);
                    return Err(PipelineError::Spawn { name, source });
                }
            }
        }

        Ok(())
    }

    /// Join whatever was started after `cause` stopped the pipeline early.
    ///
    /// Worker errors are logged and `cause` is handed back as the failure.
    fn abandon(&mut self, cause: PipelineError) -> PipelineError {
        if let Err(err) = self.join() {
            warn!("workers stopped with error after '{cause}': {err}");
        }
        cause
    }

    /// Number of workers that have been spawned and not joined yet.
    pub fn running(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker, then finalise and drop the units.
    ///
    /// Reports come back in registration order. When several units fail the
    /// first error that is not an [`PipelineError::IllegalOperation`] wins,
    /// since those are usually fallout from a neighbour shutting down.
    pub fn join(&mut self) -> Result<Vec<UnitReport>, PipelineError> {
        let mut units = Vec::with_capacity(self.workers.len());
        let mut errors = Vec::new();

        for worker in self.workers.drain(..) {
            match worker.handle.join() {
                Ok((unit, outcome)) => {
                    if let Err(err) = outcome {
                        warn!("worker '{}' failed: {err}", worker.name);
                        errors.push(err);
                    }
                    units.push(unit);
                }
                Err(_) => errors.push(PipelineError::WorkerPanicked(worker.name)),
            }
        }

        let mut reports = Vec::with_capacity(units.len());
        for unit in &mut units {
            match unit.finish() {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!("finalising '{}' failed: {err}", unit.name());
                    errors.push(err);
                }
            }
        }
        drop(units);

        match root_cause(errors) {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            if let Err(err) = self.join() {
                warn!("pipeline torn down with error: {err}");
            }
        }
    }
}

/// Run `units` to completion on their own workers and tear them down.
pub fn run_units(units: Vec<Box<dyn WorkUnit>>) -> Result<Vec<UnitReport>, PipelineError> {
    let mut scheduler = Scheduler::new();
    scheduler.add_units(units)?;
    if let Err(err) = scheduler.start() {
        return Err(scheduler.abandon(err));
    }
    scheduler.join()
}

fn drive(mut unit: Box<dyn WorkUnit>) -> WorkerOutcome {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| loop {
        match unit.run() {
            Ok(true) => continue,
            Ok(false) => break Ok(()),
            Err(err) => break Err(err),
        }
    }));
    unit.close();

    let outcome = outcome.unwrap_or_else(|payload| {
        warn!(
            "worker '{}' panicked: {}",
            unit.name(),
            panic_message(payload.as_ref())
        );
        Err(PipelineError::WorkerPanicked(unit.name().to_owned()))
    });
    debug!("worker '{}' stopped", unit.name());
    (unit, outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

fn root_cause(errors: Vec<PipelineError>) -> Option<PipelineError> {
    let mut fallout = None;
    for err in errors {
        if !err.is_illegal_operation() {
            return Some(err);
        }
        fallout.get_or_insert(err);
    }
    fallout
}
