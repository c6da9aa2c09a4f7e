use std::io::{self, Write};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::HarnessError;
use crate::events::{self, Translation};
use crate::models::RunSummary;
use crate::options::{Options, TestFilter};
use crate::report::ReportWriter;
use crate::runner::{CompletionEvent, TestEngine};

/// Run the suite under the iteration and duration limits in `options`,
/// writing one report line per completed test case.
///
/// The sink is only opened once the filter is known to select tests, and is
/// finished exactly once whatever the outcome after that.
pub async fn run<E, W, F>(
    options: &Options,
    engine: &E,
    open_sink: F,
) -> Result<RunSummary, HarnessError>
where
    E: TestEngine + ?Sized,
    W: Write,
    F: FnOnce() -> io::Result<ReportWriter<W>>,
{
    let count = engine
        .count_matching(&options.filter)
        .await
        .map_err(HarnessError::Engine)?;
    if count == 0 {
        return Err(HarnessError::NoTests {
            filter: options.filter.to_string(),
        });
    }
    tracing::info!(tests = count, engine = engine.name(), "starting run");

    let mut sink = open_sink().map_err(|source| HarnessError::Report {
        path: options.report_path.clone(),
        source,
    })?;
    let outcome = drive(options, engine, &mut sink).await;
    let path = sink.path().to_path_buf();
    let closed = sink.finish();

    let summary = outcome?;
    closed.map_err(|source| HarnessError::Report { path, source })?;
    Ok(summary)
}

async fn drive<E, W>(
    options: &Options,
    engine: &E,
    sink: &mut ReportWriter<W>,
) -> Result<RunSummary, HarnessError>
where
    E: TestEngine + ?Sized,
    W: Write,
{
    let mut summary = RunSummary::default();
    let started = Instant::now();

    loop {
        let iteration = summary.iterations + 1;
        tracing::info!(iteration, "iteration started");
        run_iteration(engine, &options.filter, sink, &mut summary).await?;
        summary.iterations = iteration;

        if options.iterations.exhausted_after(iteration) {
            break;
        }
        if let Some(limit) = options.duration_limit {
            let elapsed = started.elapsed();
            if elapsed > limit {
                tracing::info!(
                    iteration,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "duration limit reached"
                );
                break;
            }
        }
    }

    Ok(summary)
}

/// One full pass over the selected tests. Records are written while the
/// engine is still running.
async fn run_iteration<E, W>(
    engine: &E,
    filter: &TestFilter,
    sink: &mut ReportWriter<W>,
    summary: &mut RunSummary,
) -> Result<(), HarnessError>
where
    E: TestEngine + ?Sized,
    W: Write,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<CompletionEvent>();

    let record_events = async {
        let mut write_error = None;
        while let Some(event) = rx.recv().await {
            match events::translate(&event) {
                Translation::Record(record) => {
                    if write_error.is_some() {
                        continue;
                    }
                    match sink.write_record(&record) {
                        Ok(()) => summary.count(&record),
                        Err(e) => write_error = Some(e),
                    }
                }
                Translation::Ignored => {}
                Translation::Dropped => summary.dropped_events += 1,
            }
        }
        write_error
    };

    let (executed, write_error) = tokio::join!(engine.execute(filter, tx), record_events);

    if let Some(source) = write_error {
        return Err(HarnessError::Report {
            path: sink.path().to_path_buf(),
            source,
        });
    }
    executed.map_err(HarnessError::Engine)
}
