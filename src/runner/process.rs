use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::options::TestFilter;

use super::splitter::EventSplitter;
use super::{CompletionEvent, TestEngine};

/// Guard that kills the child process (and its entire process group) on drop.
struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Test suites often fork helpers; take the whole group down with the suite.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Engine adapter that drives the target suite as a subprocess.
///
/// The target lists matching test identifiers (one per line) when invoked with
/// the configured list arguments, and streams XML completion events on stdout
/// when invoked with the run arguments. An event starts on a line beginning
/// with `<` and may span several lines.
pub struct ProcessEngine {
    target: PathBuf,
    /// Program and leading arguments placed before the target, if any.
    launcher: Vec<String>,
    list_args: Vec<String>,
    run_args: Vec<String>,
    filter_flag: String,
}

impl ProcessEngine {
    pub fn new(target: PathBuf, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            target,
            launcher: config.launcher_words()?,
            list_args: config.list_args.clone(),
            run_args: config.run_args.clone(),
            filter_flag: config.filter_flag.clone(),
        })
    }

    /// Check that `path` is something the engine can run and return its
    /// canonical location.
    pub fn load(path: &Path, config: &EngineConfig) -> Result<PathBuf> {
        let meta = std::fs::metadata(path).context("test suite not found")?;
        if !meta.is_file() {
            anyhow::bail!("test suite is not a file");
        }

        // A launcher (e.g. `dotnet exec`) reads the target; otherwise we exec it.
        #[cfg(unix)]
        if config.launcher_words()?.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            if meta.permissions().mode() & 0o111 == 0 {
                anyhow::bail!("test suite is not executable and no engine launcher is configured");
            }
        }
        #[cfg(not(unix))]
        let _ = config;

        std::fs::canonicalize(path).context("failed to resolve test suite path")
    }

    fn command(&self, mode_args: &[String], filter: &TestFilter) -> Command {
        let mut cmd = match self.launcher.split_first() {
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(&self.target);
                cmd
            }
            None => Command::new(&self.target),
        };
        cmd.args(mode_args);
        if let Some(expr) = filter.expression() {
            cmd.arg(&self.filter_flag).arg(expr);
        }
        if let Some(dir) = self.target.parent() {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

#[async_trait]
impl TestEngine for ProcessEngine {
    async fn count_matching(&self, filter: &TestFilter) -> Result<usize> {
        let mut cmd = self.command(&self.list_args, filter);
        tracing::debug!(command = ?cmd.as_std(), "listing tests");

        let output = cmd
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to spawn test suite to list tests")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "listing tests failed ({}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter(|l| !l.trim().is_empty()).count())
    }

    async fn execute(
        &self,
        filter: &TestFilter,
        tx: mpsc::UnboundedSender<CompletionEvent>,
    ) -> Result<()> {
        let mut cmd = self.command(&self.run_args, filter);
        tracing::debug!(command = ?cmd.as_std(), "running tests");

        // Own process group so the guard can reap every worker the suite forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn test suite")?;

        let stdout = child.stdout.take().context("missing stdout")?;
        let stderr = child.stderr.take().context("missing stderr")?;

        let mut child_guard = ChildGuard::new(child);

        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(target: "testloop::engine", "{line}");
            }
        });

        let mut splitter = EventSplitter::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("failed to read test suite output")?
        {
            for document in splitter.push_line(&line) {
                // Receiver gone means the controller stopped listening; keep draining.
                let _ = tx.send(CompletionEvent::new(document));
            }
        }
        if let Some(rest) = splitter.finish() {
            let _ = tx.send(CompletionEvent::new(rest));
        }

        stderr_handle.await.ok();

        let status = match child_guard.child.as_mut() {
            Some(child) => child.wait().await.context("failed to wait for test suite")?,
            None => return Ok(()),
        };
        // Non-zero exit is how suites report failing tests; only a crash is fatal.
        if status.code().is_none() {
            anyhow::bail!("test suite terminated abnormally ({status})");
        }
        tracing::debug!(%status, "test suite exited");

        Ok(())
    }

    fn name(&self) -> &str {
        "process"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::{Translation, translate};
    use crate::models::TestStatus;

    const SCRIPT: &str = r#"
mode="$1"
filter=""
if [ "$2" = "--where" ]; then filter="$3"; fi
if [ "$filter" = "none" ]; then exit 0; fi
case "$mode" in
  --list)
    echo "Calc.Tests.Adds"
    echo ""
    echo "Calc.Tests.Divides"
    ;;
  --run)
    echo "banner line"
    echo "warming up" >&2
    echo '<start-run count="2"/>'
    echo '<test-case methodname="Adds" classname="Calc.Tests" result="Passed" start-time="2024-03-01 09:30:00Z" duration="0.5"/>'
    echo '<test-case methodname="Divides" classname="Calc.Tests" result="Failed" start-time="2024-03-01 09:30:01Z" duration="0.1"><failure><message>boom</message></failure></test-case>'
    exit 1
    ;;
  --multiline)
    echo '<test-case methodname="Divides" classname="Calc.Tests" result="Failed" start-time="2024-03-01 09:30:01Z" duration="0.1"><failure><message><![CDATA[boom]]></message><stack-trace><![CDATA[at Calc.Tests.Divides() in Calc.cs:line 1'
    echo 'at Runner.Invoke()]]></stack-trace></failure></test-case>'
    echo '<test-case methodname="Adds" classname="Calc.Tests" result="Passed" start-time="2024-03-01 09:30:02Z" duration="0.5"/>'
    exit 1
    ;;
  --crash)
    echo '<test-case methodname="Adds" classname="Calc.Tests" result="Passed" start-time="2024-03-01 09:30:00Z" duration="0.5"/>'
    kill -9 $$
    ;;
  --fail-list)
    echo "cannot load suite" >&2
    exit 3
    ;;
esac
"#;

    fn sh_config() -> EngineConfig {
        EngineConfig {
            launcher: Some("sh".into()),
            ..EngineConfig::default()
        }
    }

    fn engine(dir: &tempfile::TempDir, config: EngineConfig) -> ProcessEngine {
        let path = dir.path().join("suite.sh");
        std::fs::write(&path, SCRIPT).unwrap();
        let target = ProcessEngine::load(&path, &config).unwrap();
        ProcessEngine::new(target, &config).unwrap()
    }

    async fn collect(engine: &ProcessEngine, filter: &TestFilter) -> (Result<()>, Vec<String>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = engine.execute(filter, tx).await;
        let mut docs = Vec::new();
        while let Some(event) = rx.recv().await {
            docs.push(event.document().to_string());
        }
        (result, docs)
    }

    #[tokio::test]
    async fn counts_non_empty_listed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, sh_config());
        assert_eq!(engine.count_matching(&TestFilter::all()).await.unwrap(), 2);
        assert_eq!(engine.count_matching(&TestFilter::new("none")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn streams_xml_lines_in_order_and_tolerates_failing_exit() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, sh_config());
        let (result, docs) = collect(&engine, &TestFilter::all()).await;
        result.unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs[0].starts_with("<start-run"));
        assert!(docs[1].contains(r#"methodname="Adds""#));
        assert!(docs[2].contains(r#"methodname="Divides""#));
    }

    #[tokio::test]
    async fn multi_line_stack_trace_arrives_as_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            run_args: vec!["--multiline".into()],
            ..sh_config()
        };
        let engine = engine(&dir, config);
        let (result, docs) = collect(&engine, &TestFilter::all()).await;
        result.unwrap();
        assert_eq!(docs.len(), 2);

        let Translation::Record(failed) = translate(&CompletionEvent::new(docs[0].as_str())) else {
            panic!("expected a record for {}", docs[0]);
        };
        assert_eq!(failed.status, TestStatus::Failed);
        assert_eq!(failed.error_message, "boom");
        assert_eq!(
            failed.error_trace,
            "at Calc.Tests.Divides() in Calc.cs:line 1\nat Runner.Invoke()"
        );
        assert!(docs[1].contains(r#"methodname="Adds""#));
    }

    #[tokio::test]
    async fn signal_termination_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            run_args: vec!["--crash".into()],
            ..sh_config()
        };
        let engine = engine(&dir, config);
        let (result, docs) = collect(&engine, &TestFilter::all()).await;
        assert!(result.unwrap_err().to_string().contains("terminated abnormally"));
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn failed_listing_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            list_args: vec!["--fail-list".into()],
            ..sh_config()
        };
        let engine = engine(&dir, config);
        let err = engine.count_matching(&TestFilter::all()).await.unwrap_err();
        assert!(err.to_string().contains("cannot load suite"));
    }

    #[test]
    fn load_rejects_missing_and_non_executable_targets() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ProcessEngine::load(&dir.path().join("absent"), &sh_config());
        assert!(missing.is_err());

        let path = dir.path().join("suite.sh");
        std::fs::write(&path, SCRIPT).unwrap();
        let err = ProcessEngine::load(&path, &EngineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not executable"));

        assert!(ProcessEngine::load(dir.path(), &sh_config()).is_err());
        assert_eq!(
            ProcessEngine::load(&path, &sh_config()).unwrap(),
            std::fs::canonicalize(&path).unwrap()
        );
    }

    #[test]
    fn command_places_filter_after_mode_args() {
        let engine = ProcessEngine::new(
            PathBuf::from("/suites/Calc.dll"),
            &EngineConfig {
                launcher: Some("dotnet exec".into()),
                ..EngineConfig::default()
            },
        )
        .unwrap();
        let cmd = engine.command(&engine.run_args, &TestFilter::new("cat == Smoke"));
        let std = cmd.as_std();
        assert_eq!(std.get_program(), "dotnet");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["exec", "/suites/Calc.dll", "--run", "--where", "cat == Smoke"]);
    }
}
