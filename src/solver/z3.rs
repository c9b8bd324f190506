//! z3 child process speaking SMT-LIB2 over stdio

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{CheckResult, Goal, Model, ModelEntry, SolverBackend, SolverSession};
use crate::error::SolverError;
use crate::smt::sexpr::{SExpr, paren_balance, parse_one};
use crate::smt::{Assignment, Sort, Term, eval, quote_symbol};

/// Spawns one `z3 -in -smt2` process per session
#[derive(Debug, Clone)]
pub struct Z3Backend {
    path: PathBuf,
    timeout: Duration,
    grace: Duration,
}

impl Z3Backend {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, grace: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            grace,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the configured binary can be started
    pub async fn is_available(&self) -> bool {
        Command::new(&self.path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }
}

#[async_trait]
impl SolverBackend for Z3Backend {
    fn name(&self) -> &'static str {
        "z3"
    }

    async fn open(&self) -> Result<Box<dyn SolverSession>, SolverError> {
        let session = Z3Session::spawn(&self.path, self.timeout, self.grace).await?;
        Ok(Box::new(session))
    }
}

pub struct Z3Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Outer wall clock around each read, beyond z3's own timeout
    read_timeout: Duration,
    declarations: Vec<(String, Sort)>,
    last: Option<CheckResult>,
}

impl Z3Session {
    async fn spawn(path: &Path, timeout: Duration, grace: Duration) -> Result<Self, SolverError> {
        let mut child = Command::new(path)
            .args(["-in", "-smt2"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SolverError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::Protocol("solver stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolverError::Protocol("solver stdout unavailable".into()))?;

        tracing::debug!(path = %path.display(), pid = child.id(), "Spawned z3");

        let mut session = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            read_timeout: timeout + grace,
            declarations: Vec::new(),
            last: None,
        };
        session.send("(set-option :print-success false)").await?;
        session.send("(set-option :produce-models true)").await?;
        session
            .send(&format!("(set-option :timeout {})", timeout.as_millis()))
            .await?;
        Ok(session)
    }

    async fn send(&mut self, command: &str) -> Result<(), SolverError> {
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, SolverError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.stdout.read_line(&mut line).await?;
            if read == 0 {
                return Err(SolverError::Closed);
            }
            if !line.trim().is_empty() {
                return Ok(line.trim().to_string());
            }
        }
    }

    /// Read one complete s-expression or atom, possibly spanning several lines
    async fn read_response(&mut self) -> Result<String, SolverError> {
        let mut response = self.read_line().await?;
        let mut depth = paren_balance(&response);
        while depth > 0 {
            let line = self.read_line().await?;
            depth += paren_balance(&line);
            response.push('\n');
            response.push_str(&line);
        }
        Ok(response)
    }

    /// Read a response under the outer wall clock; on expiry the process is killed
    async fn read_bounded(&mut self) -> Result<String, SolverError> {
        match tokio::time::timeout(self.read_timeout, self.read_response()).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "z3 ignored its timeout, killing it"
                );
                let _ = self.child.start_kill();
                Err(SolverError::Timeout)
            }
        }
    }
}

fn solver_error(response: &str) -> Option<SolverError> {
    response
        .starts_with("(error")
        .then(|| SolverError::Solver(response.to_string()))
}

#[async_trait]
impl SolverSession for Z3Session {
    async fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError> {
        self.declarations.push((name.to_string(), sort));
        self.send(&format!("(declare-const {} {sort})", quote_symbol(name)))
            .await
    }

    async fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        self.send(&format!("(assert {term})")).await
    }

    async fn optimize(&mut self, term: &Term, goal: Goal) -> Result<(), SolverError> {
        let command = match goal {
            Goal::Minimize => "minimize",
            Goal::Maximize => "maximize",
        };
        self.send(&format!("({command} {term})")).await
    }

    async fn check_sat(&mut self) -> Result<CheckResult, SolverError> {
        self.last = None;
        self.send("(check-sat)").await?;
        let response = self.read_bounded().await?;
        if let Some(error) = solver_error(&response) {
            return Err(error);
        }
        let result = match response.as_str() {
            "sat" => CheckResult::Sat,
            "unsat" => CheckResult::Unsat,
            "unknown" | "timeout" => CheckResult::Unknown,
            other => return Err(SolverError::Protocol(other.to_string())),
        };
        tracing::debug!(solver = "z3", ?result, "check-sat");
        self.last = Some(result);
        Ok(result)
    }

    async fn get_model(&mut self) -> Result<Model, SolverError> {
        if self.last != Some(CheckResult::Sat) {
            return Err(SolverError::NoModel("last check-sat was not sat".into()));
        }
        self.send("(get-model)").await?;
        let response = self.read_bounded().await?;
        if let Some(error) = solver_error(&response) {
            return Err(error);
        }
        parse_model(&response)
    }
}

/// Parse `get-model` output, keeping nullary definitions only
///
/// Accepts both `((define-fun ...) ...)` and the older `(model (define-fun ...) ...)`.
pub fn parse_model(text: &str) -> Result<Model, SolverError> {
    let expr = parse_one(text)?;
    let items = expr
        .as_list()
        .ok_or_else(|| SolverError::Protocol(format!("model is not a list: {text}")))?;
    let items = match items.split_first() {
        Some((head, rest)) if head.is_symbol("model") => rest,
        _ => items,
    };

    let empty = Assignment::new();
    let mut entries = Vec::new();
    for item in items {
        let Some([head, name, params, sort, value]) = item.as_list() else {
            return Err(SolverError::Protocol(format!("unexpected model item: {item:?}")));
        };
        if !head.is_symbol("define-fun") {
            continue;
        }
        let Some(name) = name.as_symbol() else {
            continue;
        };
        if !params.as_list().is_some_and(<[SExpr]>::is_empty) || name.contains("/0") {
            continue;
        }
        let Some(sort) = sort.as_symbol().and_then(Sort::from_name) else {
            continue;
        };
        let term = value.to_term()?;
        let value = eval(&term, &empty).ok_or_else(|| {
            SolverError::Protocol(format!("non-constant model value for {name}: {term}"))
        })?;
        entries.push(ModelEntry {
            name: name.to_string(),
            sort,
            value,
        });
    }
    Ok(Model { entries })
}
