//! Line-delimited JSON transport to an analysis engine.
//!
//! Queries go out one JSON object per line on any [`Write`]. A reader thread
//! parses every line coming back and hands it to the shared
//! [`AnalysisRouter`]. [`spawn`] wires both ends to a child process.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::query::{Query, QueryOptions};
use super::response::{AnalysisMessage, ProtocolError};
use super::router::{AnalysisRouter, Subscription};
use crate::constants::ENGINE_READY_LINE;
use crate::position::Position;

/// How to launch an external engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Line the engine prints on stderr once it accepts queries.
    pub ready_line: String,
    pub startup_timeout: Duration,
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("katago"),
            args: vec!["analysis".into()],
            ready_line: ENGINE_READY_LINE.to_string(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// The sending half of an engine connection.
pub struct AnalysisEngine<W: Write> {
    writer: Mutex<W>,
    router: Arc<AnalysisRouter>,
    next_id: AtomicU64,
}

impl<W: Write> AnalysisEngine<W> {
    pub fn new(writer: W, router: Arc<AnalysisRouter>) -> Self {
        Self {
            writer: Mutex::new(writer),
            router,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn router(&self) -> &Arc<AnalysisRouter> {
        &self.router
    }

    /// A fresh query id, unique for this connection.
    pub fn next_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Send a query. The subscription is registered before the line is
    /// written, so no reply can be missed.
    pub fn submit(&self, query: &Query) -> Result<Subscription, ProtocolError> {
        let line = serde_json::to_string(query)?;
        let subscription = self.router.register(query.id.clone(), query.expected_finals());
        debug!(id = %query.id, "> {line}");

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = write_line(&mut *writer, &line) {
            self.router.cancel(&query.id);
            return Err(e.into());
        }
        Ok(subscription)
    }

    /// Build a query for a sequence of positions and send it.
    pub fn analyze(&self, sequence: &[Position], options: &QueryOptions) -> Result<Subscription, ProtocolError> {
        let query = Query::from_positions(self.next_id(), sequence, options);
        self.submit(&query)
    }
}

fn write_line(writer: &mut impl Write, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read engine output until EOF, dispatching every line. When the stream
/// ends all pending subscriptions are closed.
pub fn spawn_reader<R>(reader: R, router: Arc<AnalysisRouter>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "reading engine output failed");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("< {line}");
            match AnalysisMessage::parse(line) {
                Ok(message) => {
                    router.dispatch(message);
                }
                Err(e) => warn!(error = %e, "skipping malformed engine line"),
            }
        }
        info!("engine output closed");
        router.close_all();
    })
}

/// A running engine process.
pub struct EngineProcess {
    child: Child,
    engine: AnalysisEngine<ChildStdin>,
    reader: Option<JoinHandle<()>>,
}

impl EngineProcess {
    pub fn engine(&self) -> &AnalysisEngine<ChildStdin> {
        &self.engine
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Close the engine's input and wait for it to exit.
    pub fn shutdown(self) -> Result<(), ProtocolError> {
        let EngineProcess {
            mut child,
            engine,
            reader,
        } = self;
        drop(engine);
        let status = child.wait()?;
        info!(%status, "engine exited");
        if let Some(reader) = reader {
            let _ = reader.join();
        }
        Ok(())
    }
}

/// Launch the engine and wait until it reports that it is ready.
pub fn spawn(command: &EngineCommand) -> Result<EngineProcess, ProtocolError> {
    info!(program = %command.program.display(), "starting analysis engine");
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let missing = |what: &str| ProtocolError::EngineStart(format!("no {what} pipe"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let (ready_tx, ready_rx) = mpsc::channel();
    let ready_line = command.ready_line.clone();
    thread::spawn(move || {
        let mut ready_tx = Some(ready_tx);
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if ready_tx.is_some() && line.trim() == ready_line {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(());
                }
                continue;
            }
            if ready_tx.is_some() && !line.starts_with("KataGo v") {
                warn!("engine: {line}");
            } else {
                debug!("engine: {line}");
            }
        }
    });

    if ready_rx.recv_timeout(command.startup_timeout).is_err() {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ProtocolError::EngineStart(format!(
            "`{}` never reported ready",
            command.program.display()
        )));
    }
    info!("analysis engine ready");

    let router = Arc::new(AnalysisRouter::new());
    let reader = spawn_reader(BufReader::new(stdout), Arc::clone(&router));
    Ok(EngineProcess {
        child,
        engine: AnalysisEngine::new(stdin, router),
        reader: Some(reader),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisEvent, Response};
    use std::io::Cursor;

    #[test]
    fn test_submit_writes_one_line_per_query() {
        let router = Arc::new(AnalysisRouter::new());
        let engine = AnalysisEngine::new(Vec::new(), Arc::clone(&router));
        let options = QueryOptions::default();
        let a = engine.analyze(&[Position::square(9).unwrap()], &options).unwrap();
        let b = engine.analyze(&[Position::square(9).unwrap()], &options).unwrap();
        assert_eq!(a.id(), "1");
        assert_eq!(b.id(), "2");
        assert_eq!(router.pending(), 2);

        let written = String::from_utf8(engine.writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Query = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(first.board_x_size, 9);
    }

    #[test]
    fn test_reader_dispatches_and_closes() {
        let router = Arc::new(AnalysisRouter::new());
        let sub = router.register("1", 1);
        let output = concat!(
            r#"{"id":"1","isDuringSearch":true,"turnNumber":0}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"id":"1","isDuringSearch":false,"turnNumber":0}"#,
            "\n",
        );
        spawn_reader(Cursor::new(output), Arc::clone(&router)).join().unwrap();

        assert!(matches!(sub.recv(), Some(AnalysisEvent::Update(_))));
        let AnalysisEvent::Final(Response { id, .. }) = sub.recv().unwrap() else {
            panic!("expected the final response");
        };
        assert_eq!(id, "1");
        assert_eq!(router.pending(), 0);
    }

    #[test]
    fn test_reader_eof_closes_pending() {
        let router = Arc::new(AnalysisRouter::new());
        let sub = router.register("9", 1);
        spawn_reader(Cursor::new(""), Arc::clone(&router)).join().unwrap();
        assert!(matches!(sub.wait_final(Duration::from_secs(1)), Err(ProtocolError::Closed(_))));
    }
}
