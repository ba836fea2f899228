use std::mem;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, trace, warn};
use crate::core::error::{Error, Result};
use crate::query::ast::ColumnBinding;
use crate::search::executor::{QueryExecutor, RowSink};
use crate::search::results::{Fetch, QueryRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Worker started, no fetch yet.
    Created,
    /// A batch was handed over; the worker is parked mid-scan.
    Waiting,
    Done,
    Failed,
    Closed,
}

enum Reply {
    Rows(Vec<QueryRow>),
    Done,
    Failed(Error),
}

/// A running query: one worker thread scanning, one caller fetching.
///
/// The two sides hand off over zero-capacity channels, so they strictly
/// alternate: `fetch` sends a batch budget on `go` and blocks on `ready`;
/// the worker scans until the budget is met, sends the batch, and blocks on
/// `go` again. A budget of zero, or a closed channel, stops the worker.
pub struct QuerySession {
    state: SessionState,
    error: Option<Error>,
    go: Option<Sender<usize>>,
    ready: Option<Receiver<Reply>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    columns: Vec<String>,
    projection: Vec<ColumnBinding>,
    fetched: usize,
}

impl QuerySession {
    pub(crate) fn start(executor: QueryExecutor) -> Result<Self> {
        let (go_tx, go_rx) = bounded::<usize>(0);
        let (ready_tx, ready_rx) = bounded::<Reply>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let columns = executor.query().column_names();
        let projection = executor.query().projection.clone();

        let worker_stop = stop.clone();
        let worker = thread::Builder::new()
            .name("ffdb-query".to_string())
            .spawn(move || Self::worker(executor, go_rx, ready_tx, worker_stop))
            .map_err(|e| Error::concurrency(format!("cannot start query worker: {}", e)))?;

        Ok(QuerySession {
            state: SessionState::Created,
            error: None,
            go: Some(go_tx),
            ready: Some(ready_rx),
            stop,
            worker: Some(worker),
            columns,
            projection,
            fetched: 0,
        })
    }

    fn worker(executor: QueryExecutor, go: Receiver<usize>, ready: Sender<Reply>, stop: Arc<AtomicBool>) {
        let budget = match go.recv() {
            Ok(n) if n > 0 => n,
            _ => return,
        };
        let mut sink = BatchSink { go: &go, ready: &ready, budget, rows: Vec::new() };

        match executor.run(&mut sink, &stop) {
            Ok(ControlFlow::Break(())) => trace!("query worker stopped"),
            Ok(ControlFlow::Continue(())) => {
                if !sink.rows.is_empty() {
                    let rows = mem::take(&mut sink.rows);
                    if ready.send(Reply::Rows(rows)).is_err() {
                        return;
                    }
                    match go.recv() {
                        Ok(n) if n > 0 => {}
                        _ => return,
                    }
                }
                let _ = ready.send(Reply::Done);
            }
            Err(e) => {
                warn!("query failed: {}", e);
                let _ = ready.send(Reply::Failed(e));
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `ref.column` names of the selected columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn projection(&self) -> &[ColumnBinding] {
        &self.projection
    }

    /// Rows handed out so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Up to `max_count` more rows. Returns `done` with no rows once the
    /// scan is exhausted. A scan failure is returned here, and again by
    /// every later call.
    pub fn fetch(&mut self, max_count: usize) -> Result<Fetch> {
        match self.state {
            SessionState::Closed => return Err(Error::invalid_state("fetch on a closed query session")),
            SessionState::Done => return Ok(Fetch { rows: Vec::new(), done: true }),
            SessionState::Failed => {
                return Err(self
                    .error
                    .clone()
                    .unwrap_or_else(|| Error::invalid_state("query session failed")));
            }
            SessionState::Created | SessionState::Waiting => {}
        }
        if max_count == 0 {
            return Err(Error::invalid_argument("fetch needs a batch size of at least 1"));
        }
        let (Some(go), Some(ready)) = (&self.go, &self.ready) else {
            return Err(Error::invalid_state("query session has no worker"));
        };

        let reply = go
            .send(max_count)
            .map_err(|_| Error::concurrency("query worker exited"))
            .and_then(|_| ready.recv().map_err(|_| Error::concurrency("query worker exited")));
        match reply {
            Ok(Reply::Rows(rows)) => {
                self.state = SessionState::Waiting;
                self.fetched += rows.len();
                Ok(Fetch { rows, done: false })
            }
            Ok(Reply::Done) => {
                debug!("query done after {} rows", self.fetched);
                self.state = SessionState::Done;
                Ok(Fetch { rows: Vec::new(), done: true })
            }
            Ok(Reply::Failed(e)) | Err(e) => {
                self.state = SessionState::Failed;
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Fetch in batches of `batch` until done.
    pub fn drain(&mut self, batch: usize) -> Result<Vec<QueryRow>> {
        let mut rows = Vec::new();
        loop {
            let fetch = self.fetch(batch)?;
            if fetch.done {
                return Ok(rows);
            }
            rows.extend(fetch.rows);
        }
    }

    /// Stop the worker and wait for it. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.stop.store(true, Ordering::Relaxed);
        if let Some(go) = self.go.take() {
            // wakes a worker parked between batches; a busy one sees `stop`
            let _ = go.try_send(0);
        }
        self.ready.take();
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::concurrency("query worker panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for QuerySession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing query session: {}", e);
        }
    }
}

/// Buffers rows for the current batch and parks the worker once it is full.
struct BatchSink<'a> {
    go: &'a Receiver<usize>,
    ready: &'a Sender<Reply>,
    budget: usize,
    rows: Vec<QueryRow>,
}

impl RowSink for BatchSink<'_> {
    fn push(&mut self, row: QueryRow) -> Result<ControlFlow<()>> {
        self.rows.push(row);
        if self.rows.len() < self.budget {
            return Ok(ControlFlow::Continue(()));
        }
        let rows = mem::take(&mut self.rows);
        if self.ready.send(Reply::Rows(rows)).is_err() {
            return Ok(ControlFlow::Break(()));
        }
        match self.go.recv() {
            Ok(n) if n > 0 => {
                self.budget = n;
                Ok(ControlFlow::Continue(()))
            }
            _ => Ok(ControlFlow::Break(())),
        }
    }
}
