//! # HTTP stub
//!
//! This module contains the HTTP stub server: an expectation store behind a loopback
//! listener, answering each inbound request with the first matching canned response

mod expectation;
mod wire;

use std::io;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

pub use expectation::{CaptureSink, ResponseSpec};
use expectation::{Expectation, ExpectationStore, MatchOutcome};
use lazy_regex::Regex;

use crate::types::{Method, StubError, StubResult};

/// Reserved path answered with 200 unconditionally; never consults the store.
/// Kept so a client parked in a blocking request can always unblock itself.
const SHUTDOWN_PATH: &str = "/__shutdown";

/// How often the accept loop checks the stop flag while idle
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The HTTP stub server.
///
/// Register expectations with [`StubServer::expect`] before starting the listener with
/// [`StubServer::run`]. [`StubServer::stop`] shuts the listener down and then runs
/// [`StubServer::verify`], so a test that forgets to satisfy an expectation fails at
/// tear-down.
pub struct StubServer {
    port: u16,
    store: Arc<Mutex<ExpectationStore>>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Handle to one registered expectation, used to finish configuring it.
///
/// The store owns the expectation; the handle only refers to it by registration index.
#[must_use = "an expectation without a response is a programming error; call and_return()"]
pub struct ExpectationHandle {
    store: Arc<Mutex<ExpectationStore>>,
    index: usize,
}

impl ExpectationHandle {
    /// Attach the body the test expects the client to send. Advisory: the body is never
    /// used as a match criterion, but it appears in verify descriptions.
    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_expected_body(self.index, body.into());
        self
    }

    /// Have the engine copy the observed request body into `sink` under key `"body"`
    /// once this expectation matches. The sink stays owned by the caller.
    pub fn capture_into(self, sink: CaptureSink) -> Self {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_capture(self.index, sink);
        self
    }

    /// Set the response a matching request receives. Must be called exactly once
    /// before the expectation can be served.
    pub fn and_return(self, response: ResponseSpec) {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_response(self.index, response);
    }
}

impl StubServer {
    /// Create a stub bound to the given port once started; `0` picks a free port
    pub fn new(port: u16) -> Self {
        Self {
            port,
            store: Arc::new(Mutex::new(ExpectationStore::default())),
            stopped: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Register an expectation for `method` on any path matched by `url_pattern`
    /// (search semantics: the pattern matches if it occurs anywhere in the path,
    /// unless anchored).
    ///
    /// # Panics
    ///
    /// Panics if `url_pattern` is not a valid regular expression.
    pub fn expect(&self, method: Method, url_pattern: &str) -> ExpectationHandle {
        let pattern = Regex::new(url_pattern)
            .unwrap_or_else(|err| panic!("invalid URL pattern `{url_pattern}`: {err}"));
        let index = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(Expectation::new(method, pattern));
        debug!("registered expectation #{index}: {method} {url_pattern}");
        ExpectationHandle {
            store: self.store.clone(),
            index,
        }
    }

    /// Start the accept loop on its own thread
    pub fn run(&mut self) -> StubResult<()> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port))
            .map_err(StubError::ConnectionError)?;
        listener
            .set_nonblocking(true)
            .map_err(StubError::ConnectionError)?;
        self.port = listener
            .local_addr()
            .map_err(StubError::ConnectionError)?
            .port();
        debug!("HTTP stub listening on 127.0.0.1:{}", self.port);
        let store = self.store.clone();
        let stopped = self.stopped.clone();
        self.handle = Some(std::thread::spawn(move || {
            accept_loop(listener, store, stopped)
        }));
        Ok(())
    }

    /// The port the stub is bound to; meaningful once [`StubServer::run`] returned
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shut the listener down, then [`StubServer::verify`].
    ///
    /// Safe to call on a stub with no registered expectations; a second call fails with
    /// [`StubError::NotRunning`].
    pub fn stop(&mut self) -> StubResult<()> {
        let handle = self.handle.take().ok_or(StubError::NotRunning)?;
        self.stopped.store(true, Ordering::SeqCst);
        if let Err(panic) = handle.join() {
            // a panic in the accept loop is a programming error (e.g. an expectation
            // served without a response); surface it to the test
            std::panic::resume_unwind(panic);
        }
        debug!("HTTP stub stopped");
        self.verify()
    }

    /// Fail with [`StubError::UnsatisfiedExpectations`] if any registered expectation
    /// was never consumed; the store is cleared either way, so a second verify on the
    /// same stub succeeds trivially.
    pub fn verify(&self) -> StubResult<()> {
        let failures = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .verify();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StubError::UnsatisfiedExpectations(failures.join("\n")))
        }
    }
}

fn accept_loop(listener: TcpListener, store: Arc<Mutex<ExpectationStore>>, stopped: Arc<AtomicBool>) {
    loop {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                trace!("HTTP connection from {addr}");
                if let Err(err) = handle_connection(stream, &store) {
                    // failures are isolated to this connection
                    error!("HTTP connection error: {err}");
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                error!("HTTP accept failed: {err}");
                break;
            }
        }
    }
    debug!("HTTP accept loop terminated");
}

/// Read one request, consult the store and answer. The body was fully drained by the
/// time the store is consulted, also on the error paths.
fn handle_connection(mut stream: TcpStream, store: &Arc<Mutex<ExpectationStore>>) -> io::Result<()> {
    // sockets accepted from a nonblocking listener must go back to blocking mode
    stream.set_nonblocking(false)?;
    let request = wire::read_request(&mut stream)?;
    if request.path == SHUTDOWN_PATH {
        return wire::write_response(&mut stream, 200, wire::reason_phrase(200), "text/plain", b"");
    }
    let outcome = store
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .select(&request.method, &request.path, &request.body);
    match outcome {
        MatchOutcome::Matched(response) => wire::write_response(
            &mut stream,
            response.status(),
            wire::reason_phrase(response.status()),
            response.mime_type(),
            response.body(),
        ),
        MatchOutcome::Exhausted(candidates) => wire::write_response(
            &mut stream,
            400,
            "Expectations exhausted",
            "text/plain",
            format!("Expectations at this URL have already been satisfied.\n{candidates}")
                .as_bytes(),
        ),
        MatchOutcome::MethodNotAllowed(candidates) => wire::write_response(
            &mut stream,
            405,
            "Method not allowed",
            "text/plain",
            format!("Method {} not allowed.\n{candidates}", request.method).as_bytes(),
        ),
        MatchOutcome::NotFound => wire::write_response(
            &mut stream,
            404,
            "Not found",
            "text/plain",
            b"No URL pattern matched.",
        ),
    }
}
