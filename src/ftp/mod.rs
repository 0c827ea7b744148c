//! # FTP stub
//!
//! This module contains the FTP stub server: a loopback control channel with
//! passive-mode data transfers backed by an in-memory file store

mod command;
mod data;
mod file_store;
mod session;

use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use file_store::FileStore;
use session::Session;

use crate::types::{StubError, StubResult};

/// How often the accept loop checks the stop flag while idle
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The FTP stub server.
///
/// Implements USER, PASS, TYPE, PASV, STOR, RETR, LIST, NLST, CWD, PWD and QUIT; any
/// credentials are accepted and the working directory is never validated. Stored files
/// live in memory, where tests can read them back with [`FtpStubServer::files`] or
/// seed them with [`FtpStubServer::add_file`] without a real STOR. Multiple control
/// connections are served concurrently; each one runs on its own thread.
pub struct FtpStubServer {
    port: u16,
    files: FileStore,
    interactions: Arc<Mutex<Vec<String>>>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FtpStubServer {
    /// Create a stub bound to the given port once started; `0` picks a free port
    pub fn new(port: u16) -> Self {
        Self {
            port,
            files: FileStore::default(),
            interactions: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(AtomicBool::new(false)),
            handle: None,
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
        debug!("FTP stub listening on 127.0.0.1:{}", self.port);
        let files = self.files.clone();
        let interactions = self.interactions.clone();
        let stopped = self.stopped.clone();
        self.handle = Some(std::thread::spawn(move || {
            accept_loop(listener, files, interactions, stopped)
        }));
        Ok(())
    }

    /// The port the stub is bound to; meaningful once [`FtpStubServer::run`] returned
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shut the listener down and clear stored files and logged interactions.
    ///
    /// In-flight sessions are left to finish on their own threads; an incomplete data
    /// channel rendezvous at shutdown is best-effort cleanup. A second call fails with
    /// [`StubError::NotRunning`].
    pub fn stop(&mut self) -> StubResult<()> {
        let handle = self.handle.take().ok_or(StubError::NotRunning)?;
        self.stopped.store(true, Ordering::SeqCst);
        let _ = handle.join();
        self.files.clear();
        self.interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("FTP stub stopped");
        Ok(())
    }

    /// Content of the stored file with the given name, if any
    pub fn files(&self, name: &str) -> Option<String> {
        self.files
            .get(name)
            .map(|content| String::from_utf8_lossy(&content).into_owned())
    }

    /// Seed the file store without a real STOR
    pub fn add_file(&self, name: &str, content: &str) {
        self.files
            .insert(name.to_string(), content.as_bytes().to_vec());
    }

    /// Every raw command line received so far, across all control connections
    pub fn interactions(&self) -> Vec<String> {
        self.interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn accept_loop(
    listener: TcpListener,
    files: FileStore,
    interactions: Arc<Mutex<Vec<String>>>,
    stopped: Arc<AtomicBool>,
) {
    loop {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("FTP client connected from {addr}");
                let files = files.clone();
                let interactions = interactions.clone();
                std::thread::spawn(move || {
                    // sockets accepted from a nonblocking listener must go back to
                    // blocking mode before the session loop reads from them
                    let session = match stream.set_nonblocking(false) {
                        Ok(()) => Session::new(stream, files, interactions),
                        Err(err) => {
                            error!("failed to configure control connection: {err}");
                            return;
                        }
                    };
                    if let Err(err) = session.run() {
                        // failures are isolated to this session
                        error!("FTP session terminated: {err}");
                    }
                });
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                error!("FTP accept failed: {err}");
                break;
            }
        }
    }
    debug!("FTP accept loop terminated");
}
