#![crate_name = "stubnet"]
#![crate_type = "lib"]

//! # stubnet
//!
//! stubnet provides a pair of in-process network test doubles: a stub HTTP server and a
//! stub FTP server. They let you black-box test clients that make outbound HTTP or FTP
//! calls without a real backend: register ordered *expectations* (request patterns and
//! canned responses) before exercising the client under test, then ask the stub to
//! *verify* that every expectation was consumed exactly once.
//!
//! ## Get started
//!
//! Add **stubnet** to your dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! stubnet = "^0.1"
//! ```
//!
//! ## HTTP stub
//!
//! ```rust,no_run
//! use stubnet::{Method, ResponseSpec, StubServer};
//!
//! let mut server = StubServer::new(0);
//! server
//!     .expect(Method::Get, "^/api/users$")
//!     .and_return(ResponseSpec::new(200, "application/json", r#"[{"id": 1}]"#));
//! server.run().unwrap();
//!
//! // ... exercise the client under test against http://127.0.0.1:{server.port()} ...
//!
//! // stop() shuts the listener down and fails if any expectation went unused
//! server.stop().unwrap();
//! ```
//!
//! Expectations are consumed in FIFO order: registering the same pattern twice scripts
//! two successive responses for repeated calls to the same endpoint. Requests that match
//! no expectation receive a structured error instead: `400` when every matching
//! expectation is already satisfied, `405` when the URL is known but the method is not,
//! `404` otherwise.
//!
//! ## FTP stub
//!
//! ```rust,no_run
//! use stubnet::FtpStubServer;
//!
//! let mut server = FtpStubServer::new(0);
//! server.run().unwrap();
//!
//! // ... point the FTP client under test at 127.0.0.1:{server.port()} ...
//!
//! assert_eq!(server.files("report.csv").as_deref(), Some("a,b,c"));
//! server.stop().unwrap();
//! ```
//!
//! The FTP stub accepts any credentials, supports passive mode only and keeps stored
//! files in memory, where tests can inspect them with [`FtpStubServer::files`] or seed
//! them with [`FtpStubServer::add_file`].
//!
//! Both stubs bind `127.0.0.1`; pass port `0` to get an OS-assigned port, reported by
//! `port()` once the stub is running. Each stub instance owns all of its state, so
//! multiple instances can coexist in one test run.

// -- common deps
#[macro_use]
extern crate log;

// -- private
mod ftp;
mod http;
mod status;

// -- public
pub mod types;

pub use ftp::FtpStubServer;
pub use http::{CaptureSink, ExpectationHandle, ResponseSpec, StubServer};
pub use status::Status;
pub use types::{Method, StubError, StubResult};

// -- test logging
#[cfg(test)]
pub fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
