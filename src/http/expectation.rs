//! # Expectation
//!
//! The ordered expectation store and the matching engine behind the HTTP stub

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use lazy_regex::Regex;

use crate::types::Method;

/// Caller-owned mapping the engine copies observed request bodies into, under key
/// `"body"`. Shared with the stub through [`crate::ExpectationHandle::capture_into`].
pub type CaptureSink = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Describes what a matched request receives back. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpec {
    status: u16,
    mime_type: String,
    body: Vec<u8>,
}

impl ResponseSpec {
    /// Instantiates a new `ResponseSpec`
    pub fn new(status: u16, mime_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            mime_type: mime_type.into(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A registered, single-use rule describing which inbound request to answer and how.
///
/// `expected_body` is advisory metadata: it is never consulted during matching, but it
/// shows up in verify descriptions so the intent stays visible.
pub(crate) struct Expectation {
    method: Method,
    url_pattern: Regex,
    expected_body: Option<Vec<u8>>,
    capture: Option<CaptureSink>,
    response: Option<ResponseSpec>,
    satisfied: bool,
}

impl Expectation {
    pub fn new(method: Method, url_pattern: Regex) -> Self {
        Self {
            method,
            url_pattern,
            expected_body: None,
            capture: None,
            response: None,
            satisfied: false,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url_pattern.as_str())?;
        if let Some(expected) = &self.expected_body {
            write!(f, " expected body: {:?}", String::from_utf8_lossy(expected))?;
        }
        if let Some(sink) = &self.capture {
            let sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(body) = sink.get("body") {
                write!(f, " captured body: {:?}", String::from_utf8_lossy(body))?;
            }
        }
        Ok(())
    }
}

/// Outcome of matching one inbound request against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchOutcome {
    /// Exactly one expectation was selected and marked satisfied
    Matched(ResponseSpec),
    /// Every expectation for this URL and method is satisfied already; carries their descriptions
    Exhausted(String),
    /// The URL is known but this method was never registered for it; carries the candidates
    MethodNotAllowed(String),
    /// No registered pattern matches the path at all
    NotFound,
}

/// Ordered sequence of expectations; insertion order is registration order.
///
/// One store exists per stub instance, shared between the accept loop and the
/// expectation handles behind a mutex. Matching is a single scan-and-mark critical
/// section, so each expectation answers at most one request even under concurrent
/// dispatch.
#[derive(Default)]
pub(crate) struct ExpectationStore {
    expectations: Vec<Expectation>,
}

impl ExpectationStore {
    /// Append an expectation, returning its registration index
    pub fn register(&mut self, expectation: Expectation) -> usize {
        self.expectations.push(expectation);
        self.expectations.len() - 1
    }

    pub fn set_expected_body(&mut self, index: usize, body: Vec<u8>) {
        self.expectations[index].expected_body = Some(body);
    }

    pub fn set_capture(&mut self, index: usize, sink: CaptureSink) {
        self.expectations[index].capture = Some(sink);
    }

    pub fn set_response(&mut self, index: usize, response: ResponseSpec) {
        self.expectations[index].response = Some(response);
    }

    /// Match one inbound request against the store.
    ///
    /// Selects the first unsatisfied expectation whose pattern matches `path` (search
    /// semantics) and whose method equals `method`, marks it satisfied and stores the
    /// drained `body` into its capture sink. When nothing is eligible the outcome
    /// classifies why: exhausted beats method-not-allowed beats not-found.
    ///
    /// # Panics
    ///
    /// Panics if the selected expectation was never given a response; that is a
    /// programming error in the test, not a runtime condition.
    pub fn select(&mut self, method: &str, path: &str, body: &[u8]) -> MatchOutcome {
        let by_url: Vec<usize> = (0..self.expectations.len())
            .filter(|&i| self.expectations[i].url_pattern.is_match(path))
            .collect();
        let by_url_and_method: Vec<usize> = by_url
            .iter()
            .copied()
            .filter(|&i| self.expectations[i].method.as_str() == method)
            .collect();
        let eligible = by_url_and_method
            .iter()
            .copied()
            .find(|&i| !self.expectations[i].satisfied);

        match eligible {
            Some(index) => {
                let expectation = &mut self.expectations[index];
                expectation.satisfied = true;
                debug!("request {method} {path} consumed expectation #{index}");
                if let Some(sink) = &expectation.capture {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert("body".to_string(), body.to_vec());
                }
                match &expectation.response {
                    Some(response) => MatchOutcome::Matched(response.clone()),
                    None => panic!(
                        "expectation `{} {}` has no response; call and_return() before serving requests",
                        expectation.method,
                        expectation.url_pattern.as_str()
                    ),
                }
            }
            None if !by_url_and_method.is_empty() => {
                debug!("request {method} {path} exhausted its expectations");
                MatchOutcome::Exhausted(self.describe(&by_url_and_method))
            }
            None if !by_url.is_empty() => {
                debug!("request {method} {path} matched a URL but not a method");
                MatchOutcome::MethodNotAllowed(self.describe(&by_url))
            }
            None => {
                debug!("request {method} {path} matched nothing");
                MatchOutcome::NotFound
            }
        }
    }

    /// Collect descriptions of every unsatisfied expectation, then clear the store.
    /// Collection and clearing happen under the same borrow, so a failed verify never
    /// leaves a partially cleared store behind.
    pub fn verify(&mut self) -> Vec<String> {
        let failures: Vec<String> = self
            .expectations
            .iter()
            .filter(|expectation| !expectation.satisfied)
            .map(ToString::to_string)
            .collect();
        self.expectations.clear();
        failures
    }

    fn describe(&self, indexes: &[usize]) -> String {
        indexes
            .iter()
            .map(|&i| self.expectations[i].to_string())
            .collect::<Vec<String>>()
            .join("\n")
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;

    use super::*;

    fn store_with(entries: &[(Method, &str, u16)]) -> ExpectationStore {
        let mut store = ExpectationStore::default();
        for &(method, pattern, status) in entries {
            let index = store.register(Expectation::new(
                method,
                Regex::new(pattern).expect("test pattern"),
            ));
            store.set_response(index, ResponseSpec::new(status, "text/plain", ""));
        }
        store
    }

    #[test]
    fn should_select_first_registered_expectation() {
        let mut store = store_with(&[(Method::Get, "^/a$", 200), (Method::Get, "^/a$", 201)]);
        assert_eq!(
            store.select("GET", "/a", b""),
            MatchOutcome::Matched(ResponseSpec::new(200, "text/plain", ""))
        );
        assert_eq!(
            store.select("GET", "/a", b""),
            MatchOutcome::Matched(ResponseSpec::new(201, "text/plain", ""))
        );
    }

    #[test]
    fn should_report_exhausted_once_all_matching_are_satisfied() {
        let mut store = store_with(&[(Method::Get, "^/a$", 200)]);
        store.select("GET", "/a", b"");
        match store.select("GET", "/a", b"") {
            MatchOutcome::Exhausted(description) => assert!(description.contains("GET ^/a$")),
            outcome => panic!("expected Exhausted, got {outcome:?}"),
        }
    }

    #[test]
    fn should_report_method_not_allowed_over_not_found() {
        let mut store = store_with(&[(Method::Post, "^/a$", 200)]);
        match store.select("GET", "/a", b"") {
            MatchOutcome::MethodNotAllowed(description) => {
                assert!(description.contains("POST ^/a$"))
            }
            outcome => panic!("expected MethodNotAllowed, got {outcome:?}"),
        }
    }

    #[test]
    fn should_report_not_found_for_unknown_path() {
        let mut store = store_with(&[(Method::Get, "^/a$", 200)]);
        assert_eq!(store.select("GET", "/nope", b""), MatchOutcome::NotFound);
    }

    #[test]
    fn should_match_with_search_semantics() {
        // an unanchored pattern matches anywhere in the path
        let mut store = store_with(&[(Method::Get, "users", 200)]);
        assert_eq!(
            store.select("GET", "/api/users/42", b""),
            MatchOutcome::Matched(ResponseSpec::new(200, "text/plain", ""))
        );
    }

    #[test]
    fn should_capture_request_body_on_match() {
        let mut store = store_with(&[(Method::Post, "^/a$", 200)]);
        let sink: CaptureSink = Arc::new(Mutex::new(HashMap::new()));
        store.set_capture(0, sink.clone());
        store.select("POST", "/a", b"payload");
        assert_eq!(
            sink.lock().unwrap().get("body").map(Vec::as_slice),
            Some(b"payload".as_slice())
        );
    }

    #[test]
    fn should_not_use_expected_body_as_match_criterion() {
        let mut store = store_with(&[(Method::Post, "^/a$", 200)]);
        store.set_expected_body(0, b"something else".to_vec());
        assert_eq!(
            store.select("POST", "/a", b"payload"),
            MatchOutcome::Matched(ResponseSpec::new(200, "text/plain", ""))
        );
    }

    #[test]
    fn should_collect_unsatisfied_and_clear_on_verify() {
        let mut store = store_with(&[(Method::Get, "^/a$", 200), (Method::Get, "^/b$", 200)]);
        store.select("GET", "/a", b"");
        let failures = store.verify();
        assert_eq!(failures, vec!["GET ^/b$".to_string()]);
        // store is now empty: verify again succeeds trivially
        assert_eq!(store.verify(), Vec::<String>::new());
        assert_eq!(store.select("GET", "/a", b""), MatchOutcome::NotFound);
    }

    #[test]
    #[should_panic(expected = "has no response")]
    fn should_panic_when_response_was_never_set() {
        let mut store = ExpectationStore::default();
        store.register(Expectation::new(
            Method::Get,
            Regex::new("^/a$").expect("test pattern"),
        ));
        store.select("GET", "/a", b"");
    }
}
