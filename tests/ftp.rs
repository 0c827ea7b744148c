//! Integration tests driving the FTP stub with a hand-rolled control-channel client

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use lazy_regex::{lazy_regex, Lazy, Regex};
use pretty_assertions::assert_eq;
use stubnet::{FtpStubServer, StubError};

/// Extracts IP and port details from the PASV reply tuple (h1,h2,h3,h4,p1,p2)
static PASV_PORT_RE: Lazy<Regex> = lazy_regex!(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)");

fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal blocking FTP control-channel client
struct FtpTester {
    reader: BufReader<TcpStream>,
}

impl FtpTester {
    /// Connect and consume the greeting banner
    fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to stub");
        let mut tester = Self {
            reader: BufReader::new(stream),
        };
        let greeting = tester.read_reply();
        assert!(greeting.starts_with("220"), "unexpected greeting: {greeting}");
        tester
    }

    /// Connect and run the stub's no-op login handshake
    fn login(port: u16) -> Self {
        let mut tester = Self::connect(port);
        assert!(tester.send("USER test").starts_with("331"));
        assert!(tester.send("PASS test").starts_with("230"));
        tester
    }

    fn send(&mut self, line: &str) -> String {
        let stream = self.reader.get_mut();
        stream
            .write_all(format!("{line}\r\n").as_bytes())
            .expect("write command");
        self.read_reply()
    }

    fn read_reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read reply");
        line.trim_end().to_string()
    }

    /// Issue PASV and return the data port encoded in the reply
    fn pasv(&mut self) -> u16 {
        let reply = self.send("PASV");
        assert!(reply.starts_with("227"), "unexpected PASV reply: {reply}");
        let caps = PASV_PORT_RE.captures(&reply).expect("PASV tuple");
        let msb: u16 = caps[5].parse().expect("port msb");
        let lsb: u16 = caps[6].parse().expect("port lsb");
        (msb << 8) | lsb
    }

    /// STOR `filename` with the given content over a fresh data connection
    fn store(&mut self, filename: &str, content: &[u8]) {
        let port = self.pasv();
        let mut data = TcpStream::connect(("127.0.0.1", port)).expect("data connect");
        assert!(self.send(&format!("STOR {filename}")).starts_with("150"));
        data.write_all(content).expect("write data");
        drop(data);
        assert!(self.read_reply().starts_with("226"));
    }

    /// Run a data-channel command and return everything read from the data connection
    fn transfer(&mut self, command: &str) -> Vec<u8> {
        let port = self.pasv();
        let mut data = TcpStream::connect(("127.0.0.1", port)).expect("data connect");
        assert!(self.send(command).starts_with("150"));
        let mut content = Vec::new();
        data.read_to_end(&mut content).expect("read data");
        assert!(self.read_reply().starts_with("226"));
        content
    }

    fn quit(mut self) {
        assert_eq!(self.send("QUIT"), "221-Goodbye.");
        assert_eq!(self.read_reply(), "221 Have fun.");
    }
}

#[test]
fn should_accept_any_credentials() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::connect(server.port());
    assert_eq!(session.send("USER anyone"), "331 Please specify password.");
    assert_eq!(session.send("PASS whatever"), "230 You are now logged in.");
    assert_eq!(session.send("TYPE I"), "200 Switching mode.");
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_store_and_retrieve_a_file() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::login(server.port());
    session.store("foo.txt", b"cant believe its not bitter\n");

    // visible to test assertions right after STOR completes, trailing newline trimmed
    assert_eq!(
        server.files("foo.txt").as_deref(),
        Some("cant believe its not bitter")
    );

    let retrieved = session.transfer("RETR foo.txt");
    assert_eq!(retrieved, b"cant believe its not bitter");
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_list_all_stored_names() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();
    server.add_file("a.txt", "alpha");
    server.add_file("b.txt", "beta");

    let mut session = FtpTester::login(server.port());

    let listing = String::from_utf8(session.transfer("LIST")).unwrap();
    let mut names: Vec<&str> = listing.split('\n').collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    let listing = String::from_utf8(session.transfer("NLST")).unwrap();
    let mut names: Vec<&str> = listing.split("\r\n").collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_retrieve_seeded_file() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();
    server.add_file("seeded.txt", "from add_file");

    let mut session = FtpTester::login(server.port());
    assert_eq!(session.transfer("RETR seeded.txt"), b"from add_file");
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_reply_550_for_missing_file() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::login(server.port());
    session.pasv();
    assert_eq!(session.send("RETR ghost.txt"), "550 ghost.txt: no such file.");
    // the session survives and can allocate a fresh channel
    session.pasv();
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_reply_425_for_transfer_without_pasv() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::login(server.port());
    assert_eq!(session.send("LIST"), "425 Use PASV first.");
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_survive_unknown_commands() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::login(server.port());
    assert_eq!(session.send("MKD /tmp"), "500 Command MKD not recognized.");
    assert_eq!(session.send("STOR"), "501 STOR requires an argument.");
    // the session is still usable afterwards
    assert_eq!(session.send("PWD"), "257 \"/\" is your current location");
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_track_working_directory() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::login(server.port());
    assert_eq!(session.send("PWD"), "257 \"/\" is your current location");
    assert_eq!(
        session.send("CWD /uploads"),
        "250 OK. Current directory is \"/uploads\""
    );
    assert_eq!(session.send("PWD"), "257 \"/uploads\" is your current location");
    session.quit();
    server.stop().unwrap();
}

#[test]
fn should_log_raw_interactions() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut session = FtpTester::login(server.port());
    session.send("PWD");
    session.quit();

    let interactions = server.interactions();
    assert_eq!(
        interactions,
        vec![
            "USER test".to_string(),
            "PASS test".to_string(),
            "PWD".to_string(),
            "QUIT".to_string(),
        ]
    );
    server.stop().unwrap();
    // stop clears files and interactions
    assert_eq!(server.interactions(), Vec::<String>::new());
}

#[test]
fn should_stop_cleanly_and_only_once() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();
    server.stop().unwrap();
    assert!(matches!(server.stop(), Err(StubError::NotRunning)));
}

#[test]
fn should_serve_concurrent_control_connections() {
    log_init();
    let mut server = FtpStubServer::new(0);
    server.run().unwrap();

    let mut first = FtpTester::login(server.port());
    let mut second = FtpTester::login(server.port());
    assert_eq!(
        first.send("CWD /one"),
        "250 OK. Current directory is \"/one\""
    );
    // working directory is per-session state
    assert_eq!(second.send("PWD"), "257 \"/\" is your current location");
    first.quit();
    second.quit();
    server.stop().unwrap();
}
