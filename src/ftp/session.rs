//! # Session
//!
//! Per-connection state machine driving the FTP control channel

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::command::{Command, CommandError};
use super::data::{DataChannel, TransferAction};
use super::file_store::FileStore;
use crate::status::Status;

const GREETING: &str = "220 (stubnet FTP stub)\r\n";
const GOODBYE: &str = "221-Goodbye.\r\n221 Have fun.\r\n";

/// How long a transfer command waits for its data channel to complete
const DATA_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30);

/// One FTP control connection. Commands are processed strictly in sequence: the next
/// command line is not read until the previous reply went out and any data-channel
/// rendezvous completed.
pub(crate) struct Session {
    reader: BufReader<TcpStream>,
    working_dir: String,
    files: FileStore,
    interactions: Arc<Mutex<Vec<String>>>,
    pending: Option<DataChannel>,
    communicating: bool,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        files: FileStore,
        interactions: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            reader: BufReader::new(stream),
            working_dir: "/".to_string(),
            files,
            interactions,
            pending: None,
            communicating: true,
        }
    }

    /// Drive the control channel until QUIT or EOF. I/O errors abort only this session.
    pub fn run(mut self) -> io::Result<()> {
        self.send_raw(GREETING)?;
        while self.communicating {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                debug!("control connection closed by peer");
                break;
            }
            let line = line.trim_end().to_string();
            trace!("CC IN: {line}");
            self.interactions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.clone());
            match line.parse::<Command>() {
                Ok(command) => self.dispatch(command)?,
                Err(CommandError::Unknown(token)) => {
                    self.reply(Status::BadCommand, &format!("Command {token} not recognized."))?
                }
                Err(CommandError::MissingArgument(name)) => {
                    self.reply(Status::BadArguments, &format!("{name} requires an argument."))?
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> io::Result<()> {
        match command {
            Command::User(_) => self.reply(Status::NeedPassword, "Please specify password."),
            Command::Pass(_) => self.reply(Status::LoggedIn, "You are now logged in."),
            Command::Type(_) => self.reply(Status::CommandOk, "Switching mode."),
            Command::Pwd => {
                let dir = self.working_dir.clone();
                self.reply(Status::PathCreated, &format!("\"{dir}\" is your current location"))
            }
            Command::Cwd(dir) => {
                // no validation: this is a stub, any directory exists
                self.working_dir = dir.clone();
                self.reply(
                    Status::RequestedFileActionOk,
                    &format!("OK. Current directory is \"{dir}\""),
                )
            }
            Command::Pasv => self.handle_pasv(),
            Command::Stor(filename) => self.handle_transfer(TransferAction::Store(filename)),
            Command::Retr(filename) => self.handle_transfer(TransferAction::Retrieve(filename)),
            Command::List => self.handle_transfer(TransferAction::List),
            Command::Nlst => self.handle_transfer(TransferAction::NameList),
            Command::Quit => {
                self.communicating = false;
                self.send_raw(GOODBYE)
            }
        }
    }

    /// Bind a fresh one-shot data channel and report its actual port in the PASV tuple
    fn handle_pasv(&mut self) -> io::Result<()> {
        let channel = DataChannel::bind()?;
        let port = channel.port();
        self.pending = Some(channel);
        self.reply(
            Status::PassiveMode,
            &format!("Entering Passive Mode. (127,0,0,1,{},{})", port >> 8, port & 0xff),
        )
    }

    /// Consume the pending data channel for one transfer: reply 150, run the transfer
    /// on its own thread, await the rendezvous, then send the final status line
    fn handle_transfer(&mut self, action: TransferAction) -> io::Result<()> {
        let Some(channel) = self.pending.take() else {
            return self.reply(Status::CannotOpenDataConnection, "Use PASV first.");
        };
        if let TransferAction::Retrieve(filename) = &action {
            if self.files.get(filename).is_none() {
                // dropping the channel closes the never-announced listener
                return self.reply(Status::FileUnavailable, &format!("{filename}: no such file."));
            }
        }
        let (open_msg, done_msg) = match &action {
            TransferAction::Store(_) => ("Okay to send data", "Got the file"),
            TransferAction::Retrieve(_) => ("Accepted data connection", "Enjoy your file"),
            TransferAction::List | TransferAction::NameList => {
                ("Accepted data connection", "You got the listings now")
            }
        };
        self.reply(Status::AboutToSend, open_msg)?;
        let receiver = channel.launch(action, self.files.clone());
        match receiver.recv_timeout(DATA_RENDEZVOUS_TIMEOUT) {
            Ok(Ok(())) => self.reply(Status::ClosingDataConnection, done_msg),
            Ok(Err(err)) => {
                error!("data transfer failed: {err}");
                self.reply(Status::ActionAborted, "Transfer failed.")
            }
            Err(_) => {
                error!("data channel rendezvous timed out");
                self.reply(Status::ActionAborted, "Data channel timed out.")
            }
        }
    }

    fn reply(&mut self, status: Status, message: &str) -> io::Result<()> {
        self.send_raw(&format!("{} {message}\r\n", status.code()))
    }

    fn send_raw(&mut self, line: &str) -> io::Result<()> {
        trace!("CC OUT: {}", line.trim_end());
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.flush()
    }
}
