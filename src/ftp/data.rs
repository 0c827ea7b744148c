//! # Data channel
//!
//! One-shot passive-mode data channel used for STOR/RETR/LIST/NLST payload transfer

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::sync::mpsc;

use super::file_store::FileStore;

/// What the data channel does with its single accepted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransferAction {
    /// Read the connection to EOF and store the bytes under the given filename
    Store(String),
    /// Write the stored file's bytes to the connection
    Retrieve(String),
    /// Write all stored filenames, newline separated
    List,
    /// Write all stored filenames, CRLF separated
    NameList,
}

/// Short-lived listener bound in response to PASV and torn down after exactly one
/// accepted connection. A subsequent transfer command allocates a fresh channel on a
/// fresh OS-assigned port.
pub(crate) struct DataChannel {
    listener: TcpListener,
    port: u16,
}

impl DataChannel {
    /// Bind a fresh ephemeral loopback port for one transfer
    pub fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        debug!("data channel listening on 127.0.0.1:{port}");
        Ok(Self { listener, port })
    }

    /// The actual bound port, reported in the PASV reply
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the one-shot transfer on its own thread. Completion is signalled through
    /// the returned receiver, which the control handler awaits before sending the
    /// final control-channel status line.
    pub fn launch(self, action: TransferAction, files: FileStore) -> mpsc::Receiver<io::Result<()>> {
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            // the control handler may have stopped waiting; nothing to do then
            let _ = sender.send(self.serve(action, files));
        });
        receiver
    }

    /// Accept one connection and perform the transfer
    fn serve(self, action: TransferAction, files: FileStore) -> io::Result<()> {
        let (mut stream, addr) = self.listener.accept()?;
        trace!("data connection from {addr} for {action:?}");
        match action {
            TransferAction::Store(name) => {
                let mut content = Vec::new();
                stream.read_to_end(&mut content)?;
                // trailing newline/whitespace is trimmed, as for a text-mode upload
                while content.last().is_some_and(u8::is_ascii_whitespace) {
                    content.pop();
                }
                files.insert(name, content);
            }
            TransferAction::Retrieve(name) => {
                if let Some(content) = files.get(&name) {
                    stream.write_all(&content)?;
                }
            }
            TransferAction::List => {
                stream.write_all(files.names().join("\n").as_bytes())?;
            }
            TransferAction::NameList => {
                stream.write_all(files.names().join("\r\n").as_bytes())?;
            }
        }
        stream.flush()
        // both the connection and the listener are dropped here: one-shot
    }
}
