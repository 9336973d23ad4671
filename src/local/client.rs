use colored::Colorize;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{load_config, Config};
use crate::error::TransportResult;
use crate::processing::session::{ConnectionState, GazeStreamSession};
use crate::processing::transport::{GazeTransport, TransportEvent};
use crate::utils::log::{log_to_file, GazeRecorder};

const READ_CHUNK: usize = 4096;
/// Longest partial line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;
const IDLE_SLEEP: Duration = Duration::from_millis(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

// -----------------------------------------------------------------------------
// TCP TRANSPORT
// -----------------------------------------------------------------------------

/// Newline-delimited JSON over a non-blocking TCP stream.
pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
    lines: VecDeque<String>,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
            buffer: Vec::with_capacity(READ_CHUNK),
            lines: VecDeque::new(),
        }
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                self.lines.push_back(text);
            }
        }
    }
}

impl GazeTransport for TcpTransport {
    fn open(&mut self) -> TransportResult<()> {
        let stream = TcpStream::connect(&self.address)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.buffer.clear();
        self.lines.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn poll(&mut self) -> TransportEvent {
        if let Some(line) = self.lines.pop_front() {
            return TransportEvent::Message(line);
        }

        let Some(stream) = self.stream.as_mut() else {
            return TransportEvent::Idle;
        };

        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => {
                self.stream = None;
                TransportEvent::Closed
            }
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                self.split_lines();
                if self.buffer.len() > MAX_LINE_BYTES {
                    let pending = self.buffer.len();
                    self.close();
                    return TransportEvent::Error(format!(
                        "message exceeds {} bytes without a newline ({} pending)",
                        MAX_LINE_BYTES, pending
                    ));
                }
                match self.lines.pop_front() {
                    Some(line) => TransportEvent::Message(line),
                    None => TransportEvent::Idle,
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                TransportEvent::Idle
            }
            Err(e) => {
                self.stream = None;
                TransportEvent::Error(e.to_string())
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.buffer.clear();
        self.lines.clear();
    }
}

// -----------------------------------------------------------------------------
// RUN CODE
// -----------------------------------------------------------------------------

pub fn run(config_path: Option<&Path>) -> io::Result<()> {
    let config = match config_path {
        Some(path) => {
            load_config(path).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?
        }
        None => Config::default(),
    };

    let transport = TcpTransport::new(config.session.address.clone());
    let mut session = GazeStreamSession::from_config(Box::new(transport), &config);

    if let Some(path) = &config.session.record_path {
        let recorder = GazeRecorder::create(path)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))?;
        session.add_observer(Box::new(recorder));
        info!("Recording gaze samples to {}", path.display());
    }

    if !config.session.auto_connect {
        println!(
            "{} {}",
            "Press Enter to connect to".white(),
            config.session.address.cyan()
        );
        io::stdin().read_line(&mut String::new())?;
    }

    println!(
        "{} {}",
        "Connecting to tracker at".white(),
        config.session.address.cyan()
    );

    let mut last_count = 0;
    loop {
        if !session.is_connected() {
            session.connect();
            if let Some(error) = session.error() {
                let message = format!("{}", error);
                eprintln!("{}", message.red());
                if let Err(e) = log_to_file("client.log", &message) {
                    warn!("Failed to write client log: {}", e);
                }
                std::thread::sleep(RECONNECT_DELAY);
                continue;
            }
        }

        if session.drain() == 0 {
            std::thread::sleep(IDLE_SLEEP);
        }

        if session.message_count() != last_count {
            last_count = session.message_count();
            print_status(&session)?;
        }
    }
}

fn print_status(session: &GazeStreamSession) -> io::Result<()> {
    let state = match session.state() {
        ConnectionState::Connected => session.state().as_str().green(),
        ConnectionState::Frozen => session.state().as_str().blue(),
        _ => session.state().as_str().red(),
    };

    let point = match session.calibrated_gaze_point() {
        Some(p) => format!("({:>7.1}, {:>7.1})", p.x, p.y).yellow(),
        None => "(   --  ,    --  )".white(),
    };

    let mut stdout = io::stdout();
    write!(
        stdout,
        "\r{} {} {:>6.1} fps  #{}   ",
        state,
        point,
        session.fps(),
        session.message_count()
    )?;
    stdout.flush()
}
