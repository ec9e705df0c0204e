#[cfg(test)]
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::thread::sleep;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::drivers::SweepError;
/// Default port of the SCPI raw-socket service.
pub const SCPI_RAW_PORT: u16 = 5025;
/// Blocking request/response link to one instrument.
///
/// Implementations must not return before the instrument had time to act on the command:
/// every `send` and `query` ends with the channel's settle delay.
pub trait InstrumentChannel {
    fn send(&mut self, command: &str) -> Result<(), SweepError>;
    fn query(&mut self, command: &str) -> Result<String, SweepError>;
}
impl<T: InstrumentChannel + ?Sized> InstrumentChannel for Box<T> {
    fn send(&mut self, command: &str) -> Result<(), SweepError> {
        (**self).send(command)
    }
    fn query(&mut self, command: &str) -> Result<String, SweepError> {
        (**self).query(command)
    }
}
pub type BoxedChannel = Box<dyn InstrumentChannel + Send>;
/// Delays applied around instrument I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Pause after every command and query.
    pub settle_ms: u64,
    /// Pause after reconfiguring the display (time division, output toggles).
    pub dwell_ms: u64,
    /// Accumulation window after statistics are (re)started.
    pub statistics_window_ms: u64,
    /// Read timeout of the underlying link.
    pub io_timeout_ms: u64,
}
impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            dwell_ms: 250,
            statistics_window_ms: 750,
            io_timeout_ms: 5000,
        }
    }
}
impl Timing {
    /// No pauses at all; for simulated instruments and tests.
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            dwell_ms: 0,
            statistics_window_ms: 0,
            ..Self::default()
        }
    }
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
    pub fn statistics_window(&self) -> Duration {
        Duration::from_millis(self.statistics_window_ms)
    }
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
/// Where an instrument is reachable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InstrumentAddress {
    Tcp { host: String, port: u16 },
    Serial { path: String, baud_rate: u32 },
}
impl fmt::Display for InstrumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstrumentAddress::Tcp { host, port } => write!(f, "{host}:{port}"),
            InstrumentAddress::Serial { path, baud_rate } => write!(f, "serial:{path}@{baud_rate}"),
        }
    }
}
impl FromStr for InstrumentAddress {
    type Err = SweepError;
    /// Accepts `host`, `host:port` or `serial:<path>[@baud]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SweepError::InvalidConfig(format!("bad instrument address {s:?}"));
        if let Some(rest) = s.strip_prefix("serial:") {
            let (path, baud_rate) = match rest.rsplit_once('@') {
                Some((path, baud)) => (path, baud.parse().map_err(|_| invalid())?),
                None => (rest, 9600),
            };
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(InstrumentAddress::Serial {
                path: path.to_owned(),
                baud_rate,
            });
        }
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (s, SCPI_RAW_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(InstrumentAddress::Tcp {
            host: host.to_owned(),
            port,
        })
    }
}
/// Newline-terminated SCPI over any byte stream.
pub struct ScpiChannel<L: Read + Write> {
    name: String,
    link: BufReader<L>,
    settle: Duration,
}
impl<L: Read + Write> ScpiChannel<L> {
    pub fn new(name: impl Into<String>, link: L, settle: Duration) -> Self {
        Self {
            name: name.into(),
            link: BufReader::new(link),
            settle,
        }
    }
    fn write_line(&mut self, command: &str) -> Result<(), SweepError> {
        log::debug!("{} <- {}", self.name, command);
        let writer = self.link.get_mut();
        writer
            .write_all(command.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|e| SweepError::transport(command, e))
    }
    fn settle(&self) {
        if !self.settle.is_zero() {
            sleep(self.settle);
        }
    }
}
impl<L: Read + Write> InstrumentChannel for ScpiChannel<L> {
    fn send(&mut self, command: &str) -> Result<(), SweepError> {
        self.write_line(command)?;
        self.settle();
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, SweepError> {
        self.write_line(command)?;
        let mut line = String::new();
        let read = self
            .link
            .read_line(&mut line)
            .map_err(|e| SweepError::transport(command, e))?;
        if read == 0 {
            return Err(SweepError::transport(
                command,
                io::Error::new(io::ErrorKind::UnexpectedEof, "instrument closed the connection"),
            ));
        }
        let response = line.trim_end_matches(&['\r', '\n'][..]).to_owned();
        log::debug!("{} -> {}", self.name, response);
        self.settle();
        Ok(response)
    }
}
/// Opens a hardware channel to `address`.
pub fn open_channel(
    name: &str,
    address: &InstrumentAddress,
    timing: &Timing,
) -> Result<BoxedChannel, SweepError> {
    let describe = format!("connect {address}");
    match address {
        InstrumentAddress::Tcp { host, port } => {
            let socket_addr = (host.as_str(), *port)
                .to_socket_addrs()
                .and_then(|mut addrs| {
                    addrs.next().ok_or_else(|| {
                        io::Error::new(io::ErrorKind::NotFound, "host did not resolve")
                    })
                })
                .map_err(|e| SweepError::transport(&describe, e))?;
            let stream = TcpStream::connect_timeout(&socket_addr, timing.io_timeout())
                .map_err(|e| SweepError::transport(&describe, e))?;
            stream
                .set_read_timeout(Some(timing.io_timeout()))
                .and_then(|_| stream.set_write_timeout(Some(timing.io_timeout())))
                .and_then(|_| stream.set_nodelay(true))
                .map_err(|e| SweepError::transport(&describe, e))?;
            log::info!("{name}: connected to {address}");
            Ok(Box::new(ScpiChannel::new(name, stream, timing.settle())))
        }
        InstrumentAddress::Serial { path, baud_rate } => {
            let port = serialport::new(path.as_str(), *baud_rate)
                .timeout(timing.io_timeout())
                .open()
                .map_err(|e| SweepError::transport(&describe, e.into()))?;
            log::info!("{name}: opened {address}");
            Ok(Box::new(ScpiChannel::new(name, port, timing.settle())))
        }
    }
}
/// In-memory channel for tests: replays canned responses and records every command.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    responses: VecDeque<String>,
    pub sent: Vec<String>,
}
#[cfg(test)]
impl ScriptedChannel {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            sent: Vec::new(),
        }
    }
}
#[cfg(test)]
impl InstrumentChannel for ScriptedChannel {
    fn send(&mut self, command: &str) -> Result<(), SweepError> {
        self.sent.push(command.to_owned());
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, SweepError> {
        self.sent.push(command.to_owned());
        self.responses.pop_front().ok_or_else(|| {
            SweepError::transport(
                command,
                io::Error::new(io::ErrorKind::TimedOut, "no scripted response left"),
            )
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    struct Loopback {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }
    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }
    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    #[test]
    fn scpi_channel_frames_commands_and_responses() {
        let link = Loopback {
            input: Cursor::new(b"TDIV 1.00E-03S\r\nC1:PAVA PKPK,5.0V\n".to_vec()),
            output: Vec::new(),
        };
        let mut channel = ScpiChannel::new("scope", link, Duration::ZERO);
        channel.send("PASTAT ON").unwrap();
        assert_eq!(channel.query("TIME_DIV?").unwrap(), "TDIV 1.00E-03S");
        assert_eq!(channel.query("C1:PAVA? PKPK").unwrap(), "C1:PAVA PKPK,5.0V");
        let err = channel.query("PAVA? STAT1").unwrap_err();
        assert!(matches!(err, SweepError::Transport { .. }));
        let written = String::from_utf8(channel.link.get_ref().output.clone()).unwrap();
        assert_eq!(written, "PASTAT ON\nTIME_DIV?\nC1:PAVA? PKPK\nPAVA? STAT1\n");
    }
    #[test]
    fn parses_addresses() {
        assert_eq!(
            "192.168.1.91".parse::<InstrumentAddress>().unwrap(),
            InstrumentAddress::Tcp {
                host: "192.168.1.91".into(),
                port: SCPI_RAW_PORT
            }
        );
        assert_eq!(
            "scope.lab:5555".parse::<InstrumentAddress>().unwrap(),
            InstrumentAddress::Tcp {
                host: "scope.lab".into(),
                port: 5555
            }
        );
        assert_eq!(
            "serial:/dev/ttyUSB0@115200".parse::<InstrumentAddress>().unwrap(),
            InstrumentAddress::Serial {
                path: "/dev/ttyUSB0".into(),
                baud_rate: 115200
            }
        );
        assert!("host:notaport".parse::<InstrumentAddress>().is_err());
        assert!("serial:".parse::<InstrumentAddress>().is_err());
    }
    #[test]
    fn scripted_channel_records_traffic() {
        let mut channel = ScriptedChannel::new(["ok"]);
        channel.send("OUTP1 ON").unwrap();
        assert_eq!(channel.query("*IDN?").unwrap(), "ok");
        assert!(channel.query("*IDN?").is_err());
        assert_eq!(channel.sent, vec!["OUTP1 ON", "*IDN?", "*IDN?"]);
    }
}
