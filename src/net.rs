/*!
 * Network Layer
 *
 * Thread-per-connection TCP server. The accept loop runs on the caller's
 * thread, each accepted connection gets its own OS thread running
 * [`handle_connection`], and the statistics reporter runs on one more.
 */

use crate::error::{DecodeError, ServerError};
use crate::protocol::{parse_many, parse_rest, write_response, ErrorLength, Request, Response};
use crate::space::TupleSpace;
use crate::stats::{self, spawn_reporter, Snapshot, DEFAULT_REPORT_INTERVAL};
use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// Size of read buffer for incoming data
const READ_BUF: usize = 1024;

/// Listen backlog handed to the kernel
const BACKLOG: i32 = 128;

/// How long a partial request may sit in the buffer before it is answered as is
pub const PARTIAL_REQUEST_WAIT: Duration = Duration::from_millis(200);

/// Runtime settings for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on; all interfaces by default
    pub addr: SocketAddr,
    /// Period of the statistics report
    pub report_interval: Duration,
    /// Close connections idle for longer than this; `None` waits forever
    pub read_timeout: Option<Duration>,
    /// Length header policy for ERROR responses
    pub error_length: ErrorLength,
}

/// Listens on an OS-assigned port
impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_port(0)
    }
}

impl ServerConfig {
    /// Defaults, listening on `port` on all interfaces
    pub fn with_port(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            report_interval: DEFAULT_REPORT_INTERVAL,
            read_timeout: None,
            error_length: ErrorLength::Fixed,
        }
    }
}

/// Bind a blocking TCP listener with SO_REUSEADDR set
///
/// Lets a restarted server take its port back while old connections are
/// still in TIME_WAIT.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let bind = || -> io::Result<TcpListener> {
        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(BACKLOG)?;
        Ok(socket.into())
    };
    bind().map_err(|source| ServerError::Bind { addr, source })
}

/// The tuple space server: one listener, one shared space
pub struct Server {
    listener: TcpListener,
    space: Arc<TupleSpace>,
    config: ServerConfig,
}

impl Server {
    /// Bind the configured address with a fresh, empty tuple space
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_space(config, Arc::new(TupleSpace::new()))
    }

    /// Bind the configured address serving an existing space
    pub fn with_space(config: ServerConfig, space: Arc<TupleSpace>) -> Result<Self, ServerError> {
        let listener = bind_listener(config.addr)?;
        Ok(Self {
            listener,
            space,
            config,
        })
    }

    /// Actual bound address; differs from the config when port 0 was asked for
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn space(&self) -> Arc<TupleSpace> {
        self.space.clone()
    }

    /// Serve forever, writing statistics reports to the log
    pub fn run(self) -> Result<(), ServerError> {
        self.run_with_sink(stats::log_report)
    }

    /// Serve forever, handing each statistics report to `sink`
    ///
    /// Only returns on a fatal accept error.
    pub fn run_with_sink<F>(self, sink: F) -> Result<(), ServerError>
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        let _reporter = spawn_reporter(self.space.clone(), self.config.report_interval, sink)?;

        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(x) => x,
                Err(ref e) if is_transient(e) => {
                    log::warn!("accept failed, retrying: {}", e);
                    continue;
                }
                Err(e) => return Err(ServerError::Accept(e)),
            };
            self.space.record_client();
            self.spawn_handler(stream, peer);
        }
    }

    fn spawn_handler(&self, mut stream: TcpStream, peer: SocketAddr) {
        stream.set_nodelay(true).ok();

        let space = self.space.clone();
        let errors = self.config.error_length;
        let idle = self.config.read_timeout;
        let spawned = std::thread::Builder::new()
            .name(format!("conn-{}", peer))
            .spawn(move || {
                log::debug!("{} connected", peer);
                match handle_connection(&mut stream, &space, errors, idle) {
                    Ok(()) => log::debug!("{} disconnected", peer),
                    Err(e) => log::warn!("{}: {:#}", peer, anyhow::Error::from(e)),
                }
            });
        if let Err(e) = spawned {
            log::error!("{}: {}", peer, ServerError::Spawn("connection", e));
        }
    }
}

/// A byte stream whose reads can be bounded in time
pub trait Transport: Read + Write {
    fn set_read_timeout(&mut self, dur: Option<Duration>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_read_timeout(&mut self, dur: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(&*self, dur)
    }
}

/// Serve one connection until the peer closes it or I/O fails
///
/// Each pass reads whatever bytes arrived, answers every complete request
/// frame in order, and writes the answers back in one go. The space's guard
/// is only taken inside [`TupleSpace::exec`], never across the socket write.
///
/// A partial frame left in the buffer switches the read timeout to
/// [`PARTIAL_REQUEST_WAIT`]; if the peer sends nothing more by then, or
/// closes, the buffered bytes are answered as one request. `idle` bounds
/// reads otherwise.
pub fn handle_connection<S: Transport>(
    stream: &mut S,
    space: &TupleSpace,
    errors: ErrorLength,
    idle: Option<Duration>,
) -> Result<(), ServerError> {
    let mut rbuf = BytesMut::with_capacity(READ_BUF);
    let mut wbuf = BytesMut::new();
    let mut reqs = Vec::with_capacity(4);
    let mut tmp = [0u8; READ_BUF];
    let mut partial = false;
    stream.set_read_timeout(idle)?;

    loop {
        match stream.read(&mut tmp) {
            Ok(0) => {
                if rbuf.is_empty() {
                    return Ok(());
                }
                log::debug!("peer closed with {} bytes of partial request", rbuf.len());
                parse_rest(&mut rbuf, &mut reqs);
                respond(&mut reqs, space, errors, &mut wbuf);
                // the peer may only have shut down its write half
                if let Err(e) = stream.write_all(&wbuf) {
                    log::debug!("cannot answer partial request: {}", e);
                }
                return Ok(());
            }
            Ok(n) => {
                rbuf.extend_from_slice(&tmp[..n]);
                parse_many(&mut rbuf, &mut reqs);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if partial && is_timeout(e) => {
                log::debug!("peer stalled with {} bytes of partial request", rbuf.len());
                parse_rest(&mut rbuf, &mut reqs);
            }
            Err(e) => return Err(e.into()),
        }

        respond(&mut reqs, space, errors, &mut wbuf);
        if !wbuf.is_empty() {
            stream.write_all(&wbuf)?;
            stream.flush()?;
            wbuf.clear();
        }

        let waiting = !rbuf.is_empty();
        if waiting != partial {
            partial = waiting;
            stream.set_read_timeout(if partial { Some(PARTIAL_REQUEST_WAIT) } else { idle })?;
        }
    }
}

/// Execute or reject every decoded request, encoding the answers into `wbuf`
fn respond(
    reqs: &mut Vec<Result<Request, DecodeError>>,
    space: &TupleSpace,
    errors: ErrorLength,
    wbuf: &mut BytesMut,
) {
    for req in reqs.drain(..) {
        let resp = match req {
            Ok(req) => {
                log::trace!("request {:?}", req);
                space.exec(req)
            }
            Err(e) => {
                log::debug!("undecodable request: {}", e);
                space.record_error();
                Response::failure(e)
            }
        };
        log::trace!("response {}", resp);
        write_response(&resp, errors, wbuf);
    }
}

#[inline]
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// accept() errors caused by a single misbehaving peer
#[inline]
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
