use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::rngs::SmallRng;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::config::Tunables;
use crate::error::SessionError;
use crate::message::{Request, Response};
use crate::pacing::Pacing;
use crate::protocol::{Codec, TERMINATOR};
use crate::samples::SamplePools;
use crate::workload::RequestGenerator;

/// Opens the transport a session talks over.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self) -> io::Result<Self::Stream>;
}

#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Everything sessions of one run share. Nothing in here changes after the run starts.
pub struct SessionContext {
    pub codec: Arc<dyn Codec>,
    pub pools: Arc<SamplePools>,
    pub tunables: Tunables,
    pub pacing: Pacing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    LoggingIn,
    Active,
    Terminated,
}

/// Why a session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    DialFailed,
    LoginRejected,
    WriteFailed,
    ReadFailed,
    /// The server closed the connection.
    Disconnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub id: Uuid,
    pub termination: Termination,
    pub requests_sent: usize,
    pub responses_received: usize,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} ended ({:?}) after {} requests, {} responses",
            self.id, self.termination, self.requests_sent, self.responses_received
        )
    }
}

/// One simulated terminal. Owns its connection exclusively; dropping the session closes it.
pub struct Session<S> {
    id: Uuid,
    stream: BufReader<S>,
    ctx: Arc<SessionContext>,
    rng: SmallRng,
    buf: Vec<u8>,
    state: SessionState,
    requests_sent: usize,
    responses_received: usize,
}

/// Dials the server and runs a session to completion. A failed dial is final.
pub async fn connect_and_run<C: Connector + ?Sized>(
    connector: &C,
    ctx: Arc<SessionContext>,
    rng: SmallRng,
) -> SessionReport {
    let id = Uuid::new_v4();
    debug!("[{}] {:?} -> {:?}", id, SessionState::Disconnected, SessionState::Connecting);

    match connector.connect().await {
        Ok(stream) => Session::new(id, stream, ctx, rng).run().await,
        Err(e) => {
            let e = SessionError::Dial(e);
            error!("[{}] {}", id, e);

            SessionReport {
                id,
                termination: Termination::DialFailed,
                requests_sent: 0,
                responses_received: 0,
            }
        }
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: Uuid, stream: S, ctx: Arc<SessionContext>, rng: SmallRng) -> Self {
        Self {
            id,
            stream: BufReader::new(stream),
            ctx,
            rng,
            buf: Vec::with_capacity(512),
            state: SessionState::Connecting,
            requests_sent: 0,
            responses_received: 0,
        }
    }

    #[cfg(test)]
    fn state(&self) -> SessionState {
        self.state
    }

    /// Runs until the connection fails or the server turns the login down.
    pub async fn run(mut self) -> SessionReport {
        let err = match self.drive().await {
            Ok(never) => match never {},
            Err(e) => e,
        };

        match err {
            SessionError::CleanDisconnect => debug!("[{}] {}", self.id, err),
            SessionError::LoginRejected => warn!("[{}] {}", self.id, err),
            _ => error!("[{}] {}", self.id, err),
        }

        self.transition(SessionState::Terminated);

        SessionReport {
            id: self.id,
            // Decode errors are absorbed by `drive`, so every error reaching here is final.
            termination: err.termination().unwrap_or(Termination::ReadFailed),
            requests_sent: self.requests_sent,
            responses_received: self.responses_received,
        }
    }

    async fn drive(&mut self) -> Result<std::convert::Infallible, SessionError> {
        let login = RequestGenerator::new(&self.ctx.pools).login(&mut self.rng);

        if let Some(login) = login {
            self.transition(SessionState::LoggingIn);
            self.login(&login).await?;
        }

        self.transition(SessionState::Active);

        loop {
            let delay = self
                .ctx
                .pacing
                .delay(self.ctx.tunables.busy_factor(), &mut self.rng);

            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    info!("[{}] busy factor is 0, staying idle", self.id);
                    std::future::pending::<()>().await;
                }
            }

            let request = RequestGenerator::new(&self.ctx.pools).next(&mut self.rng);

            match self.exchange(&request).await {
                Ok(_) => {}
                Err(SessionError::Decode(e)) => {
                    warn!("[{}] error decoding SIP response: {}", self.id, e)
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn login(&mut self, login: &Request) -> Result<(), SessionError> {
        match self.exchange(login).await {
            Ok(response) if !response.ok() => Err(SessionError::LoginRejected),
            Ok(_) => Ok(()),
            // Nothing decoded means no affirmative ok flag either.
            Err(SessionError::Decode(e)) => {
                warn!("[{}] error decoding SIP login response: {}", self.id, e);
                Err(SessionError::LoginRejected)
            }
            Err(e) => Err(e),
        }
    }

    /// Sends one request and waits for its response. No pipelining: there is never more than
    /// one request in flight.
    async fn exchange(&mut self, request: &Request) -> Result<Response, SessionError> {
        let frame = self.ctx.codec.encode(request, self.requests_sent);

        self.stream
            .write_all(&frame)
            .await
            .map_err(SessionError::from_write)?;
        self.stream.flush().await.map_err(SessionError::from_write)?;
        self.requests_sent += 1;

        self.buf.clear();
        let read = self
            .stream
            .read_until(TERMINATOR, &mut self.buf)
            .await
            .map_err(SessionError::from_read)?;

        // EOF, with or without a partial frame
        if read == 0 || self.buf.last() != Some(&TERMINATOR) {
            return Err(SessionError::CleanDisconnect);
        }
        self.responses_received += 1;

        Ok(self.ctx.codec.decode(&self.buf)?)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("[{}] {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        sync::atomic::{AtomicUsize, Ordering},
        task::{Context, Poll},
    };

    use rand::SeedableRng;
    use tokio::io::{duplex, DuplexStream, ReadBuf};

    use super::*;
    use crate::protocol::Sip2Codec;
    use crate::workload::tests::pools;

    fn context(with_login: bool) -> Arc<SessionContext> {
        Arc::new(SessionContext {
            codec: Arc::new(Sip2Codec::default()),
            pools: Arc::new(pools(with_login)),
            tunables: Tunables::new(1.0, 0.0).unwrap(),
            pacing: Pacing::ScaledUniform,
        })
    }

    fn session<S: AsyncRead + AsyncWrite + Unpin>(stream: S, with_login: bool) -> Session<S> {
        Session::new(
            Uuid::new_v4(),
            stream,
            context(with_login),
            SmallRng::seed_from_u64(99),
        )
    }

    /// Fails every write and counts attempted reads.
    struct BrokenWrites {
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for BrokenWrites {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for BrokenWrites {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Reads request frames and answers each with the next scripted reply. Once the script runs
    /// out, reads one more request and hangs up without answering.
    async fn scripted_server(stream: DuplexStream, replies: Vec<&'static str>) -> Vec<String> {
        let mut stream = BufReader::new(stream);
        let mut requests = Vec::new();
        let mut buf = Vec::new();

        for reply in replies.into_iter().map(Some).chain([None]) {
            buf.clear();
            if stream.read_until(TERMINATOR, &mut buf).await.unwrap() == 0 {
                break;
            }
            requests.push(String::from_utf8(buf.clone()).unwrap());

            match reply {
                Some(reply) => stream.write_all(reply.as_bytes()).await.unwrap(),
                None => break,
            }
        }

        requests
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_terminates_without_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let stream = BrokenWrites {
            reads: reads.clone(),
        };

        let report = session(stream, false).run().await;

        assert_eq!(report.termination, Termination::WriteFailed);
        assert_eq!(report.requests_sent, 0);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_keeps_session_active() {
        let (client, server) = duplex(4096);
        let server = tokio::spawn(scripted_server(server, vec!["XX garbage\r", "96\r"]));

        let report = session(client, false).run().await;
        let requests = server.await.unwrap();

        assert_eq!(requests.len(), 3);
        assert_eq!(report.requests_sent, 3);
        assert_eq!(report.responses_received, 2);
        assert_eq!(report.termination, Termination::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_rejected() {
        let (client, server) = duplex(4096);
        let server = tokio::spawn(scripted_server(server, vec!["940\r"]));

        let session = session(client, true);
        assert_eq!(session.state(), SessionState::Connecting);

        let report = session.run().await;
        let requests = server.await.unwrap();

        assert_eq!(report.termination, Termination::LoginRejected);
        assert_eq!(report.requests_sent, 1);
        assert_eq!(report.responses_received, 1);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("93"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_login_response_counts_as_rejection() {
        let (client, server) = duplex(4096);
        let server = tokio::spawn(scripted_server(server, vec!["??\r"]));

        let report = session(client, true).run().await;
        let requests = server.await.unwrap();

        assert_eq!(report.termination, Termination::LoginRejected);
        assert_eq!(report.requests_sent, 1);
        assert_eq!(report.responses_received, 1);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("93"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_frame_is_a_clean_disconnect() {
        let (client, server) = duplex(4096);
        let server = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut buf = Vec::new();
            server.read_until(TERMINATOR, &mut buf).await.unwrap();
            server.write_all(b"12").await.unwrap();
        });

        let report = session(client, false).run().await;
        server.await.unwrap();

        assert_eq!(report.termination, Termination::Disconnected);
        assert_eq!(report.responses_received, 0);
    }
}
