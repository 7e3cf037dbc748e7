// src/network/stratum.rs

//! Monero stratum client
//!
//! Speaks the JSON-RPC dialect Monero pools use (`login`, `submit`,
//! `keepalived`, pushed `job` notifications). By default messages travel as
//! newline-delimited JSON over TCP, wrapped in TLS for secure workers;
//! [`Transport::WebSocket`] carries one message per text frame instead.
//! [`StratumConnector`] opens the socket and spawns a link task that owns it;
//! the protocol bookkeeping lives in [`StratumState`], which never touches
//! I/O.
use crate::config::Worker;
use crate::miner::job::{MiningJob, parse_target};
use crate::network::connector::{
    LoginReply, PoolChannel, PoolConnector, PoolNotification, PoolRequest, Reply, ShareAck,
};
use crate::utils::error::MinerError;
use futures::future::{self, BoxFuture};
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt, sink, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tungstenite::protocol::Message;
use url::Url;

/// Depth of the request and notification queues of one link
const LINK_QUEUE: usize = 64;

/// How stratum messages are framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON over TCP (TLS when the worker is secure)
    #[default]
    Tcp,
    /// One JSON message per text frame over `ws://` or `wss://`
    WebSocket,
}

/// Opens stratum links to pools
#[derive(Debug, Clone)]
pub struct StratumConnector {
    /// Upper bound for DNS + TCP + TLS (+ WebSocket) handshake
    connect_timeout: Duration,
    transport: Transport,
}

impl StratumConnector {
    /// Creates a TCP connector with the given handshake timeout
    pub fn new(connect_timeout: Duration) -> Self {
        StratumConnector {
            connect_timeout,
            transport: Transport::Tcp,
        }
    }

    /// Uses `transport` for every link this connector opens
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Transport used for new links
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// WebSocket URL for a worker's pool
    ///
    /// # Errors
    /// `MinerError::ConfigError` if host and port do not form a valid URL
    pub fn url_for(worker: &Worker) -> Result<Url, MinerError> {
        let scheme = if worker.secure { "wss" } else { "ws" };
        let raw = format!("{}://{}:{}", scheme, worker.pool_host, worker.pool_port);
        Url::parse(&raw)
            .map_err(|e| MinerError::ConfigError(format!("Invalid pool address '{}': {}", raw, e)))
    }

    async fn open(&self, worker: &Worker) -> Result<PoolChannel, MinerError> {
        match self.transport {
            Transport::Tcp => {
                let socket = open_tcp(worker).await?;
                if worker.secure {
                    Ok(line_link(open_tls(worker, socket).await?))
                } else {
                    Ok(line_link(socket))
                }
            }
            Transport::WebSocket => open_websocket(worker).await,
        }
    }
}

impl Default for StratumConnector {
    fn default() -> Self {
        StratumConnector::new(Duration::from_secs(10))
    }
}

impl PoolConnector for StratumConnector {
    fn connect<'a>(&'a self, worker: &'a Worker) -> BoxFuture<'a, Result<PoolChannel, MinerError>> {
        async move {
            log::debug!(
                "Worker '{}': connecting to {}:{} over {:?}{}",
                worker.identifier,
                worker.pool_host,
                worker.pool_port,
                self.transport,
                if worker.secure { " (TLS)" } else { "" }
            );

            match time::timeout(self.connect_timeout, self.open(worker)).await {
                Ok(opened) => opened,
                Err(_) => Err(MinerError::ConnectionError(format!(
                    "Connection to {}:{} timed out after {:?}",
                    worker.pool_host, worker.pool_port, self.connect_timeout
                ))),
            }
        }
        .boxed()
    }
}

async fn open_tcp(worker: &Worker) -> Result<TcpStream, MinerError> {
    let socket = TcpStream::connect((worker.pool_host.as_str(), worker.pool_port))
        .await
        .map_err(|e| {
            MinerError::ConnectionError(format!(
                "Cannot reach {}:{}: {}",
                worker.pool_host, worker.pool_port, e
            ))
        })?;
    socket.set_nodelay(true)?;
    Ok(socket)
}

async fn open_tls(
    worker: &Worker,
    socket: TcpStream,
) -> Result<tokio_native_tls::TlsStream<TcpStream>, MinerError> {
    let connector = tokio_native_tls::native_tls::TlsConnector::new()
        .map_err(|e| MinerError::ConnectionError(format!("TLS setup failed: {}", e)))?;
    tokio_native_tls::TlsConnector::from(connector)
        .connect(&worker.pool_host, socket)
        .await
        .map_err(|e| {
            MinerError::ConnectionError(format!(
                "TLS handshake with {} failed: {}",
                worker.pool_host, e
            ))
        })
}

async fn open_websocket(worker: &Worker) -> Result<PoolChannel, MinerError> {
    let url = StratumConnector::url_for(worker)?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| {
            if e.to_string().contains("dns error") {
                MinerError::ConnectionError(format!(
                    "DNS resolution failed. Check pool host: {}",
                    worker.pool_host
                ))
            } else {
                e.into()
            }
        })?;

    let (ws_sink, ws_frames) = ws_stream.split();
    let lines_out = ws_sink.with(|line: String| {
        future::ready(Ok::<_, MinerError>(Message::Text(line.into())))
    });
    let lines_in = ws_frames
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(_) => None,
                Err(e) => Some(Err(MinerError::from(e))),
            })
        });
    Ok(spawn_link(lines_out, lines_in))
}

/// Frames a byte stream as one JSON message per line
fn line_link<T>(io: T) -> PoolChannel
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    let lines_in = stream::unfold(BufReader::new(reader).lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(MinerError::from(e)), lines)),
        }
    });
    let lines_out = sink::unfold(writer, |mut writer, line: String| async move {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<_, MinerError>(writer)
    });
    spawn_link(lines_out, lines_in)
}

fn spawn_link<S, R>(lines_out: S, lines_in: R) -> PoolChannel
where
    S: Sink<String, Error = MinerError> + Send + 'static,
    R: Stream<Item = Result<String, MinerError>> + Send + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(LINK_QUEUE);
    let (note_tx, note_rx) = mpsc::channel(LINK_QUEUE);
    tokio::spawn(run_link(lines_out, lines_in, request_rx, note_tx));

    PoolChannel {
        requests: request_tx,
        notifications: note_rx,
    }
}

/// Owns one socket: encodes requests, decodes replies and pushes
async fn run_link<S, R>(
    lines_out: S,
    lines_in: R,
    mut requests: mpsc::Receiver<PoolRequest>,
    notifications: mpsc::Sender<PoolNotification>,
) where
    S: Sink<String, Error = MinerError>,
    R: Stream<Item = Result<String, MinerError>>,
{
    futures::pin_mut!(lines_out);
    futures::pin_mut!(lines_in);
    let mut state = StratumState::default();

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(PoolRequest::Close) | None => {
                    let _ = lines_out.close().await;
                    break;
                }
                Some(request) => {
                    let Some(message) = state.encode(request) else { continue };
                    if let Err(e) = lines_out.send(message.to_string()).await {
                        let _ = notifications.send(PoolNotification::Closed(Some(e))).await;
                        break;
                    }
                }
            },
            line = lines_in.next() => match line {
                Some(Ok(text)) if text.trim().is_empty() => {}
                Some(Ok(text)) => match state.handle(&text) {
                    Ok(Some(note)) => {
                        if notifications.send(note).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Ignoring pool message: {}", e),
                },
                None => {
                    let _ = notifications.send(PoolNotification::Closed(None)).await;
                    break;
                }
                Some(Err(e)) => {
                    let _ = notifications.send(PoolNotification::Closed(Some(e))).await;
                    break;
                }
            },
        }
    }

    state.abandon();
}

enum PendingReply {
    Login(Reply<LoginReply>),
    Submit(Reply<ShareAck>),
}

/// Request/response bookkeeping for one stratum session
#[derive(Default)]
pub struct StratumState {
    next_id: u64,
    session_id: Option<String>,
    pending: HashMap<u64, PendingReply>,
}

impl StratumState {
    /// Session id assigned at login
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Requests still waiting for an answer
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Turns a request into a JSON-RPC message
    ///
    /// Returns `None` when there is nothing to send; a submit before login is
    /// answered right away with a `StateError`.
    pub fn encode(&mut self, request: PoolRequest) -> Option<Value> {
        match request {
            PoolRequest::Login {
                wallet,
                password,
                agent,
                reply,
            } => {
                let id = self.next_id();
                self.pending.insert(id, PendingReply::Login(reply));
                Some(json!({
                    "id": id,
                    "jsonrpc": "2.0",
                    "method": "login",
                    "params": {
                        "login": wallet,
                        "pass": password,
                        "agent": agent
                    }
                }))
            }
            PoolRequest::Submit { share, reply } => {
                let Some(session) = self.session_id.clone() else {
                    let _ = reply.send(Err(MinerError::StateError(
                        "Share submitted before login".into(),
                    )));
                    return None;
                };
                let id = self.next_id();
                self.pending.insert(id, PendingReply::Submit(reply));
                Some(json!({
                    "id": id,
                    "jsonrpc": "2.0",
                    "method": "submit",
                    "params": {
                        "id": session,
                        "job_id": share.job_id,
                        "nonce": share.nonce_hex(),
                        "result": share.result_hex()
                    }
                }))
            }
            PoolRequest::KeepAlive => {
                let session = self.session_id.clone()?;
                let id = self.next_id();
                Some(json!({
                    "id": id,
                    "jsonrpc": "2.0",
                    "method": "keepalived",
                    "params": { "id": session }
                }))
            }
            PoolRequest::Close => None,
        }
    }

    /// Handles one message from the pool
    ///
    /// Replies are routed to the waiting request; pushed messages come back as
    /// notifications.
    ///
    /// # Errors
    /// `MinerError::JsonError`/`ProtocolError` for messages that cannot be
    /// understood.
    pub fn handle(&mut self, text: &str) -> Result<Option<PoolNotification>, MinerError> {
        let message: Value = serde_json::from_str(text)?;

        if let Some(method) = message.get("method").and_then(Value::as_str) {
            return match method {
                "job" => Ok(Some(PoolNotification::Job(parse_job(&message["params"])?))),
                "block_found" | "blockFound" => Ok(Some(PoolNotification::BlockFound)),
                other => {
                    log::debug!("Unhandled pool method: {}", other);
                    Ok(None)
                }
            };
        }

        let id = message
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| MinerError::ProtocolError("Message has neither method nor id".into()))?;
        let Some(pending) = self.pending.remove(&id) else {
            log::trace!("Reply to untracked request {}", id);
            return Ok(None);
        };

        let error = message
            .get("error")
            .filter(|e| !e.is_null())
            .map(error_message);

        match pending {
            PendingReply::Login(reply) => {
                let outcome = match error {
                    Some(reason) => Err(MinerError::AuthError(reason)),
                    None => self.login_result(&message["result"]),
                };
                let _ = reply.send(outcome);
            }
            PendingReply::Submit(reply) => {
                let ack = match (error, message["result"]["status"].as_str()) {
                    (Some(reason), _) => ShareAck::Rejected(reason),
                    (None, Some(status)) if !status.eq_ignore_ascii_case("OK") => {
                        ShareAck::Rejected(status.to_string())
                    }
                    (None, _) => ShareAck::Accepted,
                };
                let _ = reply.send(Ok(ack));
            }
        }
        Ok(None)
    }

    fn login_result(&mut self, result: &Value) -> Result<LoginReply, MinerError> {
        let session_id = str_field(result, "id")?.to_string();
        let job = match result.get("job").filter(|j| !j.is_null()) {
            Some(job) => Some(parse_job(job)?),
            None => None,
        };
        self.session_id = Some(session_id.clone());
        Ok(LoginReply { session_id, job })
    }

    /// Fails every request still waiting; the link is gone
    fn abandon(&mut self) {
        for (_, pending) in self.pending.drain() {
            let error = || MinerError::ConnectionError("Pool link closed".into());
            match pending {
                PendingReply::Login(reply) => {
                    let _ = reply.send(Err(error()));
                }
                PendingReply::Submit(reply) => {
                    let _ = reply.send(Err(error()));
                }
            }
        }
    }
}

/// Parses the `params` of a job notification (or the login `job` object)
///
/// # Errors
/// `MinerError::ProtocolError` if `job_id`, `blob` or `target` is missing or
/// malformed.
pub fn parse_job(params: &Value) -> Result<MiningJob, MinerError> {
    let blob = hex::decode(str_field(params, "blob")?)?;
    let target = parse_target(str_field(params, "target")?)?;
    let mut job = MiningJob::new(str_field(params, "job_id")?, blob, target)?;

    job.seed_hash = params
        .get("seed_hash")
        .and_then(Value::as_str)
        .map(hex::decode)
        .transpose()?;
    job.algorithm = params
        .get("algo")
        .and_then(Value::as_str)
        .and_then(|algo| match algo.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        });
    job.height = params.get("height").and_then(Value::as_u64);
    Ok(job)
}

fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, MinerError> {
    value
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| MinerError::ProtocolError(format!("Missing '{}'", name)))
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::job::Share;
    use crate::types::AlgorithmType;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn blob_hex() -> String {
        hex::encode([7u8; 76])
    }

    fn login(state: &mut StratumState) -> (u64, oneshot::Receiver<Result<LoginReply, MinerError>>) {
        let (reply, rx) = oneshot::channel();
        let message = state
            .encode(PoolRequest::Login {
                wallet: "4Wallet".into(),
                password: "x".into(),
                agent: "test/1.0".into(),
                reply,
            })
            .unwrap();
        assert_eq!(message["method"], "login");
        assert_eq!(message["params"]["login"], "4Wallet");
        (message["id"].as_u64().unwrap(), rx)
    }

    fn logged_in() -> StratumState {
        let mut state = StratumState::default();
        let (id, _rx) = login(&mut state);
        let answer = json!({"id": id, "error": null, "result": {"id": "sess-1", "status": "OK"}});
        state.handle(&answer.to_string()).unwrap();
        state
    }

    fn submit(state: &mut StratumState) -> (Value, oneshot::Receiver<Result<ShareAck, MinerError>>) {
        let (reply, rx) = oneshot::channel();
        let share = Share {
            worker_id: "w1".into(),
            job_id: "job-9".into(),
            nonce: 0x0403_0201,
            result: [0xAB; 32],
        };
        (state.encode(PoolRequest::Submit { share, reply }).unwrap(), rx)
    }

    #[test]
    fn login_reply_carries_session_and_job() {
        let mut state = StratumState::default();
        let (id, mut rx) = login(&mut state);
        let answer = json!({
            "id": id,
            "jsonrpc": "2.0",
            "error": null,
            "result": {
                "id": "sess-1",
                "status": "OK",
                "job": {"job_id": "j1", "blob": blob_hex(), "target": "b88d0600"}
            }
        });
        assert!(state.handle(&answer.to_string()).unwrap().is_none());

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.session_id, "sess-1");
        assert_eq!(reply.job.unwrap().difficulty(), 10000);
        assert_eq!(state.session_id(), Some("sess-1"));
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn login_error_is_auth_error() {
        let mut state = StratumState::default();
        let (id, mut rx) = login(&mut state);
        let answer = json!({"id": id, "error": {"code": -1, "message": "Invalid address"}});
        state.handle(&answer.to_string()).unwrap();

        match rx.try_recv().unwrap() {
            Err(MinerError::AuthError(reason)) => assert_eq!(reason, "Invalid address"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state.session_id(), None);
    }

    #[test]
    fn submit_uses_session_and_blob_nonce_order() {
        let mut state = logged_in();
        let (message, _rx) = submit(&mut state);
        assert_eq!(message["method"], "submit");
        assert_eq!(message["params"]["id"], "sess-1");
        assert_eq!(message["params"]["job_id"], "job-9");
        assert_eq!(message["params"]["nonce"], "01020304");
        assert_eq!(message["params"]["result"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn submit_verdicts() {
        let mut state = logged_in();

        let (message, mut accepted) = submit(&mut state);
        let answer = json!({"id": message["id"], "error": null, "result": {"status": "OK"}});
        state.handle(&answer.to_string()).unwrap();
        assert_eq!(accepted.try_recv().unwrap().unwrap(), ShareAck::Accepted);

        let (message, mut rejected) = submit(&mut state);
        let answer = json!({"id": message["id"], "error": {"code": -1, "message": "Low difficulty share"}});
        state.handle(&answer.to_string()).unwrap();
        assert_eq!(
            rejected.try_recv().unwrap().unwrap(),
            ShareAck::Rejected("Low difficulty share".into())
        );
    }

    #[test]
    fn submit_before_login_fails_locally() {
        let mut state = StratumState::default();
        let (reply, mut rx) = oneshot::channel();
        let share = Share {
            worker_id: "w1".into(),
            job_id: "j".into(),
            nonce: 1,
            result: [0; 32],
        };
        assert!(state.encode(PoolRequest::Submit { share, reply }).is_none());
        assert!(matches!(rx.try_recv().unwrap(), Err(MinerError::StateError(_))));
        assert!(state.encode(PoolRequest::KeepAlive).is_none());
    }

    #[test]
    fn keepalive_names_the_session() {
        let mut state = logged_in();
        let ping = state.encode(PoolRequest::KeepAlive).unwrap();
        assert_eq!(ping["method"], "keepalived");
        assert_eq!(ping["params"]["id"], "sess-1");
        assert!(state.encode(PoolRequest::Close).is_none());
    }

    #[test]
    fn job_notifications_are_parsed() {
        let mut state = logged_in();
        let push = json!({
            "jsonrpc": "2.0",
            "method": "job",
            "params": {
                "job_id": "j2",
                "blob": blob_hex(),
                "target": "ffffffffffffff00",
                "seed_hash": "11".repeat(32),
                "algo": "rx/0",
                "height": 3_000_000
            }
        });
        let Some(PoolNotification::Job(job)) = state.handle(&push.to_string()).unwrap() else {
            panic!("expected a job");
        };
        assert_eq!(job.job_id, "j2");
        assert_eq!(job.target, 0x00FF_FFFF_FFFF_FFFF);
        assert_eq!(job.seed_hash, Some(vec![0x11; 32]));
        assert_eq!(job.algorithm, Some(AlgorithmType::RandomX));
        assert_eq!(job.height, Some(3_000_000));
    }

    #[test]
    fn block_found_and_unknown_methods() {
        let mut state = logged_in();
        assert!(matches!(
            state.handle(r#"{"method":"block_found","params":{}}"#).unwrap(),
            Some(PoolNotification::BlockFound)
        ));
        assert!(state.handle(r#"{"method":"motd","params":{}}"#).unwrap().is_none());
        assert!(state.handle(r#"{"id":99,"result":{"status":"KEEPALIVED"}}"#).unwrap().is_none());
    }

    #[test]
    fn malformed_messages_are_errors() {
        let mut state = logged_in();
        assert!(state.handle("not json").is_err());
        assert!(matches!(
            state.handle(r#"{"method":"job","params":{"job_id":"j"}}"#),
            Err(MinerError::ProtocolError(_))
        ));
        assert!(state.handle(r#"{"result":{}}"#).is_err());
    }

    #[test]
    fn abandoned_requests_fail_as_connection_errors() {
        let mut state = logged_in();
        let (_message, mut rx) = submit(&mut state);
        state.abandon();
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(MinerError::ConnectionError(_))
        ));
    }

    #[test]
    fn tcp_is_the_default_transport() {
        let connector = StratumConnector::default();
        assert_eq!(connector.transport(), Transport::Tcp);
        let ws = connector.with_transport(Transport::WebSocket);
        assert_eq!(ws.transport(), Transport::WebSocket);
        let parsed: Transport = serde_json::from_str(r#""websocket""#).unwrap();
        assert_eq!(parsed, Transport::WebSocket);
    }

    #[tokio::test]
    async fn tcp_link_exchanges_json_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let pool = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            let mut lines = BufReader::new(reader).lines();

            let login: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(login["method"], "login");
            assert_eq!(login["params"]["login"], "4Wallet");
            let answer = json!({"id": login["id"], "jsonrpc": "2.0", "error": null,
                "result": {"id": "tcp-1", "status": "OK"}});
            let push = json!({"jsonrpc": "2.0", "method": "job",
                "params": {"job_id": "j7", "blob": blob_hex(), "target": "b88d0600"}});
            writer
                .write_all(format!("{}\n\n{}\n", answer, push).as_bytes())
                .await
                .unwrap();

            let ping: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(ping["method"], "keepalived");
            assert_eq!(ping["params"]["id"], "tcp-1");

            // The link hangs up after Close
            assert!(!matches!(lines.next_line().await, Ok(Some(_))));
        });

        let worker = Worker::new("w1", "127.0.0.1", port, "4Wallet");
        let mut channel = StratumConnector::default().connect(&worker).await.unwrap();

        let (reply, answer) = oneshot::channel();
        channel
            .requests
            .send(PoolRequest::Login {
                wallet: "4Wallet".into(),
                password: "x".into(),
                agent: "test/1.0".into(),
                reply,
            })
            .await
            .unwrap();
        assert_eq!(answer.await.unwrap().unwrap().session_id, "tcp-1");

        match channel.notifications.recv().await {
            Some(PoolNotification::Job(job)) => assert_eq!(job.job_id, "j7"),
            other => panic!("expected a job, got {:?}", other),
        }

        channel.requests.send(PoolRequest::KeepAlive).await.unwrap();
        channel.requests.send(PoolRequest::Close).await.unwrap();
        pool.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_pool_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let worker = Worker::new("w1", "127.0.0.1", port, "4Wallet");
        assert!(matches!(
            StratumConnector::default().connect(&worker).await,
            Err(MinerError::ConnectionError(_))
        ));
    }

    #[test]
    fn secure_workers_use_wss() {
        let worker = Worker::new("w", "pool.example.com", 8443, "4W").with_secure(true);
        assert_eq!(
            StratumConnector::url_for(&worker).unwrap().as_str(),
            "wss://pool.example.com:8443/"
        );
        let plain = Worker::new("w", "pool.example.com", 3333, "4W");
        assert_eq!(StratumConnector::url_for(&plain).unwrap().scheme(), "ws");
    }
}
