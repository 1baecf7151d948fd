//! One TDS session: the request/response engine.
//!
//! A connection runs exactly one request at a time. Issuing a request
//! transitions `Idle → Writing → AwaitingHeader → AwaitingTokens` and the
//! stream of decoded tokens is surfaced through [`Connection::next_event`]
//! until the DONE without a more-results bit brings the state back to
//! `Idle`. An abandoned stream is healed on next use by an ATTENTION and a
//! bounded drain.

use bytes::Bytes;

use tds_framing::{AttentionHandle, MessageAccumulator, OutboundMessage, Transport};
use tds_values::FromValue;
use tds_wire::packet::PacketType;
use tds_wire::stream::TokenStreamDecoder;
use tds_wire::{
    AllHeaders, Collation, EnvChange, LoginAck, RpcRequest, ServerMessage, TdsVersion, Token,
    encode_batch,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{SessionOptions, Timeouts};
use crate::error::{ERROR_SEVERITY, Error, Result, TimeoutScope};
use crate::events::{Event, ExecutionResult, ResultSet};
use crate::row::Row;

/// Boxed transport: plain TCP, or TLS over the PRELOGIN tunnel.
pub(crate) trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}
pub(crate) type BoxedIo = Box<dyn Io>;

/// Request slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No request in flight.
    Idle,
    /// Writing the request message.
    Writing,
    /// Request sent, no response packet yet.
    AwaitingHeader,
    /// Consuming response tokens.
    AwaitingTokens,
    /// ATTENTION sent, draining to its acknowledgement.
    Cancelling,
    /// Connection is unusable.
    Closed,
}

/// An authenticated session with SQL Server.
pub struct Connection {
    transport: Transport<BoxedIo>,
    attention: AttentionHandle<BoxedIo>,
    accumulator: MessageAccumulator,
    decoder: TokenStreamDecoder,
    state: RequestState,
    request_complete: bool,
    pending_reset: bool,
    defaults_applied: bool,
    pending_packet_size: Option<u32>,

    session_options: SessionOptions,
    timeouts: Timeouts,

    database: Option<String>,
    collation: Option<Collation>,
    transaction_descriptor: u64,
    tds_version: Option<TdsVersion>,
    server_version: Option<(u8, u8, u16)>,
    session_state: Option<Bytes>,
    data_classification: Option<Bytes>,
    fed_auth_info: Option<Bytes>,
    last_routing: Option<(String, u16)>,

    errors: Vec<ServerMessage>,
}

impl Connection {
    pub(crate) fn from_transport(
        transport: Transport<BoxedIo>,
        session_options: SessionOptions,
        timeouts: Timeouts,
        database: Option<String>,
    ) -> Self {
        let attention = transport.attention_handle();
        Self {
            transport,
            attention,
            accumulator: MessageAccumulator::new(),
            decoder: TokenStreamDecoder::new(),
            state: RequestState::Idle,
            request_complete: true,
            pending_reset: false,
            defaults_applied: false,
            pending_packet_size: None,
            session_options,
            timeouts,
            database,
            collation: None,
            transaction_descriptor: 0,
            tds_version: None,
            server_version: None,
            session_state: None,
            data_classification: None,
            fed_auth_info: None,
            last_routing: None,
            errors: Vec::new(),
        }
    }

    /// Current request-slot state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Current database, as confirmed by the server.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Session collation, as last announced by the server.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    /// TDS version in effect, from LOGINACK.
    #[must_use]
    pub fn tds_version(&self) -> Option<TdsVersion> {
        self.tds_version
    }

    /// Server product version from the PRELOGIN response.
    #[must_use]
    pub fn server_version(&self) -> Option<(u8, u8, u16)> {
        self.server_version
    }

    /// Descriptor of the open transaction; 0 in auto-commit.
    #[must_use]
    pub fn transaction_descriptor(&self) -> u64 {
        self.transaction_descriptor
    }

    /// Latest session-recovery payload, verbatim.
    #[must_use]
    pub fn session_state(&self) -> Option<&Bytes> {
        self.session_state.as_ref()
    }

    /// Latest data-classification payload, verbatim.
    #[must_use]
    pub fn data_classification(&self) -> Option<&Bytes> {
        self.data_classification.as_ref()
    }

    /// Latest federated-auth info payload, verbatim.
    #[must_use]
    pub fn fed_auth_info(&self) -> Option<&Bytes> {
        self.fed_auth_info.as_ref()
    }

    pub(crate) fn set_server_version(&mut self, version: (u8, u8, u16)) {
        self.server_version = Some(version);
    }

    pub(crate) fn record_login_ack(&mut self, ack: &LoginAck) {
        self.tds_version = TdsVersion::from_raw(ack.tds_version);
    }

    pub(crate) fn take_routing(&mut self) -> Option<(String, u16)> {
        self.last_routing.take()
    }

    /// Arm a new response stream (login and request paths).
    pub(crate) fn expect_response(&mut self) {
        self.decoder.reset();
        self.accumulator.clear();
        self.errors.clear();
        self.request_complete = false;
        self.state = RequestState::AwaitingHeader;
    }

    /// Make the slot ready for a fresh request: heal abandoned streams,
    /// then make sure session defaults are in effect.
    async fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            RequestState::Closed => return Err(Error::ConnectionClosed),
            RequestState::Writing => return Err(Error::Busy),
            RequestState::AwaitingHeader
            | RequestState::AwaitingTokens
            | RequestState::Cancelling => {
                tracing::debug!("healing abandoned request before reuse");
                self.cancel_and_drain().await?;
            }
            RequestState::Idle => {}
        }
        if !self.defaults_applied {
            self.apply_session_defaults().await?;
        }
        Ok(())
    }

    /// Send the session-defaults batch (which also carries any pending
    /// RESETCONNECTION flag) and drain its response.
    async fn apply_session_defaults(&mut self) -> Result<()> {
        self.defaults_applied = true;
        let Some(batch) = self.session_options.to_batch() else {
            return Ok(());
        };
        tracing::debug!("applying session defaults");
        self.raw_send_batch(&batch).await?;
        while self.next_event().await?.is_some() {}
        self.fail_on_errors()
    }

    async fn raw_send_batch(&mut self, sql: &str) -> Result<()> {
        let headers = AllHeaders::in_transaction(self.transaction_descriptor);
        let payload = encode_batch(sql, &headers);
        self.begin_request(PacketType::SqlBatch, payload).await
    }

    async fn begin_request(&mut self, ty: PacketType, payload: Bytes) -> Result<()> {
        self.state = RequestState::Writing;
        self.decoder.reset();
        self.accumulator.clear();
        self.errors.clear();
        self.request_complete = false;
        let reset_connection = std::mem::take(&mut self.pending_reset);
        let result = self
            .transport
            .send(OutboundMessage {
                ty,
                payload,
                reset_connection,
            })
            .await;
        match result {
            Ok(()) => {
                self.state = RequestState::AwaitingHeader;
                Ok(())
            }
            Err(e) => {
                self.state = RequestState::Closed;
                Err(e.into())
            }
        }
    }

    /// Submit a SQL batch. Events are then pulled with
    /// [`Connection::next_event`].
    pub async fn send_batch(&mut self, sql: &str) -> Result<()> {
        self.ensure_ready().await?;
        self.raw_send_batch(sql).await
    }

    /// Submit an RPC request.
    pub async fn send_rpc(&mut self, request: &RpcRequest) -> Result<()> {
        self.ensure_ready().await?;
        let headers = AllHeaders::in_transaction(self.transaction_descriptor);
        let payload = request.encode(&headers);
        self.begin_request(PacketType::Rpc, payload).await
    }

    /// The next event of the in-flight request; `None` once it completed.
    ///
    /// Events preserve wire order. Server error messages are delivered as
    /// events *and* recorded; the collecting helpers turn the
    /// highest-severity one into the request's failure.
    pub async fn next_event(&mut self) -> Result<Option<Event>> {
        if self.state == RequestState::Cancelling {
            return Err(Error::Cancelled);
        }
        if self.request_complete {
            return Ok(None);
        }
        loop {
            let token = match self.decoder.decode(self.accumulator.buffer_mut()) {
                Ok(token) => token,
                Err(e) => {
                    // Undecodable stream: quarantine the connection.
                    self.state = RequestState::Closed;
                    return Err(e.into());
                }
            };
            if let Some(token) = token {
                let event = self.apply_token(token)?;
                if let Some(size) = self.pending_packet_size.take() {
                    self.transport.set_packet_size(size as usize).await;
                }
                match event {
                    Some(event) => return Ok(Some(event)),
                    None => continue,
                }
            }

            if self.request_complete {
                return Ok(None);
            }
            let packet = match self.transport.recv().await {
                Ok(packet) => packet,
                Err(e) => {
                    self.state = RequestState::Closed;
                    return Err(e.into());
                }
            };
            let Some(packet) = packet else {
                self.state = RequestState::Closed;
                return Err(Error::ConnectionClosed);
            };
            if packet.header.ty != PacketType::TabularResult {
                self.state = RequestState::Closed;
                return Err(Error::Protocol(format!(
                    "unexpected {:?} packet in a response stream",
                    packet.header.ty
                )));
            }
            self.state = RequestState::AwaitingTokens;
            if let Err(e) = self.accumulator.push(packet) {
                self.state = RequestState::Closed;
                return Err(e.into());
            }
        }
    }

    fn apply_token(&mut self, token: Token) -> Result<Option<Event>> {
        let event = match token {
            Token::Metadata(columns) => Event::Metadata(columns),
            Token::Row(values) => {
                let columns = self
                    .decoder
                    .columns()
                    .cloned()
                    .ok_or_else(|| Error::Protocol("row without schema".into()))?;
                Event::Row(Row::new(columns, values))
            }
            Token::Done(done) | Token::DoneProc(done) => {
                if !done.has_more() {
                    self.request_complete = true;
                    self.state = RequestState::Idle;
                }
                Event::Done(done)
            }
            Token::DoneInProc(done) => Event::Done(done),
            Token::Error(message) => {
                tracing::debug!(
                    number = message.number,
                    class = message.class,
                    "server error message"
                );
                self.errors.push(message.clone());
                Event::Message(message)
            }
            Token::Info(message) => Event::Message(message),
            Token::EnvChange(change) => {
                self.apply_env_change(&change);
                Event::EnvChange(change)
            }
            Token::LoginAck(ack) => {
                self.record_login_ack(&ack);
                Event::LoginAck(ack)
            }
            Token::FeatureExtAck(features) => Event::FeatureAck(features),
            Token::ReturnStatus(status) => Event::ReturnStatus(status),
            Token::ReturnValue(value) => Event::ReturnValue(value),
            Token::Order(ordinals) => Event::Order(ordinals),
            Token::SessionState(payload) => {
                self.session_state = Some(payload.clone());
                Event::SessionState(payload)
            }
            Token::DataClassification(payload) => {
                self.data_classification = Some(payload.clone());
                Event::DataClassification(payload)
            }
            Token::FedAuthInfo(payload) => {
                self.fed_auth_info = Some(payload);
                return Ok(None);
            }
            // Browse-mode and reserved tokens carry nothing for callers.
            Token::TabName(_)
            | Token::ColInfo(_)
            | Token::Offset(_)
            | Token::Sspi(_)
            | Token::Unknown { .. } => return Ok(None),
        };
        Ok(Some(event))
    }

    fn apply_env_change(&mut self, change: &EnvChange) {
        match change {
            EnvChange::Database { new, .. } => {
                self.database = Some(new.clone());
            }
            EnvChange::PacketSize(size) => {
                tracing::debug!(size, "server renegotiated packet size");
                self.pending_packet_size = Some(*size);
            }
            EnvChange::SqlCollation(collation) => {
                self.collation = *collation;
            }
            EnvChange::BeginTransaction(descriptor) => {
                self.transaction_descriptor = *descriptor;
            }
            EnvChange::CommitTransaction
            | EnvChange::RollbackTransaction
            | EnvChange::TransactionEnded => {
                self.transaction_descriptor = 0;
            }
            EnvChange::ResetConnectionAck => {
                tracing::trace!("connection reset acknowledged");
            }
            EnvChange::Routing { host, port } => {
                self.last_routing = Some((host.clone(), *port));
            }
            EnvChange::Language { .. }
            | EnvChange::PromoteTransaction(_)
            | EnvChange::Other { .. } => {}
        }
    }

    /// Turn recorded server errors into the request's failure.
    pub(crate) fn fail_on_errors(&mut self) -> Result<()> {
        let worst = self
            .errors
            .iter()
            .filter(|m| m.class >= ERROR_SEVERITY)
            .max_by_key(|m| m.class)
            .cloned();
        self.errors.clear();
        match worst {
            Some(message) => Err(Error::Server(message)),
            None => Ok(()),
        }
    }

    /// Cancel the in-flight request: send ATTENTION, then drop tokens
    /// until its acknowledging DONE. Exceeding the drain budget closes the
    /// connection.
    pub async fn cancel_and_drain(&mut self) -> Result<()> {
        match self.state {
            RequestState::Idle => return Ok(()),
            RequestState::Closed => return Err(Error::ConnectionClosed),
            _ => {}
        }
        self.state = RequestState::Cancelling;
        if let Err(e) = self.attention.send_attention().await {
            self.state = RequestState::Closed;
            return Err(e.into());
        }

        let budget = self.timeouts.cancel_drain;
        match tokio::time::timeout(budget, self.drain_to_attention_ack()).await {
            Ok(Ok(())) => {
                self.state = RequestState::Idle;
                self.request_complete = true;
                self.errors.clear();
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = RequestState::Closed;
                Err(e)
            }
            Err(_) => {
                tracing::warn!("attention drain exceeded its budget, closing connection");
                self.state = RequestState::Closed;
                Err(Error::Timeout(TimeoutScope::CancelDrain))
            }
        }
    }

    async fn drain_to_attention_ack(&mut self) -> Result<()> {
        loop {
            if let Some(token) = self.decoder.decode(self.accumulator.buffer_mut())? {
                match token {
                    Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done)
                        if done.is_attention_ack() =>
                    {
                        tracing::debug!("attention acknowledged");
                        return Ok(());
                    }
                    _ => continue,
                }
            }
            let packet = self
                .transport
                .recv()
                .await?
                .ok_or(Error::ConnectionClosed)?;
            if packet.header.ty == PacketType::TabularResult {
                self.accumulator.push(packet)?;
            }
        }
    }

    async fn collect_sets(&mut self) -> Result<Vec<ResultSet>> {
        let mut sets = Vec::new();
        let mut current: Option<ResultSet> = None;
        while let Some(event) = self.next_event().await? {
            match event {
                Event::Metadata(columns) => {
                    if let Some(set) = current.take() {
                        sets.push(set);
                    }
                    current = Some(ResultSet {
                        columns,
                        rows: Vec::new(),
                    });
                }
                Event::Row(row) => {
                    if let Some(set) = &mut current {
                        set.rows.push(row);
                    }
                }
                Event::Done(_) => {
                    if let Some(set) = current.take() {
                        sets.push(set);
                    }
                }
                _ => {}
            }
        }
        if let Some(set) = current.take() {
            sets.push(set);
        }
        Ok(sets)
    }

    /// Run `sql` and collect every result set.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        self.send_batch(sql).await?;
        let budget = self.timeouts.request;
        let sets = match tokio::time::timeout(budget, self.collect_sets()).await {
            Ok(sets) => sets?,
            Err(_) => {
                let _ = self.cancel_and_drain().await;
                return Err(Error::Timeout(TimeoutScope::Request));
            }
        };
        self.fail_on_errors()?;
        Ok(sets)
    }

    /// Run `sql` and collect the rows of the last result set.
    pub async fn query_rows(&mut self, sql: &str) -> Result<Vec<Row>> {
        let sets = self.query(sql).await?;
        Ok(sets.into_iter().next_back().map(|s| s.rows).unwrap_or_default())
    }

    /// Run `sql` and read the first column of the first row of the first
    /// result set.
    pub async fn query_scalar<T: FromValue>(&mut self, sql: &str) -> Result<Option<T>> {
        let sets = self.query(sql).await?;
        let Some(row) = sets.into_iter().next().and_then(|s| s.rows.into_iter().next()) else {
            return Ok(None);
        };
        row.get::<T>(0)
    }

    /// Run `sql` for its side effects, collecting counts, return values
    /// and messages.
    pub async fn execute(&mut self, sql: &str) -> Result<ExecutionResult> {
        self.send_batch(sql).await?;
        let result = self.collect_execution_bounded().await?;
        self.fail_on_errors()?;
        Ok(result)
    }

    /// Run an RPC and collect its outcome.
    pub async fn execute_rpc(&mut self, request: &RpcRequest) -> Result<ExecutionResult> {
        self.send_rpc(request).await?;
        let result = self.collect_execution_bounded().await?;
        self.fail_on_errors()?;
        Ok(result)
    }

    async fn collect_execution_bounded(&mut self) -> Result<ExecutionResult> {
        let budget = self.timeouts.request;
        match tokio::time::timeout(budget, self.collect_execution()).await {
            Ok(result) => result,
            Err(_) => {
                let _ = self.cancel_and_drain().await;
                Err(Error::Timeout(TimeoutScope::Request))
            }
        }
    }

    async fn collect_execution(&mut self) -> Result<ExecutionResult> {
        let mut result = ExecutionResult::default();
        while let Some(event) = self.next_event().await? {
            match event {
                Event::Done(done) => {
                    if done.status.contains(tds_wire::DoneStatus::COUNT) {
                        result.rows_affected.push(done.rows);
                    }
                }
                Event::ReturnStatus(status) => result.return_status = Some(status),
                Event::ReturnValue(value) => result.return_values.push(value),
                Event::Message(message) if !message.is_error() => result.messages.push(message),
                _ => {}
            }
        }
        Ok(result)
    }

    /// Switch databases. Idempotent: a clean connection already in `name`
    /// issues no USE at all.
    pub async fn change_database(&mut self, name: &str) -> Result<()> {
        if self.state == RequestState::Idle
            && self.defaults_applied
            && !self.pending_reset
            && self.database.as_deref() == Some(name)
        {
            return Ok(());
        }
        // Bracket-quote the identifier; `]` escapes by doubling.
        let quoted = format!("USE [{}]", name.replace(']', "]]"));
        self.execute(&quoted).await?;
        if self.database.as_deref() != Some(name) {
            return Err(Error::Protocol(
                "server did not confirm the database change".into(),
            ));
        }
        Ok(())
    }

    /// Pool hook: decide whether this connection can be lent out again,
    /// arming a server-side reset for its next request.
    pub(crate) fn recycle(&mut self) -> bool {
        if self.state == RequestState::Closed {
            return false;
        }
        self.pending_reset = true;
        self.defaults_applied = false;
        true
    }

    /// Close the session. TDS has no goodbye message; dropping the
    /// transport sends the FIN.
    pub async fn close(self) {}
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("database", &self.database)
            .field("transaction_descriptor", &self.transaction_descriptor)
            .field("pending_reset", &self.pending_reset)
            .finish_non_exhaustive()
    }
}
