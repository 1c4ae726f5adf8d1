//! Session / protocol driver (spec.md §4.3, C3): connection URI handling,
//! capability negotiation, TLS upgrade, authentication selection, notice
//! routing, and the high-level request entry points.

use crate::auth::{self, Mechanism};
use crate::buffer::BufferSet;
use crate::codec::{self, ArgumentValue, NoticeFrame, ServerErrorMsg, ServerMessage};
use crate::constant::{NoticeScope, NoticeType, SessionStateParam};
use crate::error::{Error, Result, Severity};
use crate::opts::{AuthMechanism, Opts};
use crate::pbwire::{field_as_u64, FieldIter};
use crate::result::{ResultStream, State as ResultState};
use crate::row::{ColumnMetadata, Row};
use crate::transport::Transport;

/// LIFO-registered callback: returns `true` if it consumed the notice.
pub type NoticeHandler = Box<dyn FnMut(&NoticeFrame) -> bool + Send>;

pub struct Session {
    transport: Transport,
    buffers: BufferSet,
    notice_stack: Vec<NoticeHandler>,
    client_id: Option<u64>,
    account_expired: bool,
    closed: bool,
    dont_wait_for_disconnect: bool,
}

impl Session {
    /// Connect, negotiate capabilities, optionally upgrade to TLS, and
    /// authenticate — per spec.md §4.3's TLS-then-PLAIN vs MYSQL41 policy,
    /// unless `opts.auth` names an explicit mechanism.
    pub fn connect(opts: &Opts) -> Result<Self> {
        let transport = match &opts.socket {
            Some(path) => Transport::connect_unix(path)?,
            None => Transport::connect(&opts.host, opts.port)?,
        };

        let mut session = Self {
            transport,
            buffers: BufferSet::new(),
            notice_stack: Vec::new(),
            client_id: None,
            account_expired: false,
            closed: false,
            dont_wait_for_disconnect: opts.dont_wait_for_disconnect,
        };

        session.fetch_capabilities()?;

        let mechanism = match opts.auth {
            AuthMechanism::Plain => Mechanism::Plain,
            AuthMechanism::Mysql41 => Mechanism::Mysql41,
            AuthMechanism::Auto if session.transport.supports_tls() => {
                session.setup_capability("tls", true)?;
                session.transport.activate_tls(&opts.host)?;
                Mechanism::Plain
            }
            AuthMechanism::Auto => Mechanism::Mysql41,
        };

        for (name, value) in &opts.capabilities {
            let as_bool = matches!(value, crate::opts::CapabilityValue::Bool(true));
            session.setup_capability(name, as_bool)?;
        }

        let schema = opts.schema.as_deref().unwrap_or("");
        let password = opts.password.as_deref().unwrap_or("");
        auth::authenticate(&mut session, mechanism, schema, &opts.user, password)?;

        Ok(session)
    }

    pub(crate) fn send_raw(&mut self, type_tag: u8, payload: &[u8]) -> Result<()> {
        codec::send(&mut self.transport, &mut self.buffers, type_tag, payload)
    }

    fn recv_raw(&mut self) -> Result<ServerMessage> {
        codec::recv(&mut self.transport)
    }

    /// Return the next message that is not a `NOTICE`, dispatching notices
    /// transparently as they arrive.
    pub(crate) fn recv_dispatching_notices(&mut self) -> Result<ServerMessage> {
        loop {
            match self.recv_raw()? {
                ServerMessage::Notice(notice) => self.dispatch_notice(notice),
                other => return Ok(other),
            }
        }
    }

    fn dispatch_notice(&mut self, notice: NoticeFrame) {
        if notice.scope == NoticeScope::Local {
            let mut consumed = false;
            for handler in self.notice_stack.iter_mut().rev() {
                if handler(&notice) {
                    consumed = true;
                    break;
                }
            }
            if !consumed && notice.notice_type == NoticeType::SessionStateChanged {
                self.interpret_session_state_changed(&notice.payload);
            }
        }
        // Unconsumed LOCAL notices of other types, and all GLOBAL notices,
        // are logged but otherwise ignored.
        tracing::trace!(scope = ?notice.scope, notice_type = ?notice.notice_type, "notice");
    }

    fn interpret_session_state_changed(&mut self, payload: &[u8]) {
        let mut param = None;
        for field in FieldIter::new(payload) {
            let Ok(field) = field else { continue };
            if field.number == 1 {
                if let Ok(v) = field_as_u64(&field) {
                    param = Some(SessionStateParam::from_u32(u32::try_from(v).unwrap_or(0)));
                }
            }
        }
        match param {
            Some(SessionStateParam::AccountExpired) => self.account_expired = true,
            Some(SessionStateParam::ClientIdAssigned) => {
                for field in FieldIter::new(payload) {
                    let Ok(field) = field else { continue };
                    if field.number == 2 {
                        if let Ok(v) = field_as_u64(&field) {
                            self.client_id = Some(v);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub fn push_notice_handler(&mut self, handler: NoticeHandler) {
        self.notice_stack.push(handler);
    }

    pub fn pop_notice_handler(&mut self) {
        self.notice_stack.pop();
    }

    pub(crate) fn server_error(&mut self, e: ServerErrorMsg) -> Error {
        Error::ServerError { code: e.code, sql_state: e.sql_state, message: e.message, severity: e.severity }
    }

    pub fn account_expired(&self) -> bool {
        self.account_expired
    }

    pub fn client_id(&self) -> Option<u64> {
        self.client_id
    }

    pub fn fetch_capabilities(&mut self) -> Result<Vec<(String, Vec<u8>)>> {
        let (tag, payload) = codec::encode_capabilities_get();
        self.send_raw(tag, &payload)?;
        match self.recv_dispatching_notices()? {
            ServerMessage::ConnCapabilities(caps) => Ok(caps),
            ServerMessage::Error(e) => Err(self.server_error(e)),
            _ => Err(Error::CommandsOutOfSync),
        }
    }

    pub fn setup_capability(&mut self, name: &str, value: bool) -> Result<()> {
        let (tag, payload) = codec::encode_capabilities_set_bool(name, value);
        self.send_raw(tag, &payload)?;
        match self.recv_dispatching_notices()? {
            ServerMessage::Ok => Ok(()),
            ServerMessage::Error(e) => {
                self.closed = true;
                Err(self.server_error(e))
            }
            _ => Err(Error::CommandsOutOfSync),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send `Session.Close`, wait for `OK`, then close the socket. If
    /// `dont_wait_for_disconnect` is set the socket is dropped right after
    /// the `OK` rather than waiting for the server to disconnect first.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let outcome = self.close_inner();
        self.closed = true;
        self.transport.close();
        let _ = outcome;
    }

    fn close_inner(&mut self) -> Result<()> {
        let (tag, payload) = codec::encode_session_close();
        self.send_raw(tag, &payload)?;
        match self.recv_dispatching_notices()? {
            ServerMessage::Ok => {}
            ServerMessage::Error(_) => return Err(Error::CommandsOutOfSync),
            _ => return Err(Error::CommandsOutOfSync),
        }
        if !self.dont_wait_for_disconnect {
            let mut probe = [0u8; 1];
            let _ = self.transport.read_with_timeout(&mut probe, 0);
        }
        Ok(())
    }

    pub fn execute_sql(&mut self, stmt: &str) -> Result<ResultHandle<'_>> {
        self.execute_stmt("sql", stmt, &[])
    }

    pub fn execute_stmt(&mut self, namespace: &str, stmt: &str, args: &[ArgumentValue]) -> Result<ResultHandle<'_>> {
        let (tag, payload) = codec::encode_sql_stmt_execute(namespace, stmt, args);
        self.send_raw(tag, &payload)?;
        Ok(ResultHandle::new(self, true))
    }

    /// Send an already-built CRUD wire message (`Find`/`Insert`/`Update`/
    /// `Delete`); building that message is out of scope for this core.
    pub fn send_crud(&mut self, type_tag: u8, payload: &[u8]) -> Result<ResultHandle<'_>> {
        self.send_raw(type_tag, payload)?;
        Ok(ResultHandle::new(self, true))
    }
}

enum Pumped {
    Row(Vec<Vec<u8>>),
    DatasetDone,
    MoreDatasets,
    Finished,
}

/// A borrow of `&mut Session` for the duration of one statement's response.
/// Per spec.md §9's design note, modeling this as a borrow (rather than a
/// shared/ref-counted back-reference, as the source does) statically
/// enforces the "at most one live Result per Session" invariant: a second
/// `execute_*` call cannot be made while this handle is alive. Dropping an
/// unread handle drains the pipe to `ReadDone`/`ReadError`.
pub struct ResultHandle<'a> {
    session: &'a mut Session,
    stream: ResultStream,
    pending: Option<Vec<Vec<u8>>>,
    dataset_done: bool,
    more_datasets: bool,
}

impl<'a> ResultHandle<'a> {
    fn new(session: &'a mut Session, expects_rows: bool) -> Self {
        Self {
            session,
            stream: ResultStream::new(expects_rows),
            pending: None,
            dataset_done: false,
            more_datasets: false,
        }
    }

    fn pump_one(&mut self) -> Result<Pumped> {
        loop {
            let msg = self.session.recv_dispatching_notices()?;
            let is_fetch_done = matches!(msg, ServerMessage::FetchDone);
            let is_fetch_more = matches!(msg, ServerMessage::FetchDoneMoreResultsets);
            let is_stmt_ok = matches!(msg, ServerMessage::StmtExecuteOk);
            if let Some(fields) = self.stream.on_message(msg)? {
                return Ok(Pumped::Row(fields));
            }
            if is_fetch_done {
                return Ok(Pumped::DatasetDone);
            }
            if is_fetch_more {
                return Ok(Pumped::MoreDatasets);
            }
            if is_stmt_ok {
                return Ok(Pumped::Finished);
            }
        }
    }

    fn ensure_metadata_peeked(&mut self) -> Result<()> {
        if self.pending.is_some() || self.dataset_done || !self.stream.columns().is_empty() {
            return Ok(());
        }
        if self.stream.state() == ResultState::ReadDone || self.stream.state() == ResultState::ReadError {
            return Ok(());
        }
        match self.pump_one()? {
            Pumped::Row(fields) => self.pending = Some(fields),
            Pumped::DatasetDone => {
                self.dataset_done = true;
                self.more_datasets = false;
            }
            Pumped::MoreDatasets => {
                self.dataset_done = true;
                self.more_datasets = true;
            }
            Pumped::Finished => {
                self.dataset_done = true;
                self.more_datasets = false;
            }
        }
        Ok(())
    }

    pub fn metadata(&mut self) -> Result<&[ColumnMetadata]> {
        self.ensure_metadata_peeked()?;
        Ok(self.stream.columns())
    }

    fn next_raw(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        if let Some(fields) = self.pending.take() {
            return Ok(Some(fields));
        }
        if self.dataset_done {
            return Ok(None);
        }
        match self.pump_one()? {
            Pumped::Row(fields) => Ok(Some(fields)),
            Pumped::DatasetDone => {
                self.dataset_done = true;
                self.more_datasets = false;
                Ok(None)
            }
            Pumped::MoreDatasets => {
                self.dataset_done = true;
                self.more_datasets = true;
                Ok(None)
            }
            Pumped::Finished => {
                self.dataset_done = true;
                self.more_datasets = false;
                Ok(None)
            }
        }
    }

    /// The next row in the current resultset, or `None` when it is exhausted.
    pub fn next(&mut self) -> Result<Option<Row<'_>>> {
        let fields = self.next_raw()?;
        Ok(fields.map(|f| Row::new(self.stream.columns(), f)))
    }

    /// Advance to the next resultset. Drains any unread rows of the current
    /// one first.
    pub fn next_dataset(&mut self) -> Result<bool> {
        while self.next_raw()?.is_some() {}
        if !self.more_datasets {
            loop {
                match self.pump_one()? {
                    Pumped::Finished => break,
                    _ => continue,
                }
            }
            return Ok(false);
        }
        self.more_datasets = false;
        self.dataset_done = false;
        Ok(true)
    }

    /// Cache every remaining resultset in memory, enabling
    /// `rewind`/`tell`/`seek`.
    pub fn buffer(&mut self) -> Result<()> {
        let mut sets = Vec::new();
        loop {
            self.ensure_metadata_peeked()?;
            let columns = self.stream.columns().to_vec();
            let mut rows = Vec::new();
            while let Some(fields) = self.next_raw()? {
                rows.push(fields);
            }
            sets.push((columns, rows));
            if !self.next_dataset()? {
                break;
            }
        }
        self.stream.buffer(sets);
        Ok(())
    }

    pub fn is_buffered(&self) -> bool {
        self.stream.is_buffered()
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.stream.rewind()
    }

    pub fn tell(&self) -> Result<(usize, usize)> {
        self.stream.tell()
    }

    pub fn seek(&mut self, dataset: usize, record: usize) -> Result<()> {
        self.stream.seek(dataset, record)
    }

    pub fn buffered_row(&self) -> Result<Option<Row<'_>>> {
        self.stream.buffered_row()
    }

    pub fn affected_rows(&self) -> Option<u64> {
        self.stream.affected_rows
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.stream.last_insert_id
    }

    pub fn info_message(&self) -> Option<&str> {
        self.stream.info_message.as_deref()
    }

    pub fn warnings(&self) -> &[crate::result::Warning] {
        &self.stream.warnings
    }

    pub fn set_last_document_ids(&mut self, ids: Vec<String>) {
        self.stream.set_last_document_ids(ids);
    }

    pub fn last_document_id(&self) -> Result<&str> {
        self.stream.last_document_id()
    }

    pub fn last_document_ids(&self) -> Result<&[String]> {
        self.stream.last_document_ids()
    }
}

impl Drop for ResultHandle<'_> {
    fn drop(&mut self) {
        while !self.stream.is_done() {
            let Ok(msg) = self.session.recv_dispatching_notices() else { break };
            if self.stream.on_message(msg).is_err() {
                break;
            }
        }
    }
}
