//! The multi-resultset state machine (spec.md §4.5, C5).

use crate::codec::{NoticeFrame, RawColumnMetaData, ServerMessage};
use crate::constant::{NoticeType, SessionStateParam};
use crate::error::{Error, Result};
use crate::pbwire::{field_as_u64, FieldIter};
use crate::row::{ColumnMetadata, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadMetadataI,
    ReadMetadata,
    ReadRows,
    ReadStmtOkI,
    ReadStmtOk,
    ReadDone,
    ReadError,
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub code: i32,
    pub text: String,
    pub is_note: bool,
}

struct ResultSetData {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<Vec<u8>>>,
}

enum Buffering {
    Live,
    Buffered {
        sets: Vec<ResultSetData>,
        dataset: usize,
        record: usize,
    },
}

/// One statement's response: a sequence of resultsets plus the terminal
/// OK/ERROR status and whatever the interleaved notices populated.
pub struct ResultStream {
    state: State,
    current_columns: Vec<ColumnMetadata>,

    pub affected_rows: Option<u64>,
    pub last_insert_id: Option<u64>,
    pub info_message: Option<String>,
    pub warnings: Vec<Warning>,
    last_document_ids: Vec<String>,

    buffering: Buffering,
}

impl ResultStream {
    /// `expects_rows`: false for statements that only ever send an OK
    /// (`ReadStmtOkI` entry state); true for statements that may send
    /// column metadata (`ReadMetadataI` entry state).
    pub fn new(expects_rows: bool) -> Self {
        Self {
            state: if expects_rows { State::ReadMetadataI } else { State::ReadStmtOkI },
            current_columns: Vec::new(),
            affected_rows: None,
            last_insert_id: None,
            info_message: None,
            warnings: Vec::new(),
            last_document_ids: Vec::new(),
            buffering: Buffering::Live,
        }
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.current_columns
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::ReadDone | State::ReadError)
    }

    /// Feed one server message to the state machine. Notices are consumed
    /// internally and never advance the state. Returns a freshly decoded
    /// `Row` when the message was a `Row`; `None` otherwise.
    pub fn on_message(&mut self, msg: ServerMessage) -> Result<Option<Vec<Vec<u8>>>> {
        match msg {
            ServerMessage::Notice(notice) => {
                self.apply_notice(&notice);
                Ok(None)
            }
            ServerMessage::Error(e) => {
                self.state = State::ReadError;
                Err(Error::ServerError {
                    code: e.code,
                    sql_state: e.sql_state,
                    message: e.message,
                    severity: e.severity,
                })
            }
            ServerMessage::ColumnMetaData(raw) => self.on_column_meta_data(raw),
            ServerMessage::Row(row) => self.on_row(row.fields),
            ServerMessage::FetchDone => self.on_fetch_done(),
            ServerMessage::FetchDoneMoreResultsets => self.on_fetch_done_more(),
            ServerMessage::StmtExecuteOk => self.on_stmt_execute_ok(),
            _ => self.out_of_sync(),
        }
    }

    fn on_column_meta_data(&mut self, raw: RawColumnMetaData) -> Result<Option<Vec<Vec<u8>>>> {
        match self.state {
            State::ReadMetadataI | State::ReadMetadata => {
                let meta = ColumnMetadata::try_from(raw)?;
                self.current_columns.push(meta);
                self.state = State::ReadMetadata;
                Ok(None)
            }
            _ => self.out_of_sync(),
        }
    }

    fn on_row(&mut self, fields: Vec<Vec<u8>>) -> Result<Option<Vec<Vec<u8>>>> {
        match self.state {
            State::ReadMetadata | State::ReadRows => {
                self.state = State::ReadRows;
                Ok(Some(fields))
            }
            _ => self.out_of_sync(),
        }
    }

    fn on_fetch_done(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        match self.state {
            State::ReadMetadata | State::ReadRows => {
                self.state = State::ReadStmtOk;
                Ok(None)
            }
            _ => self.out_of_sync(),
        }
    }

    fn on_fetch_done_more(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        match self.state {
            State::ReadRows => {
                self.current_columns.clear();
                self.state = State::ReadMetadata;
                Ok(None)
            }
            _ => self.out_of_sync(),
        }
    }

    fn on_stmt_execute_ok(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        match self.state {
            State::ReadMetadataI | State::ReadStmtOkI | State::ReadStmtOk => {
                self.state = State::ReadDone;
                Ok(None)
            }
            _ => self.out_of_sync(),
        }
    }

    fn out_of_sync(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        self.state = State::ReadError;
        Err(Error::CommandsOutOfSync)
    }

    /// Populate `affected_rows`/`last_insert_id`/`info_message`/`warnings`
    /// from a notice observed while this Result is the active reader
    /// (spec.md §4.5 "Notice interleaving").
    fn apply_notice(&mut self, notice: &NoticeFrame) {
        match notice.notice_type {
            NoticeType::Warning => {
                if let Some(warning) = parse_warning(&notice.payload) {
                    self.warnings.push(warning);
                }
            }
            NoticeType::SessionStateChanged => {
                self.apply_session_state_changed(&notice.payload);
            }
            _ => {}
        }
    }

    fn apply_session_state_changed(&mut self, payload: &[u8]) {
        let mut param = None;
        let mut value_field = None;
        for field in FieldIter::new(payload) {
            let Ok(field) = field else { continue };
            match field.number {
                1 => {
                    if let Ok(v) = field_as_u64(&field) {
                        param = Some(SessionStateParam::from_u32(u32::try_from(v).unwrap_or(0)));
                    }
                }
                2 => value_field = Some(field.bytes.to_vec()),
                _ => {}
            }
        }
        let (Some(param), Some(value)) = (param, value_field) else { return };
        match param {
            SessionStateParam::GeneratedInsertId => {
                if let Some(v) = first_uint_scalar(&value) {
                    self.last_insert_id = Some(v);
                }
            }
            SessionStateParam::RowsAffected => {
                if let Some(v) = first_uint_scalar(&value) {
                    self.affected_rows = Some(v);
                }
            }
            SessionStateParam::ProducedMessage => {
                if let Some(s) = first_string_scalar(&value) {
                    self.info_message = Some(s);
                }
            }
            _ => {}
        }
    }

    /// Cache all remaining resultsets in memory so `rewind`/`tell`/`seek`
    /// become available.
    pub fn buffer(&mut self, remaining: Vec<(Vec<ColumnMetadata>, Vec<Vec<Vec<u8>>>)>) {
        let sets = remaining
            .into_iter()
            .map(|(columns, rows)| ResultSetData { columns, rows })
            .collect();
        self.buffering = Buffering::Buffered { sets, dataset: 0, record: 0 };
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.buffering, Buffering::Buffered { .. })
    }

    /// Reset every resultset's cursor, then advance once to the second
    /// resultset if one exists — matching the observed source behavior
    /// rather than guessing a "rewind to the very first row" contract
    /// (spec.md §9 open question). Callers that want the first row back
    /// must follow `rewind()` with an explicit `seek(0, 0)`.
    pub fn rewind(&mut self) -> Result<()> {
        let Buffering::Buffered { sets, dataset, record } = &mut self.buffering else {
            return Err(Error::StateAbuse("rewind requires a buffered result".to_string()));
        };
        *record = 0;
        *dataset = if sets.len() > 1 { 1 } else { 0 };
        Ok(())
    }

    pub fn tell(&self) -> Result<(usize, usize)> {
        match &self.buffering {
            Buffering::Buffered { dataset, record, .. } => Ok((*dataset, *record)),
            Buffering::Live => Err(Error::StateAbuse("tell requires a buffered result".to_string())),
        }
    }

    pub fn seek(&mut self, dataset: usize, record: usize) -> Result<()> {
        match &mut self.buffering {
            Buffering::Buffered { sets, dataset: d, record: r } => {
                if dataset >= sets.len() {
                    return Err(Error::IndexOutOfRange);
                }
                *d = dataset;
                *r = record;
                Ok(())
            }
            Buffering::Live => Err(Error::StateAbuse("seek requires a buffered result".to_string())),
        }
    }

    pub fn buffered_row(&self) -> Result<Option<Row<'_>>> {
        match &self.buffering {
            Buffering::Buffered { sets, dataset, record } => {
                let Some(set) = sets.get(*dataset) else { return Ok(None) };
                let Some(fields) = set.rows.get(*record) else { return Ok(None) };
                Ok(Some(Row::new(&set.columns, fields.clone())))
            }
            Buffering::Live => Err(Error::StateAbuse("buffered_row requires a buffered result".to_string())),
        }
    }

    /// Attached by the CRUD `Add` entry point; see spec.md §9 open
    /// question. This port makes repeated calls replace rather than
    /// append, since "replace" is the behavior a caller setting this once
    /// per Result would expect and the accumulate-forever alternative has
    /// no legitimate caller.
    pub fn set_last_document_ids(&mut self, ids: Vec<String>) {
        self.last_document_ids = ids;
    }

    pub fn last_document_id(&self) -> Result<&str> {
        match self.last_document_ids.as_slice() {
            [single] => Ok(single.as_str()),
            _ => Err(Error::StateAbuse("expected exactly one document id".to_string())),
        }
    }

    pub fn last_document_ids(&self) -> Result<&[String]> {
        if self.last_document_ids.is_empty() {
            return Err(Error::StateAbuse("no document ids were stored".to_string()));
        }
        Ok(&self.last_document_ids)
    }
}

fn parse_warning(payload: &[u8]) -> Option<Warning> {
    let mut code = 0i32;
    let mut text = String::new();
    let mut is_note = false;
    for field in FieldIter::new(payload) {
        let field = field.ok()?;
        match field.number {
            1 => is_note = field_as_u64(&field).ok()? != 0,
            2 => code = field_as_u64(&field).ok()? as i32,
            3 => text = String::from_utf8_lossy(field.bytes).into_owned(),
            _ => {}
        }
    }
    Some(Warning { code, text, is_note })
}

/// Extract a `V_UINT`/`V_SINT` scalar's value from a `SessionStateChanged`
/// parameter's `Any(Scalar(...))` wrapper.
fn first_uint_scalar(any_bytes: &[u8]) -> Option<u64> {
    for field in FieldIter::new(any_bytes) {
        let field = field.ok()?;
        if field.number == 2 {
            for inner in FieldIter::new(field.bytes) {
                let inner = inner.ok()?;
                if inner.number == 2 || inner.number == 3 {
                    return field_as_u64(&inner).ok();
                }
            }
        }
    }
    None
}

fn first_string_scalar(any_bytes: &[u8]) -> Option<String> {
    for field in FieldIter::new(any_bytes) {
        let field = field.ok()?;
        if field.number == 2 {
            for inner in FieldIter::new(field.bytes) {
                let inner = inner.ok()?;
                if inner.number == 8 {
                    for string_msg in FieldIter::new(inner.bytes) {
                        let string_msg = string_msg.ok()?;
                        if string_msg.number == 1 {
                            return Some(String::from_utf8_lossy(string_msg.bytes).into_owned());
                        }
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{RowData, ServerErrorMsg};
    use crate::constant::NoticeScope;
    use crate::error::Severity;
    use crate::pbwire::{write_length_delimited, write_tagged_varint};

    fn col_meta(field_type: u8, name: &str) -> RawColumnMetaData {
        let mut m = RawColumnMetaData::default();
        m.field_type = crate::constant::FieldType::from_u8(field_type);
        m.name = name.to_string();
        m
    }

    #[test]
    fn multi_resultset_streaming() {
        let mut rs = ResultStream::new(true);
        rs.on_message(ServerMessage::ColumnMetaData(col_meta(1, "a"))).unwrap();
        rs.on_message(ServerMessage::ColumnMetaData(col_meta(1, "b"))).unwrap();
        assert_eq!(rs.current_columns.len(), 2);

        for _ in 0..3 {
            let row = rs.on_message(ServerMessage::Row(RowData { fields: vec![vec![1]] })).unwrap();
            assert!(row.is_some());
        }

        rs.on_message(ServerMessage::FetchDoneMoreResultsets).unwrap();
        assert_eq!(rs.state(), State::ReadMetadata);

        rs.on_message(ServerMessage::ColumnMetaData(col_meta(1, "c"))).unwrap();
        rs.on_message(ServerMessage::FetchDone).unwrap();
        assert_eq!(rs.state(), State::ReadStmtOk);

        rs.on_message(ServerMessage::StmtExecuteOk).unwrap();
        assert_eq!(rs.state(), State::ReadDone);
    }

    #[test]
    fn error_message_sets_terminal_state() {
        let mut rs = ResultStream::new(true);
        let err = rs.on_message(ServerMessage::Error(ServerErrorMsg {
            severity: Severity::Error,
            code: 1062,
            sql_state: "42000".to_string(),
            message: "dup".to_string(),
        }));
        assert!(err.is_err());
        assert_eq!(rs.state(), State::ReadError);
    }

    #[test]
    fn out_of_sequence_message_is_commands_out_of_sync() {
        let mut rs = ResultStream::new(false);
        let result = rs.on_message(ServerMessage::Row(RowData { fields: vec![] }));
        assert!(matches!(result, Err(Error::CommandsOutOfSync)));
        assert_eq!(rs.state(), State::ReadError);
    }

    #[test]
    fn warning_notice_is_accumulated() {
        let mut rs = ResultStream::new(true);
        let mut payload = Vec::new();
        write_tagged_varint(&mut payload, 1, 0);
        write_tagged_varint(&mut payload, 2, 1062);
        write_length_delimited(&mut payload, 3, b"dup");

        rs.on_message(ServerMessage::Notice(NoticeFrame {
            scope: NoticeScope::Local,
            notice_type: NoticeType::Warning,
            payload,
        }))
        .unwrap();

        assert_eq!(rs.warnings.len(), 1);
        assert_eq!(rs.warnings[0].code, 1062);
        assert_eq!(rs.warnings[0].text, "dup");
        assert!(!rs.warnings[0].is_note);
    }

    #[test]
    fn set_last_document_ids_replaces_not_appends() {
        let mut rs = ResultStream::new(false);
        rs.set_last_document_ids(vec!["a".to_string()]);
        rs.set_last_document_ids(vec!["b".to_string(), "c".to_string()]);
        assert_eq!(rs.last_document_ids().unwrap(), ["b".to_string(), "c".to_string()]);
    }
}
