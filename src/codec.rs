//! Wire codec (spec.md §4.2, C2): the 5-byte frame header, the static
//! server-message dispatch table, and the client-message encoders.
//!
//! The frame header is a fixed little-endian layout, so it is modeled with
//! `zerocopy` the way the teacher models its classic-protocol packet header.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::buffer::BufferSet;
use crate::constant::{ClientMsgType, FieldType, NoticeScope, NoticeType, ServerMsgType};
use crate::error::{Error, Result, Severity};
use crate::pbwire::{
    self, field_as_u64, write_fixed32, write_fixed64, write_length_delimited, write_tagged_varint,
    FieldIter,
};
use crate::transport::Transport;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, Copy)]
#[repr(C, packed)]
struct FrameHeader {
    len: u32,
    type_tag: u8,
}

/// A fully decoded server message (the subset this core dispatches on,
/// spec.md §6).
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Ok,
    Error(ServerErrorMsg),
    ConnCapabilities(Vec<(String, Vec<u8>)>),
    AuthenticateContinue { auth_data: Vec<u8> },
    AuthenticateOk,
    Notice(NoticeFrame),
    ColumnMetaData(RawColumnMetaData),
    Row(RowData),
    FetchDone,
    FetchDoneMoreResultsets,
    StmtExecuteOk,
}

#[derive(Debug, Clone)]
pub struct ServerErrorMsg {
    pub severity: Severity,
    pub code: u32,
    pub sql_state: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NoticeFrame {
    pub scope: NoticeScope,
    pub notice_type: NoticeType,
    pub payload: Vec<u8>,
}

/// Column metadata as parsed straight off the wire (u32/u64 widths, raw
/// name bytes); `row.rs` converts this to the public `ColumnMetadata`.
#[derive(Debug, Clone, Default)]
pub struct RawColumnMetaData {
    pub field_type: Option<FieldType>,
    pub name: String,
    pub original_name: String,
    pub table: String,
    pub original_table: String,
    pub schema: String,
    pub catalog: String,
    pub collation: u64,
    pub fractional_digits: u32,
    pub length: u32,
    pub flags: u32,
    pub content_type: u32,
}

#[derive(Debug, Clone)]
pub struct RowData {
    pub fields: Vec<Vec<u8>>,
}

/// Send one framed message: header (len = payload.len() + 1, type tag) then
/// payload, as a single logical write (spec.md §4.2).
pub fn send(transport: &mut Transport, buffers: &mut BufferSet, type_tag: u8, payload: &[u8]) -> Result<()> {
    let buf = buffers.new_write_buffer();
    buf.extend_from_slice(payload);

    let len = u32::try_from(payload.len() + 1)
        .map_err(|_| Error::internal("payload too large to frame"))?;
    let header = FrameHeader { len, type_tag };
    buf[0..5].copy_from_slice(header.as_bytes());

    if std::env::var_os("MYSQLX_TRACE_CONNECTION").is_some() {
        tracing::debug!(type_tag, payload_len = payload.len(), "send");
    }

    transport.write(buf)
}

/// Read one frame and dispatch it to the appropriate parser.
pub fn recv(transport: &mut Transport) -> Result<ServerMessage> {
    let mut header_bytes = [0u8; 5];
    transport.read_exact(&mut header_bytes)?;
    let header = FrameHeader::read_from_bytes(&header_bytes)
        .map_err(|_| Error::internal("frame header has the wrong size"))?;
    let payload_len = (header.len as usize)
        .checked_sub(1)
        .ok_or_else(|| Error::MalformedPacket("frame advertises zero length".to_string()))?;

    let mut payload = vec![0u8; payload_len];
    transport.read_exact(&mut payload)?;

    if std::env::var_os("MYSQLX_TRACE_CONNECTION").is_some() {
        tracing::debug!(type_tag = header.type_tag, payload_len, "recv");
    }

    decode(header.type_tag, &payload)
}

/// As `recv`, but with a bounded wait on the header read. A clean zero-byte
/// read is reported as `Ok(None)` ("no message"), not an error.
pub fn recv_with_deadline(transport: &mut Transport, ms: u64) -> Result<Option<ServerMessage>> {
    let mut header_bytes = [0u8; 5];
    let n = transport.read_with_timeout(&mut header_bytes, ms)?;
    if n == 0 {
        return Ok(None);
    }
    if n < header_bytes.len() {
        transport.read_exact(&mut header_bytes[n..])?;
    }
    let header = FrameHeader::read_from_bytes(&header_bytes)
        .map_err(|_| Error::internal("frame header has the wrong size"))?;
    let payload_len = (header.len as usize)
        .checked_sub(1)
        .ok_or_else(|| Error::MalformedPacket("frame advertises zero length".to_string()))?;

    let mut payload = vec![0u8; payload_len];
    transport.read_exact(&mut payload)?;
    decode(header.type_tag, &payload).map(Some)
}

fn decode(type_tag: u8, payload: &[u8]) -> Result<ServerMessage> {
    let known = ServerMsgType::from_u8(type_tag)
        .ok_or_else(|| Error::MalformedPacket(format!("unknown server message type {type_tag}")))?;
    match known {
        ServerMsgType::OK => Ok(ServerMessage::Ok),
        ServerMsgType::ERROR => parse_error(payload).map(ServerMessage::Error),
        ServerMsgType::CONN_CAPABILITIES => parse_conn_capabilities(payload).map(ServerMessage::ConnCapabilities),
        ServerMsgType::SESS_AUTHENTICATE_CONTINUE => parse_authenticate_continue(payload),
        ServerMsgType::SESS_AUTHENTICATE_OK => Ok(ServerMessage::AuthenticateOk),
        ServerMsgType::NOTICE => parse_notice(payload).map(ServerMessage::Notice),
        ServerMsgType::RESULTSET_COLUMN_META_DATA => parse_column_meta_data(payload).map(ServerMessage::ColumnMetaData),
        ServerMsgType::RESULTSET_ROW => parse_row(payload).map(ServerMessage::Row),
        ServerMsgType::RESULTSET_FETCH_DONE => Ok(ServerMessage::FetchDone),
        ServerMsgType::RESULTSET_FETCH_DONE_MORE_RESULTSETS => Ok(ServerMessage::FetchDoneMoreResultsets),
        ServerMsgType::SQL_STMT_EXECUTE_OK => Ok(ServerMessage::StmtExecuteOk),
    }
}

fn parse_error(payload: &[u8]) -> Result<ServerErrorMsg> {
    let mut severity = Severity::Error;
    let mut code = 0u32;
    let mut sql_state = String::new();
    let mut message = String::new();
    for field in FieldIter::new(payload) {
        let field = field?;
        match field.number {
            1 => severity = if field_as_u64(&field)? == 1 { Severity::Fatal } else { Severity::Error },
            2 => code = u32::try_from(field_as_u64(&field)?).unwrap_or(0),
            3 => sql_state = String::from_utf8_lossy(field.bytes).into_owned(),
            4 => message = String::from_utf8_lossy(field.bytes).into_owned(),
            _ => {}
        }
    }
    Ok(ServerErrorMsg { severity, code, sql_state, message })
}

fn parse_conn_capabilities(payload: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut out = Vec::new();
    for field in FieldIter::new(payload) {
        let field = field?;
        if field.number != 1 {
            continue;
        }
        let mut name = String::new();
        let mut value = Vec::new();
        for inner in FieldIter::new(field.bytes) {
            let inner = inner?;
            match inner.number {
                1 => name = String::from_utf8_lossy(inner.bytes).into_owned(),
                2 => value = inner.bytes.to_vec(),
                _ => {}
            }
        }
        out.push((name, value));
    }
    Ok(out)
}

fn parse_authenticate_continue(payload: &[u8]) -> Result<ServerMessage> {
    let mut auth_data = Vec::new();
    for field in FieldIter::new(payload) {
        let field = field?;
        if field.number == 1 {
            auth_data = field.bytes.to_vec();
        }
    }
    Ok(ServerMessage::AuthenticateContinue { auth_data })
}

fn parse_notice(payload: &[u8]) -> Result<NoticeFrame> {
    let mut scope = NoticeScope::Local;
    let mut notice_type = NoticeType::Other(0);
    let mut inner_payload = Vec::new();
    for field in FieldIter::new(payload) {
        let field = field?;
        match field.number {
            1 => notice_type = NoticeType::from_u32(u32::try_from(field_as_u64(&field)?).unwrap_or(0)),
            2 => scope = if field_as_u64(&field)? == 2 { NoticeScope::Global } else { NoticeScope::Local },
            3 => inner_payload = field.bytes.to_vec(),
            _ => {}
        }
    }
    Ok(NoticeFrame { scope, notice_type, payload: inner_payload })
}

fn parse_column_meta_data(payload: &[u8]) -> Result<RawColumnMetaData> {
    let mut meta = RawColumnMetaData::default();
    for field in FieldIter::new(payload) {
        let field = field?;
        match field.number {
            1 => meta.field_type = FieldType::from_u8(u8::try_from(field_as_u64(&field)?).unwrap_or(0)),
            2 => meta.name = String::from_utf8_lossy(field.bytes).into_owned(),
            3 => meta.original_name = String::from_utf8_lossy(field.bytes).into_owned(),
            4 => meta.table = String::from_utf8_lossy(field.bytes).into_owned(),
            5 => meta.original_table = String::from_utf8_lossy(field.bytes).into_owned(),
            6 => meta.schema = String::from_utf8_lossy(field.bytes).into_owned(),
            7 => meta.catalog = String::from_utf8_lossy(field.bytes).into_owned(),
            8 => meta.collation = field_as_u64(&field)?,
            9 => meta.fractional_digits = u32::try_from(field_as_u64(&field)?).unwrap_or(0),
            10 => meta.flags = u32::try_from(field_as_u64(&field)?).unwrap_or(0),
            11 => meta.content_type = u32::try_from(field_as_u64(&field)?).unwrap_or(0),
            12 => meta.length = u32::try_from(field_as_u64(&field)?).unwrap_or(0),
            _ => {}
        }
    }
    Ok(meta)
}

fn parse_row(payload: &[u8]) -> Result<RowData> {
    let mut fields = Vec::new();
    for field in FieldIter::new(payload) {
        let field = field?;
        if field.number == 1 {
            fields.push(field.bytes.to_vec());
        }
    }
    Ok(RowData { fields })
}

// --- Client -> server encoders -------------------------------------------------

pub fn encode_capabilities_get() -> (u8, Vec<u8>) {
    (ClientMsgType::CON_CAPABILITIES_GET.tag(), Vec::new())
}

pub fn encode_capabilities_set_bool(name: &str, value: bool) -> (u8, Vec<u8>) {
    let mut scalar = Vec::new();
    write_tagged_varint(&mut scalar, 1, 7); // Scalar.type = V_BOOL
    write_tagged_varint(&mut scalar, 7, u64::from(value));

    let mut any = Vec::new();
    write_tagged_varint(&mut any, 1, 1); // Any.type = SCALAR
    write_length_delimited(&mut any, 2, &scalar);

    let mut capability = Vec::new();
    write_length_delimited(&mut capability, 1, name.as_bytes());
    write_length_delimited(&mut capability, 2, &any);

    let mut payload = Vec::new();
    write_length_delimited(&mut payload, 1, &capability);
    (ClientMsgType::CON_CAPABILITIES_SET.tag(), payload)
}

pub fn encode_authenticate_start(mech_name: &str, auth_data: &[u8]) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    write_length_delimited(&mut payload, 1, mech_name.as_bytes());
    write_length_delimited(&mut payload, 2, auth_data);
    (ClientMsgType::SESS_AUTHENTICATE_START.tag(), payload)
}

pub fn encode_authenticate_continue(auth_data: &[u8]) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    write_length_delimited(&mut payload, 1, auth_data);
    (ClientMsgType::SESS_AUTHENTICATE_CONTINUE.tag(), payload)
}

pub fn encode_session_close() -> (u8, Vec<u8>) {
    (ClientMsgType::SESS_CLOSE.tag(), Vec::new())
}

pub fn encode_connection_close() -> (u8, Vec<u8>) {
    (ClientMsgType::CON_CLOSE.tag(), Vec::new())
}

/// A single typed argument to `execute_stmt`, per spec.md §4.3's fixed
/// `ArgumentValue -> Scalar variant` mapping.
#[derive(Debug, Clone)]
pub enum ArgumentValue {
    SignedInt(i64),
    UnsignedInt(u64),
    Null,
    Double(f64),
    Float(f32),
    Bool(bool),
    String(Vec<u8>),
    Octets(Vec<u8>),
}

fn encode_any_scalar(value: &ArgumentValue) -> Vec<u8> {
    let mut scalar = Vec::new();
    match value {
        ArgumentValue::SignedInt(v) => {
            write_tagged_varint(&mut scalar, 1, 1);
            write_tagged_varint(&mut scalar, 2, pbwire::zigzag_encode(*v));
        }
        ArgumentValue::UnsignedInt(v) => {
            write_tagged_varint(&mut scalar, 1, 2);
            write_tagged_varint(&mut scalar, 3, *v);
        }
        ArgumentValue::Null => {
            write_tagged_varint(&mut scalar, 1, 3);
        }
        ArgumentValue::Double(v) => {
            write_tagged_varint(&mut scalar, 1, 5);
            write_varint_tag_fixed64(&mut scalar, 5, v.to_bits());
        }
        ArgumentValue::Float(v) => {
            write_tagged_varint(&mut scalar, 1, 6);
            write_varint_tag_fixed32(&mut scalar, 6, v.to_bits());
        }
        ArgumentValue::Bool(v) => {
            write_tagged_varint(&mut scalar, 1, 7);
            write_tagged_varint(&mut scalar, 7, u64::from(*v));
        }
        ArgumentValue::String(bytes) => {
            write_tagged_varint(&mut scalar, 1, 8);
            let mut inner = Vec::new();
            write_length_delimited(&mut inner, 1, bytes);
            write_length_delimited(&mut scalar, 8, &inner);
        }
        ArgumentValue::Octets(bytes) => {
            write_tagged_varint(&mut scalar, 1, 9);
            let mut inner = Vec::new();
            write_length_delimited(&mut inner, 1, bytes);
            write_length_delimited(&mut scalar, 9, &inner);
        }
    }

    let mut any = Vec::new();
    write_tagged_varint(&mut any, 1, 1); // Any.type = SCALAR
    write_length_delimited(&mut any, 2, &scalar);
    any
}

fn write_varint_tag_fixed64(out: &mut Vec<u8>, field_number: u32, bits: u64) {
    write_varint_tag(out, field_number, 1);
    write_fixed64(out, bits);
}

fn write_varint_tag_fixed32(out: &mut Vec<u8>, field_number: u32, bits: u32) {
    write_varint_tag(out, field_number, 5);
    write_fixed32(out, bits);
}

fn write_varint_tag(out: &mut Vec<u8>, field_number: u32, wire_type: u64) {
    pbwire::write_varint(out, (u64::from(field_number) << 3) | wire_type);
}

/// Encode `Sql.StmtExecute { namespace = "sql", stmt, args, compact_metadata = false }`.
pub fn encode_sql_stmt_execute(namespace: &str, stmt: &str, args: &[ArgumentValue]) -> (u8, Vec<u8>) {
    let mut payload = Vec::new();
    write_length_delimited(&mut payload, 3, namespace.as_bytes());
    write_length_delimited(&mut payload, 1, stmt.as_bytes());
    for arg in args {
        let encoded = encode_any_scalar(arg);
        write_length_delimited(&mut payload, 2, &encoded);
    }
    (ClientMsgType::SQL_STMT_EXECUTE.tag(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_is_five_bytes() {
        assert_eq!(core::mem::size_of::<FrameHeader>(), 5);
    }

    #[test]
    fn capabilities_set_round_trips_through_field_iter() {
        let (tag, payload) = encode_capabilities_set_bool("tls", true);
        assert_eq!(tag, ClientMsgType::CON_CAPABILITIES_SET.tag());

        let capability = FieldIter::new(&payload).next().unwrap().unwrap();
        assert_eq!(capability.number, 1);
        let mut name = String::new();
        for inner in FieldIter::new(capability.bytes) {
            let inner = inner.unwrap();
            if inner.number == 1 {
                name = String::from_utf8_lossy(inner.bytes).into_owned();
            }
        }
        assert_eq!(name, "tls");
    }

    #[test]
    fn error_message_parses() {
        let mut payload = Vec::new();
        write_tagged_varint(&mut payload, 1, 1);
        write_tagged_varint(&mut payload, 2, 1062);
        write_length_delimited(&mut payload, 3, b"42000");
        write_length_delimited(&mut payload, 4, b"dup entry");

        let parsed = parse_error(&payload).unwrap();
        assert_eq!(parsed.severity, Severity::Fatal);
        assert_eq!(parsed.code, 1062);
        assert_eq!(parsed.sql_state, "42000");
        assert_eq!(parsed.message, "dup entry");
    }

    #[test]
    fn sint_argument_round_trips_as_zigzag_varint() {
        let encoded = encode_any_scalar(&ArgumentValue::SignedInt(-5));
        let any_type = FieldIter::new(&encoded).next().unwrap().unwrap();
        assert_eq!(field_as_u64(&any_type).unwrap(), 1);
    }
}
