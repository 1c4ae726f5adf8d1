//! Wire-level constants for the X Protocol core: client/server message type
//! tags (spec.md §6), column `FieldType` (spec.md §3), and the notice
//! scope/type codes used by notice routing (spec.md §4.3).

/// Server -> Client message type tags (the subset this core dispatches on).
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMsgType {
    OK = 0x00,
    ERROR = 0x01,
    CONN_CAPABILITIES = 0x02,
    SESS_AUTHENTICATE_CONTINUE = 0x03,
    SESS_AUTHENTICATE_OK = 0x04,
    NOTICE = 0x0B,
    RESULTSET_COLUMN_META_DATA = 0x0C,
    RESULTSET_ROW = 0x0D,
    RESULTSET_FETCH_DONE = 0x0E,
    RESULTSET_FETCH_DONE_MORE_RESULTSETS = 0x0F,
    SQL_STMT_EXECUTE_OK = 0x11,
}

impl ServerMsgType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::OK),
            0x01 => Some(Self::ERROR),
            0x02 => Some(Self::CONN_CAPABILITIES),
            0x03 => Some(Self::SESS_AUTHENTICATE_CONTINUE),
            0x04 => Some(Self::SESS_AUTHENTICATE_OK),
            0x0B => Some(Self::NOTICE),
            0x0C => Some(Self::RESULTSET_COLUMN_META_DATA),
            0x0D => Some(Self::RESULTSET_ROW),
            0x0E => Some(Self::RESULTSET_FETCH_DONE),
            0x0F => Some(Self::RESULTSET_FETCH_DONE_MORE_RESULTSETS),
            0x11 => Some(Self::SQL_STMT_EXECUTE_OK),
            _ => None,
        }
    }
}

/// Client -> Server message type tags.
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMsgType {
    CON_CAPABILITIES_GET = 0x01,
    CON_CAPABILITIES_SET = 0x02,
    CON_CLOSE = 0x03,
    SESS_AUTHENTICATE_START = 0x04,
    SESS_AUTHENTICATE_CONTINUE = 0x05,
    SESS_RESET = 0x06,
    SESS_CLOSE = 0x07,
    SQL_STMT_EXECUTE = 0x0C,
    CRUD_FIND = 0x11,
    CRUD_INSERT = 0x12,
    CRUD_UPDATE = 0x13,
    CRUD_DELETE = 0x14,
}

impl ClientMsgType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Column field type, per spec.md §3 ColumnMetadata.
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    SINT = 1,
    UINT = 2,
    DOUBLE = 5,
    FLOAT = 6,
    BYTES = 7,
    TIME = 10,
    DATETIME = 12,
    SET = 15,
    ENUM = 16,
    BIT = 17,
    DECIMAL = 18,
}

impl FieldType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::SINT),
            2 => Some(Self::UINT),
            5 => Some(Self::DOUBLE),
            6 => Some(Self::FLOAT),
            7 => Some(Self::BYTES),
            10 => Some(Self::TIME),
            12 => Some(Self::DATETIME),
            15 => Some(Self::SET),
            16 => Some(Self::ENUM),
            17 => Some(Self::BIT),
            18 => Some(Self::DECIMAL),
            _ => None,
        }
    }
}

/// Notice scope, per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeScope {
    Local,
    Global,
}

/// Well-known notice payload types, per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeType {
    Warning,
    SessionVariableChanged,
    SessionStateChanged,
    GroupReplicationStateChanged,
    ServerHello,
    Other(u32),
}

impl NoticeType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Warning,
            2 => Self::SessionVariableChanged,
            3 => Self::SessionStateChanged,
            4 => Self::GroupReplicationStateChanged,
            5 => Self::ServerHello,
            other => Self::Other(other),
        }
    }
}

/// `SessionStateChanged` parameter kinds this core interprets itself when no
/// registered handler consumes the notice (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStateParam {
    GeneratedInsertId,
    RowsAffected,
    ProducedMessage,
    AccountExpired,
    ClientIdAssigned,
    Other(u32),
}

impl SessionStateParam {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::GeneratedInsertId,
            5 => Self::RowsAffected,
            7 => Self::ProducedMessage,
            8 => Self::AccountExpired,
            9 => Self::ClientIdAssigned,
            other => Self::Other(other),
        }
    }
}

bitflags::bitflags! {
    /// Bitset of a page-cache Block's status (spec.md §3 Block.status).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockStatus: u16 {
        const READ        = 0x0001;
        const CHANGED     = 0x0002;
        const IN_SWITCH   = 0x0004;
        const REASSIGNED  = 0x0008;
        const IN_FLUSH    = 0x0010;
        const ERROR       = 0x0020;
        const DIRECT_W    = 0x0040;
        const DEL_WRITE   = 0x0080;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_msg_type_round_trips() {
        for tag in 0u8..=0xFF {
            if let Some(t) = ServerMsgType::from_u8(tag) {
                assert_eq!(t as u8, tag);
            }
        }
    }

    #[test]
    fn field_type_round_trips() {
        for tag in 0u8..=0xFF {
            if let Some(t) = FieldType::from_u8(tag) {
                assert_eq!(t as u8, tag);
            }
        }
    }

    #[test]
    fn block_status_bits_are_disjoint() {
        let all = [
            BlockStatus::READ,
            BlockStatus::CHANGED,
            BlockStatus::IN_SWITCH,
            BlockStatus::REASSIGNED,
            BlockStatus::IN_FLUSH,
            BlockStatus::ERROR,
            BlockStatus::DIRECT_W,
            BlockStatus::DEL_WRITE,
        ];
        let mut union = BlockStatus::empty();
        for flag in all {
            assert!((union & flag).is_empty(), "flags must be disjoint bits");
            union |= flag;
        }
    }
}
