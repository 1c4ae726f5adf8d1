use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Severity of a server-originated error, per spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
}

/// Errors surfaced by the protocol core (C1-C6).
///
/// Numeric codes in doc comments are the fixed error-code space of spec.md §6.
#[derive(Debug, Error)]
pub enum Error {
    /// 2002 CONNECTION_ERROR / generic transport failure.
    #[error("IO error: {0}")]
    Transport(#[from] std::io::Error),

    /// 2026 SSL_CONNECTION_ERROR.
    #[error("TLS error: {0}")]
    Tls(String),

    /// 2009 WRONG_HOST_INFO.
    #[error("wrong host info: {0}")]
    WrongHostInfo(String),

    /// 2005 UNKNOWN_HOST.
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// 2006 SERVER_GONE.
    #[error("MySQL server has gone away")]
    ServerGone,

    /// 2007 BROKEN_PIPE.
    #[error("broken pipe")]
    BrokenPipe,

    /// 2027 MALFORMED_PACKET.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// 2014 COMMANDS_OUT_OF_SYNC.
    #[error("commands out of sync")]
    CommandsOutOfSync,

    /// 2028 INVALID_AUTH_METHOD.
    #[error("invalid authentication method: {0}")]
    InvalidAuthMethod(String),

    /// A server-originated ERROR message.
    #[error("server error {code} ({sql_state}): {message}")]
    ServerError {
        code: u32,
        sql_state: String,
        message: String,
        severity: Severity,
    },

    #[error("field type mismatch")]
    TypeMismatch,

    #[error("field index out of range")]
    IndexOutOfRange,

    #[error("invalid session/result state: {0}")]
    StateAbuse(String),

    /// A bug in this crate: an invariant the locking/state-machine discipline
    /// should have made unreachable was reached anyway.
    #[error("internal error: {0}")]
    Internal(color_eyre::Report),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(color_eyre::eyre::eyre!(msg.into()))
    }

    /// Whether this error should mark the owning Session/Transport permanently closed.
    pub fn is_conn_broken(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Tls(_)
                | Error::ServerGone
                | Error::BrokenPipe
                | Error::MalformedPacket(_)
                | Error::CommandsOutOfSync
        )
    }
}

/// Errors surfaced by the page cache (C7-C9).
#[derive(Debug, Error)]
pub enum PageCacheError {
    #[error("IO error (errno {errno:?}): {source}")]
    Io {
        errno: Option<i32>,
        source: std::io::Error,
    },

    #[error("page is pinned during flush and was skipped")]
    PagePinnedDuringFlush,

    #[error("page cache corruption: {0}")]
    Corruption(String),

    #[error("page cache misconfigured: {0}")]
    BadConfig(String),
}

pub type PcResult<T> = core::result::Result<T, PageCacheError>;
