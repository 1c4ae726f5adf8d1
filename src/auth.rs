//! PLAIN and MYSQL41 authentication state machines (spec.md §4.4, C4).
//!
//! The scramble primitive is injected as a pure function per spec.md's
//! "consumed as a pure function" framing; `mysql41_scramble` here is
//! grounded on the teacher's `auth_mysql_native_password` double-SHA1
//! construction.

use sha1::{Digest, Sha1};

use crate::codec::{self, ServerMessage};
use crate::error::{Error, Result};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Mysql41,
}

impl Mechanism {
    fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Mysql41 => "MYSQL41",
        }
    }
}

/// Drive the chosen mechanism's handshake to completion, or fail.
pub fn authenticate(
    session: &mut Session,
    mechanism: Mechanism,
    schema: &str,
    user: &str,
    password: &str,
) -> Result<()> {
    match mechanism {
        Mechanism::Plain => run_plain(session, schema, user, password),
        Mechanism::Mysql41 => run_mysql41(session, schema, user, password),
    }
}

fn auth_data_unless_empty(schema: &str, user: &str, tail: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(schema.as_bytes());
    out.push(0);
    out.extend_from_slice(user.as_bytes());
    out.push(0);
    out.extend_from_slice(tail.as_bytes());
    out
}

fn run_plain(session: &mut Session, schema: &str, user: &str, password: &str) -> Result<()> {
    let auth_data = auth_data_unless_empty(schema, user, password);
    let (tag, payload) = codec::encode_authenticate_start(Mechanism::Plain.name(), &auth_data);
    session.send_raw(tag, &payload)?;
    wait_for_ok(session)
}

fn run_mysql41(session: &mut Session, schema: &str, user: &str, password: &str) -> Result<()> {
    let (tag, payload) = codec::encode_authenticate_start(Mechanism::Mysql41.name(), &[]);
    session.send_raw(tag, &payload)?;

    let salt = loop {
        match session.recv_dispatching_notices()? {
            ServerMessage::AuthenticateContinue { auth_data } => break auth_data,
            ServerMessage::Error(e) => return Err(session.server_error(e)),
            other => return Err(unexpected(&other)),
        }
    };

    let hash = if password.is_empty() {
        String::new()
    } else {
        mysql41_scramble_hex(&salt, password.as_bytes())
    };
    let auth_data = auth_data_unless_empty(schema, user, &hash);
    let (tag, payload) = codec::encode_authenticate_continue(&auth_data);
    session.send_raw(tag, &payload)?;
    wait_for_ok(session)
}

fn wait_for_ok(session: &mut Session) -> Result<()> {
    loop {
        match session.recv_dispatching_notices()? {
            ServerMessage::AuthenticateOk => return Ok(()),
            ServerMessage::Error(e) => return Err(session.server_error(e)),
            other => return Err(unexpected(&other)),
        }
    }
}

fn unexpected(msg: &ServerMessage) -> Error {
    Error::MalformedPacket(format!("unexpected message during authentication: {msg:?}"))
}

/// `hex_upper(sha1(sha1(password)) XOR sha1(salt || sha1(sha1(password))))`,
/// the MYSQL41 double-SHA1 challenge response.
pub fn mysql41_scramble(salt: &[u8], password: &[u8]) -> [u8; 40] {
    let digest = mysql41_scramble_bytes(salt, password);
    let mut hex = [0u8; 40];
    const TABLE: &[u8; 16] = b"0123456789ABCDEF";
    for (i, byte) in digest.iter().enumerate() {
        hex[i * 2] = TABLE[(byte >> 4) as usize];
        hex[i * 2 + 1] = TABLE[(byte & 0x0F) as usize];
    }
    hex
}

fn mysql41_scramble_bytes(salt: &[u8], password: &[u8]) -> [u8; 20] {
    let stage1 = Sha1::digest(password);
    let stage2 = Sha1::digest(stage1);

    let mut salted = Sha1::new();
    salted.update(salt);
    salted.update(stage2);
    let salted = salted.finalize();

    let mut result = [0u8; 20];
    for i in 0..20 {
        result[i] = stage1[i] ^ salted[i];
    }
    result
}

fn mysql41_scramble_hex(salt: &[u8], password: &[u8]) -> String {
    String::from_utf8(mysql41_scramble(salt, password).to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_round_trips_through_hex() {
        let hex = mysql41_scramble_hex(b"0123456789012345678", b"");
        assert_eq!(hex.len(), 40);
    }

    #[test]
    fn scramble_is_deterministic() {
        let salt = b"01234567890123456789";
        let a = mysql41_scramble(salt, b"secret");
        let b = mysql41_scramble(salt, b"secret");
        assert_eq!(a, b);
    }

    #[test]
    fn scramble_differs_by_password() {
        let salt = b"01234567890123456789";
        assert_ne!(
            mysql41_scramble(salt, b"secret"),
            mysql41_scramble(salt, b"other")
        );
    }
}
