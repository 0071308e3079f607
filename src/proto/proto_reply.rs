use crate::invocation::{NotFoundKind, RpcFailure, UndeclaredKind};
use crate::proto::{Identity, WireReader, read_facet_path};

/// Single-byte tag classifying a reply envelope's outcome.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReplyStatus {
    Ok = 0,
    UserException = 1,
    ObjectNotExist = 2,
    FacetNotExist = 3,
    OperationNotExist = 4,
    UnknownLocalException = 5,
    UnknownUserException = 6,
    UnknownException = 7,
}

impl ReplyStatus {
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ReplyStatus {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, ()> {
        match v {
            0 => Ok(ReplyStatus::Ok),
            1 => Ok(ReplyStatus::UserException),
            2 => Ok(ReplyStatus::ObjectNotExist),
            3 => Ok(ReplyStatus::FacetNotExist),
            4 => Ok(ReplyStatus::OperationNotExist),
            5 => Ok(ReplyStatus::UnknownLocalException),
            6 => Ok(ReplyStatus::UnknownUserException),
            7 => Ok(ReplyStatus::UnknownException),
            _ => Err(()),
        }
    }
}

/// A successfully decoded reply. `status` is always `Ok` or
/// `UserException`; every other status decodes into an `RpcFailure`
/// instead. For `UserException` the body holds a user-defined exception
/// that the caller decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn success() -> Self {
        Self {
            status: ReplyStatus::Ok,
            body: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

/// Decodes a reply envelope: one status byte, then a status-dependent
/// remainder.
///
/// - `Ok` / `UserException`: the remainder is the reply body.
/// - not-exist statuses: a target descriptor (identity, legacy facet path,
///   operation name).
/// - unknown-* statuses: a single diagnostic string.
/// - any other status value: a protocol violation.
pub fn decode_reply(bytes: &[u8]) -> Result<Reply, RpcFailure> {
    let mut r = WireReader::new(bytes);
    let raw_status = r.read_u8()?;
    let status = ReplyStatus::try_from(raw_status)
        .map_err(|()| RpcFailure::ProtocolViolation { status: raw_status })?;

    match status {
        ReplyStatus::Ok | ReplyStatus::UserException => Ok(Reply {
            status,
            body: r.remaining().to_vec(),
        }),

        ReplyStatus::ObjectNotExist | ReplyStatus::FacetNotExist | ReplyStatus::OperationNotExist => {
            let identity = Identity::read(&mut r)?;
            let facet = read_facet_path(&mut r)?;
            let operation = r.read_string()?;
            let kind = match status {
                ReplyStatus::FacetNotExist => NotFoundKind::Facet,
                ReplyStatus::OperationNotExist => NotFoundKind::Operation,
                _ => NotFoundKind::Object,
            };
            Err(RpcFailure::TargetNotFound {
                kind,
                identity,
                facet,
                operation,
            })
        }

        ReplyStatus::UnknownLocalException
        | ReplyStatus::UnknownUserException
        | ReplyStatus::UnknownException => {
            let message = r.read_string()?;
            let kind = match status {
                ReplyStatus::UnknownLocalException => UndeclaredKind::Local,
                ReplyStatus::UnknownUserException => UndeclaredKind::User,
                _ => UndeclaredKind::Unknown,
            };
            Err(RpcFailure::RemoteUndeclared { kind, message })
        }
    }
}
