use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("you are not a member of this conversation")]
    NotAMember,

    #[error("only the group admin can do that")]
    NotAdmin,

    #[error("invalid participants")]
    InvalidParticipants,

    #[error("content cannot be empty")]
    EmptyContent,

    #[error("cannot remove the group admin")]
    CannotRemoveAdmin,

    #[error("cannot follow yourself")]
    CannotFollowSelf,

    #[error("already exists")]
    AlreadyExists,

    #[error("{0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    Lock(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Error::AlreadyExists
            }
            _ => Error::Sqlite(err),
        }
    }
}

impl Error {
    /// True for failures the caller caused, as opposed to storage faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Sqlite(_) | Error::Lock(_))
    }
}
