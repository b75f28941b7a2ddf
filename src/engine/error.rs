use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    TrackId,
    StartDate,
    EndDate,
    LocationId,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Id => "id",
            Field::TrackId => "trackId",
            Field::StartDate => "startDate",
            Field::EndDate => "endDate",
            Field::LocationId => "locationId",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Missing,
    Malformed(String),
    EndBeforeStart,
    DuplicateId,
    TooLong,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Missing => write!(f, "missing"),
            Reason::Malformed(raw) => write!(f, "malformed value {raw:?}, expected YYYY-MM-DD"),
            Reason::EndBeforeStart => write!(f, "ends before it starts"),
            Reason::DuplicateId => write!(f, "duplicate id in batch"),
            Reason::TooLong => write!(f, "too long"),
        }
    }
}

/// One problem with one booking of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Position in the input batch.
    pub index: usize,
    /// `None` when the id itself is missing.
    pub booking_id: Option<String>,
    pub field: Field,
    pub reason: Reason,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.booking_id {
            Some(id) => write!(f, "booking {id:?} (#{}): {} {}", self.index, self.field, self.reason),
            None => write!(f, "booking #{}: {} {}", self.index, self.field, self.reason),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    /// Every validation problem of the batch, in input order.
    Invalid(Vec<ValidationError>),
    NotFound(String),
    AlreadyExists(String),
    Conflict { booking: String, with: String },
    LimitExceeded(&'static str),
    JournalError(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Invalid(errors) => {
                write!(f, "{} invalid booking field(s)", errors.len())?;
                for e in errors {
                    write!(f, "; {e}")?;
                }
                Ok(())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict { booking, with } => {
                write!(f, "booking {booking} conflicts with booking {with}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::JournalError(e.to_string())
    }
}
