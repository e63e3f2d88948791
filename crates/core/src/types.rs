use std::fmt;

/// Sequence number assigned to a request when the dispatcher accepts it.
///
/// Ids start at 1 and increase with each call to `add`. They are unique per
/// dispatcher but not gap-free: an `add` cancelled while waiting for intake
/// space still consumes its id. Concurrent `add` calls may reach the intake
/// in a different order than their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}
