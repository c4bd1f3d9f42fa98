use std::fmt;

use crate::error::{ExecutorError, ExecutorResult};

/// Identifies one job's usage of the running external cluster.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LeaseId(u64);

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues lease IDs starting from 1.
/// IDs are never reused within one executor starter.
#[derive(Debug, Default)]
pub(crate) struct LeaseIdGenerator {
    last: u64,
}

impl LeaseIdGenerator {
    pub fn next(&mut self) -> ExecutorResult<LeaseId> {
        self.last = self
            .last
            .checked_add(1)
            .ok_or_else(|| ExecutorError::internal("lease ID overflow"))?;
        Ok(LeaseId(self.last))
    }
}
