//! LIMIT stage.

use super::{unexpected_input, Executor, Intermediate};
use crate::error::Result;

/// Keeps the first `limit` ranked entries; passes everything through
/// without a limit.
pub struct LimitExecutor {
    limit: Option<usize>,
}

impl LimitExecutor {
    pub fn new(limit: Option<usize>) -> Self {
        LimitExecutor { limit }
    }
}

impl Executor for LimitExecutor {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn execute(&self, input: Intermediate) -> Result<Intermediate> {
        let Some(limit) = self.limit else {
            return Ok(input);
        };
        match input {
            Intermediate::Scored(mut docs) => {
                docs.truncate(limit);
                Ok(Intermediate::Scored(docs))
            }
            other => Err(unexpected_input(self.name(), &other)),
        }
    }
}
