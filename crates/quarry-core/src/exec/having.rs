//! HAVING stage: filters candidates on their metadata.

use super::predicate;
use super::{unexpected_input, Executor, Intermediate};
use crate::error::Result;
use crate::query::{Conjunction, Predicate};
use crate::store::Store;

pub struct HavingExecutor<'a> {
    store: &'a Store,
    having: Option<Conjunction<Predicate>>,
}

impl<'a> HavingExecutor<'a> {
    /// Without a clause the stage passes its input through.
    pub fn new(store: &'a Store, having: Option<Conjunction<Predicate>>) -> Self {
        HavingExecutor { store, having }
    }
}

impl Executor for HavingExecutor<'_> {
    fn name(&self) -> &'static str {
        "having"
    }

    fn execute(&self, input: Intermediate) -> Result<Intermediate> {
        let Some(having) = &self.having else {
            return Ok(input);
        };
        let ids = match input {
            Intermediate::DocIds(ids) => ids,
            other => return Err(unexpected_input(self.name(), &other)),
        };

        let kept = ids
            .into_iter()
            .filter(|id| {
                self.store.find_document(*id).is_some_and(|doc| {
                    doc.with_kvs(|kvs| having.evaluate(&mut |p: &Predicate| predicate::matches(p, kvs)))
                })
            })
            .collect();
        Ok(Intermediate::DocIds(kept))
    }
}
