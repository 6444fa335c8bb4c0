//! Single pass over a set of operations, one call at a time or in batches.

use gdrive_core::{BATCH_LIMIT, DriveError};

use super::operation::{Operation, OperationError, Outcome, RemoteService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One call per operation, outcomes in submission order.
    Sequential,
    /// Chunks of up to the batch limit per call. Chunks are sent in order;
    /// outcomes within a chunk arrive in whatever order the service replies.
    Batched,
}

pub struct BatchExecutor<'s, S> {
    service: &'s S,
    strategy: Strategy,
    batch_limit: usize,
}

impl<'s, S: RemoteService> BatchExecutor<'s, S> {
    pub fn new(service: &'s S, strategy: Strategy) -> Self {
        Self {
            service,
            strategy,
            batch_limit: BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.clamp(1, BATCH_LIMIT);
        self
    }

    /// Runs every operation once and hands each outcome to `sink` as soon as
    /// it is known. The pass stops early only when `sink` returns an error or
    /// an operation cannot be prepared.
    pub async fn run<E, F>(&self, operations: &[(String, Operation)], mut sink: F) -> Result<(), E>
    where
        E: From<OperationError> + From<DriveError>,
        F: FnMut(Outcome) -> Result<(), E>,
    {
        match self.strategy {
            Strategy::Sequential => {
                for (id, operation) in operations {
                    let request = prepare(id, operation)?;
                    let result = self.service.call(request).await;
                    sink(Outcome {
                        id: id.clone(),
                        result,
                    })?;
                }
            }
            Strategy::Batched => {
                for chunk in operations.chunks(self.batch_limit) {
                    let mut requests = Vec::with_capacity(chunk.len());
                    for (id, operation) in chunk {
                        requests.push((id.clone(), prepare(id, operation)?));
                    }
                    match self.service.call_batch(requests).await {
                        Ok(replies) => {
                            for reply in replies {
                                sink(Outcome {
                                    id: reply.id,
                                    result: reply.result,
                                })?;
                            }
                        }
                        Err(err) => {
                            // A failed envelope fails every member of the
                            // chunk with the same signature.
                            let Some(signature) = err.signature() else {
                                return Err(err.into());
                            };
                            let message = err.to_string();
                            for (id, _) in chunk {
                                sink(Outcome {
                                    id: id.clone(),
                                    result: Err(DriveError::Batch {
                                        signature: signature.clone(),
                                        message: message.clone(),
                                    }),
                                })?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn prepare(id: &str, operation: &Operation) -> Result<gdrive_core::ApiRequest, OperationError> {
    operation.materialize().map_err(|source| OperationError::Prepare {
        id: id.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{Call, FakeDrive};
    use gdrive_core::ApiRequest;

    #[derive(Debug)]
    enum TestError {
        Op,
        Drive,
    }

    impl From<OperationError> for TestError {
        fn from(_: OperationError) -> Self {
            TestError::Op
        }
    }

    impl From<DriveError> for TestError {
        fn from(_: DriveError) -> Self {
            TestError::Drive
        }
    }

    fn deletes(count: usize) -> Vec<(String, Operation)> {
        (0..count)
            .map(|i| {
                (
                    format!("op-{i}"),
                    Operation::ready(ApiRequest::delete(format!("f{i}"))),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn batched_strategy_chunks_by_limit() {
        let fake = FakeDrive::new();
        let operations = deletes(250);
        let mut seen = 0;

        BatchExecutor::new(&fake, Strategy::Batched)
            .run::<TestError, _>(&operations, |_| {
                seen += 1;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(fake.batch_sizes(), vec![100, 100, 50]);
        assert_eq!(seen, 250);
    }

    #[tokio::test]
    async fn sequential_strategy_preserves_order() {
        let fake = FakeDrive::new();
        let operations = deletes(3);
        let mut order = Vec::new();

        BatchExecutor::new(&fake, Strategy::Sequential)
            .run::<TestError, _>(&operations, |outcome| {
                assert!(outcome.result.is_err());
                order.push(outcome.id);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(order, vec!["op-0", "op-1", "op-2"]);
        assert_eq!(
            fake.calls(),
            vec![
                Call::Single("f0".into()),
                Call::Single("f1".into()),
                Call::Single("f2".into())
            ]
        );
    }

    #[tokio::test]
    async fn prepare_failure_stops_pass() {
        let fake = FakeDrive::new();
        let operations = vec![(
            "broken".to_string(),
            Operation::deferred(|| Err(std::io::Error::other("unreadable"))),
        )];

        let err = BatchExecutor::new(&fake, Strategy::Sequential)
            .run::<TestError, _>(&operations, |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(err, TestError::Op));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_call_fails_every_member_with_its_signature() {
        let fake = FakeDrive::new();
        fake.fail_batches("500", None, 1);
        let operations = deletes(3);
        let mut failed = Vec::new();

        BatchExecutor::new(&fake, Strategy::Batched)
            .run::<TestError, _>(&operations, |outcome| {
                let error = outcome.result.expect_err("whole batch failed");
                assert!(matches!(error, DriveError::Batch { .. }));
                failed.push((outcome.id, error.signature()));
                Ok(())
            })
            .await
            .expect("pass completes");

        let expected = Some(gdrive_core::ErrorSignature::new("500", None));
        assert_eq!(
            failed,
            vec![
                ("op-0".to_string(), expected.clone()),
                ("op-1".to_string(), expected.clone()),
                ("op-2".to_string(), expected),
            ]
        );
    }

    #[tokio::test]
    async fn undecodable_batch_response_stops_pass() {
        let fake = FakeDrive::new();
        fake.garble_next_batch();
        let operations = deletes(2);
        let mut seen = 0;

        let err = BatchExecutor::new(&fake, Strategy::Batched)
            .run::<TestError, _>(&operations, |_| {
                seen += 1;
                Ok(())
            })
            .await
            .expect_err("pass stops");

        assert!(matches!(err, TestError::Drive));
        assert_eq!(seen, 0);
    }
}
