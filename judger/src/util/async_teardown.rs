use async_trait::async_trait;

/// Data structure that needs to be torn down asynchronously.
///
/// This trait is used in the place of `AsyncDrop`, which is unfortunately
/// not available for now. Types implementing it should be torn down
/// explicitly; their `Drop` impl is only a fallback for cancelled futures.
#[async_trait]
pub trait AsyncTeardown: Sync + Send {
    async fn teardown(&mut self);
}
