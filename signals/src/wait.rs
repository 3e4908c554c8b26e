use crate::Read;

/// Helper trait for `wait_for` to allow flexible predicate return types.
///
/// ## Semantics
/// - `result()` returns `Some(output)` to stop waiting and return `output`
/// - `result()` returns `None` to continue waiting for the next update
pub trait WaitResult {
    type Output;
    fn result(self) -> Option<Self::Output>;
}

// true = stop with (), false = keep waiting
impl WaitResult for bool {
    type Output = ();
    fn result(self) -> Option<Self::Output> { if self { Some(()) } else { None } }
}

impl<T> WaitResult for Option<T> {
    type Output = T;
    fn result(self) -> Option<Self::Output> { self }
}

impl<T: Clone + Send + Sync + 'static> Read<T> {
    /// Resolves once `predicate` accepts the current value
    pub async fn wait_for<F, R>(&self, predicate: F) -> R::Output
    where
        F: Fn(&T) -> R,
        R: WaitResult,
    {
        // listen before checking so an update between the check and the subscription is not lost
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let _guard = self.subscribe(move |_: T| {
            let _ = tx.send(());
        });

        loop {
            if let Some(output) = self.with(|value| predicate(value).result()) {
                return output;
            }
            if rx.recv().await.is_none() {
                // the listener lives as long as `_guard`, so the channel cannot close first
                tracing::warn!("wait_for: change channel closed unexpectedly");
                std::future::pending::<()>().await;
            }
        }
    }

    /// Resolves once the value equals `target`
    pub async fn wait_value(&self, target: T)
    where T: PartialEq {
        self.wait_for(move |value| *value == target).await
    }
}
