//! Pending request handles.
//!
//! A [`PendingRequest`] wraps one not-yet-run request. It is consumed by
//! exactly one of [`blocking`](PendingRequest::blocking),
//! [`spawn`](PendingRequest::spawn) or awaiting it, so its outcome is
//! delivered once: to the success side or to the error side, never both.

use chat_common::{ClientError, ClientResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::{Future, IntoFuture};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::signal::ShutdownSignal;

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
type ErrorCallback = Box<dyn FnOnce(ClientError) + Send + 'static>;

/// Cancels the request it was taken from
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: ShutdownSignal,
}

impl CancelHandle {
    /// Cancel the request; its error side receives [`ClientError::Cancelled`]
    pub fn cancel(&self) {
        self.signal.trigger();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_triggered()
    }
}

/// A request whose outcome is delivered exactly once.
///
/// Dropping the handle unconsumed drops the request: nothing is sent and no
/// callback runs.
///
/// ```compile_fail
/// #![deny(unused_must_use)]
/// fn queue(runtime: tokio::runtime::Handle) {
///     chat_rest::PendingRequest::ready(runtime, Ok(1u8));
/// }
/// ```
#[must_use = "a PendingRequest does nothing unless blocking(), spawn() or awaited"]
pub struct PendingRequest<T> {
    id: Uuid,
    task: BoxFuture<'static, ClientResult<T>>,
    runtime: Handle,
    cancel: ShutdownSignal,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T: Send + 'static> PendingRequest<T> {
    /// Wrap a request future that will run on `runtime`
    pub fn new<F>(runtime: Handle, task: F) -> Self
    where
        F: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let cancel = ShutdownSignal::new();
        let signal = cancel.clone();
        let task = async move {
            tokio::select! {
                biased;
                () = signal.wait() => Err(ClientError::Cancelled),
                result = task => result,
            }
        }
        .boxed();

        Self {
            id: Uuid::new_v4(),
            task,
            runtime,
            cancel,
            on_success: None,
            on_error: None,
        }
    }

    /// A request whose outcome is already known
    pub fn ready(runtime: Handle, result: ClientResult<T>) -> Self {
        Self::new(runtime, futures::future::ready(result))
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Set the success callback, replacing any previous one
    #[must_use]
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Set the error callback, replacing any previous one
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(ClientError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Handle that cancels this request from elsewhere
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            signal: self.cancel.clone(),
        }
    }

    /// Run on a runtime worker and return immediately.
    ///
    /// The registered callback matching the outcome runs on that worker.
    pub fn spawn(self) -> JoinHandle<()> {
        let Self {
            id,
            task,
            runtime,
            on_success,
            on_error,
            ..
        } = self;

        runtime.spawn(async move {
            match task.await {
                Ok(value) => {
                    if let Some(callback) = on_success {
                        callback(value);
                    }
                }
                Err(err) => deliver_error(id, err, on_error),
            }
        })
    }

    /// Await the outcome directly.
    ///
    /// The returned `Result` is the delivery; registered callbacks are not invoked.
    pub async fn result(self) -> ClientResult<T> {
        self.task.await
    }
}

impl<T: Clone + Send + 'static> PendingRequest<T> {
    /// Block the calling thread until the outcome is known.
    ///
    /// Returns the value (after passing a clone to the success callback) or
    /// `None` on error, in which case the error goes to the error callback.
    ///
    /// # Panics
    /// Panics if called from within an async execution context.
    pub fn blocking(self) -> Option<T> {
        let Self {
            id,
            task,
            runtime,
            on_success,
            on_error,
            ..
        } = self;

        let (tx, rx) = oneshot::channel();
        runtime.spawn(async move {
            let _ = tx.send(task.await);
        });

        // A dropped sender means the runtime shut down before the task finished
        let outcome = rx.blocking_recv().unwrap_or(Err(ClientError::Cancelled));
        match outcome {
            Ok(value) => {
                if let Some(callback) = on_success {
                    callback(value.clone());
                }
                Some(value)
            }
            Err(err) => {
                deliver_error(id, err, on_error);
                None
            }
        }
    }
}

fn deliver_error(id: Uuid, err: ClientError, on_error: Option<ErrorCallback>) {
    match on_error {
        Some(callback) => callback(err),
        None if err.is_cancelled() => {
            tracing::debug!(request_id = %id, "Request cancelled");
        }
        None => {
            tracing::warn!(request_id = %id, error = %err, "Request failed with no error callback");
        }
    }
}

impl<T: Send + 'static> IntoFuture for PendingRequest<T> {
    type Output = ClientResult<T>;
    type IntoFuture = BoxFuture<'static, ClientResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.task
    }
}

impl<T> fmt::Debug for PendingRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("has_success_callback", &self.on_success.is_some())
            .field("has_error_callback", &self.on_error.is_some())
            .finish()
    }
}
