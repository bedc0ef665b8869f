use actor_protocol::{CalibrationError, CalibrationEvent};
use futures::stream::StreamExt;
use futures_channel::mpsc;

/// Actor trait for implementing message-driven components
///
/// Actors are independent, stateful components that communicate through
/// message passing. Each actor has its own message queue and processes
/// messages sequentially, which makes the actor the single writer of
/// whatever state it owns.
///
/// # Lifecycle
///
/// 1. **init()** - Called once before message processing starts
/// 2. **handle()** - Called for each received message
/// 3. **shutdown()** - Called when the actor is stopping
///
/// # Example
///
/// ```ignore
/// struct MyActor {
///     count: u32,
///     event_tx: mpsc::Sender<CalibrationEvent>,
/// }
///
/// impl Actor for MyActor {
///     type Message = MyMessage;
///
///     fn name(&self) -> &'static str {
///         "MyActor"
///     }
///
///     async fn handle(&mut self, msg: Self::Message) -> Result<(), CalibrationError> {
///         self.count += 1;
///         Ok(())
///     }
/// }
/// ```
#[allow(async_fn_in_trait)]
pub trait Actor: Send + 'static {
    /// Message type this actor processes
    type Message: Send + 'static;

    /// Actor name (used for logging and debugging)
    fn name(&self) -> &'static str;

    /// Initialize the actor before processing messages
    async fn init(&mut self) -> Result<(), CalibrationError> {
        Ok(())
    }

    /// Handle a single message
    async fn handle(&mut self, msg: Self::Message) -> Result<(), CalibrationError>;

    /// Clean up before shutdown
    async fn shutdown(&mut self) {}

    /// Main actor run loop (provided by runtime)
    ///
    /// Consumes the actor and runs it until every sender of `rx` is dropped.
    /// Errors returned by `handle()` are reported as `CalibrationEvent::Error`
    /// and processing continues with the next message.
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Self::Message>,
        event_tx: mpsc::Sender<CalibrationEvent>,
    ) where
        Self: Sized,
    {
        if let Err(e) = self.init().await {
            crate::actor_error!("{} init failed: {}", self.name(), e);
            let _ = event_tx.clone().try_send(CalibrationEvent::Error {
                message: format!("{} init failed: {}", self.name(), e),
            });
            return;
        }

        crate::actor_debug!("{} started", self.name());

        while let Some(msg) = rx.next().await {
            if let Err(e) = self.handle(msg).await {
                crate::actor_warn!("{} error: {}", self.name(), e);
                let _ = event_tx.clone().try_send(CalibrationEvent::Error {
                    message: format!("{} error: {}", self.name(), e),
                });
            }
        }

        self.shutdown().await;

        crate::actor_debug!("{} stopped", self.name());
    }
}
