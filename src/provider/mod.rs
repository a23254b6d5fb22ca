//! Provider Request Queue - the page-side client of the dispatcher.
//!
//! ```text
//!  connect / request_*  ──► validate ──► FIFO ──► post head ──► await answer
//!                                         ▲                         │
//!                                         └──── settle delay ◄──────┘
//!
//!  get_balance / disconnect / status  ──► post now ──► first matching answer
//! ```
//!
//! At most one popup request is posted at a time, so the approval popup only
//! ever stands for a single pending decision. Answers are matched on response
//! type and on the page's own origin; anything else is ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::VaultResult;
use crate::protocol::{parse_data, MessageRequest, MessageType, PaymentRequest, PsbtRequest, TxStatusRequest};
use crate::ui::TabMessage;

/// Time the approval popup gets to close before the next request is posted.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid data")]
    InvalidData,
    #[error("{0}")]
    Rejected(String),
    #[error("provider closed")]
    Closed,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Message a page posts toward its content script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The page's window, as far as the provider is concerned.
#[async_trait]
pub trait PageChannel: Send + Sync {
    async fn post(&self, message: PageMessage) -> VaultResult<()>;
}

type SuccessFn = Box<dyn FnOnce(&Value) + Send>;
type ErrorFn = Box<dyn FnOnce(&ProviderError) + Send>;

/// Optional callbacks run alongside the returned result.
#[derive(Default)]
pub struct Callbacks {
    pub on_success: Option<SuccessFn>,
    pub on_error: Option<ErrorFn>,
}

impl Callbacks {
    pub fn none() -> Self { Self::default() }

    pub fn on_success(mut self, f: impl FnOnce(&Value) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&ProviderError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

struct Pending {
    request_type: MessageType,
    response_type: MessageType,
    data: Option<Value>,
    callbacks: Callbacks,
    reply: oneshot::Sender<ProviderResult<Value>>,
}

impl Pending {
    fn settle(self, result: ProviderResult<Value>) {
        match &result {
            Ok(value) => {
                if let Some(f) = self.callbacks.on_success {
                    f(value);
                }
            }
            Err(err) => {
                if let Some(f) = self.callbacks.on_error {
                    f(err);
                }
            }
        }
        let _ = self.reply.send(result);
    }

    fn matches(&self, message: &TabMessage, origin: &str) -> bool {
        message.origin == origin && message.kind == self.response_type.as_str()
    }
}

fn answer_of(message: TabMessage) -> ProviderResult<Value> {
    match (message.error, message.data) {
        (Some(error), _) if !error.is_empty() => Err(ProviderError::Rejected(error)),
        (_, Some(data)) if !data.is_null() => Ok(data),
        _ => Err(ProviderError::Rejected("Empty response".into())),
    }
}

enum Event {
    Enqueue(Pending),
    Direct(Pending),
    Inbound(TabMessage),
}

enum QueueState {
    Idle,
    Dispatched(Pending),
    Settling(Instant),
}

struct Runner {
    origin: String,
    channel: Arc<dyn PageChannel>,
    settle_delay: Duration,
    queue: VecDeque<Pending>,
    state: QueueState,
    direct: Vec<Pending>,
}

impl Runner {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        loop {
            let settle_at = match self.state {
                QueueState::Settling(at) => Some(at),
                _ => None,
            };
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = tokio::time::sleep_until(settle_at.unwrap_or_else(Instant::now)), if settle_at.is_some() => {
                    self.state = QueueState::Idle;
                    self.post_next().await;
                }
            }
        }
        if let QueueState::Dispatched(head) = std::mem::replace(&mut self.state, QueueState::Idle) {
            head.settle(Err(ProviderError::Closed));
        }
        for pending in self.queue.drain(..).chain(self.direct.drain(..)) {
            pending.settle(Err(ProviderError::Closed));
        }
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Enqueue(pending) => {
                self.queue.push_back(pending);
                if matches!(self.state, QueueState::Idle) {
                    self.post_next().await;
                }
            }
            Event::Direct(pending) => {
                let message = PageMessage { kind: pending.request_type, data: pending.data.clone() };
                match self.channel.post(message).await {
                    Ok(()) => self.direct.push(pending),
                    Err(err) => pending.settle(Err(ProviderError::Rejected(err.public_message()))),
                }
            }
            Event::Inbound(message) => self.inbound(message),
        }
    }

    fn inbound(&mut self, message: TabMessage) {
        if let QueueState::Dispatched(head) = &self.state {
            if head.matches(&message, &self.origin) {
                let state = std::mem::replace(&mut self.state, QueueState::Settling(Instant::now() + self.settle_delay));
                if let QueueState::Dispatched(head) = state {
                    tracing::debug!(kind = %head.request_type, "popup request answered");
                    head.settle(answer_of(message));
                }
                return;
            }
        }
        if let Some(pos) = self.direct.iter().position(|p| p.matches(&message, &self.origin)) {
            self.direct.remove(pos).settle(answer_of(message));
        }
    }

    /// Post the queue head, skipping requests whose post fails.
    async fn post_next(&mut self) {
        while let Some(pending) = self.queue.pop_front() {
            let message = PageMessage { kind: pending.request_type, data: pending.data.clone() };
            match self.channel.post(message).await {
                Ok(()) => {
                    self.state = QueueState::Dispatched(pending);
                    return;
                }
                Err(err) => pending.settle(Err(ProviderError::Rejected(err.public_message()))),
            }
        }
        self.state = QueueState::Idle;
    }
}

/// Handle to a page's request queue. Cloning shares the queue.
#[derive(Clone)]
pub struct Provider {
    events: mpsc::UnboundedSender<Event>,
}

impl Provider {
    /// Start the queue for a page at `origin`. Must be called inside a tokio runtime.
    pub fn spawn(origin: impl Into<String>, channel: Arc<dyn PageChannel>) -> Self {
        Self::spawn_with_settle_delay(origin, channel, DEFAULT_SETTLE_DELAY)
    }

    pub fn spawn_with_settle_delay(
        origin: impl Into<String>,
        channel: Arc<dyn PageChannel>,
        settle_delay: Duration,
    ) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let runner = Runner {
            origin: origin.into(),
            channel,
            settle_delay,
            queue: VecDeque::new(),
            state: QueueState::Idle,
            direct: Vec::new(),
        };
        tokio::spawn(runner.run(rx));
        Self { events }
    }

    /// Hand the provider a message the content script posted to the window.
    pub fn deliver(&self, message: TabMessage) {
        if self.events.send(Event::Inbound(message)).is_err() {
            tracing::debug!("provider closed, inbound message dropped");
        }
    }

    async fn submit(
        &self,
        request_type: MessageType,
        data: Option<Value>,
        callbacks: Callbacks,
        queued: bool,
    ) -> ProviderResult<Value> {
        let Some(response_type) = request_type.response_type() else {
            return Err(ProviderError::InvalidData);
        };
        let (reply, rx) = oneshot::channel();
        let pending = Pending { request_type, response_type, data, callbacks, reply };
        let event = if queued { Event::Enqueue(pending) } else { Event::Direct(pending) };
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            if let Event::Enqueue(pending) | Event::Direct(pending) = event {
                pending.settle(Err(ProviderError::Closed));
            }
            return Err(ProviderError::Closed);
        }
        rx.await.unwrap_or(Err(ProviderError::Closed))
    }

    fn invalid(callbacks: Callbacks) -> ProviderResult<Value> {
        if let Some(f) = callbacks.on_error {
            f(&ProviderError::InvalidData);
        }
        Err(ProviderError::InvalidData)
    }

    pub async fn connect(&self, callbacks: Callbacks) -> ProviderResult<Value> {
        self.submit(MessageType::ClientRequestConnection, None, callbacks, true).await
    }

    pub async fn get_balance(&self, callbacks: Callbacks) -> ProviderResult<Value> {
        self.submit(MessageType::ClientRequestBalance, None, callbacks, false).await
    }

    /// `data` carries `recipientAddress` and `pepeAmount`.
    pub async fn request_transaction(&self, data: Value, callbacks: Callbacks) -> ProviderResult<Value> {
        let valid = parse_data::<PaymentRequest>(&data).and_then(|p| p.validate()).is_ok();
        if !valid {
            return Self::invalid(callbacks);
        }
        self.submit(MessageType::ClientRequestTransaction, Some(data), callbacks, true).await
    }

    /// `data` carries `rawTx`, `indexes` and optionally `signOnly`, `partial`, `sighashType`.
    pub async fn request_psbt(&self, data: Value, callbacks: Callbacks) -> ProviderResult<Value> {
        let valid = parse_data::<PsbtRequest>(&data).and_then(|p| p.validate()).is_ok();
        if !valid {
            return Self::invalid(callbacks);
        }
        self.submit(MessageType::ClientRequestPsbt, Some(data), callbacks, true).await
    }

    pub async fn request_signed_message(&self, data: Value, callbacks: Callbacks) -> ProviderResult<Value> {
        let valid = parse_data::<MessageRequest>(&data).and_then(|m| m.validate()).is_ok();
        if !valid {
            return Self::invalid(callbacks);
        }
        self.submit(MessageType::ClientRequestSignedMessage, Some(data), callbacks, true).await
    }

    pub async fn request_decrypted_message(&self, data: Value, callbacks: Callbacks) -> ProviderResult<Value> {
        let valid = parse_data::<MessageRequest>(&data).and_then(|m| m.validate()).is_ok();
        if !valid {
            return Self::invalid(callbacks);
        }
        self.submit(MessageType::ClientRequestDecryptedMessage, Some(data), callbacks, true).await
    }

    pub async fn disconnect(&self, callbacks: Callbacks) -> ProviderResult<Value> {
        self.submit(MessageType::ClientDisconnect, None, callbacks, false).await
    }

    pub async fn get_connection_status(&self, callbacks: Callbacks) -> ProviderResult<Value> {
        self.submit(MessageType::ClientConnectionStatus, None, callbacks, false).await
    }

    pub async fn get_transaction_status(&self, data: Value, callbacks: Callbacks) -> ProviderResult<Value> {
        let valid = parse_data::<TxStatusRequest>(&data).and_then(|t| t.validate()).is_ok();
        if !valid {
            return Self::invalid(callbacks);
        }
        self.submit(MessageType::ClientTransactionStatus, Some(data), callbacks, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        posted: Mutex<Vec<PageMessage>>,
    }

    #[async_trait]
    impl PageChannel for Recorder {
        async fn post(&self, message: PageMessage) -> VaultResult<()> {
            self.posted.lock().unwrap().push(message);
            Ok(())
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<MessageType> {
            self.posted.lock().unwrap().iter().map(|m| m.kind).collect()
        }
    }

    fn answer(kind: MessageType, origin: &str, data: Value) -> TabMessage {
        TabMessage { kind: kind.as_str(), data: Some(data), error: None, origin: origin.into() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_data_is_not_posted() {
        let page = Arc::new(Recorder::default());
        let provider = Provider::spawn("https://shop.example", page.clone());

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let err = provider
            .request_transaction(
                json!({"recipientAddress": "Pabc"}),
                Callbacks::none().on_error(move |e| *sink.lock().unwrap() = Some(e.clone())),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::InvalidData);
        assert_eq!(err.to_string(), "Invalid data");
        assert_eq!(seen.lock().unwrap().clone(), Some(ProviderError::InvalidData));

        tokio::task::yield_now().await;
        assert!(page.kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_origin_is_ignored() {
        let page = Arc::new(Recorder::default());
        let provider = Provider::spawn("https://shop.example", page.clone());

        let call = tokio::spawn({
            let provider = provider.clone();
            async move { provider.get_connection_status(Callbacks::none()).await }
        });
        tokio::task::yield_now().await;

        let kind = MessageType::ClientConnectionStatusResponse;
        provider.deliver(answer(kind, "https://evil.example", json!({"connected": true})));
        provider.deliver(answer(kind, "https://shop.example", json!({"connected": false})));
        let status = call.await.unwrap().unwrap();
        assert_eq!(status["connected"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_and_empty_answers_reject() {
        let page = Arc::new(Recorder::default());
        let provider = Provider::spawn("o", page.clone());

        let call = tokio::spawn({
            let provider = provider.clone();
            async move { provider.get_balance(Callbacks::none()).await }
        });
        tokio::task::yield_now().await;
        provider.deliver(TabMessage {
            kind: MessageType::ClientGetBalanceResponse.as_str(),
            data: None,
            error: Some("Authentication failed".into()),
            origin: "o".into(),
        });
        assert_eq!(call.await.unwrap(), Err(ProviderError::Rejected("Authentication failed".into())));

        let call = tokio::spawn({
            let provider = provider.clone();
            async move { provider.disconnect(Callbacks::none()).await }
        });
        tokio::task::yield_now().await;
        provider.deliver(TabMessage {
            kind: MessageType::ClientDisconnectResponse.as_str(),
            data: None,
            error: None,
            origin: "o".into(),
        });
        assert_eq!(call.await.unwrap(), Err(ProviderError::Rejected("Empty response".into())));
    }
}
