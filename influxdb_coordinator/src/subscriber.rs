use std::{fmt::Debug, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::WritePointsRequest;

/// The sending half of a subscriber pipeline.
pub type SubscriberSender = mpsc::Sender<Arc<WritePointsRequest>>;

/// A pipeline mirroring every write to interested subscribers.
///
/// The writer only ever performs non-blocking sends into the channel returned by
/// [`Subscriber::points()`]. A full channel drops the request.
pub trait Subscriber: Debug + Send + Sync + 'static {
    fn points(&self) -> SubscriberSender;
}

impl Subscriber for SubscriberSender {
    fn points(&self) -> SubscriberSender {
        self.clone()
    }
}

#[derive(Debug)]
struct State {
    closing: CancellationToken,
    sub_points: Option<SubscriberSender>,
}

/// The open/closed state of a writer: the close signal observed by in-flight writes, and the
/// subscriber channel attached while open.
///
/// Writes take the read lock to sample the channel; [`Lifecycle::open()`] and
/// [`Lifecycle::close()`] take the write lock to swap it.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: RwLock<State>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: RwLock::new(State {
                closing: CancellationToken::new(),
                sub_points: None,
            }),
        }
    }
}

impl Lifecycle {
    /// Reset the close signal and attach `subscriber`, if any.
    pub(crate) fn open(&self, subscriber: Option<&dyn Subscriber>) {
        let mut state = self.state.write();
        state.closing = CancellationToken::new();
        state.sub_points = subscriber.map(|s| s.points());
    }

    /// Wake every in-flight write waiting on the close signal and detach the subscriber.
    pub(crate) fn close(&self) {
        let mut state = self.state.write();
        state.closing.cancel();
        state.sub_points = None;
    }

    /// A handle on the current close signal.
    pub(crate) fn closing(&self) -> CancellationToken {
        self.state.read().closing.clone()
    }

    /// Attempt to hand `req` to the attached subscriber without waiting.
    ///
    /// Returns false if no subscriber is attached or its channel has no capacity.
    pub(crate) fn try_publish(&self, req: Arc<WritePointsRequest>) -> bool {
        self.state
            .read()
            .sub_points
            .as_ref()
            .is_some_and(|tx| tx.try_send(req).is_ok())
    }
}
