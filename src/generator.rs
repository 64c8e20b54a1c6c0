//! Suspend/resume driver for the secure-channel exchanges.
//!
//! The establishment flows are written as linear `async` functions with one
//! await point per network call. A [`Generator`] steps such a flow from the
//! outside: every [`YieldPoint::suspend`] hands the pending [`RpcRequest`]
//! to the caller, and [`Generator::resume`] feeds the transport's reply back
//! in. At most one request is outstanding at a time, and dropping the
//! generator abandons the exchange: a reply arriving after the drop has
//! nothing left to resume.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use crate::flags::NegotiateFlags;
use crate::rpc::{RpcRequest, RpcResponse, Transport};
use crate::Result;

type PendingRequest = Arc<Mutex<Option<RpcRequest>>>;
type TransportReply = Arc<Mutex<Option<Result<RpcResponse>>>>;
type PinnedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by [`YieldPoint::suspend`]. Parks the request for the
/// generator to pick up, then completes with the reply on the next step.
pub struct Interrupt {
    request: Option<RpcRequest>,
    pending: PendingRequest,
    reply: TransportReply,
    ready_to_resume: bool,
}

impl Future for Interrupt {
    type Output = Result<RpcResponse>;

    fn poll(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.ready_to_resume {
            // The slots are only ever touched between polls, from the single
            // thread stepping the generator.
            let reply = this.reply.try_lock().unwrap().take().unwrap();
            Poll::Ready(reply)
        } else {
            let request = this.request.take().unwrap();
            *this.pending.try_lock().unwrap() = Some(request);
            this.ready_to_resume = true;
            Poll::Pending
        }
    }
}

/// Handle the exchange coroutines suspend themselves on.
#[derive(Debug)]
pub struct YieldPoint {
    pending: PendingRequest,
    reply: TransportReply,
}

impl YieldPoint {
    /// Hands `request` out and suspends until the transport's reply is fed
    /// back via [`Generator::resume`].
    pub(crate) fn suspend(&mut self, request: RpcRequest) -> Interrupt {
        Interrupt {
            request: Some(request),
            pending: Arc::clone(&self.pending),
            reply: Arc::clone(&self.reply),
            ready_to_resume: false,
        }
    }
}

pub enum GeneratorState<T> {
    /// The exchange wants this request executed.
    Suspended(RpcRequest),
    Completed(Result<T>),
}

/// A suspendable secure-channel exchange.
///
/// This is the "handle" returned by the initiators: call [`start`], execute
/// each yielded request, [`resume`] with the reply, and collect the final
/// result from [`GeneratorState::Completed`]. Dropping the generator cancels
/// the exchange and releases everything it owns, including the session
/// chain on not-yet-successful sessions.
///
/// [`start`]: Generator::start
/// [`resume`]: Generator::resume
pub struct Generator<'a, T> {
    pending: PendingRequest,
    reply: TransportReply,
    task: PinnedFuture<'a, Result<T>>,
}

impl<'a, T> Generator<'a, T>
where
    T: Send + 'a,
{
    pub(crate) fn new<Producer, Task>(producer: Producer) -> Self
    where
        Producer: FnOnce(YieldPoint) -> Task,
        Task: Future<Output = Result<T>> + Send + 'a,
    {
        let pending = Arc::new(Mutex::new(None));
        let reply = Arc::new(Mutex::new(None));

        let yield_point = YieldPoint {
            pending: Arc::clone(&pending),
            reply: Arc::clone(&reply),
        };

        Self {
            pending,
            reply,
            task: Box::pin(producer(yield_point)),
        }
    }

    pub fn start(&mut self) -> GeneratorState<T> {
        self.step()
    }

    pub fn resume(&mut self, reply: Result<RpcResponse>) -> GeneratorState<T> {
        *self.reply.try_lock().unwrap() = Some(reply);
        self.step()
    }

    fn step(&mut self) -> GeneratorState<T> {
        match poll_once(&mut self.task) {
            None => {
                let request = self.pending.try_lock().unwrap().take().unwrap();
                GeneratorState::Suspended(request)
            }
            Some(result) => GeneratorState::Completed(result),
        }
    }

    /// Drives the exchange to completion against a synchronous transport.
    pub fn resolve_with_transport(&mut self, transport: &mut dyn Transport) -> Result<T> {
        let mut state = self.start();
        loop {
            match state {
                GeneratorState::Suspended(request) => {
                    state = self.resume(transport.send(request));
                }
                GeneratorState::Completed(result) => {
                    return result;
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Generator<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator").field("pending", &self.pending).finish()
    }
}

fn poll_once<T>(task: &mut PinnedFuture<'_, T>) -> Option<T> {
    struct NoopWake;

    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {
            // nothing to wake: the generator is stepped manually
        }
    }

    let waker = Waker::from(Arc::new(NoopWake));
    let mut context = Context::from_waker(&waker);

    match task.as_mut().poll(&mut context) {
        Poll::Pending => None,
        Poll::Ready(value) => Some(value),
    }
}

/// Exchange establishing the session chain; completes with the chain and the
/// flags requested for the session.
pub type KeyExchangeGenerator<'a, C> = Generator<'a, (C, NegotiateFlags)>;

/// Exchange performing the full authenticated bind; completes with the
/// established chain.
pub type SecureBindGenerator<'a, C> = Generator<'a, C>;
