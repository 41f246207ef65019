//! Drives one chat request through decode → classify → assemble.
//!
//! Each turn opens exactly one request and never retries. The observer sees
//! a snapshot after every change to the turn and then exactly one of
//! `on_error` / `on_complete`, unless the caller abandons the turn by
//! dropping its [`TurnHandle`], in which case it hears nothing further.
//!
//! Chunks are pulled one at a time and fully folded before the next read, so
//! memory stays at the decoder buffer plus one chunk.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use lexplain_core::ChatRequest;
use tracing::{debug, info, warn};

use crate::assembler::{MessageAssembler, TurnId, TurnSnapshot};
use crate::cancel::{CancellationToken, TurnHandle};
use crate::decoder::{Frame, FrameDecoder, TailPolicy};
use crate::error::TransportError;
use crate::event::classify;

/// Raw body chunks of a chat response, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Opens the chat stream endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `request` and return the response body as a chunk stream.
    /// Non-success statuses are errors here, before any chunk is read.
    async fn open_chat(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError>;
}

/// Receives the progress and end of one turn.
pub trait TurnObserver {
    fn on_progress(&mut self, turn: &TurnSnapshot);
    fn on_error(&mut self, turn: TurnId, error: TransportError);
    fn on_complete(&mut self, turn: TurnId);
}

/// Closure-based [`TurnObserver`].
pub struct Callbacks<P, E, C> {
    pub on_progress: P,
    pub on_error: E,
    pub on_complete: C,
}

impl<P, E, C> TurnObserver for Callbacks<P, E, C>
where
    P: FnMut(&TurnSnapshot),
    E: FnMut(TurnId, TransportError),
    C: FnMut(TurnId),
{
    fn on_progress(&mut self, turn: &TurnSnapshot) {
        (self.on_progress)(turn)
    }

    fn on_error(&mut self, turn: TurnId, error: TransportError) {
        (self.on_error)(turn, error)
    }

    fn on_complete(&mut self, turn: TurnId) {
        (self.on_complete)(turn)
    }
}

/// How a drive loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Body read to the end; the turn is settled.
    Completed(TurnSnapshot),
    /// Transport failed; carries the turn as it stood.
    Failed(TurnSnapshot),
    /// The handle was dropped or cancelled before the body ended.
    Abandoned,
}

/// Issues turn ids and drives turns against a [`ChatTransport`].
pub struct StreamOrchestrator<T> {
    transport: T,
    next_turn: AtomicU64,
    tail_policy: TailPolicy,
}

impl<T: ChatTransport> StreamOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_turn: AtomicU64::new(1),
            tail_policy: TailPolicy::default(),
        }
    }

    pub fn with_tail_policy(mut self, tail_policy: TailPolicy) -> Self {
        self.tail_policy = tail_policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start a turn. Keep the handle alive for as long as the results matter;
    /// call [`PendingTurn::drive`] to run it.
    pub fn start(&self, request: ChatRequest) -> (TurnHandle, PendingTurn<'_, T>) {
        let id = TurnId::new(self.next_turn.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        let turn = PendingTurn {
            id,
            token: token.clone(),
            request,
            transport: &self.transport,
            tail_policy: self.tail_policy,
        };
        (TurnHandle::new(id, token), turn)
    }

    /// Start and drive a turn, holding its handle until the body ends.
    pub async fn run<O>(&self, request: ChatRequest, observer: &mut O) -> TurnOutcome
    where
        O: TurnObserver + ?Sized,
    {
        let (handle, turn) = self.start(request);
        let outcome = turn.drive(observer).await;
        drop(handle);
        outcome
    }

    /// Drive one turn to the end and return its settled snapshot.
    pub async fn ask(&self, request: ChatRequest) -> Result<TurnSnapshot, TransportError> {
        let mut failure = LastError::default();
        match self.run(request, &mut failure).await {
            TurnOutcome::Completed(turn) => Ok(turn),
            TurnOutcome::Failed(_) => Err(failure
                .0
                .unwrap_or_else(|| TransportError::Aborted("turn failed".into()))),
            TurnOutcome::Abandoned => Err(TransportError::Aborted("turn abandoned".into())),
        }
    }
}

#[derive(Default)]
struct LastError(Option<TransportError>);

impl TurnObserver for LastError {
    fn on_progress(&mut self, _turn: &TurnSnapshot) {}

    fn on_error(&mut self, _turn: TurnId, error: TransportError) {
        self.0 = Some(error);
    }

    fn on_complete(&mut self, _turn: TurnId) {}
}

/// A started turn that has not been driven yet.
pub struct PendingTurn<'a, T> {
    id: TurnId,
    token: CancellationToken,
    request: ChatRequest,
    transport: &'a T,
    tail_policy: TailPolicy,
}

impl<T: ChatTransport> PendingTurn<'_, T> {
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Open the stream and fold it into a turn, reporting to `observer`.
    pub async fn drive<O>(self, observer: &mut O) -> TurnOutcome
    where
        O: TurnObserver + ?Sized,
    {
        let PendingTurn {
            id,
            token,
            request,
            transport,
            tail_policy,
        } = self;

        info!(turn = %id, model = %request.model, "opening chat stream");
        let opened = transport.open_chat(&request).await;
        if token.is_cancelled() {
            debug!(turn = %id, "turn abandoned before the stream opened");
            return TurnOutcome::Abandoned;
        }

        let mut assembler = MessageAssembler::new(id);
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(turn = %id, error = %error, "chat stream failed to open");
                observer.on_error(id, error);
                return TurnOutcome::Failed(assembler.into_snapshot());
            }
        };

        let mut decoder = FrameDecoder::with_tail_policy(tail_policy);
        while let Some(chunk) = chunks.next().await {
            if token.is_cancelled() {
                debug!(turn = %id, "turn abandoned; dropping chunk");
                return TurnOutcome::Abandoned;
            }
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(turn = %id, error = %error, "chat stream failed mid-body");
                    observer.on_error(id, error);
                    return TurnOutcome::Failed(assembler.into_snapshot());
                }
            };
            for frame in decoder.feed(&bytes) {
                if token.is_cancelled() {
                    debug!(turn = %id, "turn abandoned; dropping frame");
                    return TurnOutcome::Abandoned;
                }
                fold(&mut assembler, frame, observer);
            }
        }

        if token.is_cancelled() {
            debug!(turn = %id, "turn abandoned at end of body");
            return TurnOutcome::Abandoned;
        }
        for frame in decoder.flush() {
            if token.is_cancelled() {
                debug!(turn = %id, "turn abandoned; dropping tail frame");
                return TurnOutcome::Abandoned;
            }
            fold(&mut assembler, frame, observer);
        }
        if token.is_cancelled() {
            return TurnOutcome::Abandoned;
        }
        if assembler.close().is_changed() {
            observer.on_progress(assembler.snapshot());
        }

        let stats = decoder.stats();
        info!(
            turn = %id,
            state = %assembler.snapshot().state,
            frames = stats.frames,
            malformed = stats.malformed_lines,
            discarded_tail_bytes = stats.discarded_tail_bytes,
            "chat stream complete"
        );
        observer.on_complete(id);
        TurnOutcome::Completed(assembler.into_snapshot())
    }
}

fn fold<O>(assembler: &mut MessageAssembler, frame: Frame, observer: &mut O)
where
    O: TurnObserver + ?Sized,
{
    let event = classify(frame);
    debug!(turn = %assembler.snapshot().id, kind = event.kind(), "stream event");
    if assembler.apply(event).is_changed() {
        observer.on_progress(assembler.snapshot());
    }
}
