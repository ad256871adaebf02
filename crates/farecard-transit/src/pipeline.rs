//! Background read: authenticate, read, classify and reconcile off the
//! caller's thread
//!
//! [`ReadTask::spawn`] runs the whole pipeline on one worker thread and
//! reports through a channel. Cancelling makes the next transceive fail with
//! [`TransceiveError::Cancelled`], which ends the session; nothing read so far
//! is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use farecard_card::{Card, CardType, ReadObserver, Sector, SectorAccessor, TransceiveError, Transceiver};
use farecard_keys::KeyResolver;
use tracing::{debug, info, warn};

use crate::config::ReadConfig;
use crate::format::{guess_early, identify, CardFormat, CardIdentity, History};

/// Messages sent from the read worker
#[derive(Debug)]
pub enum ReadEvent {
    /// A sector finished
    Progress { current: usize, total: usize },
    /// The first sectors look like this format
    CardGuess { format: &'static str },
    /// The card was read; the history is present when the format is known
    Finished(Box<ReadOutcome>),
    /// The session was lost
    Failed { message: String },
    /// The read was cancelled and its partial result discarded
    Cancelled,
}

impl ReadEvent {
    /// Whether no further events follow
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReadEvent::Finished(_) | ReadEvent::Failed { .. } | ReadEvent::Cancelled
        )
    }
}

/// Everything a finished read produced
#[derive(Debug)]
pub struct ReadOutcome {
    pub card: Card,
    pub identity: CardIdentity<'static>,
    pub history: Option<History>,
}

/// Makes the wrapped transceiver refuse work once a flag is raised
pub struct CancellableTransceiver<T> {
    inner: T,
    cancelled: Arc<AtomicBool>,
}

impl<T: Transceiver> CancellableTransceiver<T> {
    pub fn new(inner: T, cancelled: Arc<AtomicBool>) -> Self {
        Self { inner, cancelled }
    }
}

impl<T: Transceiver> Transceiver for CancellableTransceiver<T> {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(TransceiveError::Cancelled);
        }
        self.inner.transceive(command)
    }
}

struct ChannelObserver<'a> {
    events: &'a Sender<ReadEvent>,
    formats: &'a [&'static CardFormat],
    guessed: bool,
}

impl ReadObserver for ChannelObserver<'_> {
    fn on_progress(&mut self, current: usize, total: usize) {
        let _ = self.events.send(ReadEvent::Progress { current, total });
    }

    fn on_sectors(&mut self, sectors: &[Sector]) {
        if self.guessed {
            return;
        }
        if let Some(format) = guess_early(sectors, self.formats) {
            self.guessed = true;
            let _ = self.events.send(ReadEvent::CardGuess {
                format: format.name,
            });
        }
    }
}

/// Handle to a read running on a worker thread
pub struct ReadTask {
    events: Receiver<ReadEvent>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReadTask {
    /// Start reading the card behind `transceiver`
    pub fn spawn<T, R>(
        transceiver: T,
        tag_id: Vec<u8>,
        card_type: CardType,
        resolver: R,
        formats: Vec<&'static CardFormat>,
        config: &ReadConfig,
    ) -> Self
    where
        T: Transceiver + Send + 'static,
        R: KeyResolver + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let options = config.access_options();
        let flag = Arc::clone(&cancelled);

        let worker = thread::spawn(move || {
            debug!("Read worker started");
            let mut transceiver = CancellableTransceiver::new(transceiver, flag);
            let mut observer = ChannelObserver {
                events: &event_tx,
                formats: &formats,
                guessed: false,
            };

            let result = SectorAccessor::new(&mut transceiver, &resolver, options).read_card(
                &tag_id,
                card_type,
                &mut observer,
            );

            let event = match result {
                Ok(_) if transceiver.cancelled.load(Ordering::SeqCst) => ReadEvent::Cancelled,
                Ok(card) => {
                    let identity = identify(&card, &formats);
                    let history = identity.format().map(|format| format.analyse(&card));
                    ReadEvent::Finished(Box::new(ReadOutcome {
                        card,
                        identity,
                        history,
                    }))
                }
                Err(e) if e.is_cancelled() => ReadEvent::Cancelled,
                Err(e) => {
                    warn!(error = %e, "Card read failed");
                    ReadEvent::Failed {
                        message: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
            debug!("Read worker stopped");
        });

        Self {
            events: event_rx,
            cancelled,
            worker: Some(worker),
        }
    }

    /// Next event, blocking; `None` once the worker is gone
    pub fn recv(&self) -> Option<ReadEvent> {
        self.events.recv().ok()
    }

    /// Next event, waiting at most `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ReadEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Block until the read ends and return its final event
    pub fn wait(mut self) -> ReadEvent {
        let last = loop {
            match self.events.recv() {
                Ok(event) if event.is_terminal() => break event,
                Ok(_) => continue,
                Err(_) => {
                    break ReadEvent::Failed {
                        message: "read worker exited unexpectedly".into(),
                    }
                }
            }
        };
        self.join();
        last
    }

    /// Stop the read and wait at most `timeout` for the worker to notice.
    ///
    /// Returns whether the worker wound down in time. Pending events,
    /// including any finished card, are discarded either way.
    pub fn cancel(mut self, timeout: Duration) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) if event.is_terminal() => break,
                Ok(_) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(?timeout, "Read worker did not stop in time");
                    return false;
                }
            }
        }

        self.join();
        info!("Read cancelled");
        true
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Read worker panicked");
            }
        }
    }
}
