//! The receive-PDO streamer: a worker thread that pulls samples from a lazy
//! source and transmits them at a target frequency.

use crate::{node::RxPdo, pdo::SampleSource};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Owns one configured receive PDO and the thread that feeds it.
///
/// Samples are consumed strictly in source order, one per period, with no
/// batching. Pacing is best effort: a worker that cannot keep up slips
/// rather than bursting. A source that runs dry ends the stream cleanly.
pub(crate) struct Streamer {
    number: u8,
    pdo: Arc<spin::Mutex<Box<dyn RxPdo>>>,
    source: Arc<spin::Mutex<SampleSource>>,
    period: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Streamer {
    pub(crate) fn new(number: u8, pdo: Box<dyn RxPdo>, source: SampleSource, frequency: f64) -> Self {
        let period = if frequency > 0.0 {
            Duration::from_secs_f64(1.0 / frequency)
        } else {
            Duration::ZERO
        };

        Self {
            number,
            pdo: Arc::new(spin::Mutex::new(pdo)),
            source: Arc::new(spin::Mutex::new(source)),
            period,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// The shared PDO handle, for reconfiguration once the worker is
    /// stopped.
    pub(crate) fn pdo(&self) -> Arc<spin::Mutex<Box<dyn RxPdo>>> {
        Arc::clone(&self.pdo)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the worker. Restarts get a fresh stream from the source.
    pub(crate) fn start(&mut self) {
        if self.handle.is_some() {
            log::warn!("RPDO {} streamer already running", self.number);
            return;
        }

        self.running.store(true, Ordering::Release);

        let number = self.number;
        let pdo = Arc::clone(&self.pdo);
        let source = Arc::clone(&self.source);
        let running = Arc::clone(&self.running);
        let period = self.period;

        self.handle = Some(thread::spawn(move || {
            run(number, pdo, source, running, period);
        }));
    }

    /// Cooperative stop: clear the running flag and join the worker. The
    /// worker observes the flag between samples, so worst-case latency is
    /// one period plus one transmission.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("RPDO {} streamer thread panicked", self.number);
            }
        }
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    number: u8,
    pdo: Arc<spin::Mutex<Box<dyn RxPdo>>>,
    source: Arc<spin::Mutex<SampleSource>>,
    running: Arc<AtomicBool>,
    period: Duration,
) {
    log::debug!("RPDO {} stream started", number);

    let mut samples = {
        let mut factory = source.lock();

        (*factory)()
    };

    loop {
        // Pull before checking the flag; a stop() racing with this pull
        // costs at most the one sample in hand.
        let Some(sample) = samples.next() else {
            log::debug!("RPDO {} sample source exhausted", number);
            break;
        };

        if !running.load(Ordering::Acquire) {
            break;
        }

        {
            let mut pdo = pdo.lock();
            let mut sent = Ok(());

            for (entry, value) in sample.iter().enumerate() {
                sent = pdo.write(entry, *value);

                if sent.is_err() {
                    break;
                }
            }

            // Transport failures end the stream; they never cascade into a
            // state change.
            if let Err(e) = sent.and_then(|()| pdo.transmit()) {
                log::error!("RPDO {} stream aborted: {}", number, e);
                break;
            }
        }

        thread::sleep(period);
    }

    running.store(false, Ordering::Release);

    log::debug!("RPDO {} stream stopped", number);
}
