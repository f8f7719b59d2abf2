// Heartbeat writer: appends a timestamp record on an absolute schedule
use aesd_buffer::SharedStore;
use aesd_core::Record;
use chrono::{DateTime, Local, TimeZone};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// RFC 2822 layout, e.g. `timestamp:Fri, 16 Oct 2026 12:00:00 +0000`
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

pub fn timestamp_record<Tz>(now: &DateTime<Tz>) -> Record
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    Record::new(format!("timestamp:{}\n", now.format(TIMESTAMP_FORMAT)).into_bytes())
}

pub struct Heartbeat {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn spawn(store: Arc<SharedStore>, period: Duration) -> io::Result<Self> {
        let (stop, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("aesd-heartbeat".to_string())
            .spawn(move || Self::run(store, period, stop_rx))?;
        Ok(Heartbeat { stop, handle })
    }

    fn run(store: Arc<SharedStore>, period: Duration, stop: Receiver<()>) {
        let mut next_wake = Instant::now() + period;
        loop {
            match stop.recv_deadline(next_wake) {
                Err(RecvTimeoutError::Timeout) => {}
                // stop requested or handle dropped
                _ => break,
            }

            let record = timestamp_record(&Local::now());
            debug!(%record, "heartbeat");
            if let Err(e) = store.commit(record) {
                error!("heartbeat stopped: {}", e);
                break;
            }
            next_wake += period;
        }
    }

    /// Wake the writer and wait for it to exit.
    pub fn stop(self) {
        let _ = self.stop.try_send(());
        if self.handle.join().is_err() {
            error!("heartbeat thread panicked");
        }
    }
}
