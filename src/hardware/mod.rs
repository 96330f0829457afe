//! Hardware interrupt bridge: the kit-box lid sensor.
//!
//! The GPIO driver lives outside this crate; a platform task polls the reed
//! switch and feeds raw readings into [`ReedDebouncer`], which confirms an
//! edge only after a run of identical readings.  Confirmed edges become
//! [`BoxEvent`]s on the session loop's priority channel:
//!
//! * `Opened` while idle starts a session, same as the wake word.
//! * `Closed` from any state forces an immediate reset, preempting any
//!   in-flight transcription or generation.

// ---------------------------------------------------------------------------
// BoxEvent
// ---------------------------------------------------------------------------

/// A debounced lid edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEvent {
    Opened,
    Closed,
}

// ---------------------------------------------------------------------------
// ReedDebouncer
// ---------------------------------------------------------------------------

/// Confirms lid edges from noisy reed-switch readings.
///
/// A raw reading differing from the confirmed state starts a candidate run;
/// the edge is emitted only after `confirm_count` consecutive identical
/// readings.  A single reading back at the confirmed state aborts the run,
/// so contact bounce never produces an event.
pub struct ReedDebouncer {
    confirm_count: usize,
    /// Last confirmed state; `true` = open.
    confirmed_open: bool,
    /// Consecutive readings that disagree with the confirmed state.
    candidate_run: usize,
}

impl ReedDebouncer {
    /// `initially_open` is the state read once at startup; no event fires
    /// for it.
    pub fn new(confirm_count: usize, initially_open: bool) -> Self {
        Self {
            confirm_count: confirm_count.max(1),
            confirmed_open: initially_open,
            candidate_run: 0,
        }
    }

    /// Last confirmed state.
    pub fn is_open(&self) -> bool {
        self.confirmed_open
    }

    /// Feed one raw reading; returns a confirmed edge when one occurs.
    pub fn observe(&mut self, raw_open: bool) -> Option<BoxEvent> {
        if raw_open == self.confirmed_open {
            self.candidate_run = 0;
            return None;
        }

        self.candidate_run += 1;
        if self.candidate_run < self.confirm_count {
            return None;
        }

        self.confirmed_open = raw_open;
        self.candidate_run = 0;
        let event = if raw_open {
            BoxEvent::Opened
        } else {
            BoxEvent::Closed
        };
        log::info!("lid sensor: {event:?}");
        Some(event)
    }
}

// ---------------------------------------------------------------------------
// Sensor polling loop
// ---------------------------------------------------------------------------

/// Poll `read` at the configured interval, debounce the readings, and
/// forward confirmed edges to the session loop's interrupt channel.
///
/// `read` returning `None` (sensor unreadable) skips the tick.  The first
/// successful reading establishes the initial state without an event.
/// Runs until the channel closes.
pub async fn run_sensor_loop(
    config: crate::config::HardwareConfig,
    mut read: impl FnMut() -> Option<bool>,
    tx: tokio::sync::mpsc::Sender<BoxEvent>,
) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_millis(config.poll_interval_ms.max(10)));

    // Establish the initial state before debouncing edges.
    let initial = loop {
        interval.tick().await;
        if let Some(open) = read() {
            break open;
        }
    };
    log::info!("lid sensor ready (initially {})", if initial { "open" } else { "closed" });
    let mut debouncer = ReedDebouncer::new(config.confirm_count, initial);

    loop {
        interval.tick().await;
        let Some(raw) = read() else { continue };
        if let Some(event) = debouncer.observe(raw) {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Read a sysfs GPIO value file; `"1"` means the lid is open.
pub fn read_sysfs_gpio(path: &std::path::Path) -> Option<bool> {
    match std::fs::read_to_string(path) {
        Ok(value) => Some(value.trim() == "1"),
        Err(err) => {
            log::debug!("lid sensor read failed: {err}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
