//! Per-device output scheduling.
//!
//! Sessions never talk to the device directly for rumble and LED traffic;
//! they queue encoded reports in their [`OutputQueue`] and the registry pumps
//! one [`OutputScheduler`] per device every poll cycle. The scheduler keeps at
//! most one report in flight: a transmitted report occupies the link for a
//! completion window sized to the transport, and the single pending slot means
//! a burst of requests collapses to the newest one (last write wins).

use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use openpad_hid_common::{HidDeviceInfo, HidDeviceIo};
use openpad_joystick_core::{OutputKind, OutputQueue};

/// How long a transmitted report occupies the link on a wired transport.
pub const COMPLETION_WINDOW_USB: Duration = Duration::from_millis(10);
/// Bluetooth needs more slack between reports.
pub const COMPLETION_WINDOW_BLUETOOTH: Duration = Duration::from_millis(30);

const DRAIN_ATTEMPTS: usize = 3;
const DRAIN_WAIT: Duration = Duration::from_millis(10);

/// Single-flight transmitter for one device's output reports.
pub struct OutputScheduler {
    window: Duration,
    busy_until: Option<Instant>,
    completions_tx: Sender<Instant>,
    completions_rx: Receiver<Instant>,
    transmitted: u64,
    failed: u64,
}

impl OutputScheduler {
    pub fn new(window: Duration) -> Self {
        let (completions_tx, completions_rx) = channel::bounded(4);
        Self {
            window,
            busy_until: None,
            completions_tx,
            completions_rx,
            transmitted: 0,
            failed: 0,
        }
    }

    /// Scheduler with the completion window matching the device's transport.
    pub fn for_device(info: &HidDeviceInfo) -> Self {
        let window = if info.is_bluetooth() {
            COMPLETION_WINDOW_BLUETOOTH
        } else {
            COMPLETION_WINDOW_USB
        };
        Self::new(window)
    }

    /// Whether a transmitted report is still inside its completion window.
    pub fn in_flight(&self) -> bool {
        self.busy_until.is_some()
    }

    /// Reports handed to the transport so far.
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    /// Transmissions the transport refused.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// One scheduling step, called every poll cycle with the device lock held.
    ///
    /// Completes an in-flight report whose window has elapsed, then transmits
    /// the queued request if the link is idle. A transport failure drops the
    /// request; rumble and LED state is refreshed by later traffic, so a lost
    /// report is logged rather than retried.
    pub fn pump(&mut self, now: Instant, queue: &mut OutputQueue, io: &mut dyn HidDeviceIo) {
        if let Some(deadline) = self.busy_until {
            if now < deadline {
                return;
            }
            self.busy_until = None;
            let _ = self.completions_tx.try_send(now);
        }

        let Some(request) = queue.take() else {
            return;
        };
        let outcome = match request.kind {
            OutputKind::Output => io.write_report(&request.data).map(|_| ()),
            OutputKind::Feature => io.send_feature_report(&request.data),
        };
        match outcome {
            Ok(()) => {
                self.transmitted = self.transmitted.saturating_add(1);
                self.busy_until = Some(now + self.window);
            }
            Err(err) => {
                self.failed = self.failed.saturating_add(1);
                debug!(error = %err, len = request.data.len(), "output transmit failed");
            }
        }
    }

    /// Bounded wait for outstanding traffic during teardown.
    ///
    /// Pumps until the link is idle with nothing queued, sleeping on the
    /// completion channel between attempts. Gives up after a few waits and
    /// clears whatever is left; returns whether the device went quiet.
    pub fn drain(&mut self, queue: &mut OutputQueue, io: &mut dyn HidDeviceIo) -> bool {
        for _ in 0..DRAIN_ATTEMPTS {
            self.pump(Instant::now(), queue, io);
            if self.busy_until.is_none() && !queue.has_pending() {
                return true;
            }
            match self.completions_rx.recv_timeout(DRAIN_WAIT) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.pump(Instant::now(), queue, io);
        let quiet = self.busy_until.is_none() && !queue.has_pending();
        if !quiet {
            debug!("abandoning in-flight output at teardown");
            queue.clear();
            self.busy_until = None;
        }
        quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpad_hid_common::BusType;
    use openpad_hid_common::io::mock::MockDeviceHandle;
    use openpad_joystick_core::OutputRequest;

    fn handle(bus_type: BusType) -> MockDeviceHandle {
        MockDeviceHandle::new(
            HidDeviceInfo::new(0x2dc8, 0x6012, "/mock/out0").with_bus_type(bus_type),
        )
    }

    #[test]
    fn test_pump_transmits_by_request_kind() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::for_device(handle.info());
        let now = Instant::now();

        queue.request(OutputRequest::output(vec![0x05, 0x01]));
        scheduler.pump(now, &mut queue, &mut io);
        assert_eq!(handle.get_write_history(), vec![vec![0x05, 0x01]]);
        assert!(scheduler.in_flight());
        assert_eq!(scheduler.transmitted(), 1);

        queue.request(OutputRequest::feature(vec![0x09, 0x02]));
        scheduler.pump(now + COMPLETION_WINDOW_USB, &mut queue, &mut io);
        assert_eq!(handle.get_feature_history(), vec![vec![0x09, 0x02]]);
        assert_eq!(scheduler.transmitted(), 2);
    }

    #[test]
    fn test_single_flight_blocks_until_window_elapses() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::new(COMPLETION_WINDOW_USB);
        let now = Instant::now();

        queue.request(OutputRequest::output(vec![0x01]));
        scheduler.pump(now, &mut queue, &mut io);
        queue.request(OutputRequest::output(vec![0x02]));

        // Inside the window nothing moves; the request stays queued.
        scheduler.pump(now + Duration::from_millis(5), &mut queue, &mut io);
        assert_eq!(handle.get_write_history().len(), 1);
        assert!(queue.has_pending());

        scheduler.pump(now + COMPLETION_WINDOW_USB, &mut queue, &mut io);
        assert_eq!(
            handle.get_write_history(),
            vec![vec![0x01], vec![0x02]],
            "second report goes out once the window elapses"
        );
    }

    #[test]
    fn test_burst_collapses_to_newest_request() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::new(COMPLETION_WINDOW_USB);

        queue.request(OutputRequest::output(vec![0xAA, 0x01]));
        queue.request(OutputRequest::output(vec![0xAA, 0x02]));
        queue.request(OutputRequest::output(vec![0xAA, 0x03]));
        scheduler.pump(Instant::now(), &mut queue, &mut io);

        assert_eq!(handle.get_write_history(), vec![vec![0xAA, 0x03]]);
        assert_eq!(queue.overwritten(), 2);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_bluetooth_window_is_wider() {
        let handle = handle(BusType::Bluetooth);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::for_device(handle.info());
        let now = Instant::now();

        queue.request(OutputRequest::output(vec![0x01]));
        scheduler.pump(now, &mut queue, &mut io);
        queue.request(OutputRequest::output(vec![0x02]));

        scheduler.pump(now + Duration::from_millis(15), &mut queue, &mut io);
        assert_eq!(handle.get_write_history().len(), 1, "15 ms is still busy");

        scheduler.pump(now + COMPLETION_WINDOW_BLUETOOTH, &mut queue, &mut io);
        assert_eq!(handle.get_write_history().len(), 2);
    }

    #[test]
    fn test_transmit_failure_drops_request() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::new(COMPLETION_WINDOW_USB);

        handle.set_fail_writes(true);
        queue.request(OutputRequest::output(vec![0x01]));
        scheduler.pump(Instant::now(), &mut queue, &mut io);

        assert_eq!(scheduler.failed(), 1);
        assert!(!scheduler.in_flight(), "a failed transmit frees the link");
        assert!(!queue.has_pending());

        // The link recovers with the transport.
        handle.set_fail_writes(false);
        queue.request(OutputRequest::output(vec![0x02]));
        scheduler.pump(Instant::now(), &mut queue, &mut io);
        assert_eq!(handle.get_write_history(), vec![vec![0x02]]);
    }

    #[test]
    fn test_drain_flushes_queued_report() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::new(COMPLETION_WINDOW_USB);

        queue.request(OutputRequest::output(vec![0x01]));
        scheduler.pump(Instant::now(), &mut queue, &mut io);
        queue.request(OutputRequest::output(vec![0x02]));

        assert!(scheduler.drain(&mut queue, &mut io));
        assert_eq!(
            handle.get_write_history(),
            vec![vec![0x01], vec![0x02]],
            "drain waits out the window and sends the farewell report"
        );
        assert!(!scheduler.in_flight());
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_drain_on_idle_returns_immediately() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::new(COMPLETION_WINDOW_USB);

        let started = Instant::now();
        assert!(scheduler.drain(&mut queue, &mut io));
        assert!(
            started.elapsed() < Duration::from_millis(5),
            "an idle device does not wait"
        );
    }

    #[test]
    fn test_drain_gives_up_on_dead_transport() {
        let handle = handle(BusType::Usb);
        let mut io = handle.open();
        let mut queue = OutputQueue::new();
        let mut scheduler = OutputScheduler::new(COMPLETION_WINDOW_USB);

        handle.set_fail_writes(true);
        queue.request(OutputRequest::output(vec![0x01]));

        // The failed transmit clears the slot, so drain still reports quiet.
        assert!(scheduler.drain(&mut queue, &mut io));
        assert_eq!(scheduler.failed(), 1);
        assert!(!queue.has_pending());
    }
}
