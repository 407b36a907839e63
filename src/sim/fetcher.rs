use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{debug, trace, warn};

use crate::error::FetchError;
use crate::remote::Integrator;
use crate::sim::body::Body;
use crate::sim::snapshot::Snapshot;

enum FetchRequest {
    Start {
        bodies: Vec<Body>,
        reply: Sender<Result<Snapshot, FetchError>>,
    },
    Step {
        seq: u64,
        dt: f64,
    },
}

/// Result of one step request, tagged with the sequence it answers.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub seq: u64,
    pub result: Result<Snapshot, FetchError>,
}

/// Front end of the `sim-fetch` thread, which owns the integrator transport.
///
/// At most one step is in flight. Responses older than the last accepted one,
/// or issued before the latest [`invalidate`](Self::invalidate), are rejected.
pub struct SnapshotFetcher {
    req_tx: Option<Sender<FetchRequest>>,
    resp_rx: Receiver<FetchResponse>,
    next_seq: u64,
    floor: u64,
    last_accepted: Option<u64>,
    in_flight: Option<u64>,
    thread: Option<JoinHandle<()>>,
}

impl SnapshotFetcher {
    pub fn spawn(integrator: Box<dyn Integrator>) -> std::io::Result<Self> {
        let (req_tx, req_rx) = unbounded::<FetchRequest>();
        let (resp_tx, resp_rx) = unbounded::<FetchResponse>();
        let thread = thread::Builder::new()
            .name("sim-fetch".into())
            .spawn(move || fetch_loop(integrator, req_rx, resp_tx))?;
        Ok(Self {
            req_tx: Some(req_tx),
            resp_rx,
            next_seq: 0,
            floor: 0,
            last_accepted: None,
            in_flight: None,
            thread: Some(thread),
        })
    }

    /// Submit a new run and wait for its initial positions.
    ///
    /// Everything requested before this call becomes stale.
    pub fn start(&mut self, bodies: &[Body], timeout: Duration) -> Result<Snapshot, FetchError> {
        self.invalidate();
        let tx = self.req_tx.as_ref().ok_or(FetchError::Disconnected)?;
        let (reply, reply_rx) = bounded(1);
        tx.send(FetchRequest::Start {
            bodies: bodies.to_vec(),
            reply,
        })
        .map_err(|_| FetchError::Disconnected)?;
        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(FetchError::Timeout(timeout.as_millis() as u64))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(FetchError::Disconnected),
        }
    }

    /// Ask for the next step. Returns `None` when a request is still outstanding.
    pub fn request_step(&mut self, dt: f64) -> Option<u64> {
        if let Some(seq) = self.in_flight {
            trace!(seq, "step still in flight; tick dropped");
            return None;
        }
        let seq = self.next_seq;
        let tx = self.req_tx.as_ref()?;
        if tx.send(FetchRequest::Step { seq, dt }).is_err() {
            warn!("fetch thread is gone");
            return None;
        }
        self.next_seq += 1;
        self.in_flight = Some(seq);
        Some(seq)
    }

    /// Responses arrive here; clone it into a `select!`.
    pub fn responses(&self) -> Receiver<FetchResponse> {
        self.resp_rx.clone()
    }

    /// Staleness filter. Must see every response taken from [`responses`](Self::responses).
    pub fn accept(&mut self, resp: &FetchResponse) -> bool {
        if self.in_flight == Some(resp.seq) {
            self.in_flight = None;
        }
        if resp.seq < self.floor {
            debug!(seq = resp.seq, floor = self.floor, "discarding response from an earlier run");
            return false;
        }
        if self.last_accepted.is_some_and(|last| resp.seq <= last) {
            debug!(seq = resp.seq, "discarding out-of-order response");
            return false;
        }
        self.last_accepted = Some(resp.seq);
        true
    }

    /// Make every outstanding request stale.
    pub fn invalidate(&mut self) {
        self.floor = self.next_seq;
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }
}

impl Drop for SnapshotFetcher {
    fn drop(&mut self) {
        self.req_tx.take();
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

fn fetch_loop(
    mut integrator: Box<dyn Integrator>,
    req_rx: Receiver<FetchRequest>,
    resp_tx: Sender<FetchResponse>,
) {
    for req in req_rx.iter() {
        match req {
            FetchRequest::Start { bodies, reply } => {
                let result = integrator.start(&bodies);
                if reply.send(result).is_err() {
                    debug!("start reply dropped; caller gave up");
                }
            }
            FetchRequest::Step { seq, dt } => {
                let result = integrator.step(dt);
                if resp_tx.send(FetchResponse { seq, result }).is_err() {
                    break;
                }
            }
        }
    }
    debug!("fetch thread exiting");
}
