//! Two-lane interleaved executor
//!
//! Device work has a round trip (dispatch, run, read back) that the host
//! would otherwise sit idle through. The executor keeps two independent
//! units of work in flight: while it waits on one lane and post-processes
//! its result, the other lane's submission is already running on the
//! device.
//!
//! ```text
//!  lane 1: ─enqueue─▶[device]──wait─▶process──enqueue─▶[device]──wait─▶…
//!  lane 2:      ─enqueue─▶[device]─────────────wait─▶process──enqueue─▶…
//! ```
//!
//! Orchestration is single-threaded and cooperative: progress is made only
//! by waiting on completion handles in a fixed round-robin, and each lane
//! has at most one outstanding submission.
//!
//! Author: Moroya Sakamoto

pub mod coroutine;

use crate::device::DeviceError;
use tracing::{debug, instrument, trace};

/// Handle to device work that has been submitted.
///
/// Waiting blocks until the work is done. Device-side failures surface
/// here and nowhere else.
pub trait Completion {
    /// Value read back from the device
    type Output;

    /// Block until the work is done
    fn wait(self) -> Result<Self::Output, DeviceError>;
}

/// One lane of the executor.
///
/// A lane owns its scratch state exclusively; the executor never lets two
/// lanes share it.
pub trait Lane {
    /// Caller-defined work descriptor
    type Job;
    /// Completion handle returned by [`enqueue`](Lane::enqueue)
    type Pending: Completion;

    /// Submit the device part of `job`
    fn enqueue(&mut self, job: Self::Job) -> Result<Self::Pending, DeviceError>;

    /// Post-process the read-back of the last submission and return any
    /// follow-up jobs
    fn process_result(
        &mut self,
        output: <Self::Pending as Completion>::Output,
    ) -> Result<Vec<Self::Job>, DeviceError>;
}

/// Counters reported by the executors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterleaveStats {
    /// Jobs whose results were processed
    pub jobs_processed: usize,
    /// Device round trips waited on
    pub round_trips: usize,
    /// Largest number of submissions outstanding at once
    pub max_in_flight: usize,
}

enum LaneState<P> {
    Idle,
    AwaitingDevice(P),
}

struct LaneSlot<'a, L: Lane> {
    lane: &'a mut L,
    state: LaneState<L::Pending>,
}

impl<'a, L: Lane> LaneSlot<'a, L> {
    fn new(lane: &'a mut L) -> Self {
        LaneSlot {
            lane,
            state: LaneState::Idle,
        }
    }

    fn is_idle(&self) -> bool {
        matches!(self.state, LaneState::Idle)
    }

    fn submit(&mut self, job: L::Job) -> Result<(), DeviceError> {
        debug_assert!(self.is_idle(), "lane already has a submission in flight");
        let pending = self.lane.enqueue(job)?;
        self.state = LaneState::AwaitingDevice(pending);
        Ok(())
    }

    /// Wait for the outstanding submission, if any, and process it
    fn drain(&mut self) -> Result<Option<Vec<L::Job>>, DeviceError> {
        match std::mem::replace(&mut self.state, LaneState::Idle) {
            LaneState::Idle => Ok(None),
            LaneState::AwaitingDevice(pending) => {
                let output = pending.wait()?;
                self.lane.process_result(output).map(Some)
            }
        }
    }
}

/// Run `initial` and every follow-up job they produce across two lanes.
///
/// The worklist is a stack. The first job goes to lane 1, the second (if
/// any) to lane 2; then the executor repeatedly waits on the current lane,
/// processes its result, pushes the follow-ups, refills that lane and
/// swaps roles. It returns once the worklist is empty and both lanes are
/// idle. The first error aborts the run; work already submitted on the
/// other lane is left to finish on its own.
#[instrument(skip_all)]
pub fn interleave<L: Lane>(
    initial: impl IntoIterator<Item = L::Job>,
    lane1: &mut L,
    lane2: &mut L,
) -> Result<InterleaveStats, DeviceError> {
    let mut worklist: Vec<L::Job> = initial.into_iter().collect();
    let mut stats = InterleaveStats::default();
    let Some(first) = worklist.pop() else {
        return Ok(stats);
    };

    let mut current = LaneSlot::new(lane1);
    let mut other = LaneSlot::new(lane2);
    current.submit(first)?;
    let mut in_flight = 1;
    if let Some(second) = worklist.pop() {
        other.submit(second)?;
        in_flight += 1;
    }
    stats.max_in_flight = in_flight;

    loop {
        if let Some(follow_ups) = current.drain()? {
            in_flight -= 1;
            stats.round_trips += 1;
            stats.jobs_processed += 1;
            trace!(follow_ups = follow_ups.len(), queued = worklist.len(), "lane drained");
            worklist.extend(follow_ups);
        }
        if let Some(job) = worklist.pop() {
            current.submit(job)?;
            in_flight += 1;
            stats.max_in_flight = stats.max_in_flight.max(in_flight);
        }
        if current.is_idle() && other.is_idle() {
            break;
        }
        std::mem::swap(&mut current, &mut other);
    }

    debug!(
        jobs = stats.jobs_processed,
        max_in_flight = stats.max_in_flight,
        "interleave finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Ready {
        value: u32,
        fail: bool,
    }

    impl Completion for Ready {
        type Output = u32;

        fn wait(self) -> Result<u32, DeviceError> {
            if self.fail {
                Err(DeviceError::KernelAssertion("forced".to_string()))
            } else {
                Ok(self.value)
            }
        }
    }

    /// Each job n > 0 produces one follow-up n - 1
    struct Countdown {
        processed: Rc<Cell<usize>>,
        fail_on: Option<u32>,
    }

    impl Lane for Countdown {
        type Job = u32;
        type Pending = Ready;

        fn enqueue(&mut self, job: u32) -> Result<Ready, DeviceError> {
            Ok(Ready {
                value: job,
                fail: self.fail_on == Some(job),
            })
        }

        fn process_result(&mut self, output: u32) -> Result<Vec<u32>, DeviceError> {
            self.processed.set(self.processed.get() + 1);
            Ok(if output > 0 { vec![output - 1] } else { vec![] })
        }
    }

    fn lanes(fail_on: Option<u32>) -> (Countdown, Countdown, Rc<Cell<usize>>) {
        let processed = Rc::new(Cell::new(0));
        let lane = |p: &Rc<Cell<usize>>| Countdown {
            processed: Rc::clone(p),
            fail_on,
        };
        (lane(&processed), lane(&processed), processed)
    }

    #[test]
    fn test_empty_worklist() {
        let (mut a, mut b, processed) = lanes(None);
        let stats = interleave(Vec::new(), &mut a, &mut b).unwrap();
        assert_eq!(stats, InterleaveStats::default());
        assert_eq!(processed.get(), 0);
    }

    #[test]
    fn test_single_job_chain() {
        let (mut a, mut b, processed) = lanes(None);
        let stats = interleave(vec![3], &mut a, &mut b).unwrap();
        assert_eq!(stats.jobs_processed, 4);
        assert_eq!(stats.max_in_flight, 1);
        assert_eq!(processed.get(), 4);
    }

    #[test]
    fn test_two_chains_use_both_lanes() {
        let (mut a, mut b, _) = lanes(None);
        let stats = interleave(vec![2, 2], &mut a, &mut b).unwrap();
        assert_eq!(stats.jobs_processed, 6);
        assert_eq!(stats.max_in_flight, 2);
    }

    #[test]
    fn test_device_error_propagates() {
        let (mut a, mut b, _) = lanes(Some(1));
        let err = interleave(vec![3, 0], &mut a, &mut b).unwrap_err();
        assert!(matches!(err, DeviceError::KernelAssertion(_)));
    }
}
