//! Coroutine form of the interleaved executor
//!
//! Here a job is a routine that runs until it needs the device, suspends
//! with the completion handle of its submission, and is resumed with the
//! read-back once that handle is satisfied. A routine may take several
//! round trips before it finishes and hands back its follow-up jobs.
//!
//! The scheduling discipline is the same as [`interleave`](super::interleave):
//! two slots, a fixed round-robin, at most one outstanding submission per
//! slot.
//!
//! Author: Moroya Sakamoto

use super::{Completion, InterleaveStats};
use crate::device::DeviceError;
use tracing::{debug, instrument};

/// What a routine does when resumed
pub enum Step<P, J> {
    /// Suspend until this submission completes
    Await(P),
    /// Finished; these jobs are pushed onto the worklist
    Done(Vec<J>),
}

/// A resumable job
pub trait Routine {
    /// Follow-up job descriptor
    type Job;
    /// Completion handle the routine suspends on
    type Pending: Completion;

    /// Run until the next suspension point.
    ///
    /// `ready` is `None` on the first call and the read-back of the awaited
    /// submission afterwards.
    fn resume(
        &mut self,
        ready: Option<<Self::Pending as Completion>::Output>,
    ) -> Result<Step<Self::Pending, Self::Job>, DeviceError>;
}

type Slot<R> = Option<(R, <R as Routine>::Pending)>;

/// Start routines from the worklist until `slot` holds a suspended one or
/// the worklist runs dry
fn fill<R, F>(
    slot: &mut Slot<R>,
    worklist: &mut Vec<R::Job>,
    start: &mut F,
    stats: &mut InterleaveStats,
) -> Result<(), DeviceError>
where
    R: Routine,
    F: FnMut(R::Job) -> R,
{
    while slot.is_none() {
        let Some(job) = worklist.pop() else {
            break;
        };
        let mut routine = start(job);
        match routine.resume(None)? {
            Step::Await(pending) => *slot = Some((routine, pending)),
            Step::Done(follow_ups) => {
                stats.jobs_processed += 1;
                worklist.extend(follow_ups);
            }
        }
    }
    Ok(())
}

/// Run `initial` and all follow-ups as routines created by `start`
#[instrument(skip_all)]
pub fn interleave_routines<R, F>(
    initial: impl IntoIterator<Item = R::Job>,
    mut start: F,
) -> Result<InterleaveStats, DeviceError>
where
    R: Routine,
    F: FnMut(R::Job) -> R,
{
    let mut worklist: Vec<R::Job> = initial.into_iter().collect();
    let mut stats = InterleaveStats::default();
    let mut slots: [Slot<R>; 2] = [None, None];

    fill(&mut slots[0], &mut worklist, &mut start, &mut stats)?;
    fill(&mut slots[1], &mut worklist, &mut start, &mut stats)?;
    let mut current = 0;
    loop {
        let in_flight = slots.iter().filter(|s| s.is_some()).count();
        stats.max_in_flight = stats.max_in_flight.max(in_flight);
        if in_flight == 0 {
            break;
        }

        if let Some((mut routine, pending)) = slots[current].take() {
            let output = pending.wait()?;
            stats.round_trips += 1;
            match routine.resume(Some(output))? {
                Step::Await(next) => slots[current] = Some((routine, next)),
                Step::Done(follow_ups) => {
                    stats.jobs_processed += 1;
                    worklist.extend(follow_ups);
                }
            }
        }
        fill(&mut slots[current], &mut worklist, &mut start, &mut stats)?;
        current ^= 1;
    }

    debug!(
        jobs = stats.jobs_processed,
        round_trips = stats.round_trips,
        "routines finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ready(u32);

    impl Completion for Ready {
        type Output = u32;

        fn wait(self) -> Result<u32, DeviceError> {
            Ok(self.0)
        }
    }

    /// Needs `trips` round trips, then yields `depth - 1` as a follow-up
    struct MultiTrip {
        depth: u32,
        trips: u32,
        seen: u32,
    }

    impl Routine for MultiTrip {
        type Job = u32;
        type Pending = Ready;

        fn resume(&mut self, ready: Option<u32>) -> Result<Step<Ready, u32>, DeviceError> {
            if let Some(v) = ready {
                assert_eq!(v, self.seen);
                self.seen += 1;
            }
            if self.seen < self.trips {
                return Ok(Step::Await(Ready(self.seen)));
            }
            Ok(Step::Done(if self.depth > 0 {
                vec![self.depth - 1]
            } else {
                vec![]
            }))
        }
    }

    #[test]
    fn test_routines_with_several_round_trips() {
        let stats = interleave_routines(vec![2, 2, 2], |depth| MultiTrip {
            depth,
            trips: 3,
            seen: 0,
        })
        .unwrap();
        assert_eq!(stats.jobs_processed, 9);
        assert_eq!(stats.round_trips, 27);
        assert_eq!(stats.max_in_flight, 2);
    }

    #[test]
    fn test_routines_without_device_work() {
        let stats = interleave_routines(vec![4], |depth| MultiTrip {
            depth,
            trips: 0,
            seen: 0,
        })
        .unwrap();
        assert_eq!(stats.jobs_processed, 5);
        assert_eq!(stats.round_trips, 0);
        assert_eq!(stats.max_in_flight, 0);
    }
}
