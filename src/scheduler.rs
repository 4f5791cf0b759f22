use std::time::Duration;

use tokio::sync::watch;

use crate::collector::{CollectionCycle, CycleReport};
use crate::metrics::MetricSink;
use crate::runtime::{self, ContainerLogSource};

/// Phase of the [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the next tick.
    Idle,
    /// A collection cycle is in progress.
    Running,
}

/// Drives a [`CollectionCycle`] repeatedly.
///
/// The delay between two cycles is measured from the end of one cycle to the
/// start of the next, so cycles never overlap no matter how long one takes.
/// The current [`State`] is published on a watch channel, see [`Scheduler::subscribe`].
#[derive(Debug)]
pub struct Scheduler<S, M> {
    cycle: CollectionCycle<S, M>,
    delay: Duration,
    state: watch::Sender<State>,
    completed: u64,
}

impl<S, M> Scheduler<S, M>
where
    S: ContainerLogSource + Send + Sync + 'static,
    M: MetricSink + 'static,
{
    pub fn new(cycle: CollectionCycle<S, M>, delay: Duration) -> Self {
        Self {
            cycle,
            delay,
            state: watch::Sender::new(State::Idle),
            completed: 0,
        }
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Watches the state while the scheduler runs on another task.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Number of ticks run so far, aborted cycles included.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Runs exactly one cycle.
    ///
    /// An aborted cycle is already logged by the cycle itself and only returned
    /// for inspection; the scheduler stays usable either way.
    pub async fn tick(&mut self) -> runtime::Result<CycleReport> {
        self.state.send_replace(State::Running);
        let result = self.cycle.run().await;
        self.state.send_replace(State::Idle);
        self.completed += 1;
        result
    }

    /// Runs cycles forever, waiting the configured delay after each one.
    pub async fn run_forever(mut self) {
        log::info!(
            "Starting collection every {:?} over a window of {:?}",
            self.delay,
            self.cycle.options().window
        );
        loop {
            if let Err(err) = self.tick().await {
                log::debug!("cycle {} aborted: {}", self.completed, err);
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}
