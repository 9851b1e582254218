//! A controller together with the poll queue which schedules its
//! drives, for hosts which do not have a scheduler of their own.
use std::time::Duration;

use tracing::{event, Level};

use super::config::ControllerConfiguration;
use super::context::Context;
use super::controller::{DiskController, RegisterError};
use super::memory::HostMemory;
use super::schedule::PollQueue;

#[derive(Debug)]
pub struct DiskSubsystem {
    controller: DiskController,
    queue: PollQueue,
}

impl DiskSubsystem {
    #[must_use]
    pub fn new(config: &ControllerConfiguration) -> DiskSubsystem {
        DiskSubsystem {
            controller: DiskController::new(config),
            queue: PollQueue::new(),
        }
    }

    #[must_use]
    pub fn controller(&self) -> &DiskController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut DiskController {
        &mut self.controller
    }

    /// Borrow the controller and the scheduler at once, for the
    /// controller operations which need a scheduler.
    pub fn parts(&mut self) -> (&mut DiskController, &mut PollQueue) {
        (&mut self.controller, &mut self.queue)
    }

    /// The simulated time at which a drive next needs attention.
    #[must_use]
    pub fn next_tick(&self) -> Option<Duration> {
        self.queue.peek().map(|(_, due)| *due)
    }

    /// Service every drive which is due at or before the time of
    /// `ctx`.  Returns the number of callbacks made.
    pub fn tick(&mut self, ctx: &Context, mem: &mut dyn HostMemory) -> usize {
        let mut calls = 0;
        while let Some((unit, due)) = self.queue.pop_due(ctx.simulated_time) {
            let when = Context::new(due, ctx.real_elapsed_time);
            self.controller.service(&when, unit, &mut self.queue, mem);
            calls += 1;
        }
        calls
    }

    /// Run the drives until none has anything scheduled, advancing
    /// simulated time as needed.  Returns the simulated time at which
    /// the last callback happened (or `start`, if there were none).
    pub fn run_until_idle(&mut self, start: Duration, mem: &mut dyn HostMemory) -> Duration {
        let mut now = start;
        let mut calls = 0_u64;
        while let Some((unit, due)) = self.queue.pop() {
            now = now.max(due);
            self.controller
                .service(&Context::at(now), unit, &mut self.queue, mem);
            calls += 1;
        }
        event!(
            Level::TRACE,
            "idle at {:?} after {} callbacks",
            now,
            calls
        );
        now
    }

    pub fn read_status(&self, device: u8) -> Result<u32, RegisterError> {
        self.controller.read_status(device)
    }

    pub fn read_data(&self, device: u8) -> Result<u32, RegisterError> {
        self.controller.read_data(device)
    }

    pub fn write_data(&mut self, device: u8, word: u32) -> Result<(), RegisterError> {
        self.controller.write_data(device, word)
    }

    pub fn write_control(
        &mut self,
        ctx: &Context,
        device: u8,
        word: u32,
        mem: &mut dyn HostMemory,
    ) -> Result<(), RegisterError> {
        self.controller
            .write_control(ctx, device, word, &mut self.queue, mem)
    }
}
