#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Walkthrough orchestration: moves the substrate from chamber to chamber as
//! each one reports completion.

use cvd_walkthrough_core::{ChamberId, Command, Event};
use tracing::info;

/// Pure system that sequences the chambers of the walkthrough.
#[derive(Debug, Default)]
pub struct Walkthrough {
    running: bool,
}

impl Walkthrough {
    /// Creates an orchestrator waiting for the walkthrough to start.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports whether a walkthrough is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Consumes world events and emits the next chamber activation.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Command>) {
        for event in events {
            match event {
                Event::WalkthroughStarted => {
                    self.running = true;
                    out.push(Command::ActivateChamber {
                        chamber: ChamberId::Airlock,
                    });
                }
                Event::WalkthroughFinished | Event::WalkthroughReset => self.running = false,
                Event::AirlockSealed if self.running => {
                    info!("airlock evacuated, moving to first deposition chamber");
                    out.push(Command::ActivateChamber {
                        chamber: ChamberId::Deposition1,
                    });
                }
                Event::Converged { chamber } if self.running => match chamber {
                    ChamberId::Deposition1 => {
                        info!("copper layer complete, moving to second deposition chamber");
                        out.push(Command::ActivateChamber {
                            chamber: ChamberId::Deposition2,
                        });
                    }
                    ChamberId::Deposition2 => out.push(Command::FinishWalkthrough),
                    ChamberId::Airlock => {}
                },
                _ => {}
            }
        }
    }
}
