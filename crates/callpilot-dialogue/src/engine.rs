//! The turn engine: pure decisions over (script, position, reply).

use crate::classify::classify_intent;
use crate::DialogueError;
use callpilot_types::{BotScript, CallDirective, DialogueAction, Intent};
use serde::{Deserialize, Serialize};

/// What the bot says when it gives up on a call.
const GOODBYE: &str = "Okay, ending the call. Have a great day!";

/// What the bot says when handing off to a human.
const HANDOFF: &str = "Transferring you to a live agent...";

/// What the bot says when it could not understand the reply.
const REPROMPT: &str = "Sorry, I didn't understand that.";

/// Engine tunables.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consecutive unrecognized replies tolerated before the call ends.
    pub max_reprompts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_reprompts: 3 }
    }
}

/// The result of one dialogue turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// How the reply was classified.
    pub intent: Intent,
    /// The action taken plus what to speak next.
    pub directive: CallDirective,
    /// The script position after this turn.
    pub next_step: usize,
    /// Consecutive-unrecognized counter after this turn.
    pub reprompts: u32,
    /// Whether the conversation is over.
    pub done: bool,
}

/// Decides what a bot does after each customer reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogueEngine {
    config: EngineConfig,
}

impl DialogueEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Runs one turn.
    ///
    /// `current_step` is the script line the customer just replied to;
    /// `reprompts` is the consecutive-unrecognized counter carried in the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `DialogueError::StepOutOfRange` if `current_step` does not
    /// point at a script line.
    pub fn turn(
        &self,
        script: &BotScript,
        current_step: usize,
        reprompts: u32,
        transcript: &str,
    ) -> Result<TurnOutcome, DialogueError> {
        let Some(current_line) = script.line(current_step) else {
            return Err(DialogueError::StepOutOfRange {
                step: current_step,
                len: script.len(),
            });
        };

        let intent = classify_intent(transcript);

        let outcome = match intent {
            Intent::Yes => {
                let next_step = current_step + 1;
                match script.line(next_step) {
                    Some(next_line) => TurnOutcome {
                        intent,
                        directive: CallDirective {
                            action: DialogueAction::Advance,
                            say: Some(next_line.to_string()),
                        },
                        next_step,
                        reprompts: 0,
                        done: false,
                    },
                    // The customer agreed all the way through the script:
                    // they qualified, hand the call to a human.
                    None => TurnOutcome {
                        intent,
                        directive: CallDirective {
                            action: DialogueAction::TransferToAgent,
                            say: Some(HANDOFF.to_string()),
                        },
                        next_step,
                        reprompts: 0,
                        done: true,
                    },
                }
            }
            Intent::No => TurnOutcome {
                intent,
                directive: CallDirective {
                    action: DialogueAction::EndCall,
                    say: Some(GOODBYE.to_string()),
                },
                next_step: current_step,
                reprompts: 0,
                done: true,
            },
            Intent::Repeat => TurnOutcome {
                intent,
                directive: CallDirective {
                    action: DialogueAction::Repeat,
                    say: Some(current_line.to_string()),
                },
                next_step: current_step,
                reprompts: 0,
                done: false,
            },
            Intent::Unrecognized => {
                let reprompts = reprompts + 1;
                if reprompts > self.config.max_reprompts {
                    TurnOutcome {
                        intent,
                        directive: CallDirective {
                            action: DialogueAction::EndCall,
                            say: Some(GOODBYE.to_string()),
                        },
                        next_step: current_step,
                        reprompts,
                        done: true,
                    }
                } else {
                    TurnOutcome {
                        intent,
                        directive: CallDirective {
                            action: DialogueAction::Reprompt,
                            say: Some(REPROMPT.to_string()),
                        },
                        next_step: current_step,
                        reprompts,
                        done: false,
                    }
                }
            }
        };

        Ok(outcome)
    }
}
