//! Transport-neutral protocol FSM runtime.
//!
//! A state is a one-shot async step: given the machine's shared mutable
//! context and the just-read incoming frame, it returns either the next
//! state plus an optional outgoing frame, a terminal frame signalling
//! completion, or a fatal error. [`run`] alternates calling the current
//! state with framed transport I/O until the machine reaches a terminal
//! outcome, then always invokes the exit handler with the final result.

use async_trait::async_trait;

use crate::error::ProtoError;
use crate::framing::Transport;
use kerpass_crypto::Context;

pub type BoxState<M> = Box<dyn State<M>>;

/// Outcome of a single state step.
pub enum StepOutcome<M> {
    /// Advance to `state`, optionally writing `outgoing` first.
    Next { state: BoxState<M>, outgoing: Option<Vec<u8>> },
    /// Terminal success, optionally writing a final `outgoing` frame first.
    Done { outgoing: Option<Vec<u8>> },
    /// Terminal failure.
    Fail(ProtoError),
}

impl<M> StepOutcome<M> {
    pub fn next(state: BoxState<M>) -> Self {
        Self::Next { state, outgoing: None }
    }

    pub fn next_with(state: BoxState<M>, outgoing: Vec<u8>) -> Self {
        Self::Next { state, outgoing: Some(outgoing) }
    }

    pub fn done() -> Self {
        Self::Done { outgoing: None }
    }

    pub fn done_with(outgoing: Vec<u8>) -> Self {
        Self::Done { outgoing: Some(outgoing) }
    }
}

#[async_trait]
pub trait State<M: Send>: Send {
    /// `incoming` is `None` only for the very first state of the party
    /// that speaks first (the initiator's `ClientInit`/its mirror).
    async fn step(self: Box<Self>, ctx: &Context, machine: &mut M, incoming: Option<Vec<u8>>) -> StepOutcome<M>;
}

#[async_trait]
pub trait ExitHandler<M>: Send + Sync {
    async fn on_exit(&self, ctx: &Context, machine: &mut M, result: &Result<(), ProtoError>);
}

/// An exit handler that does nothing; useful where a machine has no
/// compensating actions to perform.
pub struct NoopExit;

#[async_trait]
impl<M: Send> ExitHandler<M> for NoopExit {
    async fn on_exit(&self, _ctx: &Context, _machine: &mut M, _result: &Result<(), ProtoError>) {}
}

pub async fn run<M, T, E>(
    ctx: &Context,
    machine: &mut M,
    initial: BoxState<M>,
    transport: &mut T,
    is_responder: bool,
    exit: &E,
) -> Result<(), ProtoError>
where
    M: Send,
    T: Transport,
    E: ExitHandler<M>,
{
    let result = run_inner(ctx, machine, initial, transport, is_responder).await;
    exit.on_exit(ctx, machine, &result).await;
    result
}

async fn run_inner<M, T>(
    ctx: &Context,
    machine: &mut M,
    mut state: BoxState<M>,
    transport: &mut T,
    is_responder: bool,
) -> Result<(), ProtoError>
where
    M: Send,
    T: Transport,
{
    let mut incoming = if is_responder { Some(transport.read_frame().await?) } else { None };

    loop {
        match state.step(ctx, machine, incoming.take()).await {
            StepOutcome::Next { state: next, outgoing } => {
                if let Some(bytes) = outgoing {
                    transport.write_frame(&bytes).await?;
                }
                state = next;
                incoming = Some(transport.read_frame().await?);
            }
            StepOutcome::Done { outgoing } => {
                if let Some(bytes) = outgoing {
                    transport.write_frame(&bytes).await?;
                }
                return Ok(());
            }
            StepOutcome::Fail(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::ChannelTransport;

    struct Counter(u32);

    struct Echo;

    #[async_trait]
    impl State<Counter> for Echo {
        async fn step(self: Box<Self>, _ctx: &Context, machine: &mut Counter, incoming: Option<Vec<u8>>) -> StepOutcome<Counter> {
            machine.0 += 1;
            match incoming {
                Some(bytes) => StepOutcome::done_with(bytes),
                None => StepOutcome::next_with(Box::new(Echo), vec![1, 2, 3]),
            }
        }
    }

    #[tokio::test]
    async fn run_drives_initiator_and_responder_to_completion() {
        let (mut a, mut b) = ChannelTransport::pair();
        let ctx = Context::background();

        let mut initiator_machine = Counter(0);
        let mut responder_machine = Counter(0);

        let initiator = tokio::spawn(async move {
            run(&ctx, &mut initiator_machine, Box::new(Echo), &mut a, false, &NoopExit).await.unwrap();
            initiator_machine.0
        });

        let ctx2 = Context::background();
        let responder = tokio::spawn(async move {
            run(&ctx2, &mut responder_machine, Box::new(Echo), &mut b, true, &NoopExit).await.unwrap();
            responder_machine.0
        });

        let (init_steps, resp_steps) = tokio::join!(initiator, responder);
        // Initiator's Echo runs twice: once to emit the opening frame, once
        // more on the echoed reply to complete. The responder completes in
        // a single step, echoing back what it read.
        assert_eq!(init_steps.unwrap(), 2);
        assert_eq!(resp_steps.unwrap(), 1);
    }
}
