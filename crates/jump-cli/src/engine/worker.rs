//! The evaluation worker.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use jump_core::rule::{RuleSet, ScreenContext};
use jump_core::scheduler::{
    ChangeHint, Diagnostic, Evaluation, Push, Scheduler, SchedulerConfig, TriggerEvent,
};
use jump_core::{ActionSink, Node};

use super::{timer, TokioClock};

/// Queued messages before senders wait.
const INBOX_CAPACITY: usize = 64;

/// Input to the worker.
#[derive(Debug)]
pub enum EngineMessage<N> {
    /// Replace the rule set.
    Rules(RuleSet),
    /// Replace the active window root.
    Window(Option<N>),
    Context(ScreenContext),
    Content(Option<N>),
    /// A delay deadline passed.
    Wake,
    Shutdown,
}

/// Output of the worker, in the order it was produced.
#[derive(Debug, Clone)]
pub enum EngineOutput<N> {
    Trigger {
        at: DateTime<Utc>,
        event: TriggerEvent<N>,
    },
    Diagnostic {
        at: DateTime<Utc>,
        at_ms: u64,
        diagnostic: Diagnostic,
    },
}

/// Handle to a running engine.
pub struct Engine<N> {
    inbox: mpsc::Sender<EngineMessage<N>>,
    worker: JoinHandle<()>,
}

impl<N: Node + Send + 'static> Engine<N> {
    /// Start the worker and its timer.
    pub fn spawn<S>(config: SchedulerConfig, sink: S) -> (Self, mpsc::UnboundedReceiver<EngineOutput<N>>)
    where
        S: ActionSink<N> + Send + 'static,
    {
        let clock = TokioClock::new();
        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        let (output, output_rx) = mpsc::unbounded_channel();
        let (deadline, deadline_rx) = watch::channel(None);
        timer::spawn(clock, deadline_rx, inbox.clone());

        let worker = Worker {
            scheduler: Scheduler::new(config, clock),
            window: None,
            sink,
            output,
            deadline,
        };
        let worker = tokio::spawn(worker.run(rx));
        (Self { inbox, worker }, output_rx)
    }

    pub async fn send(&self, message: EngineMessage<N>) -> Result<()> {
        self.inbox
            .send(message)
            .await
            .map_err(|_| anyhow!("Engine worker has stopped"))
    }

    /// Process everything already sent, then stop.
    pub async fn shutdown(self) -> Result<()> {
        // The worker may have exited already; joining reports why.
        let _ = self.inbox.send(EngineMessage::Shutdown).await;
        self.worker.await.context("Engine worker failed")
    }
}

struct Worker<N, S> {
    scheduler: Scheduler<N, TokioClock>,
    window: Option<N>,
    sink: S,
    output: mpsc::UnboundedSender<EngineOutput<N>>,
    deadline: watch::Sender<Option<u64>>,
}

impl<N: Node + Send + 'static, S: ActionSink<N>> Worker<N, S> {
    async fn run(mut self, mut inbox: mpsc::Receiver<EngineMessage<N>>) {
        info!("Engine worker started");
        while let Some(first) = inbox.recv().await {
            let mut batch = vec![first];
            while let Ok(more) = inbox.try_recv() {
                batch.push(more);
            }
            let shutdown = self.handle(batch);
            // The timer is gone only if it panicked; nothing left to arm.
            let _ = self.deadline.send(self.scheduler.next_deadline());
            if shutdown {
                break;
            }
        }
        info!("Engine worker stopped after {} passes", self.scheduler.passes());
    }

    /// Apply a batch of messages and run at most one event-driven pass plus
    /// any due delay jobs. Returns whether shutdown was requested.
    fn handle(&mut self, batch: Vec<EngineMessage<N>>) -> bool {
        let mut shutdown = false;
        let mut sweep = false;
        let mut content = false;
        let mut diagnostics = Vec::new();
        debug!("Handling {} messages", batch.len());

        for message in batch {
            match message {
                EngineMessage::Rules(set) => {
                    diagnostics.extend(self.scheduler.replace_rules(set));
                    sweep = true;
                }
                EngineMessage::Window(root) => self.window = root,
                EngineMessage::Context(context) => sweep |= self.scheduler.update_context(context),
                EngineMessage::Content(node) => {
                    content |= self.scheduler.notify_content(node) != Push::Throttled;
                }
                EngineMessage::Wake => {}
                EngineMessage::Shutdown => shutdown = true,
            }
        }

        let window = self.window.clone();
        let mut source = || window.clone();
        let mut evaluation = Evaluation {
            diagnostics,
            ..Evaluation::default()
        };
        if sweep {
            evaluation.merge(self.scheduler.evaluate(ChangeHint::Recheck, &mut source, &mut self.sink));
        } else if content {
            evaluation.merge(self.scheduler.evaluate(ChangeHint::Pending, &mut source, &mut self.sink));
        }
        evaluation.merge(self.scheduler.run_due(&mut source, &mut self.sink));
        self.report(evaluation);
        shutdown
    }

    fn report(&self, evaluation: Evaluation<N>) {
        let at = Utc::now();
        let at_ms = self.scheduler.now();
        for diagnostic in evaluation.diagnostics {
            debug!("Diagnostic at {}ms: {:?}", at_ms, diagnostic);
            // A dropped receiver only means nobody is listening any more.
            let _ = self.output.send(EngineOutput::Diagnostic { at, at_ms, diagnostic });
        }
        for event in evaluation.triggers {
            let _ = self.output.send(EngineOutput::Trigger { at, event });
        }
    }
}
