use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

const ACTOR_CHANNEL_SIZE: usize = 8;

pub trait Actor: Sized + Send + 'static {
    type Message: Send + 'static;
    type Options;

    /// A short name used when logging actor activity.
    fn name() -> &'static str;
    fn new(options: Self::Options) -> Self;
    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction;
    fn stop(self, _ctx: &mut ActorContext<Self>) {}
}

pub enum ActorAction {
    Continue,
    /// Log the message and keep processing.
    Warn(String),
    Stop,
}

impl ActorAction {
    pub fn warn(message: impl ToString) -> Self {
        Self::Warn(message.to_string())
    }
}

pub struct ActorHandle<T>
where
    T: Actor,
{
    sender: mpsc::Sender<T::Message>,
    stopped: watch::Receiver<bool>,
}

impl<T> Clone for ActorHandle<T>
where
    T: Actor,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Actor> ActorHandle<T> {
    pub async fn send(&self, message: T::Message) -> Result<(), mpsc::error::SendError<T::Message>> {
        self.sender.send(message).await
    }

    /// Send a message without waiting for capacity in the mailbox.
    /// The message is enqueued before any message sent afterwards.
    pub fn try_send(
        &self,
        message: T::Message,
    ) -> Result<(), mpsc::error::TrySendError<T::Message>> {
        self.sender.try_send(message)
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    pub async fn wait_for_stop(mut self) {
        // We ignore the receiver error since the sender must have been dropped in this case,
        // which means the actor has stopped.
        let _ = self.stopped.wait_for(|x| *x).await;
    }
}

/// The context passed to the actor when processing each message.
/// Delayed messages scheduled via the context are discarded when the actor stops.
pub struct ActorContext<T: Actor> {
    handle: ActorHandle<T>,
    tasks: JoinSet<()>,
}

impl<T: Actor> ActorContext<T> {
    fn new(handle: ActorHandle<T>) -> Self {
        Self {
            handle,
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> &ActorHandle<T> {
        &self.handle
    }

    /// Send a message to the actor itself after the delay.
    /// The message is discarded if the actor stops before the delay elapses.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) {
        let handle = self.handle.clone();
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = handle.send(message).await;
        });
    }

    fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        self.tasks.spawn(future);
    }

    fn reap(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }
}

async fn run<T: Actor>(
    mut actor: T,
    mut ctx: ActorContext<T>,
    mut receiver: mpsc::Receiver<T::Message>,
    stopped: watch::Sender<bool>,
) {
    while let Some(message) = receiver.recv().await {
        match actor.receive(&mut ctx, message) {
            ActorAction::Continue => {}
            ActorAction::Warn(message) => {
                warn!("{} actor: {message}", T::name());
            }
            ActorAction::Stop => break,
        }
    }
    actor.stop(&mut ctx);
    drop(ctx);
    drop(receiver);
    let _ = stopped.send(true);
}

pub struct ActorSystem {
    tasks: JoinSet<()>,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let (tx, rx) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let (stopped_tx, stopped_rx) = watch::channel::<bool>(false);
        let handle = ActorHandle {
            sender: tx,
            stopped: stopped_rx,
        };
        let actor = T::new(options);
        let ctx = ActorContext::new(handle.clone());
        self.tasks.spawn(run(actor, ctx, rx, stopped_tx));
        handle
    }

    /// Wait for all actors spawned by this system to stop.
    pub async fn join(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}
