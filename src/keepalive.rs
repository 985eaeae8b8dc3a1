use std::time::Duration;

use log::trace;
use tokio::time::Instant;

type Sender = tokio::sync::mpsc::UnboundedSender<Message>;
type Receiver = tokio::sync::mpsc::UnboundedReceiver<Message>;

pub enum Message {
    ResponseReceived,
    Shutdown,
}

/// A timer fires every `session.timeout - 5s`; it calls `on_probe` (the
/// caller sends an empty-body `GET_PARAMETER`) and schedules a 5s check. If
/// no `ResponseReceived` arrives before the check fires, `on_timeout` is
/// called once and the actor stops, per section 4.H.
struct KeepaliveActor {
    interval: Duration,
    check_delay: Duration,
    response_pending: bool,
    receiver: Receiver,
    on_probe: Box<dyn Fn() + Send>,
    on_timeout: Box<dyn Fn() + Send>,
}

impl KeepaliveActor {
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::ResponseReceived => {
                self.response_pending = false;
                true
            }
            Message::Shutdown => false,
        }
    }
}

#[derive(Clone)]
pub struct KeepaliveHandle {
    pub sender: Sender,
}

impl KeepaliveHandle {
    /// `session_timeout` is the `Session: timeout=` value negotiated at
    /// SETUP; the probe interval is derived as `session_timeout - 5s`, with a
    /// floor of 1s so a misconfigured short timeout can't busy-loop.
    pub fn new(session_timeout: Duration, on_probe: impl Fn() + Send + 'static, on_timeout: impl Fn() + Send + 'static) -> Self {
        let interval = session_timeout.saturating_sub(Duration::from_secs(5)).max(Duration::from_secs(1));
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel::<Message>();
        let actor = KeepaliveActor {
            interval,
            check_delay: Duration::from_secs(5),
            response_pending: false,
            receiver,
            on_probe: Box::new(on_probe),
            on_timeout: Box::new(on_timeout),
        };
        tokio::spawn(run(actor));

        Self { sender }
    }

    pub fn notify_response(&self) {
        self.sender.send(Message::ResponseReceived).ok();
    }

    pub fn shutdown(&self) {
        self.sender.send(Message::Shutdown).ok();
    }
}

async fn run(mut actor: KeepaliveActor) {
    loop {
        let deadline = Instant::now() + actor.interval;
        if !wait_until(&mut actor, deadline).await {
            return;
        }

        (actor.on_probe)();
        actor.response_pending = true;

        let check_deadline = Instant::now() + actor.check_delay;
        if !wait_until(&mut actor, check_deadline).await {
            return;
        }

        if actor.response_pending {
            (actor.on_timeout)();
            trace!(target: "Keepalive", "Sink stopped responding, reporting timeout");
            return;
        }
    }
}

/// Runs the actor's message loop until `deadline`, returning `false` if a
/// `Shutdown` arrived or the channel closed in the meantime.
async fn wait_until(actor: &mut KeepaliveActor, deadline: Instant) -> bool {
    loop {
        tokio::select! {
            msg = actor.receiver.recv() => {
                match msg {
                    None => return false,
                    Some(message) => {
                        if !actor.handle_message(message) {
                            return false;
                        }
                    }
                }
            }
            () = tokio::time::sleep_until(deadline) => return true,
        }
    }
}
