use std::sync::Arc;

use labwatch_api::{ModemSession, OutboundMessage};
use tokio::sync::{mpsc, watch};

use crate::clock::Clock;
use crate::configs::Modem;
use crate::errors::ModemError;
use crate::services::modem::codec::{self, at, SEGMENT_MAX, SEGMENT_MIN};
use crate::services::modem::transport::{ModemTransport, Reply};
use crate::services::supervisor::pause;

/// Receives every inbound SMS and decides on an optional reply to the sender
pub trait InboundHandler: Send + Sync {
    fn handle(&self, sender: &str, text: &str) -> Option<String>;
}

impl<F> InboundHandler for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn handle(&self, sender: &str, text: &str) -> Option<String> {
        self(sender, text)
    }
}

/// Producer side of the modem loop, cheap to clone
#[derive(Clone)]
pub struct ModemHandle {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    session: watch::Receiver<ModemSession>,
}

impl ModemHandle {
    /// Queues a message for the modem loop, false once the loop is gone
    pub fn enqueue(&self, message: OutboundMessage) -> bool {
        self.outbound.send(message).is_ok()
    }

    pub fn session(&self) -> ModemSession {
        *self.session.borrow()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<ModemSession> {
        self.session.clone()
    }
}

/// Consumer side, moved into the [`ModemClient`]
pub struct ModemMailbox {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    session: watch::Sender<ModemSession>,
}

/// Creates the queue and session channels shared by a client and its producers
pub fn channel() -> (ModemHandle, ModemMailbox) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (session_tx, session_rx) = watch::channel(ModemSession::degraded());

    let handle = ModemHandle {
        outbound: outbound_tx.clone(),
        session: session_rx,
    };
    let mailbox = ModemMailbox {
        outbound_tx,
        outbound_rx,
        session: session_tx,
    };

    (handle, mailbox)
}

/// AT-level driver and sole owner of the serial line
pub struct ModemClient<T: ModemTransport> {
    transport: T,
    settings: Modem,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn InboundHandler>,
    mailbox: ModemMailbox,
    initialized: bool,
    /// Set by a failed health check or a silent reset, cleared by the next refresh
    degraded: bool,
}

impl<T: ModemTransport> ModemClient<T> {
    pub fn new(
        transport: T,
        settings: Modem,
        clock: Arc<dyn Clock>,
        handler: Arc<dyn InboundHandler>,
        mailbox: ModemMailbox,
    ) -> Self {
        Self {
            transport,
            settings,
            clock,
            handler,
            mailbox,
            initialized: false,
            degraded: true,
        }
    }

    pub fn session(&self) -> ModemSession {
        *self.mailbox.session.borrow()
    }

    /// Factory reset with retries, then a one-off break if the modem stays silent.
    /// Never fails on a silent modem; only a hard line fault is returned.
    pub async fn initialize(&mut self) -> Result<(), ModemError> {
        let mut answered = false;

        for attempt in 1..=self.settings.reset_retries.max(1) {
            if self.factory_reset().await? {
                answered = true;
                break;
            }
            tracing::warn!("Factory reset attempt {} got no reply", attempt);
        }

        if !answered {
            tracing::warn!("Modem did not answer reset, sending break sequence");
            self.send_break().await?;
        }

        self.refresh_session().await?;
        self.initialized = true;
        self.degraded = !answered;

        let session = self.session();
        tracing::info!(
            "Modem ready, signal: {}, network: {}",
            session.signal_quality,
            session.network_type
        );

        Ok(())
    }

    /// Drives [`ModemClient::tick`] until the stop signal is raised or the line closes.
    /// Any other fault, during initialization included, is logged and retried after a backoff.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<(), ModemError> {
        while !self.initialized && !*stop.borrow() {
            match self.initialize().await {
                Ok(()) => {}
                Err(ModemError::LineClosed) => return Ok(()),
                Err(e) => {
                    tracing::error!("Modem initialization failed: {}", e);
                    pause(&mut stop, self.settings.recovery_backoff()).await;
                }
            }
        }

        while !*stop.borrow() {
            match self.tick().await {
                Ok(()) => {}
                Err(ModemError::LineClosed) => break,
                Err(e) => {
                    tracing::error!("Modem iteration failed: {}", e);
                    pause(&mut stop, self.settings.recovery_backoff()).await;
                    continue;
                }
            }

            pause(&mut stop, self.settings.idle()).await;
        }

        tracing::info!("Modem loop stopped");

        Ok(())
    }

    /// One pass: health check, signal refresh, inbound poll, outbound drain
    pub async fn tick(&mut self) -> Result<(), ModemError> {
        if !self.health_check().await? {
            tracing::warn!("Modem health check failed, recovering");
            self.degraded = true;
            self.mailbox.session.send_replace(ModemSession::degraded());
            self.recover().await?;
            tokio::time::sleep(self.settings.recovery_backoff()).await;
            return Ok(());
        }

        if self.signal_refresh_due() {
            self.refresh_session().await?;
            self.degraded = false;
        }

        self.poll_inbound().await?;
        self.drain_outbound().await?;

        Ok(())
    }

    pub async fn health_check(&mut self) -> Result<bool, ModemError> {
        Ok(self.command(at::HEALTH_CHECK, at::OK).await?.is_valid())
    }

    /// Break out of any pending prompt, then factory reset once
    pub async fn recover(&mut self) -> Result<bool, ModemError> {
        self.send_break().await?;
        self.factory_reset().await
    }

    /// Re-queries signal quality and network type and publishes the session
    pub async fn refresh_session(&mut self) -> Result<ModemSession, ModemError> {
        let signal = self.command(at::SIGNAL_QUALITY, at::OK).await?;
        let signal_quality = match &signal {
            Reply::Valid(text) => codec::parse_signal_quality(text),
            Reply::NoReply(_) => 0,
        };

        let system = self.command(at::SYSTEM_INFO, at::OK).await?;
        let network_type = match &system {
            Reply::Valid(text) => codec::parse_network_type(text),
            Reply::NoReply(_) => labwatch_api::NetworkType::None,
        };

        let session = ModemSession {
            signal_quality,
            network_type,
            last_signal_refresh: Some(self.clock.now()),
        };
        self.mailbox.session.send_replace(session);

        Ok(session)
    }

    /// Hands every unread message to the handler, then deletes it from modem storage
    pub async fn poll_inbound(&mut self) -> Result<usize, ModemError> {
        let listing = self.command(at::LIST_UNREAD, at::LISTING_END).await?;
        let Reply::Valid(listing) = listing else {
            return Ok(0);
        };

        let messages = codec::parse_unread(&listing);

        for message in &messages {
            tracing::info!("Inbound SMS {} from {}", message.index, message.sender);

            if let Some(reply) = self.handler.handle(&message.sender, &message.body) {
                let _ = self
                    .mailbox
                    .outbound_tx
                    .send(OutboundMessage::to_one(message.sender.clone(), reply));
            }

            if !self.command(&at::delete(message.index), at::OK).await?.is_valid() {
                tracing::warn!("Failed to delete inbound SMS {}", message.index);
            }
        }

        Ok(messages.len())
    }

    /// Sends everything queued right now without waiting for more.
    /// Only a closed line stops the drain; a failed recipient does not hold up the others.
    pub async fn drain_outbound(&mut self) -> Result<usize, ModemError> {
        let mut drained = 0;

        while let Ok(message) = self.mailbox.outbound_rx.try_recv() {
            for recipient in &message.recipients {
                self.send_sms(recipient, &message.body).await?;
            }
            drained += 1;
        }

        Ok(drained)
    }

    /// Sends `body` segment by segment; a segment that exhausts its retries drops the rest
    pub async fn send_sms(&mut self, number: &str, body: &str) -> Result<bool, ModemError> {
        let segments = codec::partition(body, SEGMENT_MAX, SEGMENT_MIN);
        let total = segments.len();

        for (position, segment) in segments.iter().enumerate() {
            if !self.send_segment(number, segment).await? {
                tracing::error!(
                    "Dropping SMS to {} at segment {}/{} after {} attempts",
                    number,
                    position + 1,
                    total,
                    self.settings.send_retries
                );
                return Ok(false);
            }
        }

        tracing::info!("SMS sent to {} in {} segment(s)", number, total);

        Ok(true)
    }

    /// Line faults other than a close count as failed attempts
    async fn send_segment(&mut self, number: &str, segment: &str) -> Result<bool, ModemError> {
        for attempt in 1..=self.settings.send_retries.max(1) {
            match self.try_send_segment(number, segment).await {
                Ok(true) => return Ok(true),
                Ok(false) => tracing::warn!("Failed attempt {} sending to {}", attempt, number),
                Err(ModemError::LineClosed) => return Err(ModemError::LineClosed),
                Err(e) => {
                    tracing::warn!("Failed attempt {} sending to {}: {}", attempt, number, e)
                }
            }
        }

        Ok(false)
    }

    async fn try_send_segment(&mut self, number: &str, segment: &str) -> Result<bool, ModemError> {
        if !self.command(at::GSM_CHARSET, at::OK).await?.is_valid() {
            return Ok(false);
        }
        if !self.command(at::TEXT_MODE, at::OK).await?.is_valid() {
            return Ok(false);
        }
        if !self.command(&at::send_to(number), at::PROMPT).await?.is_valid() {
            self.send_break().await?;
            return Ok(false);
        }

        let timeout = self.settings.send_timeout();
        let confirmation = self
            .transport
            .send(&format!("{segment}{}", at::CTRL_Z), at::OK, timeout)
            .await?;

        Ok(confirmation.confirms(at::SENT))
    }

    async fn factory_reset(&mut self) -> Result<bool, ModemError> {
        Ok(self.command(at::FACTORY_RESET, at::OK).await?.is_valid())
    }

    async fn send_break(&mut self) -> Result<(), ModemError> {
        self.command(at::CTRL_Z, at::OK).await?;
        Ok(())
    }

    fn signal_refresh_due(&self) -> bool {
        if self.degraded {
            return true;
        }

        match self.session().last_signal_refresh {
            Some(last) => self.clock.now() - last > self.settings.signal_refresh(),
            None => true,
        }
    }

    async fn command(&mut self, command: &str, expected: &str) -> Result<Reply, ModemError> {
        let timeout = self.settings.command_timeout();
        self.transport.send(command, expected, timeout).await
    }
}
