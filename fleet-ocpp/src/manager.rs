//! Per-connection pipeline: frame -> decode -> validate -> observer
//!
//! Every per-frame failure (malformed frame, unsolicited response, shape
//! violation) is logged and the frame dropped; the connection stays open.

use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::model::StatusProcess;
use crate::observer::{OcppObserver, Provisioner};
use crate::ocpp::{Frame, MessageType, Session, Validate};

/// Session plus observer for one live connection
pub struct ChargePointManager<O: OcppObserver> {
    session: Session,
    observer: O,
    provisioner: Provisioner,
}

impl<O: OcppObserver> ChargePointManager<O> {
    pub fn new(session: Session, provisioner: Provisioner) -> Self {
        Self {
            session,
            observer: O::new(provisioner.clone()),
            provisioner,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle one inbound text frame
    pub async fn process_frame(&mut self, text: &str) -> Result<(), Error> {
        let peer = self.session.peer().to_string();

        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[{}] Failed to parse message: {} ({})", peer, e, text);
                return Ok(());
            }
        };
        match frame.message_type() {
            MessageType::Call => debug!("[{}] Received request: {}", peer, text),
            MessageType::CallResult => debug!("[{}] Received response: {}", peer, text),
        }

        let message = match self.session.decode::<O::Message>(frame) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("[{}] Ignoring unhandled action", peer);
                return Ok(());
            }
            Err(e) => {
                warn!("[{}] Dropping message: {}", peer, e);
                return Ok(());
            }
        };

        if let Err(violation) = message.validate() {
            warn!("[{}] Message is invalid: {}", peer, violation);
            return Ok(());
        }

        self.observer.on_message(&mut self.session, message).await
    }

    /// Transport failure: record it on the matched device
    pub fn on_error(&mut self, reason: &str) -> Result<(), Error> {
        error!("[{}] An error occurred on connection: {}", self.session.peer(), reason);
        if self.session.device().is_none() {
            return Ok(());
        }
        self.provisioner.update(&mut self.session, |cp| {
            cp.set_error(reason);
            cp.set_status(StatusProcess::Failed);
        })?;
        self.provisioner.notify_process(&self.session);
        Ok(())
    }

    /// Connection closed: mark the device offline, or reset an unmatched one
    pub async fn on_disconnection(&mut self) -> Result<(), Error> {
        info!("[{}] Connection closed", self.session.peer());

        let result = if let Some(cp) = self.session.device_mut() {
            cp.set_online(false);
            let saved = self.provisioner.store().save(cp);
            self.provisioner.notifier().on_status_changed(cp);
            self.provisioner.notifier().on_disconnected(cp);
            saved.map_err(Error::from)
        } else {
            self.observer.on_disconnection(&mut self.session).await
        };

        self.session.clear();
        result
    }
}
