//! Per-connection message correlation
//!
//! A session tracks, for one live connection:
//! - the current message id (adopted from device requests, bumped on each response)
//! - the single request awaiting the device's answer
//! - the device record matched at boot, if any
//!
//! OCPP-J responses do not name their action, so a response can only be
//! decoded against the pending request.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::messages::{Action, Call, CallResult, DecodeMessage, Frame, MessageId, OcppError};
use crate::error::Error;
use crate::model::ChargePoint;

/// First message id of a fresh session
const INITIAL_MESSAGE_ID: MessageId = 1;

/// Correlation state of one connection
#[derive(Debug)]
pub struct Session {
    peer: String,
    current_id: MessageId,
    pending: Option<Call>,
    device: Option<ChargePoint>,
    outgoing: mpsc::Sender<String>,
}

impl Session {
    /// Create a session writing frames to `outgoing`
    pub fn new(peer: impl Into<String>, outgoing: mpsc::Sender<String>) -> Self {
        Self {
            peer: peer.into(),
            current_id: INITIAL_MESSAGE_ID,
            pending: None,
            device: None,
            outgoing,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn current_id(&self) -> MessageId {
        self.current_id
    }

    /// Request still waiting for an answer
    pub fn pending_request(&self) -> Option<&Call> {
        self.pending.as_ref()
    }

    pub fn device(&self) -> Option<&ChargePoint> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut ChargePoint> {
        self.device.as_mut()
    }

    /// Replace the matched device. Pending-request state is left alone.
    pub fn set_device(&mut self, device: Option<ChargePoint>) {
        self.device = device;
    }

    /// Decode an inbound frame into version-scoped messages.
    ///
    /// A request adopts the device's message id. A response consumes the
    /// pending request and bumps the id; with nothing pending it is an
    /// [`OcppError::UnsolicitedResponse`].
    pub fn decode<M: DecodeMessage>(&mut self, frame: Frame) -> Result<Option<M>, OcppError> {
        match frame {
            Frame::Call(call) => {
                self.current_id = call.message_id;
                M::from_call(&call)
            }
            Frame::CallResult(result) => {
                let request = self
                    .pending
                    .take()
                    .ok_or(OcppError::UnsolicitedResponse(result.message_id))?;
                if request.message_id != result.message_id {
                    debug!(
                        "[{}] Response id {} answers request {} ({})",
                        self.peer, result.message_id, request.message_id, request.action
                    );
                }
                self.current_id = next_id(self.current_id)?;
                M::from_result(&request, &result)
            }
        }
    }

    /// Send a request stamped with the current id and mark it pending
    pub async fn send_request(&mut self, action: Action, payload: impl Serialize) -> Result<(), Error> {
        let call = Call::new(self.current_id, action, payload)?;
        let text = call.to_text()?;

        if let Some(previous) = self.pending.replace(call) {
            warn!(
                "[{}] {} {} superseded before being answered",
                self.peer, previous.action, previous.message_id
            );
        }

        debug!("[{}] -> {}", self.peer, text);
        self.outgoing
            .send(text)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Answer the device's current request
    pub async fn send_response(&mut self, payload: impl Serialize) -> Result<(), Error> {
        let result = CallResult::new(self.current_id, payload)?;
        let text = result.to_text()?;
        self.current_id = next_id(self.current_id)?;

        debug!("[{}] -> {}", self.peer, text);
        self.outgoing
            .send(text)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Drop all in-memory state; used at teardown
    pub fn clear(&mut self) {
        self.pending = None;
        self.device = None;
    }
}

fn next_id(id: MessageId) -> Result<MessageId, OcppError> {
    id.checked_add(1)
        .ok_or_else(|| OcppError::InvalidMessageId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpp::v16::{self, Message};
    use serde_json::json;

    fn session() -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (Session::new("127.0.0.1:50000", tx), rx)
    }

    #[tokio::test]
    async fn test_request_is_stamped_and_pending() {
        let (mut session, mut rx) = session();

        session
            .send_request(Action::Reset, v16::ResetRequest::hard())
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), r#"[2,"1","Reset",{"type":"Hard"}]"#);
        assert_eq!(session.pending_request().unwrap().action, Action::Reset);
        assert_eq!(session.current_id(), 1);
    }

    #[tokio::test]
    async fn test_device_request_adopts_id() {
        let (mut session, mut rx) = session();
        let frame = Frame::parse(r#"[2,"42","FirmwareStatusNotification",{"status":"Installing"}]"#).unwrap();

        let message: Option<Message> = session.decode(frame).unwrap();
        assert!(matches!(message, Some(Message::FirmwareStatusNotification(_))));
        assert_eq!(session.current_id(), 42);

        session.send_response(json!({})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"[3,"42",{}]"#);
        assert_eq!(session.current_id(), 43);
    }

    #[tokio::test]
    async fn test_response_consumes_pending() {
        let (mut session, _rx) = session();
        session
            .send_request(Action::Reset, v16::ResetRequest::hard())
            .await
            .unwrap();

        let frame = Frame::parse(r#"[3,"1",{"status":"Accepted"}]"#).unwrap();
        let message: Option<Message> = session.decode(frame).unwrap();

        assert!(matches!(message, Some(Message::ResetResponse(_))));
        assert!(session.pending_request().is_none());
        assert_eq!(session.current_id(), 2);
    }

    #[test]
    fn test_unsolicited_response() {
        let (mut session, _rx) = session();
        let frame = Frame::parse(r#"[3,"9",{"status":"Accepted"}]"#).unwrap();

        let result = session.decode::<Message>(frame);
        assert!(matches!(result, Err(OcppError::UnsolicitedResponse(9))));
        assert_eq!(session.current_id(), 1);
    }

    #[tokio::test]
    async fn test_at_most_one_in_flight() {
        let (mut session, _rx) = session();
        session
            .send_request(Action::UpdateFirmware, v16::UpdateFirmwareRequest::now("http://fw/6.1"))
            .await
            .unwrap();
        session
            .send_request(Action::Reset, v16::ResetRequest::hard())
            .await
            .unwrap();

        assert_eq!(session.pending_request().unwrap().action, Action::Reset);

        let answer = Frame::parse(r#"[3,"1",{"status":"Accepted"}]"#).unwrap();
        assert!(session.decode::<Message>(answer).is_ok());
        let second = Frame::parse(r#"[3,"1",{"status":"Accepted"}]"#).unwrap();
        assert!(matches!(
            session.decode::<Message>(second),
            Err(OcppError::UnsolicitedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_message_id_never_overflows() {
        let (mut session, mut rx) = session();
        let text = format!(
            r#"[2,"{}","FirmwareStatusNotification",{{"status":"Idle"}}]"#,
            MessageId::MAX - 1
        );
        let _: Option<Message> = session.decode(Frame::parse(&text).unwrap()).unwrap();

        session.send_response(json!({})).await.unwrap();
        assert_eq!(session.current_id(), MessageId::MAX);
        rx.recv().await.unwrap();

        let result = session.send_response(json!({})).await;
        assert!(matches!(result, Err(Error::Ocpp(OcppError::InvalidMessageId(_)))));
        assert_eq!(session.current_id(), MessageId::MAX);
        assert!(rx.try_recv().is_err());

        session
            .send_request(Action::Reset, v16::ResetRequest::hard())
            .await
            .unwrap();
        let answer = Frame::CallResult(CallResult::new(MessageId::MAX, json!({"status": "Accepted"})).unwrap());
        assert!(matches!(
            session.decode::<Message>(answer),
            Err(OcppError::InvalidMessageId(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (mut session, rx) = session();
        drop(rx);

        let result = session.send_response(json!({})).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_set_device_keeps_pending() {
        let (mut session, _rx) = session();
        session.pending = Some(Call::new(1, Action::Reset, json!({"type": "Hard"})).unwrap());

        session.set_device(Some(ChargePoint::new(1, "ACE1", "Alfen BV", "NG920", "cp")));
        assert!(session.pending_request().is_some());

        session.clear();
        assert!(session.device().is_none());
        assert!(session.pending_request().is_none());
    }
}
