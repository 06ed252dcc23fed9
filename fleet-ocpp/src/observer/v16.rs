//! OCPP 1.6 provisioning
//!
//! Configuration is pushed one `ChangeConfiguration` at a time; each
//! answer releases the next key. Once the plan's keys are drained the
//! last order (identity, then redirect address) is queued, and a hard
//! reset closes the pass.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::{FirmwarePhase, OcppObserver, Provisioner};
use crate::error::Error;
use crate::model::{StatusProcess, Step};
use crate::ocpp::v16::{
    BootNotificationRequest, BootNotificationResponse, ChangeConfigurationRequest, ConfigurationStatus,
    FirmwareStatus, FirmwareStatusNotificationResponse, Message, RegistrationStatus, ResetRequest, ResetResponse,
    ResetStatus, UpdateFirmwareRequest,
};
use crate::ocpp::{Action, Session, Validate};
use crate::transcript::{ConfigKey, FirmwareMajor};

/// Provisioning state machine for one OCPP 1.6 connection
pub struct Observer16 {
    provisioner: Provisioner,
    queue: VecDeque<ChangeConfigurationRequest>,
    /// Firmware version reported at boot
    firmware_version: String,
    loaded: bool,
    last_order_queued: bool,
}

impl OcppObserver for Observer16 {
    type Message = Message;

    fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner,
            queue: VecDeque::new(),
            firmware_version: String::new(),
            loaded: false,
            last_order_queued: false,
        }
    }

    async fn on_message(&mut self, session: &mut Session, message: Message) -> Result<(), Error> {
        match message {
            Message::BootNotification(req) => self.on_boot(session, req).await,
            Message::FirmwareStatusNotification(req) => self.on_firmware_status(session, req.status).await,
            Message::UpdateFirmwareResponse(_) => {
                info!("[{}] UpdateFirmware acknowledged", session.peer());
                Ok(())
            }
            Message::ChangeConfigurationResponse(resp) => self.on_configuration_response(session, resp.status).await,
            Message::ResetResponse(resp) => self.on_reset_response(session, resp),
            Message::Unexpected(action) => {
                debug!("[{}] Unexpected {}, resynchronizing", session.peer(), action);
                self.resync(session).await
            }
        }
    }

    async fn on_disconnection(&mut self, session: &mut Session) -> Result<(), Error> {
        if session.device().is_some() {
            return Ok(());
        }
        self.reset_pass();
        // The socket is usually gone already
        if let Err(e) = self.reset(session).await {
            debug!("[{}] Reset on teardown not sent: {}", session.peer(), e);
        }
        Ok(())
    }
}

impl Observer16 {
    async fn on_boot(&mut self, session: &mut Session, req: BootNotificationRequest) -> Result<(), Error> {
        self.firmware_version = req.firmware_version.clone().unwrap_or_default();
        let serial = req.charge_point_serial_number.as_deref().unwrap_or_default();
        let config = self.provisioner.config();

        if !self.provisioner.authenticate(session, serial, &req.charge_point_vendor)? {
            let response = BootNotificationResponse::new(RegistrationStatus::Rejected, config.rejected_interval_secs());
            return session.send_response(response).await;
        }

        let response = BootNotificationResponse::new(RegistrationStatus::Accepted, config.accepted_interval_secs());
        session.send_response(response).await?;

        self.reset_pass();
        self.advance(session).await
    }

    /// Resume provisioning from the persisted step
    async fn advance(&mut self, session: &mut Session) -> Result<(), Error> {
        let Some(cp) = session.device() else {
            return Ok(());
        };
        if cp.plan().is_none() {
            return self
                .provisioner
                .update(session, |cp| cp.set_status(StatusProcess::Finished));
        }
        match cp.step() {
            Step::Firmware => self.firmware(session).await,
            Step::Configuration => self.configure(session).await,
        }
    }

    async fn firmware(&mut self, session: &mut Session) -> Result<(), Error> {
        match self.provisioner.firmware_step(session, &self.firmware_version)? {
            FirmwarePhase::Install(fw) => {
                session
                    .send_request(Action::UpdateFirmware, UpdateFirmwareRequest::now(fw.url))
                    .await
            }
            FirmwarePhase::Configure => self.configure(session).await,
            FirmwarePhase::Done => Ok(()),
        }
    }

    /// Send the next configuration key, or close the pass
    async fn configure(&mut self, session: &mut Session) -> Result<(), Error> {
        if !self.loaded {
            if let Err(e) = self.load_queue(session) {
                return self.abort_on(session, e);
            }
            self.loaded = true;
        }

        if session.device().map(|cp| cp.status()) != Some(StatusProcess::Processing) {
            self.provisioner
                .update(session, |cp| cp.set_status(StatusProcess::Processing))?;
        }

        loop {
            if let Some(change) = self.queue.pop_front() {
                return session.send_request(Action::ChangeConfiguration, change).await;
            }
            if self.last_order_queued {
                break;
            }
            if let Err(e) = self.queue_last_order(session) {
                return self.abort_on(session, e);
            }
            self.last_order_queued = true;
        }

        self.provisioner.finish_pass(session)?;
        self.reset(session).await
    }

    async fn on_configuration_response(
        &mut self,
        session: &mut Session,
        status: ConfigurationStatus,
    ) -> Result<(), Error> {
        match status {
            ConfigurationStatus::Accepted | ConfigurationStatus::RebootRequired => self.configure(session).await,
            rejected => {
                self.queue.clear();
                self.provisioner.fail_pass(session, &rejected.to_string())
            }
        }
    }

    async fn on_firmware_status(&mut self, session: &mut Session, status: FirmwareStatus) -> Result<(), Error> {
        session.send_response(FirmwareStatusNotificationResponse {}).await?;

        if session.device().is_none() {
            return self.resync(session).await;
        }

        match status {
            FirmwareStatus::Installed => {
                self.provisioner.firmware_installed(session)?;
                self.reset(session).await
            }
            FirmwareStatus::DownloadFailed => {
                self.provisioner
                    .firmware_failed(session, "check the internet connection of the charge point")
                    .await?;
                self.reset(session).await
            }
            FirmwareStatus::InstallationFailed => {
                self.provisioner
                    .firmware_failed(session, "check the firmware URL given to the charge point")
                    .await?;
                self.reset(session).await
            }
            other => {
                debug!("[{}] Firmware status {:?}", session.peer(), other);
                Ok(())
            }
        }
    }

    fn on_reset_response(&mut self, session: &mut Session, resp: ResetResponse) -> Result<(), Error> {
        if resp.status == ResetStatus::Rejected {
            warn!("[{}] Reset rejected by the charge point", session.peer());
        }
        self.provisioner.reset_acknowledged(session)
    }

    /// Re-read the record and pick up from its persisted state
    async fn resync(&mut self, session: &mut Session) -> Result<(), Error> {
        let Some(cp) = session.device() else {
            return self.reset(session).await;
        };
        let fresh = self
            .provisioner
            .store()
            .find_by_identity(cp.serial_number(), cp.vendor())?;
        session.set_device(fresh);

        let Some(cp) = session.device() else {
            return self.reset(session).await;
        };
        match (cp.step(), cp.status()) {
            (Step::Configuration, StatusProcess::Pending) => self.configure(session).await,
            (_, StatusProcess::Failed | StatusProcess::Finished) => {
                self.reset_pass();
                self.firmware(session).await
            }
            _ => self.reset(session).await,
        }
    }

    async fn reset(&mut self, session: &mut Session) -> Result<(), Error> {
        session.send_request(Action::Reset, ResetRequest::hard()).await
    }

    /// Flatten the plan into wire keys for the reported firmware
    fn load_queue(&mut self, session: &Session) -> Result<(), Error> {
        let Some(cp) = session.device() else {
            return Ok(());
        };
        let major = FirmwareMajor::of(&self.firmware_version)?;

        if let Some(plan) = cp.plan() {
            for (key, value) in &plan.settings {
                let change = ChangeConfigurationRequest {
                    key: key.v16_key(major).to_string(),
                    value: key.v16_value(major, value),
                };
                change.validate().map_err(crate::ocpp::OcppError::from)?;
                info!(
                    "Queued {} = {:?} for charge point ({})",
                    change.key,
                    change.value,
                    cp.serial_number()
                );
                self.queue.push_back(change);
            }
        }
        Ok(())
    }

    /// Identity, then the redirect target if one is configured
    fn queue_last_order(&mut self, session: &Session) -> Result<(), Error> {
        let Some(cp) = session.device() else {
            return Ok(());
        };
        let major = FirmwareMajor::of(&self.firmware_version)?;
        info!(
            "Configuration for charge point ({}) is almost done, sending last order",
            cp.serial_number()
        );

        let identity = ConfigKey::ChargePointIdentity;
        self.queue.push_back(ChangeConfigurationRequest {
            key: identity.v16_key(major).to_string(),
            value: identity.v16_value(major, cp.client_id()),
        });

        if let Some(address) = &self.provisioner.config().final_server_address {
            let redirect = ConfigKey::NetworkProfile;
            self.queue.push_back(ChangeConfigurationRequest {
                key: redirect.v16_key(major).to_string(),
                value: redirect.v16_value(major, address),
            });
        }
        Ok(())
    }

    fn abort_on(&mut self, session: &mut Session, error: Error) -> Result<(), Error> {
        match error {
            Error::UnknownFirmware(_) | Error::Ocpp(_) => {
                self.queue.clear();
                self.provisioner.fail_pass(session, &error.to_string())
            }
            other => Err(other),
        }
    }

    fn reset_pass(&mut self) {
        self.queue.clear();
        self.loaded = false;
        self.last_order_queued = false;
    }
}
