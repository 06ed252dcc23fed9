//! OCPP 2.0.1 provisioning
//!
//! Same firmware stepping as 1.6. Configuration goes out as a single
//! `SetVariables` batch; the pass fails if any variable is not accepted.

use tracing::{debug, info, warn};

use super::{FirmwarePhase, OcppObserver, Provisioner};
use crate::error::Error;
use crate::model::{StatusProcess, Step};
use crate::ocpp::v201::{
    BootNotificationRequest, BootNotificationResponse, FirmwareStatus, FirmwareStatusNotificationResponse,
    Message, RegistrationStatus, ResetRequest, ResetStatus, SetVariableData, SetVariableStatus,
    SetVariablesRequest, SetVariablesResponse, UpdateFirmwareRequest, UpdateFirmwareStatus,
};
use crate::ocpp::{Action, OcppError, Session, Validate};
use crate::transcript::ConfigKey;

/// Provisioning state machine for one OCPP 2.0.1 connection
pub struct Observer201 {
    provisioner: Provisioner,
    firmware_version: String,
    /// `requestId` of the last UpdateFirmware
    firmware_request_id: i32,
}

impl OcppObserver for Observer201 {
    type Message = Message;

    fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner,
            firmware_version: String::new(),
            firmware_request_id: 0,
        }
    }

    async fn on_message(&mut self, session: &mut Session, message: Message) -> Result<(), Error> {
        match message {
            Message::BootNotification(req) => self.on_boot(session, req).await,
            Message::FirmwareStatusNotification(req) => self.on_firmware_status(session, req.status).await,
            Message::UpdateFirmwareResponse(resp) => {
                if resp.status == UpdateFirmwareStatus::Accepted {
                    info!("[{}] UpdateFirmware acknowledged", session.peer());
                } else {
                    warn!("[{}] UpdateFirmware answered {:?}", session.peer(), resp.status);
                }
                Ok(())
            }
            Message::SetVariablesResponse(resp) => self.on_set_variables_response(session, resp),
            Message::ResetResponse(resp) => {
                if resp.status == ResetStatus::Rejected {
                    warn!("[{}] Reset rejected by the charging station", session.peer());
                }
                self.provisioner.reset_acknowledged(session)
            }
            Message::Unexpected(action) => {
                debug!("[{}] Ignoring unexpected {}", session.peer(), action);
                Ok(())
            }
        }
    }

    async fn on_disconnection(&mut self, session: &mut Session) -> Result<(), Error> {
        if session.device().is_some() {
            return Ok(());
        }
        if let Err(e) = self.reset(session).await {
            debug!("[{}] Reset on teardown not sent: {}", session.peer(), e);
        }
        Ok(())
    }
}

impl Observer201 {
    async fn on_boot(&mut self, session: &mut Session, req: BootNotificationRequest) -> Result<(), Error> {
        let station = req.charging_station;
        self.firmware_version = station.firmware_version.clone().unwrap_or_default();
        let serial = station.serial_number.as_deref().unwrap_or_default();
        let config = self.provisioner.config();

        if !self.provisioner.authenticate(session, serial, &station.vendor_name)? {
            let response = BootNotificationResponse::new(RegistrationStatus::Rejected, config.rejected_interval_secs());
            return session.send_response(response).await;
        }

        let response = BootNotificationResponse::new(RegistrationStatus::Accepted, config.accepted_interval_secs());
        session.send_response(response).await?;

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
                self.firmware_request_id += 1;
                let request = UpdateFirmwareRequest::now(self.firmware_request_id, fw.url);
                session.send_request(Action::UpdateFirmware, request).await
            }
            FirmwarePhase::Configure => self.configure(session).await,
            FirmwarePhase::Done => Ok(()),
        }
    }

    /// Send the whole plan, plus the identity, in one batch
    async fn configure(&mut self, session: &mut Session) -> Result<(), Error> {
        let batch = match self.build_batch(session) {
            Ok(batch) => batch,
            Err(e) => return self.provisioner.fail_pass(session, &e.to_string()),
        };

        self.provisioner
            .update(session, |cp| cp.set_status(StatusProcess::Processing))?;
        let request = SetVariablesRequest {
            set_variable_data: batch,
        };
        session.send_request(Action::SetVariables, request).await
    }

    fn build_batch(&self, session: &Session) -> Result<Vec<SetVariableData>, OcppError> {
        let Some(cp) = session.device() else {
            return Ok(Vec::new());
        };
        let mut batch = Vec::new();

        if let Some(plan) = cp.plan() {
            for (key, value) in &plan.settings {
                match (*key, key.v201_variable()) {
                    // Written last from the record's client id
                    (ConfigKey::ChargePointIdentity, _) => {}
                    (_, Some((component, variable))) => {
                        batch.push(SetVariableData::new(component, variable, value.as_str()))
                    }
                    (_, None) => info!(
                        "{} has no OCPP 2.0.1 variable, skipped for charge point ({})",
                        key,
                        cp.serial_number()
                    ),
                }
            }
        }

        if let Some((component, variable)) = ConfigKey::ChargePointIdentity.v201_variable() {
            batch.push(SetVariableData::new(component, variable, cp.client_id()));
        }
        if self.provisioner.config().final_server_address.is_some() {
            debug!("Redirect address has no OCPP 2.0.1 variable, skipped");
        }

        for data in &batch {
            data.validate()?;
        }
        info!(
            "Sending {} variables to charge point ({})",
            batch.len(),
            cp.serial_number()
        );
        Ok(batch)
    }

    fn on_set_variables_response(&mut self, session: &mut Session, resp: SetVariablesResponse) -> Result<(), Error> {
        let failures: Vec<String> = resp
            .set_variable_result
            .iter()
            .filter(|result| result.attribute_status != SetVariableStatus::Accepted)
            .map(|result| result.describe())
            .collect();

        if failures.is_empty() {
            self.provisioner.finish_pass(session)
        } else {
            self.provisioner.fail_pass(session, &failures.join("\n"))
        }
    }

    async fn on_firmware_status(&mut self, session: &mut Session, status: FirmwareStatus) -> Result<(), Error> {
        session.send_response(FirmwareStatusNotificationResponse {}).await?;

        if session.device().is_none() {
            debug!("[{}] Firmware status {:?} before boot", session.peer(), status);
            return Ok(());
        }

        match status {
            FirmwareStatus::Installed => {
                self.provisioner.firmware_installed(session)?;
                self.reset(session).await
            }
            FirmwareStatus::DownloadFailed => {
                self.provisioner
                    .firmware_failed(session, "check the internet connection of the charging station")
                    .await?;
                self.reset(session).await
            }
            FirmwareStatus::InstallationFailed
            | FirmwareStatus::InstallVerificationFailed
            | FirmwareStatus::InvalidSignature => {
                self.provisioner
                    .firmware_failed(session, "check the firmware URL given to the charging station")
                    .await?;
                self.reset(session).await
            }
            other => {
                debug!("[{}] Firmware status {:?}", session.peer(), other);
                Ok(())
            }
        }
    }

    async fn reset(&mut self, session: &mut Session) -> Result<(), Error> {
        session.send_request(Action::Reset, ResetRequest::immediate()).await
    }
}
