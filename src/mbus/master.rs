//! # Master Session Protocol
//!
//! Drives a half-duplex M-Bus line as the bus master. A single link task owns
//! the transport, the packet parser and the per-slave frame count bit (FCB)
//! table; [`MBusMaster`] handles enqueue commands and await the result, so
//! requests never interleave on the wire.
//!
//! Every request waits at most one response timeout. Timeouts, framing errors
//! and unexpected frames lead to the identical request being sent again after
//! the retry delay; when all attempts are used the caller gets
//! [`MBusError::NoResponse`] and the FCB of the slave is left unchanged. A
//! valid reply toggles the FCB exactly once.
//!
//! ```rust,no_run
//! use mbus_master::mbus::master::{MasterConfig, MBusMaster};
//! use mbus_master::mbus::transport::StreamTransport;
//!
//! # async fn run() -> Result<(), mbus_master::MBusError> {
//! let port = tokio::net::TcpStream::connect("10.0.0.5:10001").await?;
//! let master = MBusMaster::spawn(StreamTransport::new(port, 2400), MasterConfig::default());
//! master.init_slave(5).await?;
//! let response = master.read_user_data(5).await?;
//! println!("{}", response.to_json()?);
//! master.close();
//! # Ok(())
//! # }
//! ```

use crate::constants::*;
use crate::error::{FailureCause, MBusError};
use crate::mbus::device::SecondaryAddress;
use crate::mbus::frame::{ControlField, ControlFunction, LongFrameBody, MBusFrame};
use crate::mbus::parser::PacketParser;
use crate::mbus::transport::Transport;
use crate::payload::user_data::UserDataResponse;
use crate::util::logging::{log_frame_hex, LogThrottle};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Bit times budgeted for one exchange: 330 bit times of slave turnaround
/// plus the longest frame (261 characters of 11 bits each).
pub const RESPONSE_BIT_TIMES: u32 = 330 + 11 * MBUS_FRAME_LENGTH_MAX as u32;

const READ_CHUNK: usize = 64;

/// Request used to fetch the follow-up telegrams of a multi-telegram readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationRequest {
    #[default]
    ReqUd1,
    ReqUd2,
}

/// Link settings. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Overrides the line speed reported by the transport.
    pub baud_rate: Option<u32>,
    /// Retries after the first attempt of a request.
    pub max_retries: u32,
    /// Multiplier applied to the computed line timeout.
    pub safety_factor: f64,
    /// Added to the computed line timeout, e.g. for gateway latency.
    pub response_timeout_offset_ms: u64,
    /// Replaces the computed timeout entirely.
    pub response_timeout_override_ms: Option<u64>,
    pub retry_delay_ms: u64,
    /// Quiet period after SND_NKE during which replies are discarded.
    pub settle_time_ms: u64,
    /// Upper bound of telegrams in one `read_user_data` call.
    pub max_packages: usize,
    pub continuation: ContinuationRequest,
    pub queue_capacity: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            baud_rate: None,
            max_retries: 3,
            safety_factor: 1.0,
            response_timeout_offset_ms: 50,
            response_timeout_override_ms: None,
            retry_delay_ms: 50,
            settle_time_ms: 100,
            max_packages: 16,
            continuation: ContinuationRequest::default(),
            queue_capacity: 32,
        }
    }
}

impl MasterConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_safety_factor(mut self, factor: f64) -> Self {
        self.safety_factor = factor;
        self
    }

    pub fn with_response_timeout_offset(mut self, offset: Duration) -> Self {
        self.response_timeout_offset_ms = offset.as_millis() as u64;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_override_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle_time_ms = settle.as_millis() as u64;
        self
    }

    pub fn with_max_packages(mut self, max_packages: usize) -> Self {
        self.max_packages = max_packages;
        self
    }

    pub fn with_continuation(mut self, continuation: ContinuationRequest) -> Self {
        self.continuation = continuation;
        self
    }

    /// Response timeout for a line running at `transport_baud_rate`, unless
    /// `baud_rate` or an override is configured.
    pub fn response_timeout(&self, transport_baud_rate: u32) -> Duration {
        if let Some(ms) = self.response_timeout_override_ms {
            return Duration::from_millis(ms);
        }
        let baud = self.baud_rate.unwrap_or(transport_baud_rate).max(1);
        let secs = f64::from(RESPONSE_BIT_TIMES) / f64::from(baud) * self.safety_factor.max(0.0);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .saturating_add(Duration::from_millis(self.response_timeout_offset_ms))
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }
}

/// Link-layer state the master keeps per slave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceLinkState {
    /// FCB to use in the next request.
    pub fcb: bool,
    /// Access demand flag of the last reply.
    pub acd: bool,
    /// Data flow control flag of the last reply.
    pub dfc: bool,
    /// Attempts used by the last completed cycle.
    pub last_attempts: u32,
    /// Completed request/response cycles.
    pub cycles: u64,
}

impl Default for DeviceLinkState {
    fn default() -> Self {
        Self {
            fcb: true,
            acd: false,
            dfc: false,
            last_attempts: 0,
            cycles: 0,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, MBusError>>;

#[derive(Debug)]
enum Command {
    InitSlave {
        address: u8,
        reply: Reply<()>,
    },
    RequestFrame {
        address: u8,
        fcb: Option<bool>,
        reply: Reply<MBusFrame>,
    },
    ReadUserData {
        address: u8,
        reply: Reply<UserDataResponse>,
    },
    SendUserData {
        address: u8,
        control_information: u8,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    SelectSecondary {
        secondary: SecondaryAddress,
        reply: Reply<()>,
    },
    LinkState {
        address: u8,
        reply: Reply<DeviceLinkState>,
    },
}

/// Handle to a running link task. Clones share the same line.
#[derive(Debug, Clone)]
pub struct MBusMaster {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl MBusMaster {
    /// Starts the link task on the current tokio runtime.
    pub fn spawn<T>(transport: T, config: MasterConfig) -> Self
    where
        T: Transport + 'static,
    {
        let (commands, rx) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let link = Link::new(transport, config);
        tokio::spawn(link.run(rx, cancel.clone()));
        Self { commands, cancel }
    }

    async fn call<R>(&self, command: impl FnOnce(Reply<R>) -> Command) -> Result<R, MBusError> {
        if self.cancel.is_cancelled() {
            return Err(MBusError::Cancelled);
        }
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| MBusError::Cancelled)?;
        rx.await.map_err(|_| MBusError::Cancelled)?
    }

    /// Sends SND_NKE and resets the FCB of `address` (of every slave for the
    /// broadcast address 255).
    pub async fn init_slave(&self, address: u8) -> Result<(), MBusError> {
        self.call(|reply| Command::InitSlave { address, reply }).await
    }

    /// REQ_UD2 with the tracked FCB; returns the validated RSP_UD frame
    /// whatever its CI.
    pub async fn request_frame(&self, address: u8) -> Result<MBusFrame, MBusError> {
        self.call(|reply| Command::RequestFrame {
            address,
            fcb: None,
            reply,
        })
        .await
    }

    /// One REQ_UD2/RSP_UD cycle returning the variable data response.
    ///
    /// A valid RSP_UD without variable data completes the link cycle (the FCB
    /// toggles) and is reported as [`MBusError::NoVariableData`]; a new call
    /// is a new request, not a link-layer repetition.
    pub async fn request_user_data(&self, address: u8) -> Result<UserDataResponse, MBusError> {
        let frame = self
            .call(|reply| Command::RequestFrame {
                address,
                fcb: None,
                reply,
            })
            .await?;
        into_user_data(address, frame)
    }

    /// Like [`request_user_data`](Self::request_user_data) with an explicit
    /// FCB. The tracked FCB becomes the inverse of `fcb` on success.
    pub async fn request_user_data_with_fcb(
        &self,
        address: u8,
        fcb: bool,
    ) -> Result<UserDataResponse, MBusError> {
        let frame = self
            .call(|reply| Command::RequestFrame {
                address,
                fcb: Some(fcb),
                reply,
            })
            .await?;
        into_user_data(address, frame)
    }

    /// Reads telegrams until the slave reports the last one and merges them.
    pub async fn read_user_data(&self, address: u8) -> Result<UserDataResponse, MBusError> {
        self.call(|reply| Command::ReadUserData { address, reply }).await
    }

    /// SND_UD with application data; the slave must acknowledge with 0xE5.
    /// Sending to 255 does not wait for a reply.
    pub async fn send_user_data(
        &self,
        address: u8,
        control_information: u8,
        data: &[u8],
    ) -> Result<(), MBusError> {
        let data = data.to_vec();
        self.call(|reply| Command::SendUserData {
            address,
            control_information,
            data,
            reply,
        })
        .await
    }

    /// Selects a slave by secondary address so it answers at address 253.
    pub async fn select_secondary(&self, secondary: SecondaryAddress) -> Result<(), MBusError> {
        self.call(|reply| Command::SelectSecondary { secondary, reply })
            .await
    }

    pub async fn link_state(&self, address: u8) -> Result<DeviceLinkState, MBusError> {
        self.call(|reply| Command::LinkState { address, reply }).await
    }

    /// Stops the link task. Pending and later calls fail with
    /// [`MBusError::Cancelled`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }
}

fn into_user_data(address: u8, frame: MBusFrame) -> Result<UserDataResponse, MBusError> {
    let control_information = frame.control_information().unwrap_or_default();
    frame.into_user_data().ok_or(MBusError::NoVariableData {
        address,
        control_information,
    })
}

fn check_reply_address(address: u8) -> Result<(), MBusError> {
    if address == MBUS_ADDRESS_BROADCAST_NOREPLY {
        Err(MBusError::InvalidAddress(address))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Ack,
    UserData,
}

/// Runs `op` unless the caller goes away or the master is closed.
async fn complete<R, F>(cancel: &CancellationToken, mut reply: Reply<R>, op: F)
where
    F: Future<Output = Result<R, MBusError>>,
{
    let result = tokio::select! {
        result = op => result,
        _ = reply.closed() => {
            debug!("caller dropped its request, exchange abandoned");
            return;
        }
        _ = cancel.cancelled() => Err(MBusError::Cancelled),
    };
    let _ = reply.send(result);
}

struct Link<T> {
    transport: T,
    parser: PacketParser,
    config: MasterConfig,
    response_timeout: Duration,
    devices: HashMap<u8, DeviceLinkState>,
    framing_log: LogThrottle,
}

impl<T: Transport> Link<T> {
    fn new(transport: T, config: MasterConfig) -> Self {
        let response_timeout = config.response_timeout(transport.baud_rate());
        debug!("response timeout {response_timeout:?}");
        Self {
            transport,
            parser: PacketParser::new(),
            config,
            response_timeout,
            devices: HashMap::new(),
            framing_log: LogThrottle::new(1000, 5),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.dispatch(command, &cancel).await;
        }
        info!(
            "M-Bus link stopped after {} frames ({} framing errors)",
            self.parser.frames_decoded(),
            self.parser.framing_errors()
        );
    }

    async fn dispatch(&mut self, command: Command, cancel: &CancellationToken) {
        match command {
            Command::InitSlave { address, reply } => {
                complete(cancel, reply, self.init_slave(address)).await
            }
            Command::RequestFrame { address, fcb, reply } => {
                complete(cancel, reply, self.request(address, fcb, ControlField::req_ud2)).await
            }
            Command::ReadUserData { address, reply } => {
                complete(cancel, reply, self.read_user_data(address)).await
            }
            Command::SendUserData {
                address,
                control_information,
                data,
                reply,
            } => {
                let op = self.send_user_data(address, control_information, &data);
                complete(cancel, reply, op).await
            }
            Command::SelectSecondary { secondary, reply } => {
                complete(cancel, reply, self.select_secondary(secondary)).await
            }
            Command::LinkState { address, reply } => {
                let _ = reply.send(Ok(self.devices.get(&address).copied().unwrap_or_default()));
            }
        }
    }

    fn next_fcb(&self, address: u8) -> bool {
        self.devices.get(&address).map_or(true, |state| state.fcb)
    }

    /// Records a completed cycle. No await may happen between a validated
    /// reply and this call.
    fn finish_cycle(&mut self, address: u8, used_fcb: bool, reply: &MBusFrame, attempts: u32) {
        let state = self.devices.entry(address).or_default();
        state.fcb = !used_fcb;
        state.last_attempts = attempts;
        state.cycles += 1;
        if let Some(control) = reply.control() {
            state.acd = control.acd();
            state.dfc = control.dfc();
            if control.acd() {
                info!("slave 0x{address:02X} signals access demand");
            }
        }
    }

    async fn write_frame(&mut self, frame: &MBusFrame) -> Result<(), MBusError> {
        let bytes = frame.to_bytes()?;
        log_frame_hex("TX", &bytes);
        self.transport.write(&bytes).await
    }

    async fn init_slave(&mut self, address: u8) -> Result<(), MBusError> {
        let frame = MBusFrame::Short {
            control: ControlField::snd_nke(),
            address,
        };
        self.drain().await?;
        self.write_frame(&frame).await?;

        if address == MBUS_ADDRESS_BROADCAST_NOREPLY {
            self.devices.clear();
        } else {
            self.devices.entry(address).or_default().fcb = true;
        }

        let deadline = Instant::now() + self.config.settle_time();
        let mut buf = [0u8; READ_CHUNK];
        while let Ok(read) = timeout_at(deadline, self.transport.read(&mut buf)).await {
            let n = read?;
            if n == 0 {
                break;
            }
            log_frame_hex("RX (settle)", &buf[..n]);
        }
        self.parser.reset();
        debug!("slave 0x{address:02X} initialized");
        Ok(())
    }

    async fn request(
        &mut self,
        address: u8,
        fcb: Option<bool>,
        control: fn(bool) -> ControlField,
    ) -> Result<MBusFrame, MBusError> {
        check_reply_address(address)?;
        let fcb = fcb.unwrap_or_else(|| self.next_fcb(address));
        let request = MBusFrame::Short {
            control: control(fcb),
            address,
        };
        let (frame, attempts) = self.transact(address, &request, Expect::UserData).await?;
        self.finish_cycle(address, fcb, &frame, attempts);
        Ok(frame)
    }

    async fn read_user_data(&mut self, address: u8) -> Result<UserDataResponse, MBusError> {
        let frame = self.request(address, None, ControlField::req_ud2).await?;
        let mut response = into_user_data(address, frame)?;
        let mut packages = 1;
        let mut last = response.is_last_package();

        let continuation: fn(bool) -> ControlField = match self.config.continuation {
            ContinuationRequest::ReqUd1 => ControlField::req_ud1,
            ContinuationRequest::ReqUd2 => ControlField::req_ud2,
        };
        while !last {
            if packages >= self.config.max_packages {
                return Err(MBusError::ProtocolViolation {
                    address,
                    detail: format!("more than {} telegrams announced", self.config.max_packages),
                });
            }
            let frame = self.request(address, None, continuation).await?;
            let next = into_user_data(address, frame)?;
            packages += 1;
            last = next.is_last_package();
            debug!(
                "telegram {packages} from 0x{address:02X}: {} records",
                next.data_block_count()
            );
            response.append(next);
        }
        Ok(response)
    }

    async fn send_user_data(
        &mut self,
        address: u8,
        control_information: u8,
        data: &[u8],
    ) -> Result<(), MBusError> {
        if address == MBUS_ADDRESS_BROADCAST_NOREPLY {
            let frame = MBusFrame::long(ControlField::snd_ud(false), address, control_information, data);
            self.drain().await?;
            return self.write_frame(&frame).await;
        }
        let fcb = self.next_fcb(address);
        let frame = MBusFrame::long(ControlField::snd_ud(fcb), address, control_information, data);
        let (reply, attempts) = self.transact(address, &frame, Expect::Ack).await?;
        self.finish_cycle(address, fcb, &reply, attempts);
        Ok(())
    }

    async fn select_secondary(&mut self, secondary: SecondaryAddress) -> Result<(), MBusError> {
        let address = MBUS_ADDRESS_NETWORK_LAYER;
        let fcb = self.next_fcb(address);
        let frame = MBusFrame::Long {
            control: ControlField::snd_ud(fcb),
            address,
            control_information: MBUS_CONTROL_INFO_SELECT_SLAVE,
            body: LongFrameBody::SelectionOfSlave(secondary),
        };
        let (reply, attempts) = self.transact(address, &frame, Expect::Ack).await?;
        self.finish_cycle(address, fcb, &reply, attempts);
        Ok(())
    }

    /// Sends `request` until a valid reply arrives or the retries are used
    /// up. Returns the reply and the number of attempts.
    async fn transact(
        &mut self,
        address: u8,
        request: &MBusFrame,
        expect: Expect,
    ) -> Result<(MBusFrame, u32), MBusError> {
        let bytes = request.to_bytes()?;
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_cause = FailureCause::Timeout;

        for attempt in 1..=attempts {
            if attempt > 1 {
                warn!("retrying 0x{address:02X} ({attempt}/{attempts}) after {last_cause}");
                sleep(self.config.retry_delay()).await;
            }
            self.drain().await?;
            log_frame_hex("TX", &bytes);
            self.transport.write(&bytes).await?;
            match self.await_frame(address, expect).await? {
                Ok(frame) => return Ok((frame, attempt)),
                Err(cause) => last_cause = cause,
            }
        }

        error!("no valid response from 0x{address:02X} after {attempts} attempts: {last_cause}");
        Err(MBusError::NoResponse {
            address,
            attempts,
            last_cause,
        })
    }

    /// Discards stale input and parser state before a transmission.
    async fn drain(&mut self) -> Result<(), MBusError> {
        let mut buf = [0u8; READ_CHUNK];
        let mut discarded = 0;
        while let Ok(read) = timeout(Duration::ZERO, self.transport.read(&mut buf)).await {
            let n = read?;
            if n == 0 {
                break;
            }
            discarded += n;
        }
        if discarded > 0 {
            debug!("discarded {discarded} stale bytes");
        }
        self.parser.reset();
        Ok(())
    }

    /// Reads until a frame is complete or the response timeout expires.
    /// Framing errors keep the wait going; they only become the failure
    /// cause when nothing valid follows before the deadline.
    async fn await_frame(
        &mut self,
        address: u8,
        expect: Expect,
    ) -> Result<Result<MBusFrame, FailureCause>, MBusError> {
        let deadline = Instant::now() + self.response_timeout;
        let mut framing = None;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let n = match timeout_at(deadline, self.transport.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    return Ok(Err(framing.map_or(FailureCause::Timeout, FailureCause::Framing)))
                }
            };
            log_frame_hex("RX", &buf[..n]);

            for &byte in &buf[..n] {
                if self.parser.add_byte(byte) {
                    if let Some(frame) = self.parser.take_frame() {
                        return Ok(validate(address, expect, frame));
                    }
                }
                if let Some(err) = self.parser.take_error() {
                    crate::log_warn_throttled!(
                        self.framing_log,
                        "framing error from 0x{address:02X}: {err}"
                    );
                    framing = Some(err);
                }
            }
        }
    }
}

/// Checks that `frame` is an acceptable reply to a request sent to `address`.
fn validate(address: u8, expect: Expect, frame: MBusFrame) -> Result<MBusFrame, FailureCause> {
    let violation = |detail: String| Err(FailureCause::ProtocolViolation(detail));

    if let Some(control) = frame.control() {
        if control.is_from_master() {
            return violation(format!("echo of a master frame ({control:?})"));
        }
    }

    match expect {
        Expect::Ack if frame.is_ack() => Ok(frame),
        Expect::Ack => violation(format!("expected acknowledgment, got {:?} frame", frame.frame_type())),
        Expect::UserData => match &frame {
            MBusFrame::Long {
                control,
                address: from,
                ..
            } => {
                if control.function() != ControlFunction::RspUd {
                    return violation(format!("unexpected control field {control:?}"));
                }
                let any_sender =
                    address == MBUS_ADDRESS_NETWORK_LAYER || address == MBUS_ADDRESS_BROADCAST_REPLY;
                if *from != address && !any_sender {
                    return violation(format!("response from 0x{from:02X}"));
                }
                Ok(frame)
            }
            other => violation(format!("expected RSP_UD, got {:?} frame", other.frame_type())),
        },
    }
}
