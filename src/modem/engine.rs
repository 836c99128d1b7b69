//! The modem session engine.
//!
//! A cooperative state machine ticked by the host's `run()` call. Each
//! tick ingests UART bytes (line replies or a granted binary window),
//! folds completed lines into the session state, and - when no reply is
//! outstanding - advances the send machine by at most one AT command.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicU8, Ordering};

use heapless::String;

use crate::modem::dialect::ModemDialect;
use crate::modem::line::LineBuffer;
use crate::modem::parse::{self, DnsReply};
use crate::modem::{
    Config, ConnectionPhase, IdKind, APN_MAX_LENGTH, CMD_MAX_LENGTH, CONNECT_PENDING,
    DATA_PENDING, DISCONNECT_PENDING, HOST_MAX_LENGTH, IDSTRING_MAX_LENGTH, IP_CONNECTED,
    IP_MAX_LENGTH, LINE_MAX_LENGTH, LINE_READ, RESET_PENDING, RSSI_PENDING, RSSI_UNKNOWN,
    RX_HEADER_RESERVE, SEND_COMMAND_RESERVE, SERIAL_LOCKED,
};
use crate::platform::SerialOps;
use crate::ring::CircularBuffer;

const OK_REPLY: &str = "OK";
const DATA_PROMPT: &str = ">";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SendState {
    Idle,
    Probe,
    EchoOff,
    NetworkStatus,
    AttachStatus,
    SetApn,
    ActivateBearer,
    QueryLocalAddress,
    EnableReceiveMode,
    ResolveHost,
    OpenSocket,
    FinalizeConnect,
    Steady,
    SendingPayload,
    Closing,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ReplyState {
    None,
    NetworkStatus,
    AttachStatus,
    LocalAddress,
    Dns,
    RxPending,
    RxGrant,
    Csq,
    Identity,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IdRequest {
    None,
    Requested(IdKind),
    AwaitingReply,
    Ready,
}

pub struct GsmEngine<S: SerialOps, const READ_CAP: usize, const WRITE_CAP: usize> {
    serial: S,
    dialect: &'static ModemDialect,
    config: Config,

    read_buffer: CircularBuffer<u8, READ_CAP>,
    write_buffer: CircularBuffer<u8, WRITE_CAP>,
    line: LineBuffer,

    flags: AtomicU8,
    phase: ConnectionPhase,
    send_state: SendState,
    reply_state: ReplyState,
    /// Resumption point when an in-flight command is answered with
    /// `ERROR` and retried.
    resend_state: SendState,
    wait_for_reply: Option<&'static str>,
    reply_ticks: u32,
    retry_count: u8,
    registration_polls: u16,

    bytes_to_write: u16,
    bytes_to_receive: u16,
    bytes_to_read: u16,

    apn: String<APN_MAX_LENGTH>,
    host: String<HOST_MAX_LENGTH>,
    port: u16,
    ip: String<IP_MAX_LENGTH>,

    rssi: u8,
    id_request: IdRequest,
    id_string: String<IDSTRING_MAX_LENGTH>,
}

impl<S: SerialOps, const READ_CAP: usize, const WRITE_CAP: usize>
    GsmEngine<S, READ_CAP, WRITE_CAP>
{
    pub fn new(serial: S, dialect: &'static ModemDialect, config: Config) -> Self {
        let mut engine = Self {
            serial,
            dialect,
            config,
            read_buffer: CircularBuffer::new(),
            write_buffer: CircularBuffer::new(),
            line: LineBuffer::new(),
            flags: AtomicU8::new(LINE_READ),
            phase: ConnectionPhase::NotConnected,
            send_state: SendState::Idle,
            reply_state: ReplyState::None,
            resend_state: SendState::Idle,
            wait_for_reply: None,
            reply_ticks: 0,
            retry_count: 0,
            registration_polls: 0,
            bytes_to_write: 0,
            bytes_to_receive: 0,
            bytes_to_read: 0,
            apn: String::new(),
            host: String::new(),
            port: 0,
            ip: String::new(),
            rssi: RSSI_UNKNOWN,
            id_request: IdRequest::None,
            id_string: String::new(),
        };
        engine.reset_states();
        engine
    }

    /// Rewinds every counter, flag and sub-state; flushes both
    /// application rings and the serial receive queue.
    pub fn reset_states(&mut self) {
        self.serial.flush_receive_buffers();
        self.read_buffer.flush();
        self.write_buffer.flush();
        self.line.reset();
        self.flags.store(LINE_READ, Ordering::Relaxed);
        self.set_phase(ConnectionPhase::NotConnected);
        self.send_state = SendState::Idle;
        self.reply_state = ReplyState::None;
        self.resend_state = SendState::Idle;
        self.wait_for_reply = None;
        self.reply_ticks = 0;
        self.retry_count = 0;
        self.registration_polls = 0;
        self.bytes_to_write = 0;
        self.bytes_to_receive = 0;
        self.bytes_to_read = 0;
        self.ip.clear();
        self.rssi = RSSI_UNKNOWN;
        self.id_request = IdRequest::None;
        self.id_string.clear();
    }

    // ---- application surface ----

    pub fn set_apn(&mut self, apn: &str) -> bool {
        self.apn.clear();
        self.apn.push_str(apn).is_ok()
    }

    pub fn set_host_port(&mut self, host: &str, port: u16) -> bool {
        self.host.clear();
        self.port = port;
        self.host.push_str(host).is_ok()
    }

    pub fn connect(&mut self) -> bool {
        if self.apn.is_empty() || self.host.is_empty() || self.port == 0 {
            return false;
        }
        if self.phase != ConnectionPhase::NotConnected {
            return false;
        }
        self.set_flag(CONNECT_PENDING);
        self.set_phase(ConnectionPhase::Connecting);
        true
    }

    /// Requests teardown; the engine acts on it at its next
    /// decision point.
    pub fn disconnect(&mut self) {
        self.set_flag(DISCONNECT_PENDING);
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_idle(&self) -> bool {
        self.phase == ConnectionPhase::NotConnected
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Bytes queued for the application in the read ring.
    pub fn bytes_available(&self) -> u16 {
        self.read_buffer.available_data()
    }

    /// Free space in the application write ring.
    pub fn space_available(&self) -> u16 {
        self.write_buffer.available_space()
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> u16 {
        self.read_buffer.pull_slice(buffer)
    }

    pub fn write(&mut self, data: &[u8]) -> u16 {
        self.write_buffer.push_slice(data)
    }

    pub fn request_rssi(&mut self) {
        self.rssi = RSSI_PENDING;
    }

    /// Latest signal report: `u8::MAX` while a query is in flight, 99
    /// when the modem does not know.
    pub fn get_rssi(&self) -> u8 {
        self.rssi
    }

    pub fn request_id_string(&mut self, kind: IdKind) {
        self.id_string.clear();
        self.id_request = IdRequest::Requested(kind);
    }

    /// `None` until the requested identity reply has been stored.
    pub fn get_id_string(&self) -> Option<&str> {
        match self.id_request {
            IdRequest::Ready => Some(self.id_string.as_str()),
            _ => None,
        }
    }

    /// Grants the application exclusive raw UART access. Refused while
    /// any reply is outstanding.
    pub fn serial_lock(&mut self) -> bool {
        if self.wait_for_reply.is_some() || self.reply_state != ReplyState::None {
            return false;
        }
        self.set_flag(SERIAL_LOCKED);
        true
    }

    pub fn serial_unlock(&mut self) {
        self.clear_flag(SERIAL_LOCKED);
    }

    pub fn serial_write(&mut self, data: &[u8]) -> u16 {
        if self.flag(SERIAL_LOCKED) {
            self.serial.write(data)
        } else {
            0
        }
    }

    pub fn serial_read(&mut self, buffer: &mut [u8]) -> u16 {
        if self.flag(SERIAL_LOCKED) {
            self.serial.read(buffer)
        } else {
            0
        }
    }

    // ---- tick ----

    pub fn run(&mut self) {
        if self.flag(SERIAL_LOCKED) {
            return;
        }
        if self.flag(RESET_PENDING) {
            self.handle_reset();
            return;
        }

        if !self.flag(LINE_READ) && self.bytes_to_read > 0 {
            if self.read_buffer.available_space() < self.bytes_to_read {
                self.flush_read_buffer();
            } else {
                self.receive();
            }
        }

        if self.flag(LINE_READ) && self.line.fill_from(&mut self.serial) {
            let mut copy = [0u8; LINE_MAX_LENGTH];
            let len = self.line.line().len();
            copy[..len].copy_from_slice(self.line.line());
            self.process_line(&copy[..len]);
        }

        if self.wait_for_reply.is_some() || self.reply_state != ReplyState::None {
            self.reply_ticks += 1;
            if self.reply_ticks > self.config.reply_timeout_ticks {
                #[cfg(feature = "defmt")]
                defmt::warn!("reply timed out after {} ticks", self.reply_ticks);
                self.fail_general();
            }
        }

        if self.wait_for_reply.is_none() && self.reply_state == ReplyState::None {
            self.run_send();
        }
    }

    fn handle_reset(&mut self) {
        let reset = self.dialect.reset;
        if (self.serial.space_available() as usize) < reset.len() + 2 {
            return;
        }
        #[cfg(feature = "defmt")]
        defmt::info!("modem reset");
        self.serial.flush_receive_buffers();
        self.send_command(reset);
        self.flags.fetch_and(
            !(RESET_PENDING | IP_CONNECTED | DATA_PENDING),
            Ordering::Relaxed,
        );
        self.set_flag(LINE_READ);
        self.line.reset();
        self.wait_for_reply = None;
        self.reply_state = ReplyState::None;
        self.bytes_to_write = 0;
        self.bytes_to_receive = 0;
        self.bytes_to_read = 0;
        self.retry_count = 0;
        self.registration_polls = 0;
        self.reply_ticks = 0;
        self.send_state = SendState::Idle;
    }

    // ---- reply machine ----

    fn process_line(&mut self, line: &[u8]) {
        if parse::is_data_pending(line) {
            self.set_flag(DATA_PENDING);
            return;
        }
        if line.starts_with(self.dialect.close_notification.as_bytes()) {
            self.handle_close_notification();
            return;
        }

        if let Some(expected) = self.wait_for_reply {
            if line.starts_with(expected.as_bytes()) {
                self.wait_for_reply = None;
                self.retry_count = 0;
                self.reply_ticks = 0;
                // status polls tolerate a reply that is a bare OK
                if matches!(
                    self.reply_state,
                    ReplyState::NetworkStatus | ReplyState::AttachStatus
                ) {
                    self.reply_state = ReplyState::None;
                }
                return;
            }
        }

        if parse::is_error_reply(line) {
            self.handle_error_reply();
            return;
        }

        match self.reply_state {
            ReplyState::None => {}
            ReplyState::NetworkStatus => self.on_network_status(line),
            ReplyState::AttachStatus => self.on_attach_status(line),
            ReplyState::LocalAddress => self.on_local_address(line),
            ReplyState::Dns => self.on_dns_reply(line),
            ReplyState::RxPending => self.on_rx_pending(line),
            ReplyState::RxGrant => self.on_rx_grant(line),
            ReplyState::Csq => self.on_csq(line),
            ReplyState::Identity => self.on_identity(line),
        }
    }

    fn handle_close_notification(&mut self) {
        self.wait_for_reply = None;
        self.clear_flag(IP_CONNECTED);
        if self.send_state != SendState::Closing {
            // the peer or the network dropped the socket underneath us
            self.set_phase(ConnectionPhase::ConnectionError);
            self.send_state = SendState::Idle;
            self.reply_state = ReplyState::None;
            self.bytes_to_receive = 0;
            self.bytes_to_read = 0;
            self.set_flag(LINE_READ);
        }
    }

    fn handle_error_reply(&mut self) {
        if self.wait_for_reply.is_none() && self.reply_state == ReplyState::None {
            return;
        }
        self.retry_count += 1;
        #[cfg(feature = "defmt")]
        defmt::warn!("modem error reply, retry {}", self.retry_count);
        if self.retry_count > self.config.retry_limit {
            self.fail_general();
            return;
        }
        self.wait_for_reply = None;
        self.reply_state = ReplyState::None;
        self.reply_ticks = 0;
        self.send_state = self.resend_state;
    }

    fn fail_general(&mut self) {
        self.set_phase(ConnectionPhase::GeneralError);
        self.set_flag(RESET_PENDING);
        self.wait_for_reply = None;
        self.reply_state = ReplyState::None;
        self.send_state = SendState::Idle;
        self.reply_ticks = 0;
        self.retry_count = 0;
    }

    fn on_network_status(&mut self, line: &[u8]) {
        if let Some(registered) = parse::parse_registration(line) {
            if registered {
                self.registration_polls = 0;
            } else {
                self.registration_polls += 1;
                if self.registration_polls > self.config.registration_retries {
                    self.fail_general();
                } else {
                    self.send_state = SendState::NetworkStatus;
                }
            }
        }
    }

    fn on_attach_status(&mut self, line: &[u8]) {
        if let Some(attached) = parse::parse_attach(line) {
            if attached {
                self.registration_polls = 0;
            } else {
                self.registration_polls += 1;
                if self.registration_polls > self.config.registration_retries {
                    self.fail_general();
                } else {
                    self.send_state = SendState::AttachStatus;
                }
            }
        }
    }

    fn on_local_address(&mut self, line: &[u8]) {
        // bare address line; the exact value is not needed for the
        // session, seeing it is the confirmation
        if line.is_empty() || line[0] == b'\r' || line.starts_with(b"AT") {
            return;
        }
        self.reply_state = ReplyState::None;
    }

    fn on_dns_reply(&mut self, line: &[u8]) {
        match parse::parse_dns_reply(line) {
            DnsReply::Resolved(ip) => {
                self.ip = ip;
                self.reply_state = ReplyState::None;
            }
            DnsReply::Failed | DnsReply::Malformed => {
                self.set_flag(RESET_PENDING);
                self.set_phase(ConnectionPhase::DnsError);
                self.reply_state = ReplyState::None;
                self.send_state = SendState::Idle;
            }
            DnsReply::NotDns => {}
        }
    }

    fn on_rx_pending(&mut self, line: &[u8]) {
        if let Some(announced) = parse::parse_rx_pending(line) {
            self.bytes_to_receive = self.bytes_to_receive.saturating_add(announced);
            self.clear_flag(DATA_PENDING);
            self.reply_state = ReplyState::None;
        }
    }

    fn on_rx_grant(&mut self, line: &[u8]) {
        if let Some(granted) = parse::parse_rx_grant(line) {
            self.bytes_to_receive = self.bytes_to_receive.saturating_sub(granted);
            if granted > 0 {
                self.bytes_to_read += granted;
                self.clear_flag(LINE_READ);
            }
            self.reply_state = ReplyState::None;
        }
    }

    fn on_csq(&mut self, line: &[u8]) {
        if let Some(rssi) = parse::parse_csq(line) {
            self.rssi = rssi;
            self.reply_state = ReplyState::None;
        }
    }

    fn on_identity(&mut self, line: &[u8]) {
        if let Some(reply) = parse::id_reply(line) {
            self.id_string.clear();
            if let Ok(text) = core::str::from_utf8(reply) {
                let _ = self.id_string.push_str(text);
            }
            self.id_request = IdRequest::Ready;
            self.reply_state = ReplyState::None;
        }
    }

    // ---- binary receive ----

    /// Vacuums a granted window from the UART into the read ring once
    /// it has arrived in full, then re-arms line reading.
    fn receive(&mut self) -> bool {
        if self.serial.bytes_available() < self.bytes_to_read {
            return false;
        }
        let mut chunk = [0u8; 32];
        while self.bytes_to_read > 0 {
            let take = (self.bytes_to_read as usize).min(chunk.len());
            let got = self.serial.read(&mut chunk[..take]);
            if got == 0 {
                break;
            }
            self.read_buffer.push_slice(&chunk[..got as usize]);
            self.bytes_to_read -= got;
        }
        if self.bytes_to_read == 0 {
            self.set_flag(LINE_READ);
            true
        } else {
            false
        }
    }

    /// Read-and-discard resynchronization: drops the rest of the window
    /// when the read ring cannot hold it.
    fn flush_read_buffer(&mut self) {
        while self.bytes_to_read > 0 && self.serial.bytes_available() > 0 {
            let _ = self.serial.read_byte();
            self.bytes_to_read -= 1;
        }
        self.bytes_to_receive = 0;
        if self.bytes_to_read == 0 {
            self.set_flag(LINE_READ);
        }
    }

    // ---- send machine ----

    fn run_send(&mut self) {
        if self.flag(DISCONNECT_PENDING)
            && !matches!(
                self.send_state,
                SendState::Idle
                    | SendState::Steady
                    | SendState::SendingPayload
                    | SendState::Closing
            )
        {
            // abort a connect in progress; an announced CIPSEND burst
            // is not abortable - the modem already expects exactly that
            // many raw bytes, so the payload goes out first and the
            // steady state handles the disconnect afterwards
            self.clear_flag(DISCONNECT_PENDING);
            self.reset_states();
            return;
        }

        match self.send_state {
            SendState::Idle => self.run_idle(),
            SendState::Probe => {
                if self.try_command("AT") {
                    self.command_sent(ReplyState::None, SendState::Probe, SendState::EchoOff);
                }
            }
            SendState::EchoOff => {
                let cmd = self.dialect.echo_off;
                if self.try_command(cmd) {
                    self.command_sent(
                        ReplyState::None,
                        SendState::EchoOff,
                        SendState::NetworkStatus,
                    );
                }
            }
            SendState::NetworkStatus => {
                if self.try_command("AT+CREG?") {
                    self.command_sent(
                        ReplyState::NetworkStatus,
                        SendState::NetworkStatus,
                        SendState::AttachStatus,
                    );
                }
            }
            SendState::AttachStatus => {
                if self.try_command("AT+CGATT?") {
                    self.command_sent(
                        ReplyState::AttachStatus,
                        SendState::AttachStatus,
                        SendState::SetApn,
                    );
                }
            }
            SendState::SetApn => self.send_apn(),
            SendState::ActivateBearer => {
                let cmd = self.dialect.bearer_up;
                if self.try_command(cmd) {
                    self.command_sent(
                        ReplyState::None,
                        SendState::ActivateBearer,
                        SendState::QueryLocalAddress,
                    );
                }
            }
            SendState::QueryLocalAddress => {
                let cmd = self.dialect.local_address;
                if self.try_command(cmd) {
                    // replies with a bare address line, no OK
                    self.wait_for_reply = None;
                    self.reply_state = ReplyState::LocalAddress;
                    self.resend_state = SendState::QueryLocalAddress;
                    self.send_state = SendState::EnableReceiveMode;
                    self.reply_ticks = 0;
                }
            }
            SendState::EnableReceiveMode => {
                if self.try_command("AT+CIPRXGET=1") {
                    self.command_sent(
                        ReplyState::None,
                        SendState::EnableReceiveMode,
                        SendState::ResolveHost,
                    );
                }
            }
            SendState::ResolveHost => {
                if self.send_dns_query() {
                    self.command_sent(ReplyState::Dns, SendState::ResolveHost, SendState::OpenSocket);
                }
            }
            SendState::OpenSocket => self.send_socket_open(),
            SendState::FinalizeConnect => {
                self.set_flag(IP_CONNECTED);
                self.set_phase(ConnectionPhase::Connected);
                self.send_state = SendState::Steady;
            }
            SendState::Steady => self.run_steady(),
            SendState::SendingPayload => {
                self.send_data();
                self.wait_for_reply = Some(self.dialect.send_confirmation);
                self.reply_state = ReplyState::None;
                self.resend_state = SendState::Steady;
                self.send_state = SendState::Steady;
                self.reply_ticks = 0;
            }
            SendState::Closing => {
                if !self.flag(IP_CONNECTED) {
                    self.bytes_to_write = 0;
                    self.bytes_to_receive = 0;
                    self.bytes_to_read = 0;
                    self.set_flag(LINE_READ);
                    self.set_phase(ConnectionPhase::NotConnected);
                    self.send_state = SendState::Idle;
                }
            }
        }
    }

    fn run_idle(&mut self) {
        if self.flag(DISCONNECT_PENDING) {
            // also clears a latched error phase
            self.clear_flag(DISCONNECT_PENDING);
            self.reset_states();
            return;
        }
        if self.flag(CONNECT_PENDING) {
            self.clear_flag(CONNECT_PENDING);
            self.registration_polls = 0;
            self.send_state = SendState::Probe;
            return;
        }
        self.run_service_queries();
    }

    fn run_steady(&mut self) {
        if self.flag(DISCONNECT_PENDING) {
            let cmd = self.dialect.socket_close;
            if self.try_command(cmd) {
                self.clear_flag(DISCONNECT_PENDING);
                self.set_phase(ConnectionPhase::Intermediate);
                self.send_state = SendState::Closing;
                self.reply_ticks = 0;
            }
            return;
        }
        if self.write_buffer.available_data() > 0 {
            if self.prepare_sending() {
                self.send_state = SendState::SendingPayload;
            }
            return;
        }
        if self.flag(DATA_PENDING) && self.bytes_to_receive == 0 {
            if self.try_command("AT+CIPRXGET=4,0") {
                self.command_sent(ReplyState::RxPending, SendState::Steady, SendState::Steady);
            }
            return;
        }
        if self.bytes_to_receive > 0 {
            if self.send_ciprxget2() {
                self.wait_for_reply = Some(OK_REPLY);
                self.reply_state = ReplyState::RxGrant;
                self.resend_state = SendState::Steady;
                self.reply_ticks = 0;
            }
            return;
        }
        self.run_service_queries();
    }

    /// Signal and identity queries; serviced both connected and idle.
    fn run_service_queries(&mut self) {
        if self.rssi == RSSI_PENDING {
            if self.try_command("AT+CSQ") {
                let here = self.send_state;
                self.command_sent(ReplyState::Csq, here, here);
            }
            return;
        }
        if let IdRequest::Requested(kind) = self.id_request {
            if !self.flag(LINE_READ) {
                return;
            }
            let cmd = match kind {
                IdKind::Manufacturer => "AT+CGMI",
                IdKind::Model => "AT+CGMM",
                IdKind::Imei => "AT+CGSN",
                IdKind::Imsi => "AT+CIMI",
            };
            if self.try_command(cmd) {
                self.id_request = IdRequest::AwaitingReply;
                let here = self.send_state;
                self.command_sent(ReplyState::Identity, here, here);
            }
        }
    }

    fn command_sent(&mut self, reply: ReplyState, resend: SendState, next: SendState) {
        self.wait_for_reply = Some(OK_REPLY);
        self.reply_state = reply;
        self.resend_state = resend;
        self.send_state = next;
        self.reply_ticks = 0;
    }

    // ---- emitters ----

    fn send_command(&mut self, cmd: &str) {
        self.serial.write(cmd.as_bytes());
        self.serial.write(b"\r\n");
    }

    /// Emits a complete command line or nothing: without TX space the
    /// caller retries next tick.
    fn try_command(&mut self, cmd: &str) -> bool {
        if (self.serial.space_available() as usize) < cmd.len() + 2 {
            return false;
        }
        self.send_command(cmd);
        true
    }

    fn send_apn(&mut self) {
        let mut cmd: String<CMD_MAX_LENGTH> = String::new();
        let _ = write!(cmd, "{}\"{}\"", self.dialect.apn_prefix, self.apn);
        if self.try_command(cmd.as_str()) {
            self.command_sent(ReplyState::None, SendState::SetApn, SendState::ActivateBearer);
        }
    }

    fn send_dns_query(&mut self) -> bool {
        if (self.serial.space_available() as usize) < self.host.len() + 20 {
            return false;
        }
        let mut cmd: String<CMD_MAX_LENGTH> = String::new();
        let _ = write!(cmd, "AT+CDNSGIP=\"{}\"", self.host);
        self.send_command(cmd.as_str());
        true
    }

    fn send_socket_open(&mut self) {
        let mut cmd: String<CMD_MAX_LENGTH> = String::new();
        let _ = write!(
            cmd,
            "{}\"{}\",{}",
            self.dialect.socket_open_prefix, self.ip, self.port
        );
        if self.try_command(cmd.as_str()) {
            self.wait_for_reply = Some(self.dialect.connect_confirmation);
            self.reply_state = ReplyState::None;
            self.resend_state = SendState::OpenSocket;
            self.send_state = SendState::FinalizeConnect;
            self.reply_ticks = 0;
        }
    }

    /// Announces a send burst sized to the smaller of the staged data
    /// and the TX space left after the command envelope.
    fn prepare_sending(&mut self) -> bool {
        let space = self.serial.space_available();
        if space < SEND_COMMAND_RESERVE {
            return false;
        }
        let burst = self
            .write_buffer
            .available_data()
            .min(space - SEND_COMMAND_RESERVE);
        if burst == 0 {
            return false;
        }
        self.bytes_to_write = burst;
        let mut cmd: String<CMD_MAX_LENGTH> = String::new();
        let _ = write!(cmd, "AT+CIPSEND=0,{}", burst);
        self.send_command(cmd.as_str());
        self.wait_for_reply = Some(DATA_PROMPT);
        self.reply_state = ReplyState::None;
        self.resend_state = SendState::Steady;
        self.reply_ticks = 0;
        true
    }

    /// Shovels the announced burst from the write ring to the UART in
    /// one tick.
    fn send_data(&mut self) {
        let mut chunk = [0u8; 32];
        while self.bytes_to_write > 0 {
            let take = (self.bytes_to_write as usize).min(chunk.len());
            let got = self.write_buffer.pull_slice(&mut chunk[..take]);
            if got == 0 {
                break;
            }
            self.serial.write(&chunk[..got as usize]);
            self.bytes_to_write -= got;
        }
    }

    /// Requests a receive window bounded by the outstanding announce,
    /// the read-ring space, the UART RX slack and the modem's limit.
    fn send_ciprxget2(&mut self) -> bool {
        let rx_capacity = self.serial.read_buffer_size();
        let rx_used = self.serial.bytes_available();
        if rx_capacity - rx_used <= RX_HEADER_RESERVE {
            return false;
        }
        if self.read_buffer.available_space() == 0 {
            return false;
        }
        let grant = (rx_capacity - rx_used - RX_HEADER_RESERVE)
            .min(self.bytes_to_receive)
            .min(self.read_buffer.available_space())
            .min(self.dialect.max_receive_size);
        if grant == 0 {
            return false;
        }
        let mut cmd: String<CMD_MAX_LENGTH> = String::new();
        let _ = write!(cmd, "AT+CIPRXGET=2,0,{}", grant);
        self.send_command(cmd.as_str());
        true
    }

    // ---- flags ----

    fn flag(&self, mask: u8) -> bool {
        self.flags.load(Ordering::Relaxed) & mask != 0
    }

    fn set_flag(&self, mask: u8) {
        self.flags.fetch_or(mask, Ordering::Relaxed);
    }

    fn clear_flag(&self, mask: u8) {
        self.flags.fetch_and(!mask, Ordering::Relaxed);
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase != phase {
            #[cfg(feature = "defmt")]
            defmt::debug!("phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }
}
