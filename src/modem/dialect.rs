//! Per-modem AT dialect parameters.
//!
//! The engine drives one command flow; the handful of literals that
//! differ between SIMCom generations live here so a dialect is picked
//! at construction instead of baked into the state machine.

pub struct ModemDialect {
    pub echo_off: &'static str,
    /// APN programming command up to the opening quote; the engine
    /// appends `"<apn>"`.
    pub apn_prefix: &'static str,
    pub bearer_up: &'static str,
    /// Local-address query. Replies with a bare address line, no `OK`.
    pub local_address: &'static str,
    /// Socket-open command up to the quoted address; the engine appends
    /// `"<ip>",<port>`.
    pub socket_open_prefix: &'static str,
    pub socket_close: &'static str,
    pub connect_confirmation: &'static str,
    pub send_confirmation: &'static str,
    /// Prefix of the unsolicited socket-close notification.
    pub close_notification: &'static str,
    pub reset: &'static str,
    /// Largest receive window the modem accepts in one `CIPRXGET=2`.
    pub max_receive_size: u16,
}

pub const SIM800: ModemDialect = ModemDialect {
    echo_off: "ATE0",
    apn_prefix: "AT+CSTT=",
    bearer_up: "AT+CIICR",
    local_address: "AT+CIFSR",
    socket_open_prefix: "AT+CIPSTART=0,\"TCP\",",
    socket_close: "AT+CIPCLOSE=0",
    connect_confirmation: "CONNECT OK",
    send_confirmation: "SEND OK",
    close_notification: "CLOSED",
    reset: "AT+CFUN=1,1",
    max_receive_size: 1460,
};

pub const SIM7X00: ModemDialect = ModemDialect {
    echo_off: "ATE0",
    apn_prefix: "AT+CGSOCKCONT=1,\"IP\",",
    bearer_up: "AT+NETOPEN",
    local_address: "AT+IPADDR",
    socket_open_prefix: "AT+CIPOPEN=0,\"TCP\",",
    socket_close: "AT+CIPCLOSE=0",
    connect_confirmation: "+CIPOPEN: 0,0",
    send_confirmation: "SEND OK",
    close_notification: "+IPCLOSE: 0",
    reset: "AT+CFUN=1,1",
    max_receive_size: 1500,
};
