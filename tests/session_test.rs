//! Scripted end-to-end session against a serial double, through the
//! public API only.

use std::cell::RefCell;

use gsmstream::{CircularBuffer, Config, GsmEngine, IdKind, SerialOps, SIM800};

struct ScriptedSerial {
    inner: RefCell<Inner>,
}

struct Inner {
    rx: CircularBuffer<u8, 256>,
    tx: Vec<u8>,
}

impl ScriptedSerial {
    fn new() -> Self {
        Self {
            inner: RefCell::new(Inner {
                rx: CircularBuffer::new(),
                tx: Vec::new(),
            }),
        }
    }

    fn feed(&self, bytes: &[u8]) {
        assert_eq!(
            self.inner.borrow_mut().rx.push_slice(bytes),
            bytes.len() as u16
        );
    }

    fn take_tx(&self) -> String {
        String::from_utf8(std::mem::take(&mut self.inner.borrow_mut().tx))
            .expect("engine wrote non-utf8")
    }
}

impl SerialOps for &ScriptedSerial {
    fn bytes_available(&self) -> u16 {
        self.inner.borrow().rx.available_data()
    }
    fn space_available(&self) -> u16 {
        256
    }
    fn read_buffer_size(&self) -> u16 {
        256
    }
    fn read_byte(&mut self) -> u8 {
        self.inner.borrow_mut().rx.pull()
    }
    fn read(&mut self, buffer: &mut [u8]) -> u16 {
        self.inner.borrow_mut().rx.pull_slice(buffer)
    }
    fn write(&mut self, data: &[u8]) -> u16 {
        self.inner.borrow_mut().tx.extend_from_slice(data);
        data.len() as u16
    }
    fn flush_receive_buffers(&mut self) {
        self.inner.borrow_mut().rx.flush();
    }
}

/// Minimal modem double: answers the attach/DNS/open sequence the way a
/// live SIM800 does, everything else with OK.
fn modem_reply(command: &str) -> &'static [u8] {
    if command.starts_with("AT+CDNSGIP") {
        b"+CDNSGIP: 1,\"example.com\",\"93.184.216.34\"\r\nOK\r\n"
    } else if command.starts_with("AT+CIPSTART") {
        b"OK\r\nCONNECT OK\r\n"
    } else if command.starts_with("AT+CIFSR") {
        b"10.92.17.4\r\n"
    } else if command.starts_with("AT+CREG?") {
        b"+CREG: 0,1\r\nOK\r\n"
    } else if command.starts_with("AT+CGATT?") {
        b"+CGATT: 1\r\nOK\r\n"
    } else if command.starts_with("AT+CSQ") {
        b"+CSQ: 23,0\r\nOK\r\n"
    } else if command.starts_with("AT+CGSN") {
        b"\r\n867564050638945\r\n\r\nOK\r\n"
    } else {
        b"OK\r\n"
    }
}

fn connect(engine: &mut GsmEngine<&ScriptedSerial, 128, 128>, serial: &ScriptedSerial) {
    assert!(engine.set_apn("internet"));
    assert!(engine.set_host_port("example.com", 80));
    assert!(engine.connect());
    for _ in 0..64 {
        if engine.is_connected() {
            return;
        }
        engine.run();
        let tx = serial.take_tx();
        if !tx.is_empty() {
            serial.feed(modem_reply(&tx));
        }
    }
    panic!("session never reached connected");
}

#[test]
fn full_session_roundtrip() {
    let serial = ScriptedSerial::new();
    let mut engine: GsmEngine<&ScriptedSerial, 128, 128> =
        GsmEngine::new(&serial, &SIM800, Config::default());

    connect(&mut engine, &serial);
    assert!(engine.is_connected());
    assert!(!engine.is_idle());

    // outbound: the staged bytes leave in one CIPSEND burst
    assert_eq!(engine.write(b"GET /\r\n"), 7);
    engine.run();
    assert_eq!(serial.take_tx(), "AT+CIPSEND=0,7\r\n");
    serial.feed(b">");
    engine.run();
    assert_eq!(serial.take_tx(), "GET /\r\n");
    serial.feed(b"SEND OK\r\n");
    engine.run();

    // inbound: announce, window query, grant, payload
    serial.feed(b"+CIPRXGET: 1,0\r\n");
    engine.run();
    assert_eq!(serial.take_tx(), "AT+CIPRXGET=4,0\r\n");
    serial.feed(b"+CIPRXGET: 4,0,5\r\nOK\r\n");
    engine.run();
    engine.run();
    assert_eq!(serial.take_tx(), "AT+CIPRXGET=2,0,5\r\n");
    serial.feed(b"+CIPRXGET: 2,0,5\r\nworld\r\nOK\r\n");
    engine.run();
    engine.run();
    engine.run();
    engine.run();

    assert_eq!(engine.bytes_available(), 5);
    let mut out = [0u8; 16];
    assert_eq!(engine.read(&mut out), 5);
    assert_eq!(&out[..5], b"world");

    // teardown
    engine.disconnect();
    engine.run();
    assert_eq!(serial.take_tx(), "AT+CIPCLOSE=0\r\n");
    serial.feed(b"CLOSED\r\n");
    engine.run();
    assert!(engine.is_idle());
}

#[test]
fn remote_close_reads_as_eof() {
    let serial = ScriptedSerial::new();
    let mut engine: GsmEngine<&ScriptedSerial, 128, 128> =
        GsmEngine::new(&serial, &SIM800, Config::default());
    connect(&mut engine, &serial);

    // data arrives, then the peer drops the socket
    serial.feed(b"+CIPRXGET: 1,0\r\n");
    engine.run();
    serial.take_tx();
    serial.feed(b"+CIPRXGET: 4,0,2\r\nOK\r\n");
    engine.run();
    engine.run();
    serial.take_tx();
    serial.feed(b"+CIPRXGET: 2,0,2\r\nhi\r\nOK\r\n");
    for _ in 0..4 {
        engine.run();
    }
    serial.feed(b"CLOSED\r\n");
    engine.run();

    assert!(!engine.is_connected());
    // EOF is inferred once the read ring drains
    let mut out = [0u8; 4];
    assert_eq!(engine.read(&mut out), 2);
    assert_eq!(&out[..2], b"hi");
    assert!(!engine.is_connected() && engine.bytes_available() == 0);
}

#[test]
fn identity_and_rssi_served_while_idle() {
    let serial = ScriptedSerial::new();
    let mut engine: GsmEngine<&ScriptedSerial, 128, 128> =
        GsmEngine::new(&serial, &SIM800, Config::default());

    engine.request_rssi();
    assert_eq!(engine.get_rssi(), u8::MAX);
    engine.run();
    serial.feed(modem_reply(&serial.take_tx()));
    engine.run();
    engine.run();
    assert_eq!(engine.get_rssi(), 23);

    engine.request_id_string(IdKind::Imei);
    assert_eq!(engine.get_id_string(), None);
    for _ in 0..8 {
        engine.run();
        let tx = serial.take_tx();
        if !tx.is_empty() {
            serial.feed(modem_reply(&tx));
        }
    }
    assert_eq!(engine.get_id_string(), Some("867564050638945"));
}

#[test]
fn write_backpressure_reports_accepted_bytes() {
    let serial = ScriptedSerial::new();
    let mut engine: GsmEngine<&ScriptedSerial, 128, 16> =
        GsmEngine::new(&serial, &SIM800, Config::default());

    assert_eq!(engine.space_available(), 16);
    assert_eq!(engine.write(&[b'a'; 24]), 16);
    assert_eq!(engine.space_available(), 0);
    assert_eq!(engine.write(b"more"), 0);
}
