use crate::mock::MockModem;
use heapless::Vec;
use libmodem::network::cellular::Channel;
use libmodem::network::cellular::urc::{Urc, UrcHandler};
use libmodem::network::error::Error;

#[derive(Default)]
struct Recorder {
    seen: std::vec::Vec<Urc>,
}

impl UrcHandler for Recorder {
    fn handle(&mut self, urc: Urc) {
        self.seen.push(urc);
    }
}

fn channel() -> Channel<MockModem> {
    Channel::new(MockModem::new(), 200)
}

#[test]
fn test_execute_returns_marker_index() {
    let mut ch = channel();
    ch.transport_mut()
        .expect("AT+CSQ\r\n", "\r\n+CSQ: 20,99\r\n\r\nOK\r\n");

    let matched = ch.execute(format_args!("+CSQ"), &["ERROR", "+CSQ:"], 1000, &mut ());
    assert_eq!(matched, Ok(1));
    assert_eq!(ch.read_int_until(b','), Ok(20));
    assert_eq!(ch.read_int_until(b'\n'), Ok(99));
    assert_eq!(ch.transport().written(), b"AT+CSQ\r\n");
}

#[test]
fn test_wait_times_out_on_the_transport_clock() {
    let mut ch = channel();
    let result = ch.execute(format_args!("+CSQ"), &["OK\r\n"], 300, &mut ());
    assert_eq!(result, Err(Error::Timeout));
    assert!(ch.transport().now() >= 300);
}

#[test]
fn test_urc_inside_reply_is_dispatched_and_wait_continues() {
    let mut ch = channel();
    let mut recorder = Recorder::default();
    ch.transport_mut()
        .expect("AT+QICLOSE=1", "\r\n+QIURC: \"closed\",3\r\nOK\r\n");

    let result = ch.execute(format_args!("+QICLOSE=1"), &["OK\r\n"], 1000, &mut recorder);
    assert_eq!(result, Ok(0));
    assert_eq!(recorder.seen, [Urc::Closed { mux: 3 }]);
}

#[test]
fn test_awaited_marker_is_not_treated_as_urc() {
    let mut ch = channel();
    let mut recorder = Recorder::default();
    ch.transport_mut().push_rx("+QIURC: \"recv\",0,5\r\n");

    assert_eq!(ch.wait(&["+QIURC:"], 500, &mut recorder), Ok(0));
    assert!(recorder.seen.is_empty());
}

#[test]
fn test_unknown_line_is_skipped() {
    let mut ch = channel();
    ch.transport_mut().push_rx("\r\nRING\r\n+CME ERROR: 4\r\nOK\r\n");
    assert_eq!(ch.wait(&["OK\r\n"], 500, &mut ()), Ok(0));
}

#[test]
fn test_wait_ok_maps_error() {
    let mut ch = channel();
    ch.transport_mut().expect("AT+QSCLK=1", "\r\nERROR\r\n");
    ch.send_command(format_args!("+QSCLK=1")).unwrap();
    assert_eq!(ch.wait_ok(500, &mut ()), Err(Error::ProtocolMismatch));
}

#[test]
fn test_marker_found_after_long_unterminated_text() {
    let mut ch = channel();
    let mut noise = "x".repeat(150);
    noise.push_str("OK\r\n");
    ch.transport_mut().push_rx(noise);

    assert_eq!(ch.wait(&["OK\r\n"], 2_000, &mut ()), Ok(0));
}

#[test]
fn test_read_until_consumes_overlong_field() {
    let mut ch = channel();
    ch.transport_mut().push_rx("abcdefgh,XY");

    let mut field: Vec<u8, 4> = Vec::new();
    assert_eq!(ch.read_until(b',', &mut field), Err(Error::BufferOverflow));
    assert_eq!(&field[..], b"abcd");
    assert_eq!(ch.read_byte(100), Ok(b'X'));
}

#[test]
fn test_read_int_rejects_text() {
    let mut ch = channel();
    ch.transport_mut().push_rx("\"TCP\",");
    assert_eq!(ch.read_int_until(b','), Err(Error::ProtocolMismatch));
}

#[test]
fn test_closed_transport_fails_writes() {
    let mut ch = channel();
    ch.transport_mut().is_open = false;
    assert_eq!(
        ch.send_command(format_args!("+CSQ")),
        Err(Error::TransportFailure)
    );
}

#[test]
fn test_oversized_command_rejected() {
    let mut ch = channel();
    let host = "h".repeat(300);
    assert_eq!(
        ch.send_command(format_args!("+QIOPEN=1,0,\"TCP\",\"{}\",80,0,1", host)),
        Err(Error::BufferOverflow)
    );
    assert!(ch.transport().written().is_empty());
}
