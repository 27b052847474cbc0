use crate::mock::{modem, open_plain};
use libmodem::network::cellular::MUX_COUNT;
use libmodem::network::cellular::urc::{Urc, classify};
use proptest::prelude::*;

proptest! {
    #[test]
    fn classify_never_panics(line in ".{0,200}") {
        let _ = classify(&line);
    }

    #[test]
    fn recv_notification_round_trips(mux in 0u8..16, len in 0usize..100_000) {
        let urc = classify(&format!("+QIURC: \"recv\",{},{}\r\n", mux, len));
        if (mux as usize) < MUX_COUNT {
            prop_assert_eq!(urc, Urc::DataArrived { mux, len });
        } else {
            prop_assert_eq!(urc, Urc::Unknown);
        }
    }

    #[test]
    fn open_uses_index_modulo_slot_count(mux in any::<u8>()) {
        let mut modem = modem();
        let slot = mux % MUX_COUNT as u8;
        modem.channel().transport_mut().expect(
            format!("AT+QIOPEN=1,{},", slot),
            format!("\r\nOK\r\n\r\n+QIOPEN: {},0\r\n", slot),
        );

        prop_assert_eq!(modem.open(mux, "10.0.0.1", 80, false, 5), Ok(slot));
        prop_assert!(modem.connected(slot));
    }

    #[test]
    fn read_never_exceeds_available_or_buffer(
        payload in proptest::collection::vec(b'a'..=b'z', 1..64),
        buf_len in 0usize..80,
    ) {
        let mut modem = modem();
        open_plain(&mut modem, 0);
        let len = payload.len();
        let mut reply = format!("\r\n+QIRD: {}\r\n", len).into_bytes();
        reply.extend_from_slice(&payload);
        reply.extend_from_slice(b"\r\n\r\nOK\r\n");
        modem
            .channel()
            .transport_mut()
            .push_rx(format!("+QIURC: \"recv\",0,{}\r\n", len))
            .expect(format!("AT+QIRD=0,{}\r\n", len), reply);
        modem.maintain();

        let available = modem.available(0);
        prop_assert!(available >= len);

        let mut buf = vec![0u8; buf_len];
        let n = modem.read(0, &mut buf);
        prop_assert!(n <= buf_len);
        prop_assert!(n <= available);
        prop_assert_eq!(&buf[..n], &payload[..n]);
    }

    #[test]
    fn closed_notification_touches_one_socket(target in 0u8..MUX_COUNT as u8) {
        let mut modem = modem();
        for mux in 0..MUX_COUNT as u8 {
            open_plain(&mut modem, mux);
        }
        modem
            .channel()
            .transport_mut()
            .push_rx(format!("\r\n+QIURC: \"closed\",{}\r\n", target));
        modem.maintain();

        for mux in 0..MUX_COUNT as u8 {
            prop_assert_eq!(modem.connected(mux), mux != target);
        }
    }
}
