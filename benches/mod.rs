use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    cellular::urc::bench_classify,
    cellular::modem::bench_command_exchange,
    cellular::modem::bench_socket_read,
    cellular::modem::bench_mqtt_publish
);
criterion_main!(benches);
