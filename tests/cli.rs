//! Exit codes and output of the `pcap2sflow-replay` binary

mod common;

use common::*;
use std::net::UdpSocket;
use std::process::{Command, Output};

fn replay(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pcap2sflow-replay"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run pcap2sflow-replay")
}

fn collector() -> (UdpSocket, String) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind collector");
    socket.set_read_timeout(Some(LISTEN_TIMEOUT)).expect("set read timeout");
    let target = socket.local_addr().expect("collector address").to_string();
    (socket, target)
}

/// Drain everything already queued on the collector socket
fn received_lengths(socket: &UdpSocket) -> Vec<usize> {
    socket.set_nonblocking(true).expect("non-blocking collector");
    let mut buf = vec![0u8; 65_536];
    let mut lengths = Vec::new();
    while let Ok((n, _)) = socket.recv_from(&mut buf) {
        let datagram = parse(&buf[..n]);
        lengths.extend(sampled_headers(&datagram).map(|h| h.header.len()));
    }
    lengths
}

#[test]
fn test_reference_trace_exits_zero() {
    let capture = write_capture(&reference_frames());
    let (socket, target) = collector();

    let output = replay(&["--trace", capture.path().to_str().unwrap(), &target]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    // The process has exited, so every datagram is already queued
    assert_eq!(received_lengths(&socket), REFERENCE_FRAME_LENGTHS.to_vec());
}

#[test]
fn test_empty_trace_exits_zero() {
    let capture = write_capture(&[]);
    let (socket, target) = collector();

    let output = replay(&["--trace", capture.path().to_str().unwrap(), &target]);
    assert!(output.status.success());
    assert!(received_lengths(&socket).is_empty());
}

#[test]
fn test_missing_trace_exits_one() {
    let (_socket, target) = collector();

    let output = replay(&["--trace", "/nonexistent/trace.pcap", &target]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pcap2sflow-replay:"), "stderr: {}", stderr);
    assert!(stderr.contains("/nonexistent/trace.pcap"), "stderr: {}", stderr);
}

#[test]
fn test_corrupt_trace_exits_one() {
    let mut bytes = capture_bytes(&[frame(0, 60), frame(1, 70)]);
    bytes.truncate(bytes.len() - 5);
    let capture = write_bytes(&bytes);
    let (socket, target) = collector();

    let output = replay(&["--trace", capture.path().to_str().unwrap(), &target]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(received_lengths(&socket), vec![60]);
}

#[test]
fn test_invalid_flags_fail() {
    let capture = write_capture(&[frame(0, 60)]);
    let path = capture.path().to_str().unwrap();

    // No destination
    assert!(!replay(&["--trace", path]).status.success());
    // Ceiling below the smallest datagram
    assert_eq!(replay(&["--trace", path, "--max-datagram-size", "10", "127.0.0.1:9"]).status.code(), Some(1));
    // Both pacing modes at once
    assert!(!replay(&["--trace", path, "--pps", "10", "--speed", "2", "127.0.0.1:9"]).status.success());
    // A speed so slow the scaled capture offsets would overflow
    assert_eq!(replay(&["--trace", path, "--speed", "1e-20", "127.0.0.1:9"]).status.code(), Some(1));
}

#[test]
fn test_capture_limit_flag() {
    let capture = write_capture(&[frame(0, 1416), frame(1, 44)]);
    let (socket, target) = collector();

    let output = replay(&[
        "--trace",
        capture.path().to_str().unwrap(),
        "--capture-limit",
        "100",
        "--log-level",
        "debug",
        &target,
    ]);
    assert!(output.status.success());
    assert_eq!(received_lengths(&socket), vec![100, 44]);
}

/// (sub-agent, datagram sequence) of everything already queued on the collector
fn received_identities(socket: &UdpSocket) -> Vec<(u32, u32)> {
    socket.set_nonblocking(true).expect("non-blocking collector");
    let mut buf = vec![0u8; 65_536];
    let mut identities = Vec::new();
    while let Ok((n, _)) = socket.recv_from(&mut buf) {
        let datagram = parse(&buf[..n]);
        identities.push((datagram.sub_agent_id, datagram.sequence_number));
    }
    identities
}

#[test]
fn test_several_traces_never_repeat_a_datagram() {
    let first = write_capture(&[frame(0, 60)]);
    let second = write_capture(&[frame(1, 70)]);
    let first_path = first.path().to_str().unwrap();
    let second_path = second.path().to_str().unwrap();

    let (socket, target) = collector();
    let output = replay(&["--trace", first_path, "--trace", second_path, &target]);
    assert!(output.status.success());
    assert_eq!(received_identities(&socket), vec![(0, 1), (0, 2)]);

    let (socket, target) = collector();
    let output =
        replay(&["--trace", first_path, "--trace", second_path, "--independent-sessions", &target]);
    assert!(output.status.success());
    assert_eq!(received_identities(&socket), vec![(0, 1), (1, 1)]);
}
