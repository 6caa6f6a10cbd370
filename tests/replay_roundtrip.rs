//! End-to-end replays against a local UDP collector

mod common;

use anyhow::{Result, ensure};
use common::*;
use pcap2sflow::{OversizePolicy, Pcap2Sflow, ReplayConfig, ReplayError, SessionMode};
use sflow_parser::models::Address;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_reference_trace_round_trip() -> Result<()> {
    init_tracing();
    let capture = write_capture(&reference_frames());
    let listener = Listener::start(Some(58), LISTEN_TIMEOUT).await;

    let report =
        Pcap2Sflow::replay_file(capture.path(), &listener.target, &ReplayConfig::default()).await?;
    let datagrams = listener.finish().await;

    assert_eq!(header_lengths(&datagrams), REFERENCE_FRAME_LENGTHS.to_vec());
    assert_eq!(report.frames, 58);
    assert_eq!(report.samples, 58);
    assert_eq!(report.datagrams as usize, datagrams.len());

    let expected: Vec<u32> = (1..=datagrams.len() as u32).collect();
    assert_eq!(datagram_sequences(&datagrams), expected);
    assert_eq!(sample_sequences(&datagrams), (1..=58).collect::<Vec<u32>>());

    let first = &datagrams[0];
    assert_eq!(first.agent_address, Address::IPv4(Ipv4Addr::LOCALHOST));
    ensure!(
        datagrams.windows(2).all(|w| w[0].uptime <= w[1].uptime),
        "uptime never runs backwards"
    );

    // Header bytes arrive untouched
    let headers: Vec<Vec<u8>> =
        datagrams.iter().flat_map(sampled_headers).map(|h| h.header.clone()).collect();
    assert_eq!(headers, reference_frames());
    Ok(())
}

#[tokio::test]
async fn test_empty_capture_sends_nothing() -> Result<()> {
    init_tracing();
    let capture = write_capture(&[]);
    let listener = Listener::start(None, Duration::from_millis(500)).await;

    let report =
        Pcap2Sflow::replay_file(capture.path(), &listener.target, &ReplayConfig::default()).await?;

    assert_eq!(report.frames, 0);
    assert_eq!(report.datagrams, 0);
    assert!(listener.finish().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_frame_larger_than_ceiling_travels_alone() -> Result<()> {
    init_tracing();
    let capture = write_capture(&[frame(0, 17_000)]);
    let listener = Listener::start(Some(1), LISTEN_TIMEOUT).await;

    let report =
        Pcap2Sflow::replay_file(capture.path(), &listener.target, &ReplayConfig::default()).await?;
    let datagrams = listener.finish().await;

    assert_eq!(datagrams.len(), 1);
    assert_eq!(header_lengths(&datagrams), vec![17_000]);
    assert_eq!(report.oversize_samples.len(), 1);
    assert_eq!(report.oversize_samples[0].sample_sequence, 1);
    Ok(())
}

#[tokio::test]
async fn test_oversize_fail_policy_aborts() {
    init_tracing();
    let capture = write_capture(&[frame(0, 17_000)]);
    let listener = Listener::start(None, Duration::from_millis(500)).await;

    let config = ReplayConfig { oversize_policy: OversizePolicy::Fail, ..ReplayConfig::default() };
    let err = Pcap2Sflow::replay_file(capture.path(), &listener.target, &config).await.unwrap_err();

    assert!(matches!(err, ReplayError::OversizeSample { sample_sequence: 1, .. }));
    assert!(listener.finish().await.is_empty());
}

#[tokio::test]
async fn test_ceiling_bounds_every_datagram() -> Result<()> {
    init_tracing();
    let capture = write_capture(&reference_frames());
    let listener = Listener::start(Some(58), LISTEN_TIMEOUT).await;

    let config = ReplayConfig { max_datagram_size: 2000, ..ReplayConfig::default() };
    let report = Pcap2Sflow::replay_file(capture.path(), &listener.target, &config).await?;
    let datagrams = listener.finish().await;

    assert!(report.oversize_samples.is_empty());
    assert_eq!(header_lengths(&datagrams), REFERENCE_FRAME_LENGTHS.to_vec());
    assert!(report.bytes_sent <= 2000 * report.datagrams);
    let expected: Vec<u32> = (1..=datagrams.len() as u32).collect();
    assert_eq!(datagram_sequences(&datagrams), expected);
    Ok(())
}

#[tokio::test]
async fn test_capture_limit_truncates_headers() -> Result<()> {
    init_tracing();
    let capture = write_capture(&reference_frames());
    let listener = Listener::start(Some(58), LISTEN_TIMEOUT).await;

    let config = ReplayConfig { capture_length_limit: Some(128), ..ReplayConfig::default() };
    Pcap2Sflow::replay_file(capture.path(), &listener.target, &config).await?;
    let datagrams = listener.finish().await;

    let expected: Vec<usize> = REFERENCE_FRAME_LENGTHS.iter().map(|&len| len.min(128)).collect();
    assert_eq!(header_lengths(&datagrams), expected);

    let frame_lengths: Vec<u32> =
        datagrams.iter().flat_map(sampled_headers).map(|h| h.frame_length).collect();
    let originals: Vec<u32> = REFERENCE_FRAME_LENGTHS.iter().map(|&len| len as u32).collect();
    assert_eq!(frame_lengths, originals);
    Ok(())
}

#[tokio::test]
async fn test_independent_runs_restart_sequences() -> Result<()> {
    init_tracing();
    let capture = write_capture(&reference_frames());

    for _ in 0..2 {
        let listener = Listener::start(Some(58), LISTEN_TIMEOUT).await;
        Pcap2Sflow::replay_file(capture.path(), &listener.target, &ReplayConfig::default()).await?;
        let datagrams = listener.finish().await;

        assert_eq!(datagrams[0].sequence_number, 1);
        assert_eq!(sample_sequences(&datagrams), (1..=58).collect::<Vec<u32>>());
    }
    Ok(())
}

#[tokio::test]
async fn test_traces_share_counters_by_default() -> Result<()> {
    init_tracing();
    let first = write_capture(&[frame(0, 60), frame(1, 70)]);
    let second = write_capture(&[frame(2, 80)]);
    let listener = Listener::start(Some(3), LISTEN_TIMEOUT).await;

    let report = Pcap2Sflow::replay_files(
        &[first.path(), second.path()],
        &listener.target,
        &ReplayConfig::default(),
        SessionMode::default(),
        CancellationToken::new(),
    )
    .await?;
    let datagrams = listener.finish().await;

    assert_eq!(report.frames, 3);
    assert_eq!(datagram_sequences(&datagrams), vec![1, 2]);
    assert_eq!(sample_sequences(&datagrams), vec![1, 2, 3]);
    assert!(datagrams.iter().all(|d| d.sub_agent_id == 0));
    Ok(())
}

#[tokio::test]
async fn test_separate_sessions_per_trace() -> Result<()> {
    init_tracing();
    let first = write_capture(&[frame(0, 60), frame(1, 70)]);
    let second = write_capture(&[frame(2, 80)]);
    let listener = Listener::start(Some(3), LISTEN_TIMEOUT).await;

    let config = ReplayConfig { sub_agent_id: 4, ..ReplayConfig::default() };
    Pcap2Sflow::replay_files(
        &[first.path(), second.path()],
        &listener.target,
        &config,
        SessionMode::PerTrace,
        CancellationToken::new(),
    )
    .await?;
    let datagrams = listener.finish().await;

    assert_eq!(datagram_sequences(&datagrams), vec![1, 1]);
    assert_eq!(sample_sequences(&datagrams), vec![1, 2, 1]);

    // Restarted sequences are told apart by sub-agent
    let identities: Vec<(u32, u32)> =
        datagrams.iter().map(|d| (d.sub_agent_id, d.sequence_number)).collect();
    assert_eq!(identities, vec![(4, 1), (5, 1)]);
    Ok(())
}

#[tokio::test]
async fn test_missing_second_trace_sends_nothing() {
    init_tracing();
    let first = write_capture(&[frame(0, 60)]);
    let listener = Listener::start(None, Duration::from_millis(500)).await;

    let err = Pcap2Sflow::replay_files(
        &[first.path(), std::path::Path::new("/nonexistent/second.pcap")],
        &listener.target,
        &ReplayConfig::default(),
        SessionMode::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ReplayError::TraceOpen { .. }));
    assert!(listener.finish().await.is_empty());
}

#[tokio::test]
async fn test_corrupt_trace_keeps_sent_frames() {
    init_tracing();
    let mut bytes = capture_bytes(&[frame(0, 60), frame(1, 70), frame(2, 80)]);
    bytes.truncate(bytes.len() - 20);
    let capture = write_bytes(&bytes);
    let listener = Listener::start(Some(2), LISTEN_TIMEOUT).await;

    let err = Pcap2Sflow::replay_file(capture.path(), &listener.target, &ReplayConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::TraceCorrupt { frame_index: 2, .. }));

    let datagrams = listener.finish().await;
    assert_eq!(header_lengths(&datagrams), vec![60, 70]);
}
