//! Control-protocol round-trip over a real TCP socket.

use std::sync::Arc;

use fsift_analyzer::{AnalyzerApi, AnalyzerCommandHandler};
use fsift_media::registry::{MOTION_MODEL, SCENE_MODEL, TEXT_DET_MODEL};
use fsift_media::StubBackend;
use fsift_models::AnalyzerConfig;
use fsift_proto::{loopback, CommandResponse, ControlServer};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

fn stub_api() -> Arc<AnalyzerApi> {
    let mut config = AnalyzerConfig::default();
    config.scene_detector.input_size = 32;
    config.motion_detector.input_width = 32;
    config.text_detector.det_input_height = 32;
    config.text_detector.det_input_width = 32;
    config.pipeline.analysis_thread_count = 1;

    Arc::new(AnalyzerApi::new(
        config,
        Box::new(|_| {
            Ok(Arc::new(
                StubBackend::new()
                    .register_constant(SCENE_MODEL, vec![vec![1.0, 0.0, 0.0, 0.0]])
                    .register_constant(MOTION_MODEL, vec![vec![0.0; 84 * 8400]])
                    .register_constant(TEXT_DET_MODEL, vec![vec![0.0; 32 * 32]])
                    .into_registry(),
            ))
        }),
        Box::new(|_| {
            let (_frame_tx, frame_rx) = loopback(16);
            let (meta_tx, _meta_rx) = loopback(16);
            Ok((Box::new(frame_rx), Box::new(meta_tx)))
        }),
    ))
}

async fn send(stream: &mut TcpStream, line: &str) -> CommandResponse {
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut reply = String::new();
    reader.read_line(&mut reply).await.unwrap();
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn test_full_session_over_tcp() {
    let api = stub_api();
    api.initialize().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler = Arc::new(AnalyzerCommandHandler::new(Arc::clone(&api), shutdown_tx));
    let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.serve(handler, shutdown_rx));

    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = send(&mut stream, r#"{"command": "PING"}"#).await;
    assert_eq!(i32::from(response.code), 0);

    let response = send(&mut stream, r#"{"command": "GET_STATUS"}"#).await;
    assert_eq!(response.data["status"], json!(0)); // IDLE

    let response = send(&mut stream, r#"{"command": "START"}"#).await;
    assert_eq!(i32::from(response.code), 0);

    let response = send(&mut stream, r#"{"command": "GET_STATUS"}"#).await;
    assert_eq!(response.data["status"], json!(2)); // RUNNING

    let response = send(&mut stream, r#"{"command": "START"}"#).await;
    assert_eq!(i32::from(response.code), 4); // already running

    let response = send(&mut stream, r#"{"command": "GET_STATS"}"#).await;
    assert!(response.data["analyzed_frame_count"].is_i64());

    let response = send(&mut stream, r#"{"command": "STOP"}"#).await;
    assert_eq!(i32::from(response.code), 0);

    let response = send(
        &mut stream,
        r#"{"command": "CONFIG_SET", "parameters": {"keyframe_detector": {"min_score_threshold": 5.0}}}"#,
    )
    .await;
    assert_eq!(i32::from(response.code), 2); // invalid parameters

    let response = send(&mut stream, r#"{"command": "SHUTDOWN"}"#).await;
    assert_eq!(i32::from(response.code), 0);

    server_task.await.unwrap().unwrap();
}
