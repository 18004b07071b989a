//! Integration tests for the full ingestion pipeline
//!
//! These tests verify that the actors work correctly together:
//! - Ingestor → Dispatcher → Stackdriver sink (windowed averages)
//! - Ingestor → Dispatcher → StatsD sink (immediate gauges)
//! - Multiple ingestors fanning into one channel
//! - Graceful shutdown of the entire pipeline

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use turbine_collector::actors::dispatcher::DispatcherHandle;
use turbine_collector::actors::ingestor::{IngestorHandle, StreamConfig};
use turbine_collector::sinks::Sink;
use turbine_collector::sinks::stackdriver::StackdriverSink;
use turbine_collector::sinks::statsd::StatsdSink;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn stream_config(server: &MockServer) -> StreamConfig {
    let url = url::Url::parse(&server.uri()).unwrap();

    StreamConfig {
        host: url.host_str().unwrap().to_string(),
        port: url.port().unwrap(),
        path: String::new(),
        tls_enabled: false,
        // long enough that a replayed mock body cannot land a duplicate
        // window during the test
        reconnect_delay: Duration::from_secs(30),
        initial_read_timeout: Duration::from_secs(5),
        stream_read_timeout: Duration::from_secs(5),
    }
}

async fn mount_stream(server: &MockServer, cluster: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/turbine.stream"))
        .and(query_param("cluster", cluster))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn events_flow_from_stream_to_windowed_batches() {
    let turbine = MockServer::start().await;
    mount_stream(
        &turbine,
        "prod",
        concat!(
            "data: {\"name\":\"CommandX\",\"type\":\"HystrixCommand\",\"rollingCountSuccess\":10}\n",
            "data: {\"name\":\"CommandX\",\"type\":\"HystrixCommand\",\"rollingCountSuccess\":20}\n",
        ),
    )
    .await;

    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/custom"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&gateway)
        .await;

    let sink: Arc<dyn Sink> = Arc::new(StackdriverSink::with_flush_interval(
        "test-key".to_string(),
        format!("{}/v1/custom", gateway.uri()),
        Duration::from_millis(500),
    ));

    let (event_tx, event_rx) = mpsc::channel(64);
    let dispatcher = DispatcherHandle::spawn(event_rx, sink.clone());
    let ingestor = IngestorHandle::spawn(stream_config(&turbine), "prod".to_string(), event_tx);

    // wait for the first window to be published
    let report = timeout(Duration::from_secs(3), async {
        loop {
            let requests = gateway.received_requests().await.unwrap();
            if let Some(request) = requests.first() {
                break request.body_json::<serde_json::Value>().unwrap();
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("no batch was published");

    assert_eq!(report["proto_version"], 1);
    let data = report["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(
        data[0]["name"],
        "turbine_prod_CommandX_HystrixCommand_rollingCountSuccess"
    );
    assert_eq!(data[0]["value"], 15);

    ingestor.shutdown().await;
    dispatcher.join().await.unwrap();
    sink.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn events_flow_from_stream_to_immediate_gauges() {
    let turbine = MockServer::start().await;
    mount_stream(
        &turbine,
        "prod",
        "data: {\"name\":\"CommandX\",\"type\":\"HystrixCommand\",\"isCircuitBreakerOpen\":true}\n",
    )
    .await;

    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    let statsd_port = receiver.local_addr().unwrap().port();

    let sink: Arc<dyn Sink> = Arc::new(StatsdSink::new("127.0.0.1", statsd_port, "turbine").unwrap());

    let (event_tx, event_rx) = mpsc::channel(64);
    let dispatcher = DispatcherHandle::spawn(event_rx, sink.clone());
    let ingestor = IngestorHandle::spawn(stream_config(&turbine), "prod".to_string(), event_tx);

    let mut buf = [0u8; 512];
    let len = receiver.recv(&mut buf).unwrap();
    assert_eq!(
        String::from_utf8_lossy(&buf[..len]),
        "turbine.prod_CommandX_HystrixCommand_isCircuitBreakerOpen:1|g"
    );

    ingestor.shutdown().await;
    dispatcher.join().await.unwrap();
    sink.shutdown().await;
}

#[tokio::test]
async fn multiple_ingestors_share_one_window() {
    let turbine = MockServer::start().await;
    mount_stream(
        &turbine,
        "prod",
        "data: {\"name\":\"CommandX\",\"type\":\"HystrixCommand\",\"rollingCountSuccess\":10}\n",
    )
    .await;
    mount_stream(
        &turbine,
        "staging",
        "data: {\"name\":\"CommandX\",\"type\":\"HystrixCommand\",\"rollingCountSuccess\":30}\n",
    )
    .await;

    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&gateway)
        .await;

    let sink: Arc<dyn Sink> = Arc::new(StackdriverSink::with_flush_interval(
        "test-key".to_string(),
        gateway.uri(),
        Duration::from_millis(300),
    ));

    let (event_tx, event_rx) = mpsc::channel(64);
    let dispatcher = DispatcherHandle::spawn(event_rx, sink.clone());
    let ingestors = vec![
        IngestorHandle::spawn(stream_config(&turbine), "prod".to_string(), event_tx.clone()),
        IngestorHandle::spawn(
            stream_config(&turbine),
            "staging".to_string(),
            event_tx.clone(),
        ),
    ];
    drop(event_tx);

    // both clusters feed the same table, each under its own cluster-tagged
    // metric name
    let expected = [
        "turbine_prod_CommandX_HystrixCommand_rollingCountSuccess",
        "turbine_staging_CommandX_HystrixCommand_rollingCountSuccess",
    ];
    let names = timeout(Duration::from_secs(5), async {
        loop {
            let mut names = std::collections::HashSet::new();
            for request in gateway.received_requests().await.unwrap() {
                let report = request.body_json::<serde_json::Value>().unwrap();
                for point in report["data"].as_array().unwrap() {
                    names.insert(point["name"].as_str().unwrap().to_string());
                }
            }
            if names.len() >= 2 {
                break names;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("both clusters should be published");

    for name in expected {
        assert!(names.contains(name), "missing {name}");
    }

    for ingestor in &ingestors {
        ingestor.shutdown().await;
    }
    dispatcher.join().await.unwrap();
    sink.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_the_channel_and_flushes_the_tail_window() {
    let turbine = MockServer::start().await;
    mount_stream(
        &turbine,
        "prod",
        "data: {\"name\":\"CommandX\",\"type\":\"HystrixCommand\",\"rollingCountSuccess\":42}\n",
    )
    .await;

    let gateway = MockServer::start().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    Mock::given(method("POST"))
        .respond_with(move |request: &Request| {
            let _ = seen_tx.send(request.body_json::<serde_json::Value>().unwrap());
            ResponseTemplate::new(200)
        })
        .mount(&gateway)
        .await;

    // the window is far longer than the test: only the shutdown flush can
    // publish anything
    let sink: Arc<dyn Sink> = Arc::new(StackdriverSink::with_flush_interval(
        "test-key".to_string(),
        gateway.uri(),
        Duration::from_secs(600),
    ));

    let (event_tx, event_rx) = mpsc::channel(64);
    let dispatcher = DispatcherHandle::spawn(event_rx, sink.clone());
    let ingestor = IngestorHandle::spawn(stream_config(&turbine), "prod".to_string(), event_tx);

    // give the event time to travel ingestor -> dispatcher -> sink
    tokio::time::sleep(Duration::from_millis(300)).await;

    ingestor.shutdown().await;
    dispatcher.join().await.unwrap();
    sink.shutdown().await;

    let report = timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .expect("shutdown should publish the tail window")
        .unwrap();
    assert_eq!(report["data"][0]["value"], 42);
}
