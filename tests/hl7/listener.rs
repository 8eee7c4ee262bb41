//! End-to-end tests for the clinical-messaging listener over real sockets

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hl7::message::{MSA_ACK_CODE, MSA_CONTROL_ID};
use hl7::{ClinicalRecord, Delimiters, Hl7Config, Hl7Listener, Message, MessageSink};

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<ClinicalRecord>>,
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn forward(&self, record: ClinicalRecord) -> hl7::Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Start a listener on an ephemeral port, returning the port and sink
async fn start_listener(config: Hl7Config) -> (u16, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let config = Hl7Config {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..config
    };
    let listener = Hl7Listener::bind(config, sink.clone())
        .await
        .expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(listener.run());
    (port, sink)
}

fn mllp(message: &str) -> Vec<u8> {
    let mut out = vec![0x0B];
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(&[0x1C, 0x0D]);
    out
}

/// Read one MLLP-framed acknowledgement and parse it.
///
/// `collected` persists across calls so that bytes of a following
/// acknowledgement coalesced into the same TCP segment are not lost.
async fn read_ack(stream: &mut TcpStream, collected: &mut Vec<u8>) -> Message {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = collected.windows(2).position(|w| w == [0x1C, 0x0D]) {
            let start = collected.iter().position(|&b| b == 0x0B).expect("start byte");
            assert!(start < end, "terminator before start byte");
            let text =
                String::from_utf8(collected[start + 1..end].to_vec()).expect("ack utf8");
            collected.drain(..end + 2);
            return Message::parse(&text, Delimiters::default()).expect("parse ack");
        }
        let n = stream.read(&mut chunk).await.expect("read ack");
        assert!(n > 0, "connection closed before acknowledgement");
        collected.extend_from_slice(&chunk[..n]);
    }
}

const RESULT_MSG: &str = "MSH|^~\\&|RIS|HOSP|PORTAL|HOSP|20240101||ORU^R01|12345|P|2.3\r\
                          PID|1||P001||DOE^JANE\r\
                          OBR|1||ACC001|CT CHEST\r\
                          OBX|1|TX|IMPRESSION||Normal.||||||F";

#[tokio::test]
async fn result_message_is_forwarded_and_accepted() {
    let (port, sink) = start_listener(Hl7Config::default()).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    stream.write_all(&mllp(RESULT_MSG)).await.unwrap();
    let mut residue = Vec::new();
    let ack = read_ack(&mut stream, &mut residue).await;

    let msa = ack.segment("MSA").expect("MSA segment");
    assert_eq!(msa.field(MSA_ACK_CODE), "AA");
    assert_eq!(msa.field(MSA_CONTROL_ID), "12345");

    let records = sink.records.lock().unwrap();
    match &records[0] {
        ClinicalRecord::Result {
            accession,
            sections,
            ..
        } => {
            assert_eq!(accession, "ACC001");
            assert_eq!(sections.impression, "Normal.");
        }
        other => panic!("unexpected record: {other:?}"),
    }
}

#[tokio::test]
async fn demographic_update_without_order_segment_is_accepted() {
    let (port, sink) = start_listener(Hl7Config::default()).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let message = "MSH|^~\\&|RIS|HOSP|PORTAL|HOSP|20240101||ADT^A08|A1|P|2.3\r\
                   PID|1||P009||ROE^RICHARD||19550505|M";
    stream.write_all(&mllp(message)).await.unwrap();
    let mut residue = Vec::new();
    let ack = read_ack(&mut stream, &mut residue).await;

    let msa = ack.segment("MSA").unwrap();
    assert_eq!(msa.field(MSA_ACK_CODE), "AA");
    assert_eq!(msa.field(MSA_CONTROL_ID), "A1");

    let records = sink.records.lock().unwrap();
    assert!(matches!(
        &records[0],
        ClinicalRecord::DemographicUpdate { patient, .. } if patient.patient_id == "P009"
    ));
}

#[tokio::test]
async fn headerless_message_is_rejected_and_connection_survives() {
    let (port, sink) = start_listener(Hl7Config::default()).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    stream.write_all(&mllp("PID|1||P001")).await.unwrap();
    let mut residue = Vec::new();
    let ack = read_ack(&mut stream, &mut residue).await;
    let msa = ack.segment("MSA").unwrap();
    assert_eq!(msa.field(MSA_ACK_CODE), "AE");
    assert_eq!(msa.field(MSA_CONTROL_ID), "");

    // The same connection still accepts a valid message afterwards.
    stream.write_all(&mllp(RESULT_MSG)).await.unwrap();
    let ack = read_ack(&mut stream, &mut residue).await;
    assert_eq!(ack.segment("MSA").unwrap().field(MSA_ACK_CODE), "AA");
    assert_eq!(sink.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_order_segment_is_rejected_with_control_id() {
    let (port, sink) = start_listener(Hl7Config::default()).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let message = "MSH|^~\\&|RIS|HOSP|PORTAL|HOSP|20240101||ORM^O01|B2|P|2.3\r\
                   PID|1||P010||POE^EDGAR";
    stream.write_all(&mllp(message)).await.unwrap();
    let mut residue = Vec::new();
    let ack = read_ack(&mut stream, &mut residue).await;

    let msa = ack.segment("MSA").unwrap();
    assert_eq!(msa.field(MSA_ACK_CODE), "AE");
    assert_eq!(msa.field(MSA_CONTROL_ID), "B2");
    assert!(sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn frame_split_across_writes_reassembles() {
    let (port, _sink) = start_listener(Hl7Config::default()).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let framed = mllp(RESULT_MSG);
    let split = framed.len() / 2;
    stream.write_all(&framed[..split]).await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    stream.write_all(&framed[split..]).await.unwrap();

    let mut residue = Vec::new();
    let ack = read_ack(&mut stream, &mut residue).await;
    assert_eq!(ack.segment("MSA").unwrap().field(MSA_ACK_CODE), "AA");
}

#[tokio::test]
async fn two_messages_on_one_connection_are_acknowledged_in_order() {
    let (port, sink) = start_listener(Hl7Config::default()).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let second = "MSH|^~\\&|RIS|HOSP|PORTAL|HOSP|20240101||ADT^A08|C3|P|2.3\r\
                  PID|1||P011||FOE^FRED";
    let mut bytes = mllp(RESULT_MSG);
    bytes.extend_from_slice(&mllp(second));
    stream.write_all(&bytes).await.unwrap();

    // Give both acknowledgements time to coalesce into one TCP segment;
    // the second must still be readable.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let mut residue = Vec::new();
    let first_ack = read_ack(&mut stream, &mut residue).await;
    assert_eq!(first_ack.segment("MSA").unwrap().field(MSA_CONTROL_ID), "12345");
    let second_ack = read_ack(&mut stream, &mut residue).await;
    assert_eq!(second_ack.segment("MSA").unwrap().field(MSA_CONTROL_ID), "C3");

    assert_eq!(sink.records.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn unterminated_frame_past_size_limit_closes_connection() {
    let config = Hl7Config {
        max_message_bytes: 64,
        ..Default::default()
    };
    let (port, sink) = start_listener(config).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    // A start byte followed by far more than the limit, never terminated.
    let mut bytes = vec![0x0B];
    bytes.extend_from_slice(&[b'A'; 256]);
    stream.write_all(&bytes).await.unwrap();

    let mut buffer = [0u8; 16];
    let n = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .expect("listener should drop the connection")
        .expect("clean close expected");
    assert_eq!(n, 0);
    assert!(sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn idle_connection_is_closed_after_timeout() {
    let config = Hl7Config {
        idle_timeout_secs: 1,
        ..Default::default()
    };
    let (port, _sink) = start_listener(config).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    // Without traffic, the listener closes the socket; the read then
    // observes EOF.
    let mut buffer = [0u8; 16];
    let n = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .expect("listener should close the idle connection")
        .expect("clean close expected");
    assert_eq!(n, 0);
}
