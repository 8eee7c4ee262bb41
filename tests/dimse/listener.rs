//! End-to-end tests for the image-transfer listener over real sockets

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use dimse::command::{c_store_rq, CommandSet, STATUS_PROCESSING_FAILURE, STATUS_SUCCESS};
use dimse::pdu::{self, AssociateRq, Pdu, Pdv, ProposedContext, EXPLICIT_VR_LE};
use dimse::{DimseConfig, StoreScp, StudyRecord, StudySink};

const CT_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<StudyRecord>>,
}

#[async_trait]
impl StudySink for RecordingSink {
    async fn forward(&self, record: StudyRecord) -> dimse::Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl dimse::PayloadStore for MemoryStore {
    async fn store(&self, file_name: &str, payload: &[u8]) -> dimse::Result<PathBuf> {
        self.files
            .lock()
            .unwrap()
            .push((file_name.to_string(), payload.to_vec()));
        Ok(PathBuf::from("/studies").join(file_name))
    }
}

async fn start_listener() -> (u16, Arc<RecordingSink>, Arc<MemoryStore>) {
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(MemoryStore::default());
    let config = DimseConfig {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..Default::default()
    };
    let listener = StoreScp::bind(config, sink.clone(), store.clone())
        .await
        .expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(listener.run());
    (port, sink, store)
}

/// Read one complete PDU off the stream
async fn read_pdu(stream: &mut TcpStream) -> Pdu {
    let mut header = [0u8; 6];
    stream.read_exact(&mut header).await.expect("pdu header");
    let length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.expect("pdu body");
    pdu::decode(header[0], &body).expect("decode pdu")
}

fn associate_rq() -> Vec<u8> {
    AssociateRq {
        called_ae: "RADGATE_SCP".to_string(),
        calling_ae: "CT01".to_string(),
        presentation_contexts: vec![ProposedContext {
            id: 1,
            abstract_syntax: CT_STORAGE.to_string(),
            transfer_syntaxes: vec![EXPLICIT_VR_LE.to_string()],
        }],
        max_pdu_length: Some(32768),
    }
    .encode()
}

fn push_element(out: &mut Vec<u8>, group: u16, element: u16, vr: &[u8; 2], value: &[u8]) {
    let padded = value.len() + value.len() % 2;
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(vr);
    out.extend_from_slice(&(padded as u16).to_le_bytes());
    out.extend_from_slice(value);
    if value.len() % 2 == 1 {
        out.push(0);
    }
}

fn sample_payload(sop_instance_uid: &str) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    push_element(&mut out, 0x0008, 0x0018, b"UI", sop_instance_uid.as_bytes());
    push_element(&mut out, 0x0008, 0x0060, b"CS", b"CT");
    push_element(&mut out, 0x0010, 0x0010, b"PN", b"DOE^JANE");
    push_element(&mut out, 0x0010, 0x0020, b"LO", b"P001");
    out
}

async fn associate(stream: &mut TcpStream) {
    stream.write_all(&associate_rq()).await.unwrap();
    match read_pdu(stream).await {
        Pdu::AssociateAc(ac) => {
            assert_eq!(ac.accepted_contexts.len(), 1);
            assert_eq!(ac.accepted_contexts[0].result, 0);
        }
        other => panic!("expected associate-ac first, got {other:?}"),
    }
}

fn store_command(sop_instance: &str, message_id: u16) -> Vec<u8> {
    pdu::encode_p_data(&[Pdv {
        context_id: 1,
        is_command: true,
        is_last: true,
        data: c_store_rq(CT_STORAGE, sop_instance, message_id),
    }])
}

fn store_data(payload: Vec<u8>) -> Vec<u8> {
    pdu::encode_p_data(&[Pdv {
        context_id: 1,
        is_command: false,
        is_last: true,
        data: payload,
    }])
}

fn parse_rsp(pdu: Pdu) -> CommandSet {
    match pdu {
        Pdu::PDataTf(pdvs) => CommandSet::parse(&pdvs[0].data).expect("parse response"),
        other => panic!("expected p-data response, got {other:?}"),
    }
}

#[tokio::test]
async fn association_accept_precedes_any_data_handling() {
    let (port, sink, _) = start_listener().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    // Data sent before the association is ignored, not answered.
    stream
        .write_all(&store_data(sample_payload("1.9.9")))
        .await
        .unwrap();
    associate(&mut stream).await;
    assert!(sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn store_round_trip_persists_and_forwards() {
    let (port, sink, store) = start_listener().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    associate(&mut stream).await;

    let payload = sample_payload("1.2.3.4.5");
    stream.write_all(&store_command("1.2.3.4.5", 7)).await.unwrap();
    stream.write_all(&store_data(payload.clone())).await.unwrap();

    let rsp = parse_rsp(read_pdu(&mut stream).await);
    assert_eq!(rsp.status(), Some(STATUS_SUCCESS));
    assert_eq!(rsp.message_id_responded_to(), Some(7));

    let files = store.files.lock().unwrap();
    assert_eq!(files[0].0, "1.2.3.4.5.dcm");
    assert_eq!(files[0].1, payload);

    let records = sink.records.lock().unwrap();
    assert_eq!(records[0].attributes.sop_instance_uid, "1.2.3.4.5");
    assert_eq!(records[0].attributes.patient_id, "P001");
    assert_eq!(
        records[0].storage_path,
        PathBuf::from("/studies/1.2.3.4.5.dcm")
    );
}

#[tokio::test]
async fn corrupted_value_length_yields_failure_status_not_teardown() {
    let (port, _, _) = start_listener().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    associate(&mut stream).await;

    // A data-transfer frame whose value length overruns the frame body.
    let mut frame = vec![pdu::PDU_P_DATA_TF, 0, 0, 0, 0, 8];
    frame.extend_from_slice(&[0, 0, 0, 50, 1, 2, 9, 9]);
    stream.write_all(&frame).await.unwrap();

    let rsp = parse_rsp(read_pdu(&mut stream).await);
    assert_eq!(rsp.status(), Some(STATUS_PROCESSING_FAILURE));

    // The association survives for a subsequent valid transfer.
    stream.write_all(&store_command("1.2.8", 2)).await.unwrap();
    stream
        .write_all(&store_data(sample_payload("1.2.8")))
        .await
        .unwrap();
    let rsp = parse_rsp(read_pdu(&mut stream).await);
    assert_eq!(rsp.status(), Some(STATUS_SUCCESS));
}

#[tokio::test]
async fn truncated_payload_still_stores_partial_attributes() {
    let (port, sink, _) = start_listener().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    associate(&mut stream).await;

    let mut payload = sample_payload("1.2.4");
    // Append an element declaring more bytes than are present.
    payload.extend_from_slice(&0x0008u16.to_le_bytes());
    payload.extend_from_slice(&0x0050u16.to_le_bytes());
    payload.extend_from_slice(b"SH");
    payload.extend_from_slice(&0xFF00u16.to_le_bytes());
    payload.extend_from_slice(b"AC");

    stream.write_all(&store_command("1.2.4", 4)).await.unwrap();
    stream.write_all(&store_data(payload)).await.unwrap();

    let rsp = parse_rsp(read_pdu(&mut stream).await);
    assert_eq!(rsp.status(), Some(STATUS_SUCCESS));

    let records = sink.records.lock().unwrap();
    assert_eq!(records[0].attributes.sop_instance_uid, "1.2.4");
    assert_eq!(records[0].attributes.accession_number, "");
}

#[tokio::test]
async fn release_request_gets_confirmation_then_close() {
    let (port, _, _) = start_listener().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    associate(&mut stream).await;

    stream.write_all(&pdu::encode_release_rq()).await.unwrap();
    assert_eq!(read_pdu(&mut stream).await, Pdu::ReleaseRp);

    let mut buffer = [0u8; 16];
    let n = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .expect("socket should close after release")
        .expect("clean close expected");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn two_transfers_on_one_association() {
    let (port, sink, _) = start_listener().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    associate(&mut stream).await;

    for (uid, id) in [("1.3.1", 1u16), ("1.3.2", 2u16)] {
        stream.write_all(&store_command(uid, id)).await.unwrap();
        stream
            .write_all(&store_data(sample_payload(uid)))
            .await
            .unwrap();
        let rsp = parse_rsp(read_pdu(&mut stream).await);
        assert_eq!(rsp.status(), Some(STATUS_SUCCESS));
        assert_eq!(rsp.message_id_responded_to(), Some(id));
    }
    assert_eq!(sink.records.lock().unwrap().len(), 2);
}
