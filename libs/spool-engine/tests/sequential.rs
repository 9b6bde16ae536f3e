mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use common::{BasicTypes, Harness, Strings, for_each_backend};
use spool_api::codec::Message;
use spool_api::metadata::TopicMetadata;
use spool_api::record::TopicRecord;
use spool_api::storage::StorageDescriptor;
use spool_engine::{BackendRegistry, EngineError, SequentialReader, SequentialWriter, SplitPolicy};
use spool_format_json::JsonCodec;
use spool_storage_memory::MemoryStorageFactory;

fn basic(name: &str) -> TopicMetadata {
    TopicMetadata::new(name, "Basic", "fmt1")
}

#[test]
fn write_two_records_then_read_them_back() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("X")).unwrap();
        writer.create_topic(basic("/t")).unwrap();
        writer.write(TopicRecord::new("/t", &b"a"[..], 100)).unwrap();
        writer.write(TopicRecord::new("/t", &b"b"[..], 200)).unwrap();
        writer.close().unwrap();

        let mut reader = h.reader("X");
        assert!(reader.has_next().unwrap());
        let first = reader.read_next().unwrap();
        assert_eq!(first.data, Bytes::from_static(b"a"));
        assert_eq!(first.recv_timestamp, 100);
        let second = reader.read_next().unwrap();
        assert_eq!(second.data, Bytes::from_static(b"b"));
        assert_eq!(second.recv_timestamp, 200);
        assert!(!reader.has_next().unwrap());
    });
}

#[test]
fn order_is_preserved_across_topics() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        for name in ["/a", "/b", "/c"] {
            writer.create_topic(basic(name)).unwrap();
        }

        let mut expected = Vec::new();
        for i in 0..30i64 {
            let topic = ["/a", "/b", "/c"][(i * 7 % 3) as usize];
            // Timestamps deliberately not monotonic: order is write order.
            let ts = (i * 37) % 11;
            writer
                .write(TopicRecord::new(topic, i.to_string().into_bytes(), ts))
                .unwrap();
            expected.push((topic.to_string(), ts));
        }
        writer.close().unwrap();

        let mut reader = h.reader("bag");
        assert_eq!(Harness::drain(&mut reader), expected);
    });
}

#[test]
fn writes_need_a_created_topic() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();

        let err = writer
            .write(TopicRecord::new("/t", &b"x"[..], 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::TopicNotFound(ref t) if t == "/t"));

        writer.create_topic(basic("/t")).unwrap();
        writer.write(TopicRecord::new("/t", &b"x"[..], 1)).unwrap();
        writer.close().unwrap();

        assert_eq!(Harness::drain(&mut h.reader("bag")).len(), 1);
    });
}

#[test]
fn conflicting_type_is_rejected_identical_is_noop() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        writer.create_topic(TopicMetadata::new("/t", "A", "json")).unwrap();
        writer.create_topic(TopicMetadata::new("/t", "A", "json")).unwrap();

        let err = writer
            .write_serialized(&b"x"[..], "/t", "B", 1)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::MetadataConflict { ref registered_type, ref requested_type, .. }
                if registered_type == "A" && requested_type == "B"
        ));

        let err = writer
            .create_topic(TopicMetadata::new("/t", "A", "cdr"))
            .unwrap_err();
        assert!(matches!(err, EngineError::MetadataConflict { .. }));

        assert_eq!(writer.topics(), vec![TopicMetadata::new("/t", "A", "json")]);
        writer.close().unwrap();

        let reader = h.reader("bag");
        assert_eq!(reader.topics().unwrap().len(), 1);
    });
}

#[test]
fn rollover_keeps_containers_apart() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("A")).unwrap();
        writer.create_topic(basic("/t")).unwrap();
        writer.write(TopicRecord::new("/t", &b"R1"[..], 1)).unwrap();

        writer.open_uri(&h.uri("B")).unwrap();
        writer.create_topic(basic("/t")).unwrap();
        writer.write(TopicRecord::new("/t", &b"R2"[..], 2)).unwrap();
        writer.close().unwrap();

        let mut a = h.reader("A");
        let mut b = h.reader("B");
        assert_eq!(a.read_next().unwrap().data, Bytes::from_static(b"R1"));
        assert!(!a.has_next().unwrap());
        assert_eq!(b.read_next().unwrap().data, Bytes::from_static(b"R2"));
        assert!(!b.has_next().unwrap());
    });
}

#[test]
fn typed_messages_round_trip() {
    for_each_backend(|h| {
        let sent = BasicTypes {
            bool_value: true,
            int32_value: -7,
            float64_value: 0.5,
            string_value: "hello".into(),
        };
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        writer.write_message(&sent, "/basic", 10).unwrap();
        writer.close().unwrap();

        let mut reader = h.reader("bag");
        assert_eq!(
            reader.topics().unwrap(),
            vec![TopicMetadata::new("/basic", BasicTypes::TYPE_NAME, "json")]
        );
        let (record, received) = reader.read_message::<BasicTypes>().unwrap();
        assert_eq!(record.recv_timestamp, 10);
        assert_eq!(received, sent);
    });
}

#[test]
fn decoding_as_another_type_fails() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        writer
            .write_message(&Strings { data: "x".into() }, "/s", 1)
            .unwrap();
        writer
            .write_serialized(&b"{}"[..], "/raw", "Raw", 2)
            .unwrap();
        writer
            .create_topic(TopicMetadata::new("/cdr", BasicTypes::TYPE_NAME, "cdr"))
            .unwrap();
        writer.write(TopicRecord::new("/cdr", &b"\x00\x01"[..], 3)).unwrap();
        writer.close().unwrap();

        let mut reader = h.reader("bag");
        assert!(matches!(
            reader.read_message::<BasicTypes>(),
            Err(EngineError::Decode(_))
        ));
        assert!(matches!(
            reader.read_message::<BasicTypes>(),
            Err(EngineError::Decode(_))
        ));
        // Right type name, but stored in a format the JSON codec does not read.
        assert!(matches!(
            reader.read_message::<BasicTypes>(),
            Err(EngineError::Decode(_))
        ));
        assert!(!reader.has_next().unwrap());
    });
}

#[test]
fn end_of_stream_is_an_error_not_a_default() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        writer.create_topic(basic("/t")).unwrap();
        writer.write(TopicRecord::new("/t", &b"only"[..], 1)).unwrap();
        writer.close().unwrap();

        let mut reader = h.reader("bag");
        reader.read_next().unwrap();
        assert!(!reader.has_next().unwrap());
        assert!(matches!(reader.read_next(), Err(EngineError::EndOfStorage)));
        assert!(matches!(reader.read_next(), Err(EngineError::EndOfStorage)));
    });
}

#[test]
fn empty_container_has_nothing_to_read() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        writer.close().unwrap();

        let mut reader = h.reader("bag");
        assert!(reader.topics().unwrap().is_empty());
        assert!(!reader.has_next().unwrap());
    });
}

#[test]
fn close_twice_is_harmless() {
    for_each_backend(|h| {
        let mut writer = h.writer();
        writer.open(h.descriptor("bag")).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.create_topic(basic("/t")),
            Err(EngineError::NotOpen)
        ));

        let mut reader = h.reader("bag");
        reader.close().unwrap();
        reader.close().unwrap();
        assert!(matches!(reader.read_next(), Err(EngineError::NotOpen)));
    });
}

#[test]
fn second_writer_on_held_container_fails_fast() {
    for_each_backend(|h| {
        let mut first = h.writer();
        first.open(h.descriptor("bag")).unwrap();

        let mut second = h.writer();
        let err = second.open(h.descriptor("bag")).unwrap_err();
        assert!(matches!(err, EngineError::StorageOpen(_)), "{err}");
        assert!(!second.is_open());

        let mut reader = SequentialReader::new(h.backends.clone(), JsonCodec);
        assert!(matches!(
            reader.open(h.descriptor("bag")),
            Err(EngineError::StorageOpen(_))
        ));
    });
}

#[test]
fn dropping_a_writer_releases_the_container() {
    for_each_backend(|h| {
        {
            let mut writer = h.writer();
            writer.open(h.descriptor("bag")).unwrap();
            writer.create_topic(basic("/t")).unwrap();
            writer.write(TopicRecord::new("/t", &b"x"[..], 1)).unwrap();
        }

        let mut writer = h.writer();
        writer.open_append(h.descriptor("bag")).unwrap();
        assert_eq!(writer.topics(), vec![basic("/t")]);
        writer.write(TopicRecord::new("/t", &b"y"[..], 2)).unwrap();
        assert!(matches!(
            writer.create_topic(TopicMetadata::new("/t", "Other", "fmt1")),
            Err(EngineError::MetadataConflict { .. })
        ));
        drop(writer);

        let stamps: Vec<i64> = Harness::drain(&mut h.reader("bag"))
            .into_iter()
            .map(|(_, ts)| ts)
            .collect();
        assert_eq!(stamps, [1, 2]);
    });
}

#[test]
fn missing_container_cannot_be_read_or_appended() {
    for_each_backend(|h| {
        let mut reader = SequentialReader::new(h.backends.clone(), JsonCodec);
        assert!(matches!(
            reader.open(h.descriptor("absent")),
            Err(EngineError::ContainerNotFound(_))
        ));

        let mut writer = h.writer();
        assert!(matches!(
            writer.open_append(h.descriptor("absent")),
            Err(EngineError::ContainerNotFound(_))
        ));
    });
}

#[test]
fn split_policy_carries_topics_into_each_part() {
    for_each_backend(|h| {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut writer = h.writer().with_split_policy(SplitPolicy {
            max_records: Some(3),
            ..Default::default()
        });
        writer.on_split(move |e| sink.lock().unwrap().push(e.opened_uri.clone()));
        writer.open(h.descriptor("run")).unwrap();
        writer.create_topic(basic("/a")).unwrap();
        writer.create_topic(basic("/b")).unwrap();
        for ts in 0..7 {
            let topic = if ts % 2 == 0 { "/a" } else { "/b" };
            writer.write(TopicRecord::new(topic, &b"x"[..], ts)).unwrap();
        }
        writer.close().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            [h.uri("run_1"), h.uri("run_2")]
        );

        let mut total = 0;
        for (part, expected) in [("run", 3), ("run_1", 3), ("run_2", 1)] {
            let mut reader = h.reader(part);
            assert_eq!(reader.topics().unwrap(), vec![basic("/a"), basic("/b")]);
            let records = Harness::drain(&mut reader);
            assert_eq!(records.len(), expected, "{part}");
            total += records.len();
        }
        assert_eq!(total, 7);
    });
}

#[test]
fn split_part_is_only_created_for_a_record() {
    for_each_backend(|h| {
        let mut writer = h.writer().with_split_policy(SplitPolicy {
            max_records: Some(2),
            ..Default::default()
        });
        writer.open(h.descriptor("run")).unwrap();
        writer.create_topic(basic("/t")).unwrap();
        writer.write(TopicRecord::new("/t", &b"1"[..], 1)).unwrap();
        writer.write(TopicRecord::new("/t", &b"2"[..], 2)).unwrap();
        writer.close().unwrap();

        assert_eq!(Harness::drain(&mut h.reader("run")).len(), 2);
        let mut reader = SequentialReader::new(h.backends.clone(), JsonCodec);
        assert!(matches!(
            reader.open(h.descriptor("run_1")),
            Err(EngineError::ContainerNotFound(_))
        ));
    });
}

#[test]
fn split_by_duration() {
    for_each_backend(|h| {
        let mut writer = h.writer().with_split_policy(SplitPolicy {
            max_duration: Some(1_000),
            ..Default::default()
        });
        writer.open(h.descriptor("run")).unwrap();
        writer.create_topic(basic("/t")).unwrap();
        for ts in [0, 400, 999, 1_000, 1_500] {
            writer.write(TopicRecord::new("/t", &b"x"[..], ts)).unwrap();
        }
        writer.close().unwrap();

        assert_eq!(Harness::drain(&mut h.reader("run")).len(), 4);
        assert_eq!(Harness::drain(&mut h.reader("run_1")).len(), 1);
    });
}

#[test]
fn corrupt_line_surfaces_as_corrupt_record() {
    let h = Harness::new("file");
    let mut writer = h.writer();
    writer.open(h.descriptor("bag")).unwrap();
    writer.create_topic(basic("/t")).unwrap();
    writer.write(TopicRecord::new("/t", &b"ok"[..], 1)).unwrap();
    writer.close().unwrap();

    let records = std::path::Path::new(&h.uri("bag")).join("records.jsonl");
    let mut f = std::fs::OpenOptions::new().append(true).open(records).unwrap();
    writeln!(f, "{{\"topic\":\"/t\"").unwrap();

    let mut reader = h.reader("bag");
    let results: Vec<_> = reader.records().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(EngineError::CorruptRecord(_))));
    assert!(matches!(reader.read_next(), Err(EngineError::CorruptRecord(_))));
}

#[test]
fn memory_capacity_is_an_io_error() {
    let mut backends = BackendRegistry::new();
    backends.register(Arc::new(MemoryStorageFactory::with_max_records(1)));
    let mut writer = SequentialWriter::new(Arc::new(backends), JsonCodec);

    writer.open(StorageDescriptor::new("memory", "bag")).unwrap();
    writer.create_topic(basic("/t")).unwrap();
    writer.write(TopicRecord::new("/t", &b"1"[..], 1)).unwrap();
    assert!(matches!(
        writer.write(TopicRecord::new("/t", &b"2"[..], 2)),
        Err(EngineError::Io(_))
    ));
    assert_eq!(writer.stats().unwrap().records, 1);
}
